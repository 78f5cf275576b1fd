//! OAuth authorization-code flow lifecycle and token storage.
//!
//! `start_oauth` only begins an asynchronous exchange; its completion is
//! written into a single-slot mailbox the caller polls. Provider and
//! network failures therefore never propagate synchronously — they land in
//! the mailbox as the failed variant.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use url::Url;

use crate::{
    error::{Error, Result},
    token::AccessToken,
};

/// The external collaborator that performs the actual authorization-code
/// exchange, browser interaction included.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    async fn authorize(&self, client_id: &str, redirect_uri: &Url) -> Result<AccessToken>;
}

/// Terminal state of one authorization exchange.
#[derive(Clone, Debug)]
pub enum OAuthResult {
    Completed(AccessToken),
    Failed(String),
}

/// Single-slot, last-write-wins mailbox bridging the asynchronous exchange
/// to the polling caller. Writing over an unread result replaces it;
/// callers are expected to poll promptly.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

// A derived Default would demand `T: Default`; the empty slot needs no
// such bound.
impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, value: T) {
        let mut slot = self.lock();
        if slot.is_some() {
            warn!("overwriting unread result; callers should poll promptly");
        }
        *slot = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lock().is_some()
    }
}

/// Owns the token lifecycle: one in-flight flow, one result slot, one live
/// token per process.
pub struct AuthManager {
    flow: Arc<dyn AuthFlow>,
    in_flight: Arc<AtomicBool>,
    mailbox: Arc<Mailbox<OAuthResult>>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl AuthManager {
    pub fn new(flow: Arc<dyn AuthFlow>) -> Self {
        Self {
            flow,
            in_flight: Arc::new(AtomicBool::new(false)),
            mailbox: Arc::new(Mailbox::default()),
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Begins an authorization-code exchange on `runtime`.
    ///
    /// Fails immediately on malformed input or when a flow is already in
    /// flight; afterwards the outcome is only observable through the
    /// mailbox.
    pub fn start_oauth(&self, runtime: &Handle, client_id: &str, redirect_uri: &str) -> Result<()> {
        if client_id.trim().is_empty() {
            return Err(Error::invalid_input("client id is empty"));
        }
        let redirect = Url::parse(redirect_uri)?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::auth("an authorization flow is already in progress"));
        }

        let flow = Arc::clone(&self.flow);
        let in_flight = Arc::clone(&self.in_flight);
        let mailbox = Arc::clone(&self.mailbox);
        let token_slot = Arc::clone(&self.token);
        let client_id = client_id.to_owned();

        runtime.spawn(async move {
            let result = match flow.authorize(&client_id, &redirect).await {
                Ok(token) => {
                    debug!(
                        "authorization completed; token lives for {}s",
                        token.time_to_live().as_secs()
                    );
                    // The new token supersedes any previous one.
                    *token_slot.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(token.clone());
                    OAuthResult::Completed(token)
                }
                Err(e) => {
                    warn!("authorization failed: {e}");
                    OAuthResult::Failed(e.to_string())
                }
            };

            mailbox.put(result);
            in_flight.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    #[must_use]
    pub fn has_result(&self) -> bool {
        self.mailbox.is_full()
    }

    pub fn clear_result(&self) {
        let _ = self.mailbox.take();
    }

    pub fn take_result(&self) -> Option<OAuthResult> {
        self.mailbox.take()
    }

    fn with_token<T>(&self, f: impl FnOnce(&AccessToken) -> T) -> Option<T> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    /// Pure read of the last completed token; never triggers a refresh.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.with_token(|token| token.access_token.clone())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.with_token(|token| token.refresh_token.clone())
    }

    #[must_use]
    pub fn token_expires_in(&self) -> Option<Duration> {
        self.with_token(AccessToken::time_to_live)
    }

    /// A clone of the live token, for session establishment.
    #[must_use]
    pub fn token(&self) -> Option<AccessToken> {
        self.with_token(Clone::clone)
    }

    /// Drops the live token.
    pub fn invalidate_token(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
