//! The engine: one process-wide facade over authentication, settings and
//! the (at most one) live session.
//!
//! The engine owns its own multi-threaded runtime so that callers never
//! need an async context; every operation here is a plain blocking call
//! with a bounded internal timeout. Auth state and settings outlive
//! sessions; everything else is torn down with `cleanup`.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::{runtime::Runtime, time::timeout};

use crate::{
    auth::{AuthFlow, AuthManager, OAuthResult},
    connect::{Connector, DeviceConfig, Resolver},
    error::{Error, Result},
    gateway::WebApi,
    session::Session,
    settings::{Bitrate, Settings, SettingsStore},
    token::AccessToken,
    track::QueueItem,
};

/// Upper bound on session establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Nominal lifetime assumed for tokens supplied as bare strings, which
/// carry no expiry of their own.
const ASSUMED_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

pub struct Player {
    runtime: Runtime,
    auth: AuthManager,
    settings: SettingsStore,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn Resolver>,
    session: RwLock<Option<Session>>,
}

impl Player {
    /// An engine wired to the default Web API collaborators.
    pub fn new() -> Result<Self> {
        let api = Arc::new(WebApi::new()?);
        Self::with_collaborators(api.clone(), api.clone(), api)
    }

    /// An engine with injected collaborators.
    pub fn with_collaborators(
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn Resolver>,
        flow: Arc<dyn AuthFlow>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("coda-engine")
            .enable_all()
            .build()
            .map_err(|e| Error::assertion(format!("building runtime failed: {e}")))?;

        Ok(Self {
            runtime,
            auth: AuthManager::new(flow),
            settings: SettingsStore::new(),
            connector,
            resolver,
            session: RwLock::new(None),
        })
    }

    // Session lifecycle

    /// Establishes the session, binding the device identity and a snapshot
    /// of the current settings for its whole lifetime.
    pub fn init(&self, access_token: &str, device: DeviceConfig) -> Result<()> {
        // A token string matching the managed one keeps its real expiry;
        // any other bare string gets a nominal lifetime.
        let token = match self.auth.token() {
            Some(live) if live.access_token == access_token => live,
            _ => AccessToken::new(access_token, "", ASSUMED_TOKEN_LIFETIME)?,
        };
        if token.is_expired() {
            return Err(Error::AuthExpired);
        }

        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::SessionAlreadyActive);
        }

        let settings = self.settings.snapshot();
        let handle = self.runtime.block_on(async {
            timeout(
                CONNECT_TIMEOUT,
                self.connector.connect(&token, &device, &settings),
            )
            .await?
        })?;

        *slot = Some(Session::start(
            handle,
            device,
            settings,
            Arc::clone(&self.resolver),
            self.runtime.handle().clone(),
        ));
        Ok(())
    }

    /// Tears the session down. Idempotent; auth state and settings
    /// survive.
    pub fn cleanup(&self) {
        let taken = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(session) => session.shutdown(),
            None => debug!("cleanup without a live session; nothing to do"),
        }
    }

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(session) => f(session),
            None => Err(Error::NoActiveSession),
        }
    }

    fn read_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    // Authentication

    pub fn start_oauth(&self, client_id: &str, redirect_uri: &str) -> Result<()> {
        self.auth
            .start_oauth(self.runtime.handle(), client_id, redirect_uri)
    }

    #[must_use]
    pub fn has_oauth_result(&self) -> bool {
        self.auth.has_result()
    }

    pub fn clear_oauth_result(&self) {
        self.auth.clear_result();
    }

    pub fn take_oauth_result(&self) -> Option<OAuthResult> {
        self.auth.take_result()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.auth.access_token()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.auth.refresh_token()
    }

    #[must_use]
    pub fn token_expires_in(&self) -> Option<Duration> {
        self.auth.token_expires_in()
    }

    // Playback commands

    pub fn play_tracks(&self, uris: &[String]) -> Result<()> {
        self.with_session(|session| session.play_tracks(uris))
    }

    pub fn play_track(&self, uri_or_url: &str) -> Result<()> {
        self.with_session(|session| session.play_track(uri_or_url))
    }

    pub fn pause(&self) -> Result<()> {
        self.with_session(Session::pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.with_session(Session::resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.with_session(Session::stop)
    }

    pub fn next(&self) -> Result<()> {
        self.with_session(Session::next)
    }

    pub fn previous(&self) -> Result<()> {
        self.with_session(Session::previous)
    }

    pub fn seek(&self, position_ms: u32) -> Result<()> {
        self.with_session(|session| session.seek(position_ms))
    }

    pub fn jump_to_index(&self, index: usize) -> Result<()> {
        self.with_session(|session| session.jump_to_index(index))
    }

    pub fn set_volume(&self, volume: u16) -> Result<()> {
        self.with_session(|session| session.set_volume(volume))
    }

    // Queue edits

    pub fn add_to_queue(&self, uri: &str) -> Result<()> {
        self.with_session(|session| session.add_to_queue(uri))
    }

    pub fn add_next_to_queue(&self, uri: &str) -> Result<()> {
        self.with_session(|session| session.add_next_to_queue(uri))
    }

    pub fn remove_from_queue(&self, index: usize) -> Result<()> {
        self.with_session(|session| session.remove_from_queue(index))
    }

    pub fn move_queue_item(&self, from: usize, to: usize) -> Result<()> {
        self.with_session(|session| session.move_queue_item(from, to))
    }

    pub fn clear_upcoming_queue(&self) -> Result<()> {
        self.with_session(Session::clear_upcoming_queue)
    }

    pub fn radio_tracks(&self, seed: &str) -> Result<Vec<String>> {
        self.with_session(|session| session.radio_tracks(seed))
    }

    // Reads: quiet defaults without a session, matching the polling
    // contract of the boundary.

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.read_session(Session::is_playing).unwrap_or(false)
    }

    #[must_use]
    pub fn position_ms(&self) -> u32 {
        self.read_session(Session::position_ms).unwrap_or(0)
    }

    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.read_session(Session::queue_length).unwrap_or(0)
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.read_session(Session::current_index).flatten()
    }

    #[must_use]
    pub fn queue_item(&self, index: usize) -> Option<QueueItem> {
        self.read_session(|session| session.queue_item(index))
            .flatten()
    }

    pub fn queue_json(&self) -> Result<String> {
        self.with_session(Session::queue_json)
    }

    /// Current volume; absent without a session.
    #[must_use]
    pub fn volume(&self) -> Option<u16> {
        self.read_session(Session::volume)
    }

    /// The settings the live session was established with; absent without
    /// a session.
    #[must_use]
    pub fn effective_settings(&self) -> Option<Settings> {
        self.read_session(Session::effective_settings)
    }

    // Settings: fire-and-forget, applied at the next session init.

    pub fn set_bitrate(&self, bitrate: Bitrate) {
        self.settings.set_bitrate(bitrate);
    }

    #[must_use]
    pub fn bitrate(&self) -> Bitrate {
        self.settings.bitrate()
    }

    pub fn set_gapless(&self, enabled: bool) {
        self.settings.set_gapless(enabled);
    }

    #[must_use]
    pub fn gapless(&self) -> bool {
        self.settings.gapless()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.cleanup();
    }
}
