use std::{
    fmt,
    time::{Duration, SystemTime},
};

use crate::error::{Error, Result};

/// An OAuth access token with its refresh counterpart and expiry.
///
/// At most one live token exists per process; it is owned by the
/// [`AuthManager`](crate::auth::AuthManager) and superseded wholesale by a
/// newer token, never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: SystemTime,
}

/// Tolerance for clock skew between this host and the token issuer.
const CLOCK_SKEW: Duration = Duration::from_secs(5);

impl AccessToken {
    /// Creates a token expiring `expires_in` from now.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the access token is empty or the lifetime does
    /// not exceed the clock skew tolerance.
    pub fn new(access_token: &str, refresh_token: &str, expires_in: Duration) -> Result<Self> {
        if access_token.trim().is_empty() {
            return Err(Error::invalid_input("access token is empty"));
        }
        if expires_in <= CLOCK_SKEW {
            return Err(Error::AuthExpired);
        }

        let expires_at = SystemTime::now()
            .checked_add(expires_in)
            .ok_or_else(|| Error::assertion("token expiration out of bounds"))?;

        Ok(Self {
            access_token: access_token.to_owned(),
            refresh_token: refresh_token.to_owned(),
            expires_at,
        })
    }

    /// Remaining lifetime, zero when expired.
    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.access_token)
    }
}
