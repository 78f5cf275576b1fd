//! Error handling for coda.
//!
//! A single crate-wide [`enum@Error`] covers every failure the engine can
//! report across the boundary. Input validation and state preconditions
//! are detected locally and returned synchronously; resolution and
//! transport failures from asynchronous work surface the next time the
//! caller polls the relevant state. No error ever terminates the process.

use thiserror::Error;

/// Standard result type for coda operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories observable at the boundary.
///
/// Reads (per-index queue getters) report [`IndexOutOfBounds`] conditions
/// as an absent value instead of an error; mutating index operations fail
/// with it outright.
///
/// [`IndexOutOfBounds`]: Error::IndexOutOfBounds
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input: garbage URI, empty track list, out-of-range
    /// seek, or a state precondition such as "no active content".
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A playback-affecting operation was issued without a live session.
    #[error("no active session")]
    NoActiveSession,

    /// `init` was called while a session is live. Callers must `cleanup`
    /// first; there is no implicit replacement.
    #[error("a session is already active")]
    SessionAlreadyActive,

    /// A mutating queue operation named an index outside the queue.
    #[error("index {index} out of bounds for queue of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A URI could not be turned into playable content.
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// The supplied token is past its expiry.
    #[error("authentication expired")]
    AuthExpired,

    /// Authentication could not be established or is in a bad state.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Opaque failure from the transport collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// An internal invariant did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::ResolutionFailed(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthFailed(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Bounds failure for a mutating index operation.
    #[must_use]
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidInput(format!("parsing URL failed: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(format!("parsing JSON failed: {e}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Transport(String::from("operation timed out"))
    }
}
