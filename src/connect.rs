//! Collaborator seams between the engine and the outside world.
//!
//! The engine never talks to the network directly: session establishment,
//! playback command routing, content resolution and the OAuth exchange all
//! go through the traits below. [`crate::gateway`] provides the default
//! implementations; tests script their own.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    settings::Settings,
    token::AccessToken,
    track::{ContentRef, QueueItem, TrackMetadata},
};

/// Closed set of device categories a session can present as.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceType {
    #[default]
    Computer,
    Tablet,
    Smartphone,
    Speaker,
    Tv,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Computer => "computer",
            Self::Tablet => "tablet",
            Self::Smartphone => "smartphone",
            Self::Speaker => "speaker",
            Self::Tv => "tv",
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Computer),
            1 => Ok(Self::Tablet),
            2 => Ok(Self::Smartphone),
            3 => Ok(Self::Speaker),
            4 => Ok(Self::Tv),
            other => Err(Error::invalid_input(format!(
                "unknown device type: {other}"
            ))),
        }
    }
}

/// Device identity supplied once at session init and opaque afterwards.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: Uuid,
    pub name: String,
    pub device_type: DeviceType,
}

impl DeviceConfig {
    pub fn new(name: &str, device_type: DeviceType) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("device name is empty"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            device_type,
        })
    }
}

/// Transport-originated session events.
///
/// Every position-carrying event is a sync point for the position clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Playback is running at the given position.
    Playing { position_ms: u32 },
    /// Playback is paused at the given position.
    Paused { position_ms: u32 },
    /// Periodic position report without a state change.
    Position { position_ms: u32 },
    /// A seek completed at the given position.
    Seeked { position_ms: u32 },
    /// Playback stopped entirely.
    Stopped,
    /// The current item played to its end.
    EndOfTrack,
}

/// A live transport session: command routing plus the event stream.
pub struct SessionHandle {
    pub transport: Box<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Establishes device-bound transport sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session for `device` authorized by `token`.
    ///
    /// Effective `settings` are fixed for the session's lifetime.
    async fn connect(
        &self,
        token: &AccessToken,
        device: &DeviceConfig,
        settings: &Settings,
    ) -> Result<SessionHandle>;
}

/// Routes playback commands to the remote service.
#[async_trait]
pub trait Transport: Send {
    /// Loads `uri` as the active item, optionally starting playback at
    /// `position_ms`.
    async fn load(&mut self, uri: &str, start_playing: bool, position_ms: u32) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn resume(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn seek(&mut self, position_ms: u32) -> Result<()>;

    async fn set_volume(&mut self, volume: u16) -> Result<()>;

    /// Tears the session down. Called once from `cleanup`.
    async fn close(&mut self) -> Result<()>;
}

/// Resolves content references to playable items.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Metadata for a single track.
    async fn resolve_track(&self, track: &ContentRef) -> Result<TrackMetadata>;

    /// Expands any content kind to its tracks in canonical order. A single
    /// track expands to itself.
    async fn expand(&self, content: &ContentRef) -> Result<Vec<QueueItem>>;

    /// One-shot radio expansion from a seed track; returns track URIs.
    async fn radio(&self, seed: &ContentRef) -> Result<Vec<String>>;
}
