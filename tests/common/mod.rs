//! Scripted collaborators for exercising the engine without a network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use coda::auth::AuthFlow;
use coda::connect::{
    Connector, DeviceConfig, DeviceType, Resolver, SessionEvent, SessionHandle, Transport,
};
use coda::error::Result;
use coda::player::Player;
use coda::settings::Settings;
use coda::token::AccessToken;
use coda::track::{ContentKind, ContentRef, QueueItem, TrackMetadata};

pub const TOKEN: &str = "test-access-token";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Load {
        uri: String,
        start_playing: bool,
        position_ms: u32,
    },
    Pause,
    Resume,
    Stop,
    Seek(u32),
    SetVolume(u16),
    Close,
}

/// Records every command the engine routes to the transport.
#[derive(Default)]
pub struct Recorder {
    commands: Mutex<Vec<Command>>,
}

impl Recorder {
    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

struct ScriptedTransport {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn load(&mut self, uri: &str, start_playing: bool, position_ms: u32) -> Result<()> {
        self.recorder.record(Command::Load {
            uri: uri.to_owned(),
            start_playing,
            position_ms,
        });
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.recorder.record(Command::Pause);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.recorder.record(Command::Resume);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.recorder.record(Command::Stop);
        Ok(())
    }

    async fn seek(&mut self, position_ms: u32) -> Result<()> {
        self.recorder.record(Command::Seek(position_ms));
        Ok(())
    }

    async fn set_volume(&mut self, volume: u16) -> Result<()> {
        self.recorder.record(Command::SetVolume(volume));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.recorder.record(Command::Close);
        Ok(())
    }
}

/// Hands out scripted transports and keeps the event sender so tests can
/// inject transport events.
pub struct ScriptedConnector {
    recorder: Arc<Recorder>,
    sender: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    settings_seen: Mutex<Vec<Settings>>,
}

impl ScriptedConnector {
    fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            recorder,
            sender: Mutex::new(None),
            settings_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn send(&self, event: SessionEvent) {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .expect("no session has been established")
            .send(event)
            .expect("event stream should be open");
    }

    pub fn settings_seen(&self) -> Vec<Settings> {
        self.settings_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _token: &AccessToken,
        _device: &DeviceConfig,
        settings: &Settings,
    ) -> Result<SessionHandle> {
        self.settings_seen.lock().unwrap().push(*settings);

        let (sender, events) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(sender);

        Ok(SessionHandle {
            transport: Box::new(ScriptedTransport {
                recorder: Arc::clone(&self.recorder),
            }),
            events,
        })
    }
}

pub fn metadata_for(id: &str) -> TrackMetadata {
    TrackMetadata {
        track_name: format!("Track {id}"),
        artist_name: format!("Artist {id}"),
        album_art_url: format!("https://img.example/{id}"),
        duration_ms: 180_000,
        album_id: Some(format!("album{id}")),
        artist_id: Some(format!("artist{id}")),
        external_url: Some(format!("https://open.spotify.com/track/{id}")),
    }
}

/// Resolves every track to canned metadata; collections expand to three
/// derived tracks.
pub struct ScriptedResolver;

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve_track(&self, track: &ContentRef) -> Result<TrackMetadata> {
        Ok(metadata_for(&track.id))
    }

    async fn expand(&self, content: &ContentRef) -> Result<Vec<QueueItem>> {
        match content.kind {
            ContentKind::Track => Ok(vec![QueueItem::resolved(
                content.uri(),
                metadata_for(&content.id),
            )]),
            _ => Ok((0..3)
                .map(|i| {
                    let id = format!("{}x{i}", content.id);
                    QueueItem::resolved(format!("spotify:track:{id}"), metadata_for(&id))
                })
                .collect()),
        }
    }

    async fn radio(&self, _seed: &ContentRef) -> Result<Vec<String>> {
        Ok((0..5).map(|i| format!("spotify:track:radio{i}")).collect())
    }
}

/// Completes immediately with a canned token.
pub struct ScriptedFlow;

#[async_trait]
impl AuthFlow for ScriptedFlow {
    async fn authorize(&self, _client_id: &str, _redirect_uri: &Url) -> Result<AccessToken> {
        AccessToken::new("flow-access", "flow-refresh", Duration::from_secs(3600))
    }
}

pub struct Harness {
    pub player: Player,
    pub connector: Arc<ScriptedConnector>,
    pub recorder: Arc<Recorder>,
}

pub fn harness() -> Harness {
    let recorder = Arc::new(Recorder::default());
    let connector = Arc::new(ScriptedConnector::new(Arc::clone(&recorder)));
    let player = Player::with_collaborators(
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::new(ScriptedResolver),
        Arc::new(ScriptedFlow),
    )
    .expect("engine should build");

    Harness {
        player,
        connector,
        recorder,
    }
}

impl Harness {
    /// Establishes a session with a default device.
    pub fn init(&self) {
        let device =
            DeviceConfig::new("test device", DeviceType::Computer).expect("device should be valid");
        self.player.init(TOKEN, device).expect("init should succeed");
    }
}

pub fn track_uri(id: &str) -> String {
    format!("spotify:track:{id}")
}

pub fn track_uris(n: usize) -> Vec<String> {
    (0..n).map(|i| track_uri(&format!("t{i}"))).collect()
}

/// Polls `predicate` until it holds or a 5 second deadline passes.
pub fn eventually(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
