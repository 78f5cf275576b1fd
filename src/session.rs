//! A live, device-bound session: the sole authority over the queue and
//! playback state.
//!
//! All mutating commands serialize on the transport lock, so no two
//! commands ever observe a half-updated queue. Readers take a consistent
//! snapshot of the shared state and never wait on network I/O. The
//! transport's event stream is consumed by a background task that re-syncs
//! the position clock and auto-advances the queue at end of track.

use std::sync::{
    Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use tokio::{runtime::Handle, sync::Mutex as AsyncMutex, task::JoinHandle, time::timeout};

use crate::{
    connect::{DeviceConfig, Resolver, SessionEvent, SessionHandle, Transport},
    error::{Error, Result},
    position::PositionClock,
    queue::Queue,
    settings::Settings,
    track::{ContentRef, QueueItem, TrackMetadata},
};

/// Upper bound on a single transport command round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the local resolution step of a boundary call.
const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// How far a seek may overshoot the known track duration.
const SEEK_TOLERANCE_MS: u32 = 1_000;

/// Volume a fresh session starts at (50%).
pub const DEFAULT_VOLUME: u16 = u16::MAX / 2;

#[derive(Debug)]
struct SessionState {
    queue: Queue,
    clock: PositionClock,
    volume: u16,
    /// Bumped on every wholesale queue replacement; a stale lazy-fill task
    /// observes the bump and stops writing.
    epoch: u64,
}

struct Shared {
    transport: AsyncMutex<Box<dyn Transport>>,
    state: RwLock<SessionState>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Session {
    shared: Arc<Shared>,
    runtime: Handle,
    resolver: Arc<dyn Resolver>,
    settings: Settings,
    device: DeviceConfig,
    event_task: JoinHandle<()>,
    fill_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Wraps an established transport session and starts consuming its
    /// event stream.
    pub fn start(
        handle: SessionHandle,
        device: DeviceConfig,
        settings: Settings,
        resolver: Arc<dyn Resolver>,
        runtime: Handle,
    ) -> Self {
        let shared = Arc::new(Shared {
            transport: AsyncMutex::new(handle.transport),
            state: RwLock::new(SessionState {
                queue: Queue::new(),
                clock: PositionClock::new(),
                volume: DEFAULT_VOLUME,
                epoch: 0,
            }),
        });

        let event_task = spawn_event_loop(&runtime, Arc::clone(&shared), handle.events);

        info!(
            "session established for device \"{}\" ({})",
            device.name,
            device.device_type.as_str()
        );

        Self {
            shared,
            runtime,
            resolver,
            settings,
            device,
            event_task,
            fill_task: StdMutex::new(None),
        }
    }

    /// Tears the session down: stops background tasks and closes the
    /// transport.
    pub fn shutdown(self) {
        self.event_task.abort();
        if let Some(task) = self
            .fill_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        let shared = Arc::clone(&self.shared);
        let result = self.runtime.block_on(async move {
            let mut transport = shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.close()).await
        });
        match result {
            Ok(Ok(())) => debug!("transport session closed"),
            Ok(Err(e)) => warn!("error closing transport session: {e}"),
            Err(_) => warn!("closing transport session timed out"),
        }
    }

    // Commands

    /// Replaces the queue with `uris` and starts playback at the head.
    ///
    /// Indices are reserved immediately; metadata fills in lazily.
    pub fn play_tracks(&self, uris: &[String]) -> Result<()> {
        if uris.is_empty() {
            return Err(Error::invalid_input("track list is empty"));
        }

        let refs = uris
            .iter()
            .map(|uri| ContentRef::parse(uri))
            .collect::<Result<Vec<_>>>()?;
        if let Some(other) = refs.iter().find(|content| !content.is_track()) {
            return Err(Error::invalid_input(format!("not a track URI: {other}")));
        }

        let items: Vec<QueueItem> = refs
            .iter()
            .map(|content| QueueItem::placeholder(content.uri()))
            .collect();
        let first = refs[0].uri();

        let epoch = self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.load(&first, true, 0)).await??;

            let mut state = self.shared.write();
            state.queue.replace(items)?;
            state.clock.sync(0, true);
            state.epoch += 1;
            Ok::<u64, Error>(state.epoch)
        })?;

        self.spawn_fill(epoch, refs);
        Ok(())
    }

    /// Plays a single URI or web URL; collection kinds expand to their
    /// tracks in canonical order.
    pub fn play_track(&self, uri_or_url: &str) -> Result<()> {
        let content = ContentRef::parse(uri_or_url)?;
        if content.is_track() {
            return self.play_tracks(&[content.uri()]);
        }

        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;

            let items = timeout(RESOLUTION_TIMEOUT, self.resolver.expand(&content)).await??;
            if items.is_empty() {
                return Err(Error::resolution(format!("{content} expands to no tracks")));
            }

            let first = items[0].uri.clone();
            timeout(COMMAND_TIMEOUT, transport.load(&first, true, 0)).await??;

            let mut state = self.shared.write();
            state.queue.replace(items)?;
            state.clock.sync(0, true);
            state.epoch += 1;
            Ok(())
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.ensure_active_content()?;
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.pause()).await??;

            self.shared.write().clock.set_playing(false);
            Ok(())
        })
    }

    pub fn resume(&self) -> Result<()> {
        self.ensure_active_content()?;
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.resume()).await??;

            self.shared.write().clock.set_playing(true);
            Ok(())
        })
    }

    /// Stops playback and destroys the queue.
    pub fn stop(&self) -> Result<()> {
        self.ensure_active_content()?;
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.stop()).await??;

            let mut state = self.shared.write();
            state.queue.clear();
            state.clock.reset();
            state.epoch += 1;
            Ok(())
        })
    }

    pub fn next(&self) -> Result<()> {
        self.skip_to(|queue: &Queue| queue.next_index())
    }

    pub fn previous(&self) -> Result<()> {
        self.skip_to(|queue: &Queue| queue.previous_index())
    }

    fn skip_to(&self, target: impl Fn(&Queue) -> Result<usize>) -> Result<()> {
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;

            let (index, uri) = {
                let state = self.shared.read();
                let index = target(&state.queue)?;
                let uri = state
                    .queue
                    .get(index)
                    .ok_or_else(|| Error::assertion("queue index vanished"))?
                    .uri
                    .clone();
                (index, uri)
            };

            timeout(COMMAND_TIMEOUT, transport.load(&uri, true, 0)).await??;

            let mut state = self.shared.write();
            state.queue.jump(index)?;
            state.clock.sync(0, true);
            Ok(())
        })
    }

    /// Jumps to `index` and restarts playback from offset 0.
    pub fn jump_to_index(&self, index: usize) -> Result<()> {
        self.skip_to(move |queue: &Queue| {
            if index >= queue.len() {
                return Err(Error::out_of_bounds(index, queue.len()));
            }
            Ok(index)
        })
    }

    pub fn seek(&self, position_ms: u32) -> Result<()> {
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;

            {
                let state = self.shared.read();
                let current = state
                    .queue
                    .current_item()
                    .ok_or_else(|| Error::invalid_input("no active content"))?;
                // Unresolved items have no known duration to validate
                // against; the transport gets the final say.
                if let Some(duration) = current.duration_ms() {
                    if position_ms > duration.saturating_add(SEEK_TOLERANCE_MS) {
                        return Err(Error::invalid_input(format!(
                            "seek to {position_ms} ms exceeds track duration of {duration} ms"
                        )));
                    }
                }
            }

            timeout(COMMAND_TIMEOUT, transport.seek(position_ms)).await??;

            let mut state = self.shared.write();
            let playing = state.clock.is_playing();
            state.clock.sync(position_ms, playing);
            Ok(())
        })
    }

    /// Appends one resolved track at the tail; the cursor is untouched.
    pub fn add_to_queue(&self, uri: &str) -> Result<()> {
        let item = self.resolve_one(uri)?;
        self.shared.write().queue.push(item);
        Ok(())
    }

    /// Inserts one resolved track right after the current item, or appends
    /// when the queue is empty.
    pub fn add_next_to_queue(&self, uri: &str) -> Result<()> {
        let item = self.resolve_one(uri)?;
        self.shared.write().queue.insert_after_current(item);
        Ok(())
    }

    fn resolve_one(&self, uri: &str) -> Result<QueueItem> {
        let content = ContentRef::parse(uri)?;
        if !content.is_track() {
            return Err(Error::invalid_input(format!("not a track URI: {content}")));
        }

        self.runtime.block_on(async {
            // Serialize with the other mutating commands.
            let _transport = self.shared.transport.lock().await;
            let metadata =
                timeout(RESOLUTION_TIMEOUT, self.resolver.resolve_track(&content)).await??;
            Ok(QueueItem::resolved(content.uri(), metadata))
        })
    }

    pub fn remove_from_queue(&self, index: usize) -> Result<()> {
        self.shared.write().queue.remove(index)
    }

    pub fn move_queue_item(&self, from: usize, to: usize) -> Result<()> {
        self.shared.write().queue.move_item(from, to)
    }

    pub fn clear_upcoming_queue(&self) -> Result<()> {
        self.shared.write().queue.clear_upcoming();
        Ok(())
    }

    /// One-shot radio expansion from a seed track. Read-only.
    pub fn radio_tracks(&self, seed: &str) -> Result<Vec<String>> {
        let content = ContentRef::parse(seed)?;
        if !content.is_track() {
            return Err(Error::invalid_input(format!("not a track URI: {content}")));
        }

        self.runtime.block_on(async {
            let uris = timeout(RESOLUTION_TIMEOUT, self.resolver.radio(&content)).await??;
            if uris.is_empty() {
                return Err(Error::resolution(format!("no radio tracks for {content}")));
            }
            Ok(uris)
        })
    }

    pub fn set_volume(&self, volume: u16) -> Result<()> {
        self.runtime.block_on(async {
            let mut transport = self.shared.transport.lock().await;
            timeout(COMMAND_TIMEOUT, transport.set_volume(volume)).await??;

            self.shared.write().volume = volume;
            Ok(())
        })
    }

    // Reads

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared.read().clock.is_playing()
    }

    #[must_use]
    pub fn volume(&self) -> u16 {
        self.shared.read().volume
    }

    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.shared.read().queue.len()
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.shared.read().queue.current_index()
    }

    /// Interpolated position; 0 when no item is active.
    #[must_use]
    pub fn position_ms(&self) -> u32 {
        let state = self.shared.read();
        match state.queue.current_item() {
            Some(item) => state.clock.position_ms(item.duration_ms()),
            None => 0,
        }
    }

    /// A consistent snapshot of one queue item.
    #[must_use]
    pub fn queue_item(&self, index: usize) -> Option<QueueItem> {
        self.shared.read().queue.get(index).cloned()
    }

    pub fn queue_json(&self) -> Result<String> {
        self.shared.read().queue.snapshot_json()
    }

    /// Settings fixed at init; later store mutations do not apply here.
    #[must_use]
    pub fn effective_settings(&self) -> Settings {
        self.settings
    }

    #[must_use]
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn ensure_active_content(&self) -> Result<()> {
        if self.shared.read().queue.is_empty() {
            return Err(Error::invalid_input("no active content"));
        }
        Ok(())
    }

    /// Spawns the lazy metadata fill for a freshly replaced queue,
    /// superseding any fill still running for a previous queue.
    fn spawn_fill(&self, epoch: u64, refs: Vec<ContentRef>) {
        let shared = Arc::clone(&self.shared);
        let resolver = Arc::clone(&self.resolver);

        let task = self.runtime.spawn(async move {
            for (index, content) in refs.into_iter().enumerate() {
                match timeout(RESOLUTION_TIMEOUT, resolver.resolve_track(&content)).await {
                    Ok(Ok(metadata)) => {
                        if !fill_if_current(&shared, epoch, index, &content.uri(), metadata) {
                            return;
                        }
                    }
                    // The item stays unresolved; readers keep seeing it
                    // as absent.
                    Ok(Err(e)) => warn!("failed to resolve {content}: {e}"),
                    Err(_) => warn!("resolving {content} timed out"),
                }
            }
        });

        let mut slot = self
            .fill_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }
}

/// Writes `metadata` into the queue unless the queue has been replaced
/// since `epoch`. Returns whether the fill is still current.
fn fill_if_current(
    shared: &Shared,
    epoch: u64,
    index: usize,
    uri: &str,
    metadata: TrackMetadata,
) -> bool {
    let mut state = shared.write();
    if state.epoch != epoch {
        return false;
    }
    state.queue.fill(index, uri, metadata);
    true
}

fn spawn_event_loop(
    runtime: &Handle,
    shared: Arc<Shared>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(event) = events.recv().await {
            trace!("session event: {event:?}");
            match event {
                SessionEvent::Playing { position_ms } => {
                    shared.write().clock.sync(position_ms, true);
                }
                SessionEvent::Paused { position_ms } => {
                    shared.write().clock.sync(position_ms, false);
                }
                SessionEvent::Position { position_ms } | SessionEvent::Seeked { position_ms } => {
                    let mut state = shared.write();
                    let playing = state.clock.is_playing();
                    state.clock.sync(position_ms, playing);
                }
                SessionEvent::Stopped => {
                    shared.write().clock.reset();
                }
                SessionEvent::EndOfTrack => {
                    handle_end_of_track(&shared).await;
                }
            }
        }
        debug!("session event stream ended");
    })
}

/// Advances to the next queue item, or freezes at the tail.
async fn handle_end_of_track(shared: &Shared) {
    let target = {
        let state = shared.read();
        state.queue.next_index().ok().and_then(|index| {
            state
                .queue
                .get(index)
                .map(|item| (index, item.uri.clone()))
        })
    };

    match target {
        Some((index, uri)) => {
            let mut transport = shared.transport.lock().await;
            match timeout(COMMAND_TIMEOUT, transport.load(&uri, true, 0)).await {
                Ok(Ok(())) => {
                    drop(transport);
                    let mut state = shared.write();
                    if state.queue.jump(index).is_ok() {
                        state.clock.sync(0, true);
                    }
                }
                Ok(Err(e)) => {
                    error!("failed to load next track: {e}");
                    shared.write().clock.set_playing(false);
                }
                Err(_) => {
                    error!("loading next track timed out");
                    shared.write().clock.set_playing(false);
                }
            }
        }
        None => {
            shared.write().clock.sync(0, false);
        }
    }
}
