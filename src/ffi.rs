//! The C boundary.
//!
//! One process-wide engine backs every entry point. All functions are
//! synchronous and panic-free; fallible operations return 0 on success
//! and -1 on failure, index/lookup queries report absence as NULL (or a
//! zero sentinel for numeric fields) instead of failing.
//!
//! Every `char*` handed out is an owned, independently allocated buffer;
//! the caller releases it with [`coda_free_string`] exactly once. NULL
//! results require no release.

use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::LazyLock;

use crate::{
    connect::{DeviceConfig, DeviceType},
    error::Result,
    player::Player,
    track::TrackMetadata,
};

/// Device name used when the caller passes NULL at init.
const DEFAULT_DEVICE_NAME: &str = env!("CARGO_PKG_NAME");

static PLAYER: LazyLock<Option<Player>> = LazyLock::new(|| {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();

    match Player::new() {
        Ok(player) => Some(player),
        Err(e) => {
            error!("starting the engine failed: {e}");
            None
        }
    }
});

fn engine() -> Option<&'static Player> {
    PLAYER.as_ref()
}

fn report(operation: &str, result: Option<Result<()>>) -> i32 {
    match result {
        Some(Ok(())) => 0,
        Some(Err(e)) => {
            warn!("{operation} failed: {e}");
            -1
        }
        None => {
            warn!("{operation} failed: engine unavailable");
            -1
        }
    }
}

/// NULL for a string the engine cannot hand out (interior NUL).
fn into_c_string(value: String) -> *mut c_char {
    CString::new(value).map_or(ptr::null_mut(), CString::into_raw)
}

/// Borrows a required string argument. `None` on NULL or invalid UTF-8.
unsafe fn cstr_arg<'a>(pointer: *const c_char) -> Option<&'a str> {
    if pointer.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(pointer) }.to_str().ok()
}

fn queue_metadata_field(
    index: usize,
    field: impl Fn(&TrackMetadata) -> Option<String>,
) -> *mut c_char {
    engine()
        .and_then(|player| player.queue_item(index))
        .and_then(|item| item.metadata.as_ref().and_then(&field))
        .map_or(ptr::null_mut(), into_c_string)
}

/// Releases a string previously returned by this library. NULL is a
/// no-op.
///
/// # Safety
///
/// `s` must be a pointer obtained from this library and not yet released.
#[no_mangle]
pub unsafe extern "C" fn coda_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// Authentication

/// Starts an OAuth authorization-code exchange. Returns 0 when the flow
/// was started, -1 on malformed input or when a flow is already running.
/// Poll [`coda_has_oauth_result`] for completion.
///
/// # Safety
///
/// `client_id` and `redirect_uri` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn coda_start_oauth(
    client_id: *const c_char,
    redirect_uri: *const c_char,
) -> i32 {
    let (Some(client_id), Some(redirect_uri)) =
        (unsafe { cstr_arg(client_id) }, unsafe { cstr_arg(redirect_uri) })
    else {
        warn!("start_oauth failed: NULL or non-UTF-8 argument");
        return -1;
    };

    report(
        "start_oauth",
        engine().map(|player| player.start_oauth(client_id, redirect_uri)),
    )
}

/// Whether a completed (or failed) authorization result is waiting.
#[no_mangle]
pub extern "C" fn coda_has_oauth_result() -> bool {
    engine().is_some_and(Player::has_oauth_result)
}

/// Discards a waiting authorization result, if any.
#[no_mangle]
pub extern "C" fn coda_clear_oauth_result() {
    if let Some(player) = engine() {
        player.clear_oauth_result();
    }
}

/// The current access token, or NULL when none is live.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_access_token() -> *mut c_char {
    engine()
        .and_then(Player::access_token)
        .map_or(ptr::null_mut(), into_c_string)
}

/// The current refresh token, or NULL when none is live.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_refresh_token() -> *mut c_char {
    engine()
        .and_then(Player::refresh_token)
        .map_or(ptr::null_mut(), into_c_string)
}

/// Seconds until the current token expires, or -1 when none is live.
#[no_mangle]
pub extern "C" fn coda_get_token_expires_in() -> i64 {
    engine()
        .and_then(Player::token_expires_in)
        .map_or(-1, |remaining| {
            i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX)
        })
}

// Session lifecycle

/// Establishes the session. `device_name` may be NULL for a default;
/// `device_type` is 0 computer, 1 tablet, 2 smartphone, 3 speaker, 4 tv.
/// Fails when the token is empty or expired, or a session is already
/// live. Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `access_token` must be a valid NUL-terminated string; `device_name`
/// must be NULL or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_init_player(
    access_token: *const c_char,
    device_name: *const c_char,
    device_type: u8,
) -> i32 {
    let Some(token) = (unsafe { cstr_arg(access_token) }) else {
        warn!("init failed: access_token is NULL or non-UTF-8");
        return -1;
    };
    let name = if device_name.is_null() {
        DEFAULT_DEVICE_NAME
    } else {
        match unsafe { cstr_arg(device_name) } {
            Some(name) => name,
            None => {
                warn!("init failed: device_name is non-UTF-8");
                return -1;
            }
        }
    };

    report(
        "init",
        engine().map(|player| {
            let device = DeviceConfig::new(name, DeviceType::try_from(device_type)?)?;
            player.init(token, device)
        }),
    )
}

/// Tears down the live session. Safe to call without one.
#[no_mangle]
pub extern "C" fn coda_cleanup() {
    if let Some(player) = engine() {
        player.cleanup();
    }
}

// Playback commands

/// Replaces the queue with the given JSON array of track URIs and starts
/// playback at the first. Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `track_uris_json` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_play_tracks(track_uris_json: *const c_char) -> i32 {
    let Some(json) = (unsafe { cstr_arg(track_uris_json) }) else {
        warn!("play_tracks failed: argument is NULL or non-UTF-8");
        return -1;
    };

    report(
        "play_tracks",
        engine().map(|player| {
            let uris: Vec<String> = serde_json::from_str(json)?;
            player.play_tracks(&uris)
        }),
    )
}

/// Plays a single URI or web URL; albums, playlists and artists expand
/// to their tracks. Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `uri_or_url` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_play_track(uri_or_url: *const c_char) -> i32 {
    let Some(input) = (unsafe { cstr_arg(uri_or_url) }) else {
        warn!("play_track failed: argument is NULL or non-UTF-8");
        return -1;
    };

    report("play_track", engine().map(|player| player.play_track(input)))
}

/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_pause() -> i32 {
    report("pause", engine().map(Player::pause))
}

/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_resume() -> i32 {
    report("resume", engine().map(Player::resume))
}

/// Stops playback and clears the queue. Returns 0 on success, -1 on
/// error.
#[no_mangle]
pub extern "C" fn coda_stop() -> i32 {
    report("stop", engine().map(Player::stop))
}

/// Returns 1 if playing, 0 otherwise.
#[no_mangle]
pub extern "C" fn coda_is_playing() -> i32 {
    i32::from(engine().is_some_and(Player::is_playing))
}

/// Interpolated playback position in milliseconds; 0 without active
/// content.
#[no_mangle]
pub extern "C" fn coda_get_position_ms() -> u32 {
    engine().map_or(0, Player::position_ms)
}

/// Advances to the next queue item. Fails at the end of the queue.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_next() -> i32 {
    report("next", engine().map(Player::next))
}

/// Retreats to the previous queue item. Fails at the start of the queue.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_previous() -> i32 {
    report("previous", engine().map(Player::previous))
}

/// Seeks within the current item. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_seek(position_ms: u32) -> i32 {
    report("seek", engine().map(|player| player.seek(position_ms)))
}

/// Jumps to the given queue index and restarts playback from offset 0.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_jump_to_index(index: usize) -> i32 {
    report(
        "jump_to_index",
        engine().map(|player| player.jump_to_index(index)),
    )
}

// Queue reads

#[no_mangle]
pub extern "C" fn coda_get_queue_length() -> usize {
    engine().map_or(0, Player::queue_length)
}

/// The current queue index (0-based); 0 when the queue is empty.
#[no_mangle]
pub extern "C" fn coda_get_current_index() -> usize {
    engine().and_then(Player::current_index).unwrap_or(0)
}

/// The URI at the given index, or NULL if out of bounds.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_uri(index: usize) -> *mut c_char {
    engine()
        .and_then(|player| player.queue_item(index))
        .map_or(ptr::null_mut(), |item| into_c_string(item.uri))
}

/// The track name at the given index, or NULL if out of bounds or not
/// yet resolved. Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_track_name(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| Some(metadata.track_name.clone()))
}

/// The artist name at the given index, or NULL if out of bounds or not
/// yet resolved. Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_artist_name(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| Some(metadata.artist_name.clone()))
}

/// The album art URL at the given index, or NULL if out of bounds or not
/// yet resolved. Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_album_art_url(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| Some(metadata.album_art_url.clone()))
}

/// The duration in milliseconds at the given index; 0 if out of bounds
/// or not yet resolved.
#[no_mangle]
pub extern "C" fn coda_get_queue_duration_ms(index: usize) -> u32 {
    engine()
        .and_then(|player| player.queue_item(index))
        .and_then(|item| item.duration_ms())
        .unwrap_or(0)
}

/// The album id at the given index, or NULL if unavailable.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_album_id(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| metadata.album_id.clone())
}

/// The artist id at the given index, or NULL if unavailable.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_artist_id(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| metadata.artist_id.clone())
}

/// The public web link at the given index, or NULL if unavailable.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_queue_external_url(index: usize) -> *mut c_char {
    queue_metadata_field(index, |metadata| metadata.external_url.clone())
}

/// The whole queue as one JSON array of objects, or NULL on error.
/// Caller must free the string with `coda_free_string()`.
#[no_mangle]
pub extern "C" fn coda_get_all_queue_items() -> *mut c_char {
    engine()
        .and_then(|player| player.queue_json().ok())
        .map_or(ptr::null_mut(), into_c_string)
}

// Queue edits

/// Appends one track at the tail of the queue. Returns 0 on success, -1
/// on error.
///
/// # Safety
///
/// `track_uri` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_add_to_queue(track_uri: *const c_char) -> i32 {
    let Some(uri) = (unsafe { cstr_arg(track_uri) }) else {
        warn!("add_to_queue failed: argument is NULL or non-UTF-8");
        return -1;
    };
    report(
        "add_to_queue",
        engine().map(|player| player.add_to_queue(uri)),
    )
}

/// Inserts one track right after the current item. Returns 0 on success,
/// -1 on error.
///
/// # Safety
///
/// `track_uri` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_add_next_to_queue(track_uri: *const c_char) -> i32 {
    let Some(uri) = (unsafe { cstr_arg(track_uri) }) else {
        warn!("add_next_to_queue failed: argument is NULL or non-UTF-8");
        return -1;
    };
    report(
        "add_next_to_queue",
        engine().map(|player| player.add_next_to_queue(uri)),
    )
}

/// Removes an unplayed item. Fails for the current or already played
/// items. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_remove_from_queue(index: usize) -> i32 {
    report(
        "remove_from_queue",
        engine().map(|player| player.remove_from_queue(index)),
    )
}

/// Reorders unplayed items. Both indices must be after the current item.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn coda_move_queue_item(from_index: usize, to_index: usize) -> i32 {
    report(
        "move_queue_item",
        engine().map(|player| player.move_queue_item(from_index, to_index)),
    )
}

/// Drops everything after the current item. Returns 0 on success, -1 on
/// error.
#[no_mangle]
pub extern "C" fn coda_clear_upcoming_queue() -> i32 {
    report(
        "clear_upcoming_queue",
        engine().map(Player::clear_upcoming_queue),
    )
}

/// Radio expansion from a seed track: a JSON array of track URIs, or
/// NULL on error. The queue is not modified.
/// Caller must free the string with `coda_free_string()`.
///
/// # Safety
///
/// `track_uri` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn coda_get_radio_tracks(track_uri: *const c_char) -> *mut c_char {
    let Some(seed) = (unsafe { cstr_arg(track_uri) }) else {
        warn!("get_radio_tracks failed: argument is NULL or non-UTF-8");
        return ptr::null_mut();
    };
    let Some(player) = engine() else {
        return ptr::null_mut();
    };

    match player
        .radio_tracks(seed)
        .and_then(|uris| serde_json::to_string(&uris).map_err(Into::into))
    {
        Ok(json) => into_c_string(json),
        Err(e) => {
            warn!("get_radio_tracks failed: {e}");
            ptr::null_mut()
        }
    }
}

// Volume and settings

/// Sets the volume (0 to 65535, full scale). Returns 0 on success, -1 on
/// error.
#[no_mangle]
pub extern "C" fn coda_set_volume(volume: u16) -> i32 {
    report("set_volume", engine().map(|player| player.set_volume(volume)))
}

/// The current volume (0 to 65535), or -1 when no session is live.
#[no_mangle]
pub extern "C" fn coda_get_volume() -> i32 {
    engine()
        .and_then(Player::volume)
        .map_or(-1, i32::from)
}

/// Sets the bitrate preference: 0 is 96 kbps, 1 is 160 kbps, anything
/// higher is 320 kbps. Takes effect at the next session init. Cannot
/// fail.
#[no_mangle]
pub extern "C" fn coda_set_bitrate(bitrate: u8) {
    if let Some(player) = engine() {
        player.set_bitrate(bitrate.into());
    }
}

/// The current bitrate preference as the same integer levels.
#[no_mangle]
pub extern "C" fn coda_get_bitrate() -> u8 {
    engine().map_or(1, |player| player.bitrate().into())
}

/// Sets the gapless playback preference. Takes effect at the next
/// session init. Cannot fail.
#[no_mangle]
pub extern "C" fn coda_set_gapless(enabled: bool) {
    if let Some(player) = engine() {
        player.set_gapless(enabled);
    }
}

/// The current gapless playback preference.
#[no_mangle]
pub extern "C" fn coda_get_gapless() -> bool {
    engine().is_none_or(Player::gapless)
}
