//! Default collaborators backed by the service's public Web API.
//!
//! One [`WebApi`] value implements all three seams: it establishes
//! sessions ([`Connector`]), resolves content ([`Resolver`]) and runs the
//! authorization-code exchange with PKCE ([`AuthFlow`]). All outgoing
//! calls share one HTTP client and one rate limiter so that bursts of
//! boundary calls cannot trip the service's request quota.

use std::num::NonZeroU32;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use url::Url;
use uuid::Uuid;

use crate::{
    auth::AuthFlow,
    connect::{Connector, DeviceConfig, Resolver, SessionEvent, SessionHandle, Transport},
    error::{Error, Result},
    settings::Settings,
    token::AccessToken,
    track::{ContentKind, ContentRef, QueueItem, TrackMetadata},
};

/// Base URL of the catalog and player API.
const API_URL: &str = "https://api.spotify.com/v1";

/// Base URL of the authorization service.
const ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Scopes the authorization exchange requests.
const SCOPES: &str = "user-read-playback-state user-modify-playback-state streaming";

/// Rate limit: `RATE_LIMIT_CALLS` calls per `RATE_LIMIT_INTERVAL`.
const RATE_LIMIT_CALLS: u32 = 50;
const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

/// Network timeout for a single HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the redirect listener waits for the user to authorize.
const REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Playback state polling period.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Page to serve to the browser after capturing the redirect.
const REDIRECT_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body>Authorization received. You can close this window.</body></html>";

pub struct WebApi {
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    /// Bearer token for catalog calls, set at session establishment and
    /// when an authorization exchange completes.
    bearer: RwLock<Option<String>>,
}

impl WebApi {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        let replenish = RATE_LIMIT_INTERVAL / RATE_LIMIT_CALLS;
        let burst = NonZeroU32::new(RATE_LIMIT_CALLS)
            .ok_or_else(|| Error::assertion("rate limit must be non-zero"))?;
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| Error::assertion("rate limit period must be non-zero"))?
            .allow_burst(burst);

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            bearer: RwLock::new(None),
        })
    }

    fn set_bearer(&self, token: &str) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_owned());
    }

    fn bearer(&self) -> Result<String> {
        self.bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::AuthExpired)
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        self.get_json_url(&format!("{API_URL}{path_and_query}")).await
    }

    async fn get_json_url<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.bearer()?;
        self.limiter.until_ready().await;

        let response = self.client.get(url).bearer_auth(&token).send().await?;
        Ok(check_status(response)?.json::<T>().await?)
    }

    /// Drains a paged listing by following its `next` cursors.
    async fn collect_pages<T: DeserializeOwned>(&self, first: Paging<T>) -> Result<Vec<T>> {
        let mut items = first.items;
        let mut next = first.next;
        while let Some(url) = next {
            let mut page: Paging<T> = self.get_json_url(&url).await?;
            items.append(&mut page.items);
            next = page.next;
        }
        Ok(items)
    }
}

/// Maps HTTP failure classes onto the boundary's error taxonomy.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::AuthExpired),
        StatusCode::NOT_FOUND => Err(Error::resolution("content not found")),
        status => Err(Error::transport(format!(
            "request failed with status {status}"
        ))),
    }
}

// Wire formats, reduced to the fields the engine consumes.

#[derive(Deserialize)]
struct TrackObject {
    id: Option<String>,
    uri: Option<String>,
    name: String,
    duration_ms: u32,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: Option<AlbumSummary>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Deserialize)]
struct ArtistObject {
    id: Option<String>,
    name: String,
}

#[derive(Deserialize)]
struct AlbumSummary {
    id: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: String,
}

#[derive(Deserialize)]
struct AlbumObject {
    id: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
    tracks: Paging<AlbumTrackObject>,
}

#[derive(Deserialize)]
struct AlbumTrackObject {
    id: Option<String>,
    uri: Option<String>,
    name: String,
    duration_ms: u32,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    external_urls: Option<ExternalUrls>,
}

/// One page of a listing; `next` is the absolute URL of the following
/// page, absent on the last one.
#[derive(Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistEntry {
    track: Option<TrackObject>,
}

#[derive(Deserialize)]
struct TrackListing {
    tracks: Vec<TrackObject>,
}

#[derive(Deserialize)]
struct PlaybackState {
    is_playing: bool,
    progress_ms: Option<u32>,
    item: Option<PlaybackItem>,
}

#[derive(Deserialize)]
struct PlaybackItem {
    duration_ms: Option<u32>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

fn track_metadata(track: &TrackObject) -> TrackMetadata {
    TrackMetadata {
        track_name: track.name.clone(),
        artist_name: track
            .artists
            .first()
            .map(|artist| artist.name.clone())
            .unwrap_or_default(),
        album_art_url: track
            .album
            .as_ref()
            .and_then(|album| album.images.first())
            .map(|image| image.url.clone())
            .unwrap_or_default(),
        duration_ms: track.duration_ms,
        album_id: track.album.as_ref().and_then(|album| album.id.clone()),
        artist_id: track.artists.first().and_then(|artist| artist.id.clone()),
        external_url: track
            .external_urls
            .as_ref()
            .map(|urls| urls.spotify.clone()),
    }
}

fn track_uri(uri: &Option<String>, id: &Option<String>) -> Option<String> {
    uri.clone()
        .or_else(|| id.as_ref().map(|id| format!("spotify:track:{id}")))
}

fn track_item(track: &TrackObject) -> Option<QueueItem> {
    let Some(uri) = track_uri(&track.uri, &track.id) else {
        warn!("skipping track \"{}\" without an id", track.name);
        return None;
    };
    Some(QueueItem::resolved(uri, track_metadata(track)))
}

#[async_trait]
impl Resolver for WebApi {
    async fn resolve_track(&self, track: &ContentRef) -> Result<TrackMetadata> {
        let object: TrackObject = self.get_json(&format!("/tracks/{}", track.id)).await?;
        Ok(track_metadata(&object))
    }

    async fn expand(&self, content: &ContentRef) -> Result<Vec<QueueItem>> {
        match content.kind {
            ContentKind::Track => {
                let metadata = self.resolve_track(content).await?;
                Ok(vec![QueueItem::resolved(content.uri(), metadata)])
            }

            ContentKind::Album => {
                let album: AlbumObject = self.get_json(&format!("/albums/{}", content.id)).await?;
                let AlbumObject { id, images, tracks } = album;
                Ok(self
                    .collect_pages(tracks)
                    .await?
                    .iter()
                    .filter_map(|track| {
                        let uri = track_uri(&track.uri, &track.id)?;
                        // Album listings omit per-track album objects; the
                        // art and album id come from the album itself.
                        Some(QueueItem::resolved(
                            uri,
                            TrackMetadata {
                                track_name: track.name.clone(),
                                artist_name: track
                                    .artists
                                    .first()
                                    .map(|artist| artist.name.clone())
                                    .unwrap_or_default(),
                                album_art_url: images
                                    .first()
                                    .map(|image| image.url.clone())
                                    .unwrap_or_default(),
                                duration_ms: track.duration_ms,
                                album_id: id.clone(),
                                artist_id: track
                                    .artists
                                    .first()
                                    .and_then(|artist| artist.id.clone()),
                                external_url: track
                                    .external_urls
                                    .as_ref()
                                    .map(|urls| urls.spotify.clone()),
                            },
                        ))
                    })
                    .collect())
            }

            ContentKind::Playlist => {
                let page: Paging<PlaylistEntry> = self
                    .get_json(&format!("/playlists/{}/tracks?limit=100", content.id))
                    .await?;
                Ok(self
                    .collect_pages(page)
                    .await?
                    .iter()
                    .filter_map(|entry| entry.track.as_ref())
                    .filter_map(track_item)
                    .collect())
            }

            ContentKind::Artist => {
                let listing: TrackListing = self
                    .get_json(&format!("/artists/{}/top-tracks?market=from_token", content.id))
                    .await?;
                Ok(listing.tracks.iter().filter_map(track_item).collect())
            }
        }
    }

    async fn radio(&self, seed: &ContentRef) -> Result<Vec<String>> {
        let listing: TrackListing = self
            .get_json(&format!("/recommendations?seed_tracks={}&limit=20", seed.id))
            .await?;
        Ok(listing
            .tracks
            .iter()
            .filter_map(|track| track_uri(&track.uri, &track.id))
            .collect())
    }
}

#[async_trait]
impl Connector for WebApi {
    async fn connect(
        &self,
        token: &AccessToken,
        device: &DeviceConfig,
        settings: &Settings,
    ) -> Result<SessionHandle> {
        self.set_bearer(&token.access_token);

        // Probe the token before claiming a session.
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(format!("{API_URL}/me"))
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        check_status(response)?;

        debug!(
            "connecting device {} with {} kbps, gapless {}",
            device.id,
            settings.bitrate.kbps(),
            settings.gapless
        );

        let (sender, events) = mpsc::unbounded_channel();
        let poll = tokio::spawn(poll_playback(
            self.client.clone(),
            Arc::clone(&self.limiter),
            token.access_token.clone(),
            sender,
        ));

        Ok(SessionHandle {
            transport: Box::new(WebTransport {
                client: self.client.clone(),
                limiter: Arc::clone(&self.limiter),
                bearer: token.access_token.clone(),
                poll: Some(poll),
            }),
            events,
        })
    }
}

/// Feeds playback state changes into the session's event stream.
async fn poll_playback(
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    bearer: String,
    sender: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut was_playing = false;
    let mut last_progress: u32 = 0;
    let mut last_duration: Option<u32> = None;

    loop {
        ticker.tick().await;
        limiter.until_ready().await;

        let state = match fetch_playback(&client, &bearer).await {
            Ok(state) => state,
            Err(e) => {
                debug!("playback poll failed: {e}");
                continue;
            }
        };

        let event = match state {
            Some(state) => {
                let position_ms = state.progress_ms.unwrap_or(0);
                let event = if state.is_playing == was_playing {
                    state.is_playing.then_some(SessionEvent::Position { position_ms })
                } else if state.is_playing {
                    Some(SessionEvent::Playing { position_ms })
                } else if near_track_end(last_progress, last_duration) {
                    Some(SessionEvent::EndOfTrack)
                } else {
                    Some(SessionEvent::Paused { position_ms })
                };

                was_playing = state.is_playing;
                last_progress = position_ms;
                last_duration = state.item.and_then(|item| item.duration_ms);
                event
            }
            None => {
                let event = if near_track_end(last_progress, last_duration) {
                    Some(SessionEvent::EndOfTrack)
                } else if was_playing {
                    Some(SessionEvent::Stopped)
                } else {
                    None
                };

                was_playing = false;
                last_progress = 0;
                last_duration = None;
                event
            }
        };

        if let Some(event) = event {
            if sender.send(event).is_err() {
                // Session is gone.
                return;
            }
        }
    }
}

/// `None` means no active playback context (HTTP 204).
async fn fetch_playback(client: &reqwest::Client, bearer: &str) -> Result<Option<PlaybackState>> {
    let response = client
        .get(format!("{API_URL}/me/player"))
        .bearer_auth(bearer)
        .send()
        .await?;
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    Ok(Some(check_status(response)?.json().await?))
}

/// Whether playback stopping here most plausibly means the track finished
/// rather than an external pause.
fn near_track_end(progress_ms: u32, duration_ms: Option<u32>) -> bool {
    duration_ms.is_some_and(|duration| {
        progress_ms.saturating_add(2 * POLL_INTERVAL.as_millis() as u32) >= duration
    })
}

struct WebTransport {
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    bearer: String,
    poll: Option<JoinHandle<()>>,
}

impl WebTransport {
    async fn put(&self, path_and_query: &str, body: Option<serde_json::Value>) -> Result<()> {
        self.limiter.until_ready().await;

        let mut request = self
            .client
            .put(format!("{API_URL}{path_and_query}"))
            .bearer_auth(&self.bearer);
        request = match body {
            Some(body) => request.json(&body),
            // The player endpoints require an explicit empty body.
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };

        check_status(request.send().await?)?;
        Ok(())
    }
}

#[async_trait]
impl Transport for WebTransport {
    async fn load(&mut self, uri: &str, start_playing: bool, position_ms: u32) -> Result<()> {
        self.put(
            "/me/player/play",
            Some(serde_json::json!({
                "uris": [uri],
                "position_ms": position_ms,
            })),
        )
        .await?;

        if !start_playing {
            self.put("/me/player/pause", None).await?;
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.put("/me/player/pause", None).await
    }

    async fn resume(&mut self) -> Result<()> {
        self.put("/me/player/play", None).await
    }

    async fn stop(&mut self) -> Result<()> {
        // The player API has no stop; pausing is the closest the service
        // offers, and the local queue is destroyed by the caller.
        self.put("/me/player/pause", None).await
    }

    async fn seek(&mut self, position_ms: u32) -> Result<()> {
        self.put(&format!("/me/player/seek?position_ms={position_ms}"), None)
            .await
    }

    async fn set_volume(&mut self, volume: u16) -> Result<()> {
        let percent = u32::from(volume) * 100 / u32::from(u16::MAX);
        self.put(&format!("/me/player/volume?volume_percent={percent}"), None)
            .await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl AuthFlow for WebApi {
    async fn authorize(&self, client_id: &str, redirect_uri: &Url) -> Result<AccessToken> {
        let verifier = pkce_verifier();
        let challenge = pkce_challenge(&verifier);
        let state = Uuid::new_v4().to_string();

        let mut authorize = Url::parse(&format!("{ACCOUNTS_URL}/authorize"))
            .map_err(|e| Error::assertion(format!("authorize URL: {e}")))?;
        authorize
            .query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", SCOPES)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &challenge)
            .append_pair("state", &state);

        info!("authorize this application in a browser: {authorize}");

        let code = timeout(
            REDIRECT_TIMEOUT,
            capture_redirect(redirect_uri, &state),
        )
        .await
        .map_err(|_| Error::auth("timed out waiting for the authorization redirect"))??;

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(format!("{ACCOUNTS_URL}/api/token"))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", client_id),
                ("code_verifier", &verifier),
            ])
            .send()
            .await?;
        let granted: TokenResponse = check_status(response)?.json().await?;

        let token = AccessToken::new(
            &granted.access_token,
            granted.refresh_token.as_deref().unwrap_or_default(),
            Duration::from_secs(granted.expires_in),
        )?;
        self.set_bearer(&token.access_token);
        Ok(token)
    }
}

/// Accepts one connection on the redirect address and extracts the
/// authorization code, verifying the state parameter.
async fn capture_redirect(redirect_uri: &Url, expected_state: &str) -> Result<String> {
    let host = redirect_uri
        .host_str()
        .ok_or_else(|| Error::invalid_input("redirect URI has no host"))?;
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_else(|| Error::invalid_input("redirect URI has no port"))?;

    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| Error::auth(format!("binding {host}:{port} failed: {e}")))?;
    debug!("listening on {host}:{port} for the authorization redirect");

    let (mut stream, peer) = listener
        .accept()
        .await
        .map_err(|e| Error::auth(format!("accepting the redirect failed: {e}")))?;
    trace!("redirect connection from {peer}");

    let mut buffer = vec![0_u8; 4096];
    let read = stream
        .read(&mut buffer)
        .await
        .map_err(|e| Error::auth(format!("reading the redirect failed: {e}")))?;
    let request = String::from_utf8_lossy(&buffer[..read]);

    let result = parse_redirect(&request, redirect_uri, expected_state);

    if let Err(e) = stream.write_all(REDIRECT_PAGE).await {
        debug!("writing the redirect response failed: {e}");
    }

    result
}

fn parse_redirect(request: &str, redirect_uri: &Url, expected_state: &str) -> Result<String> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::auth("malformed redirect request"))?;
    let url = redirect_uri
        .join(target)
        .map_err(|e| Error::auth(format!("malformed redirect target: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(Error::auth(format!("authorization denied: {value}"))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::auth("redirect state mismatch"));
    }
    code.ok_or_else(|| Error::auth("redirect carried no authorization code"))
}

fn pkce_verifier() -> String {
    let mut bytes = [0_u8; 32];
    bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
