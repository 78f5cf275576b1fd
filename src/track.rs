//! Content addressing and track metadata.
//!
//! Content is addressed by the service's native URI scheme
//! (`spotify:track:…`) or the equivalent web URL. Queue items are
//! immutable once placed; replacing playback content means replacing the
//! queue.

use std::{fmt, str::FromStr};

use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};

/// The service's native URI scheme.
pub const URI_SCHEME: &str = "spotify";

/// Host of the service's public web links.
pub const WEB_HOST: &str = "open.spotify.com";

/// Kinds of addressable content. Collection kinds expand to their tracks
/// in canonical order.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentKind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
        }
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "track" => Ok(Self::Track),
            "album" => Ok(Self::Album),
            "playlist" => Ok(Self::Playlist),
            "artist" => Ok(Self::Artist),
            other => Err(Error::invalid_input(format!(
                "unsupported content kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed reference to one piece of content.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: String,
}

impl ContentRef {
    /// Parses a native URI or a web URL.
    ///
    /// Web URLs may carry locale path prefixes (`intl-de`) and query
    /// parameters; both are discarded.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::invalid_input("content reference is empty"));
        }

        if let Some(rest) = input.strip_prefix(&format!("{URI_SCHEME}:")) {
            let mut parts = rest.splitn(2, ':');
            let kind = parts
                .next()
                .unwrap_or_default()
                .parse::<ContentKind>()?;
            let id = parts.next().unwrap_or_default();
            return Self::from_parts(kind, id);
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            return Self::parse_web_url(input);
        }

        Err(Error::invalid_input(format!(
            "not a {URI_SCHEME} URI or web URL: {input}"
        )))
    }

    fn parse_web_url(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;
        if url.host_str() != Some(WEB_HOST) {
            return Err(Error::invalid_input(format!(
                "unsupported web host in {input}"
            )));
        }

        let mut segments = url
            .path_segments()
            .map(Iterator::collect::<Vec<_>>)
            .unwrap_or_default()
            .into_iter()
            .filter(|segment| !segment.starts_with("intl-"));

        let kind = segments
            .next()
            .ok_or_else(|| Error::invalid_input(format!("missing content kind in {input}")))?
            .parse::<ContentKind>()?;
        let id = segments
            .next()
            .ok_or_else(|| Error::invalid_input(format!("missing content id in {input}")))?;

        Self::from_parts(kind, id)
    }

    fn from_parts(kind: ContentKind, id: &str) -> Result<Self> {
        if id.is_empty() || !id.chars().all(char::is_alphanumeric) {
            return Err(Error::invalid_input(format!("invalid content id: {id:?}")));
        }

        Ok(Self {
            kind,
            id: id.to_owned(),
        })
    }

    /// The canonical native URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{URI_SCHEME}:{}:{}", self.kind, self.id)
    }

    /// The public web link for this content.
    #[must_use]
    pub fn external_url(&self) -> String {
        format!("https://{WEB_HOST}/{}/{}", self.kind, self.id)
    }

    #[must_use]
    pub fn is_track(&self) -> bool {
        self.kind == ContentKind::Track
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// Resolved track metadata as delivered by the resolver collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
    pub track_name: String,
    pub artist_name: String,
    pub album_art_url: String,
    pub duration_ms: u32,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub external_url: Option<String>,
}

/// One entry of the play queue.
///
/// Items are placed with their index reserved immediately; metadata may
/// populate later from the lazy resolution task. Per-field reads report
/// absent until then.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub uri: String,
    #[serde(flatten)]
    pub metadata: Option<TrackMetadata>,
}

impl QueueItem {
    /// An unresolved placeholder reserving its queue index.
    #[must_use]
    pub fn placeholder(uri: String) -> Self {
        Self {
            uri,
            metadata: None,
        }
    }

    #[must_use]
    pub fn resolved(uri: String, metadata: TrackMetadata) -> Self {
        Self {
            uri,
            metadata: Some(metadata),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.metadata.is_some()
    }

    /// Known duration, absent until resolved.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u32> {
        self.metadata.as_ref().map(|metadata| metadata.duration_ms)
    }
}
