use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL of the embeddable Spotify playlist player.
pub const EMBED_BASE_URL: &str = "https://open.spotify.com/embed/playlist";

/// A playlist returned by the search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistCandidate {
    pub name: String,
    pub external_url: String,
    pub embed_id: String,
}

impl PlaylistCandidate {
    pub fn embed_url(&self) -> String {
        format!("{EMBED_BASE_URL}/{}", self.embed_id)
    }
}

/// A single song for the mood-song mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub name: String,
    pub artist: String,
    pub preview_url: Option<String>,
    pub external_url: String,
}

/// Search service errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("missing API credentials: set SPOTIPY_CLIENT_ID and SPOTIPY_CLIENT_SECRET")]
    MissingCredentials,

    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },
}

impl SearchError {
    /// Auth/config failures disable the feature; everything else is per-query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SearchError::MissingCredentials | SearchError::Unauthorized(_))
    }
}

/// Abstraction over the music search service.
///
/// Implementations drop null or id-less items, so every returned candidate
/// is displayable.
#[async_trait]
pub trait MusicSearch: Send + Sync {
    async fn search_playlists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistCandidate>, SearchError>;

    async fn search_tracks(&self, query: &str, limit: usize)
        -> Result<Vec<TrackCandidate>, SearchError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
