//! Spotify Web API client: client-credentials auth plus the search endpoint.

use crate::search::{MusicSearch, PlaylistCandidate, SearchError, TrackCandidate};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SPOTIFY_API_BASE: &str = "https://api.spotify.com";
const SPOTIFY_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const SPOTIFY_OPEN_BASE: &str = "https://open.spotify.com";
/// Refresh the bearer token this long before Spotify says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream-issued credentials.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl SpotifyConfig {
    /// Read `SPOTIPY_CLIENT_ID` / `SPOTIPY_CLIENT_SECRET`; unset means empty.
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("SPOTIPY_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("SPOTIPY_CLIENT_SECRET").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    playlists: Option<Page<RawPlaylist>>,
    #[serde(default)]
    tracks: Option<Page<RawTrack>>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<RawArtist>,
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

impl RawPlaylist {
    fn into_candidate(self) -> Option<PlaylistCandidate> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(PlaylistCandidate {
            name: self.name.unwrap_or_else(|| "Playlist".to_string()),
            external_url: self
                .external_urls
                .spotify
                .unwrap_or_else(|| format!("{SPOTIFY_OPEN_BASE}/playlist/{id}")),
            embed_id: id,
        })
    }
}

impl RawTrack {
    fn into_candidate(self) -> Option<TrackCandidate> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(TrackCandidate {
            name: self.name.unwrap_or_else(|| "Untitled".to_string()),
            artist: self
                .artists
                .into_iter()
                .find_map(|a| a.name)
                .unwrap_or_else(|| "Unknown artist".to_string()),
            preview_url: self.preview_url,
            external_url: self
                .external_urls
                .spotify
                .unwrap_or_else(|| format!("{SPOTIFY_OPEN_BASE}/track/{id}")),
        })
    }
}

/// Spotify search client.
pub struct SpotifyClient {
    client: Client,
    config: SpotifyConfig,
    api_base: String,
    accounts_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Result<Self, SearchError> {
        Self::with_base_urls(
            config,
            SPOTIFY_API_BASE.to_string(),
            SPOTIFY_ACCOUNTS_BASE.to_string(),
        )
    }

    /// Create a client against custom API and accounts hosts (for testing).
    pub fn with_base_urls(
        config: SpotifyConfig,
        api_base: String,
        accounts_base: String,
    ) -> Result<Self, SearchError> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(SearchError::MissingCredentials);
        }

        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            client,
            config,
            api_base,
            accounts_base,
            token: Mutex::new(None),
        })
    }

    /// Cached bearer token, fetching a new one when stale.
    async fn access_token(&self) -> Result<String, SearchError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken, SearchError> {
        let url = format!("{}/api/token", self.accounts_base);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), body = %body, "Spotify token request rejected");
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SearchError::Unauthorized(body)
                }
                _ => SearchError::Api {
                    code: status.as_u16(),
                    message: body,
                },
            });
        }

        let body: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = body.expires_in, "Spotify access token issued");
        Ok(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }

    async fn search(&self, query: &str, kind: &str, limit: usize) -> Result<SearchResponse, SearchError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/search", self.api_base);
        let limit = limit.to_string();

        tracing::debug!(query, kind, "Spotify search");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query), ("type", kind), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Token revoked or expired early; the next call fetches a new one.
            self.token.lock().await.take();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Unauthorized(body));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), message = %message, "Spotify search failed");
            return Err(SearchError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MusicSearch for SpotifyClient {
    async fn search_playlists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistCandidate>, SearchError> {
        let body = self.search(query, "playlist", limit).await?;
        Ok(body
            .playlists
            .map(|page| page.items)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(RawPlaylist::into_candidate)
            .collect())
    }

    async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackCandidate>, SearchError> {
        let body = self.search(query, "track", limit).await?;
        Ok(body
            .tracks
            .map(|page| page.items)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(RawTrack::into_candidate)
            .collect())
    }

    fn name(&self) -> &str {
        "spotify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> SpotifyConfig {
        SpotifyConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        }
    }

    async fn client_for(server: &MockServer) -> SpotifyClient {
        SpotifyClient::with_base_urls(test_config(), server.uri(), server.uri()).unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-123",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_playlists_drops_null_items() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(header("authorization", "Bearer tok-123"))
            .and(query_param("q", "happy pop playlist"))
            .and(query_param("type", "playlist"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "playlists": {
                    "items": [
                        null,
                        {
                            "id": "pl1",
                            "name": "Happy Hits",
                            "external_urls": {"spotify": "https://open.spotify.com/playlist/pl1"}
                        },
                        {"name": "No id"},
                        {"id": "pl2"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let found = client.search_playlists("happy pop playlist", 5).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Happy Hits");
        assert_eq!(found[0].embed_id, "pl1");
        assert_eq!(found[1].name, "Playlist");
        assert_eq!(found[1].external_url, "https://open.spotify.com/playlist/pl2");
    }

    #[tokio::test]
    async fn test_token_is_cached_across_searches() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"playlists": {"items": []}})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.search_playlists("a b playlist", 5).await.unwrap().is_empty());
        assert!(client.search_playlists("c d playlist", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_tracks() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("type", "track"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": {
                    "items": [{
                        "id": "t1",
                        "name": "Walking on Sunshine",
                        "artists": [{"name": "Katrina and the Waves"}],
                        "preview_url": null,
                        "external_urls": {"spotify": "https://open.spotify.com/track/t1"}
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let tracks = client.search_tracks("upbeat", 10).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist, "Katrina and the Waves");
        assert_eq!(tracks[0].preview_url, None);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_client"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.search_playlists("x y playlist", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Unauthorized(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_search_401_clears_token() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        for _ in 0..2 {
            let err = client.search_playlists("x y playlist", 5).await.unwrap_err();
            assert!(matches!(err, SearchError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_fatal() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.search_playlists("x y playlist", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Api { code: 503, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_credentials() {
        let result = SpotifyClient::new(SpotifyConfig {
            client_id: String::new(),
            client_secret: "secret".to_string(),
        });
        assert!(matches!(result, Err(SearchError::MissingCredentials)));
    }
}
