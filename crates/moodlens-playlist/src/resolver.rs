//! Mood-to-music resolution.
//!
//! [`PlaylistResolver`] runs a best-effort keyword-pair search: shuffle the
//! emotion's keywords, try `"<a> <b> playlist"` for each unordered pair in
//! index order, stop at the first query with results. Whole attempts are
//! retried with a fresh shuffle until the wall-clock budget runs out.
//!
//! The budget also bounds each attempt: once it is spent no further query is
//! started and an in-flight one is abandoned. The very first query of a
//! resolution always runs to completion.

use crate::keywords::MoodKeywordTable;
use crate::search::{MusicSearch, PlaylistCandidate, SearchError, TrackCandidate};
use moodlens_core::Emotion;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("music search unavailable: {0}")]
    Search(#[from] SearchError),
    #[error("no playlist matched any keyword pair")]
    NoCandidate,
}

impl ResolveError {
    fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::NoCandidate)
    }
}

/// Playlist resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Results requested per query.
    pub result_limit: usize,
    /// Wall-clock budget for the whole resolution. Zero allows one query.
    pub retry_budget: Duration,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            result_limit: 5,
            retry_budget: Duration::from_secs(5),
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Search queries for one attempt: every unordered pair `(i, j)`, `i < j`,
/// in index order. Fewer than two keywords yield no queries.
pub fn pair_queries(keywords: &[String]) -> Vec<String> {
    let n = keywords.len();
    let mut queries = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..keywords.len() {
        for j in (i + 1)..keywords.len() {
            queries.push(format!("{} {} playlist", keywords[i], keywords[j]));
        }
    }
    queries
}

/// Seedable RNG shared by reference across retry attempts.
struct SharedRng(Mutex<StdRng>);

impl SharedRng {
    fn new(rng: StdRng) -> Self {
        Self(Mutex::new(rng))
    }

    fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

/// Turns an emotion into at most one playlist.
pub struct PlaylistResolver {
    search: Arc<dyn MusicSearch>,
    keywords: MoodKeywordTable,
    config: ResolverConfig,
    rng: SharedRng,
}

impl PlaylistResolver {
    pub fn new(search: Arc<dyn MusicSearch>, keywords: MoodKeywordTable, config: ResolverConfig) -> Self {
        Self {
            search,
            keywords,
            config,
            rng: SharedRng::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed RNG (for reproducible shuffles).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = SharedRng::new(rng);
        self
    }

    /// Resolve a playlist for `emotion`.
    ///
    /// `Ok(None)` means the budget ran out without a match, which is a normal
    /// outcome. `Err` means the search service itself is unusable.
    pub async fn resolve(&self, emotion: Emotion) -> Result<Option<PlaylistCandidate>, ResolveError> {
        let keyword_count = self.keywords.keywords_or_fallback(emotion).len();
        if keyword_count < 2 {
            tracing::info!(emotion = %emotion, keyword_count, "too few keywords to pair; no playlist");
            return Ok(None);
        }

        let started = Instant::now();
        let deadline = started + self.config.retry_budget;
        // A retry is scheduled only if it would start before the deadline.
        let strategy = FixedInterval::new(self.config.retry_delay)
            .take_while(move |delay| Instant::now() + *delay < deadline);
        let first_query_sent = AtomicBool::new(false);

        match RetryIf::spawn(
            strategy,
            || self.attempt(emotion, deadline, &first_query_sent),
            ResolveError::is_retryable,
        )
        .await
        {
            Ok(candidate) => {
                tracing::info!(
                    emotion = %emotion,
                    playlist = %candidate.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "playlist resolved"
                );
                Ok(Some(candidate))
            }
            Err(ResolveError::NoCandidate) => {
                tracing::info!(
                    emotion = %emotion,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "no playlist found within retry budget"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// One pass over the keyword pairs with a fresh shuffle, cut short at
    /// `deadline`.
    async fn attempt(
        &self,
        emotion: Emotion,
        deadline: Instant,
        first_query_sent: &AtomicBool,
    ) -> Result<PlaylistCandidate, ResolveError> {
        let mut keywords = self.keywords.keywords_or_fallback(emotion);
        self.rng.with(|rng| keywords.shuffle(rng));

        for query in pair_queries(&keywords) {
            let request = self.search.search_playlists(&query, self.config.result_limit);
            let outcome = if !first_query_sent.swap(true, Ordering::Relaxed) {
                request.await
            } else if Instant::now() >= deadline {
                tracing::debug!(query = %query, "budget spent; not starting query");
                return Err(ResolveError::NoCandidate);
            } else {
                match tokio::time::timeout_at(deadline, request).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!(query = %query, "budget spent while waiting on query");
                        return Err(ResolveError::NoCandidate);
                    }
                }
            };

            match outcome {
                Ok(mut found) if !found.is_empty() => {
                    let pick = self.rng.with(|rng| rng.gen_range(0..found.len()));
                    tracing::debug!(query = %query, results = found.len(), pick, "playlist query matched");
                    return Ok(found.swap_remove(pick));
                }
                Ok(_) => tracing::debug!(query = %query, "playlist query empty"),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "playlist query failed; trying next pair")
                }
            }
        }

        Err(ResolveError::NoCandidate)
    }
}

/// Mood-song mode: collects a handful of tracks from single-keyword searches.
pub struct TrackResolver {
    search: Arc<dyn MusicSearch>,
    keywords: MoodKeywordTable,
    searches: usize,
    result_limit: usize,
    rng: SharedRng,
}

impl TrackResolver {
    pub fn new(search: Arc<dyn MusicSearch>, keywords: MoodKeywordTable) -> Self {
        Self {
            search,
            keywords,
            searches: 5,
            result_limit: 10,
            rng: SharedRng::new(StdRng::from_entropy()),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = SharedRng::new(rng);
        self
    }

    /// Up to five tracks, one per non-empty search. Emotions without track
    /// keywords get none.
    pub async fn resolve(&self, emotion: Emotion) -> Result<Vec<TrackCandidate>, ResolveError> {
        let Some(keywords) = self.keywords.get(emotion) else {
            tracing::debug!(emotion = %emotion, "no track keywords for emotion");
            return Ok(Vec::new());
        };

        let mut tracks = Vec::with_capacity(self.searches);
        for _ in 0..self.searches {
            let Some(query) = self.rng.with(|rng| keywords.choose(rng).cloned()) else {
                break;
            };
            match self.search.search_tracks(&query, self.result_limit).await {
                Ok(mut found) if !found.is_empty() => {
                    let pick = self.rng.with(|rng| rng.gen_range(0..found.len()));
                    tracks.push(found.swap_remove(pick));
                }
                Ok(_) => tracing::debug!(query = %query, "track query empty"),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => tracing::warn!(query = %query, error = %e, "track query failed"),
            }
        }

        tracing::info!(emotion = %emotion, tracks = tracks.len(), "mood songs resolved");
        Ok(tracks)
    }
}
