//! One interactive session: classify, remember, recommend.

use crate::gallery::Gallery;
use moodlens_core::{analyze, Analysis, AnalyzeOptions, Emotion, EmotionClassifier};
use moodlens_hw::CapturedImage;
use moodlens_playlist::{PlaylistCandidate, PlaylistResolver, TrackCandidate, TrackResolver};

/// Music recommendation backends, or the reason they are missing.
pub enum Music {
    Ready {
        playlists: PlaylistResolver,
        /// Present only in mood-song mode.
        tracks: Option<TrackResolver>,
    },
    Unavailable(String),
}

/// Playlist outcome for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistStatus {
    Found(PlaylistCandidate),
    NotFound,
    Unavailable(String),
}

/// Everything produced by one capture/upload cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub analysis: Analysis,
    pub playlist: PlaylistStatus,
    pub track: Option<TrackCandidate>,
}

pub struct Session {
    classifier: Box<dyn EmotionClassifier>,
    options: AnalyzeOptions,
    music: Music,
    gallery: Gallery,
    last_emotion: Option<Emotion>,
    last_playlist: Option<PlaylistCandidate>,
    regenerate: bool,
    last_tracks: Vec<TrackCandidate>,
    track_index: usize,
}

impl Session {
    pub fn new(classifier: Box<dyn EmotionClassifier>, options: AnalyzeOptions, music: Music) -> Self {
        if let Music::Unavailable(reason) = &music {
            tracing::warn!(reason = %reason, "playlist recommendations disabled");
        }
        Self {
            classifier,
            options,
            music,
            gallery: Gallery::new(),
            last_emotion: None,
            last_playlist: None,
            regenerate: false,
            last_tracks: Vec::new(),
            track_index: 0,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn last_emotion(&self) -> Option<Emotion> {
        self.last_emotion
    }

    /// Run the full pipeline on one image.
    ///
    /// Classification failures are carried in the report's analysis; the
    /// image still lands in the gallery.
    pub async fn process(&mut self, image: CapturedImage) -> CycleReport {
        let analysis = analyze(self.classifier.as_mut(), &image.pixels, &self.options);
        let emotion = analysis.result.dominant_emotion;
        tracing::info!(
            source = %image.source,
            emotion = %emotion,
            confidence = analysis.result.confidence,
            "image analyzed"
        );

        self.gallery.record(&image, &analysis.result);
        self.last_emotion = Some(emotion);

        let playlist = self.playlist_for(emotion).await;
        let track = self.refresh_tracks(emotion).await;

        CycleReport {
            source: image.source.to_string(),
            width: image.width(),
            height: image.height(),
            analysis,
            playlist,
            track,
        }
    }

    /// Drop the cached playlist and mood songs. If an emotion has been seen,
    /// resolve fresh ones now; otherwise on the next cycle.
    pub async fn reload(&mut self) -> Option<PlaylistStatus> {
        self.regenerate = true;
        self.last_tracks.clear();
        self.track_index = 0;
        let emotion = self.last_emotion?;
        let status = self.playlist_for(emotion).await;
        self.refresh_tracks(emotion).await;
        Some(status)
    }

    /// Advance to the next mood song, wrapping around.
    pub fn next_track(&mut self) -> Option<&TrackCandidate> {
        if self.last_tracks.is_empty() {
            return None;
        }
        self.track_index = (self.track_index + 1) % self.last_tracks.len();
        self.last_tracks.get(self.track_index)
    }

    pub fn current_track(&self) -> Option<&TrackCandidate> {
        self.last_tracks.get(self.track_index)
    }

    /// The cached playlist is reused until a reload is requested, even when
    /// the emotion changes.
    async fn playlist_for(&mut self, emotion: Emotion) -> PlaylistStatus {
        if !self.regenerate {
            if let Some(cached) = &self.last_playlist {
                tracing::debug!(playlist = %cached.name, "reusing cached playlist");
                return PlaylistStatus::Found(cached.clone());
            }
        }

        let outcome = match &self.music {
            Music::Unavailable(reason) => return PlaylistStatus::Unavailable(reason.clone()),
            Music::Ready { playlists, .. } => playlists.resolve(emotion).await,
        };

        self.regenerate = false;
        match outcome {
            Ok(found) => {
                self.last_playlist = found.clone();
                found.map_or(PlaylistStatus::NotFound, PlaylistStatus::Found)
            }
            Err(e) => {
                tracing::warn!(error = %e, "playlist lookup failed");
                PlaylistStatus::Unavailable(e.to_string())
            }
        }
    }

    /// Fetch mood songs when none are cached.
    async fn refresh_tracks(&mut self, emotion: Emotion) -> Option<TrackCandidate> {
        let Music::Ready { tracks: Some(resolver), .. } = &self.music else {
            return None;
        };

        if self.last_tracks.is_empty() {
            match resolver.resolve(emotion).await {
                Ok(found) => {
                    self.last_tracks = found;
                    self.track_index = 0;
                }
                Err(e) => tracing::warn!(error = %e, "mood song lookup failed"),
            }
        }
        self.current_track().cloned()
    }
}
