//! Session gallery: every analyzed image, most recent first.
//!
//! Entries are never deduplicated or evicted; the gallery lives exactly as
//! long as its session.

use chrono::{DateTime, Local};
use moodlens_core::{Emotion, EmotionResult};
use moodlens_hw::CapturedImage;
use std::collections::VecDeque;
use uuid::Uuid;

const SNAPSHOT_JPEG_QUALITY: u8 = 85;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub id: Uuid,
    /// JPEG snapshot; empty if encoding failed.
    pub image_jpeg: Vec<u8>,
    pub emoji: &'static str,
    pub emotion: Emotion,
    pub timestamp: DateTime<Local>,
}

impl GalleryEntry {
    pub fn caption(&self) -> String {
        format!("{} {}", self.emoji, self.timestamp.format(TIMESTAMP_FORMAT))
    }
}

#[derive(Debug, Default)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `image` and insert it at the front.
    pub fn record(&mut self, image: &CapturedImage, result: &EmotionResult) -> &GalleryEntry {
        let image_jpeg = image.encode_jpeg(SNAPSHOT_JPEG_QUALITY).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "gallery snapshot encode failed; storing entry without image");
            Vec::new()
        });

        let entry = GalleryEntry {
            id: Uuid::new_v4(),
            image_jpeg,
            emoji: result.dominant_emotion.emoji(),
            emotion: result.dominant_emotion,
            timestamp: Local::now(),
        };
        tracing::debug!(id = %entry.id, emotion = %entry.emotion, bytes = entry.image_jpeg.len(), "gallery entry added");

        self.entries.push_front(entry);
        &self.entries[0]
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
