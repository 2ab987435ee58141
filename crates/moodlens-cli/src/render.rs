//! Terminal rendering of cycle results and the gallery.

use crate::gallery::Gallery;
use crate::session::{CycleReport, PlaylistStatus};
use moodlens_core::Analysis;
use moodlens_playlist::TrackCandidate;
use std::fmt::Write;

const CELL_SEPARATOR: &str = " │ ";

pub const EMPTY_GALLERY: &str = "No images saved yet. Capture or upload to get started!";
pub const NO_PLAYLIST: &str = "No matching playlist found on Spotify.";

fn heading(title: &str) -> String {
    format!("── {title} ──")
}

/// Emotion label, confidence, and any optional attributes.
pub fn analysis_panel(analysis: &Analysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heading("🎭 Emotion Analysis Results"));

    if let Some(warning) = &analysis.warning {
        let _ = writeln!(out, "⚠ Emotion Detection Failed: {warning}");
    }

    let result = &analysis.result;
    let _ = writeln!(out, "{} {}", result.dominant_emotion.emoji(), result.dominant_emotion.label());
    let _ = writeln!(out, "{}% confidence", result.percent());

    let mut extras = Vec::new();
    if let Some(age) = analysis.attributes.age {
        extras.push(format!("Age: {age}"));
    }
    if let Some(gender) = &analysis.attributes.gender {
        extras.push(format!("Gender: {gender}"));
    }
    if let Some(face) = analysis.face_confidence {
        extras.push(format!("Face: {}%", (face.clamp(0.0, 1.0) * 100.0) as u32));
    }
    if !extras.is_empty() {
        let _ = writeln!(out, "{}", extras.join(" · "));
    }
    out
}

pub fn playlist_section(status: &PlaylistStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heading("🎵 Your Mood-Based Playlist"));
    match status {
        PlaylistStatus::Found(playlist) => {
            let _ = writeln!(out, "{}", playlist.name);
            let _ = writeln!(out, "{}", playlist.external_url);
            let _ = writeln!(out, "embed: {}", playlist.embed_url());
        }
        PlaylistStatus::NotFound => {
            let _ = writeln!(out, "{NO_PLAYLIST}");
        }
        PlaylistStatus::Unavailable(reason) => {
            let _ = writeln!(out, "Playlist recommendations unavailable: {reason}");
        }
    }
    out
}

pub fn track_line(track: &TrackCandidate) -> String {
    let mut line = format!("🎶 {} by {} {}", track.name, track.artist, track.external_url);
    if let Some(preview) = &track.preview_url {
        let _ = write!(line, " (preview: {preview})");
    }
    line
}

/// Full output for one cycle.
pub fn cycle(report: &CycleReport) -> String {
    let mut out = format!("📸 {} ({}x{})\n", report.source, report.width, report.height);
    out.push_str(&analysis_panel(&report.analysis));
    out.push_str(&playlist_section(&report.playlist));
    if let Some(track) = &report.track {
        let _ = writeln!(out, "{}", track_line(track));
    }
    out
}

/// Gallery grid, `columns` cells per row, newest first.
pub fn gallery_grid(gallery: &Gallery, columns: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heading(&format!("🖼️ Saved Images ({})", gallery.len())));
    if gallery.is_empty() {
        let _ = writeln!(out, "{EMPTY_GALLERY}");
        return out;
    }

    let captions: Vec<String> = gallery.iter().map(|e| e.caption()).collect();
    for row in captions.chunks(columns.max(1)) {
        let _ = writeln!(out, "{}", row.join(CELL_SEPARATOR));
    }
    out
}
