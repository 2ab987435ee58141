//! Mood keyword tables.
//!
//! Built-in defaults can be overridden from a TOML file:
//!
//! ```toml
//! [playlist]
//! happy = ["happy", "pop", "feel good"]
//!
//! [track]
//! sad = ["sad", "melancholy"]
//! ```

use moodlens_core::Emotion;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Keyword used for emotions without a table entry.
pub const FALLBACK_KEYWORD: &str = "mood";

#[derive(Error, Debug)]
pub enum KeywordTableError {
    #[error("cannot read keyword file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("bad keyword TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown emotion {0:?} in keyword file")]
    UnknownEmotion(String),
    #[error("keyword list for {0:?} is empty")]
    EmptyList(String),
}

/// Static mapping from emotion to an ordered keyword list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoodKeywordTable {
    entries: HashMap<Emotion, Vec<String>>,
}

impl MoodKeywordTable {
    fn from_static(rows: &[(Emotion, &[&str])]) -> Self {
        Self {
            entries: rows
                .iter()
                .map(|(e, kws)| (*e, kws.iter().map(|k| k.to_string()).collect()))
                .collect(),
        }
    }

    /// Genre/mood keywords for playlist search.
    pub fn playlist_defaults() -> Self {
        Self::from_static(&[
            (Emotion::Happy, &["happy", "pop", "feel good", "upbeat", "party"]),
            (Emotion::Sad, &["sad songs", "acoustic", "emotional", "heartbreak", "soft rock"]),
            (Emotion::Angry, &["metal", "hard rock", "punk", "grunge", "alternative"]),
            (Emotion::Surprise, &["electronic", "dance", "edm", "house", "party"]),
            (Emotion::Neutral, &["lofi", "chill", "study", "relax", "ambient"]),
            (Emotion::Fear, &["ambient", "calm", "meditation", "relax", "instrumental"]),
            (Emotion::Disgust, &["punk", "garage rock", "grunge", "heavy", "alt rock"]),
        ])
    }

    /// Single-word keywords for track search.
    pub fn track_defaults() -> Self {
        Self::from_static(&[
            (Emotion::Happy, &["happy", "upbeat", "energetic"]),
            (Emotion::Sad, &["sad", "melancholy", "blue"]),
            (Emotion::Angry, &["angry", "aggressive", "rock"]),
            (Emotion::Surprise, &["wow", "surprise", "eclectic"]),
            (Emotion::Neutral, &["chill", "ambient", "background"]),
            (Emotion::Fear, &["dark", "intense", "haunting"]),
            (Emotion::Disgust, &["cleanse", "detox", "calm"]),
        ])
    }

    /// Keywords for `emotion`, if the table has them.
    pub fn get(&self, emotion: Emotion) -> Option<&[String]> {
        self.entries.get(&emotion).map(Vec::as_slice)
    }

    /// Keywords for `emotion`, or `["mood"]` when the table has none.
    pub fn keywords_or_fallback(&self, emotion: Emotion) -> Vec<String> {
        self.get(emotion)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![FALLBACK_KEYWORD.to_string()])
    }

    /// Replace entries from a raw `emotion key -> keywords` map.
    fn apply(&mut self, raw: HashMap<String, Vec<String>>) -> Result<(), KeywordTableError> {
        for (key, keywords) in raw {
            let emotion = Emotion::from_label(&key);
            if emotion == Emotion::Unknown {
                return Err(KeywordTableError::UnknownEmotion(key));
            }
            let cleaned: Vec<String> = keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if cleaned.is_empty() {
                return Err(KeywordTableError::EmptyList(key));
            }
            self.entries.insert(emotion, cleaned);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct KeywordFile {
    #[serde(default)]
    playlist: HashMap<String, Vec<String>>,
    #[serde(default)]
    track: HashMap<String, Vec<String>>,
}

/// The playlist and track tables, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTables {
    pub playlist: MoodKeywordTable,
    pub track: MoodKeywordTable,
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            playlist: MoodKeywordTable::playlist_defaults(),
            track: MoodKeywordTable::track_defaults(),
        }
    }
}

impl KeywordTables {
    /// Defaults overridden by the entries present in `src`.
    pub fn from_toml_str(src: &str) -> Result<Self, KeywordTableError> {
        let file: KeywordFile = toml::from_str(src)?;
        let mut tables = Self::default();
        tables.playlist.apply(file.playlist)?;
        tables.track.apply(file.track)?;
        Ok(tables)
    }

    pub fn load(path: &Path) -> Result<Self, KeywordTableError> {
        let src = std::fs::read_to_string(path).map_err(|source| KeywordTableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let tables = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), "loaded keyword overrides");
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_known_emotion() {
        let tables = KeywordTables::default();
        for emotion in Emotion::KNOWN {
            let n = tables.playlist.get(emotion).unwrap().len();
            assert!((3..=5).contains(&n), "{emotion}: {n}");
            assert!(tables.track.get(emotion).is_some());
        }
        assert!(tables.playlist.get(Emotion::Unknown).is_none());
    }

    #[test]
    fn test_unknown_falls_back_to_mood() {
        let table = MoodKeywordTable::playlist_defaults();
        assert_eq!(table.keywords_or_fallback(Emotion::Unknown), vec!["mood".to_string()]);
        assert_eq!(table.keywords_or_fallback(Emotion::Happy)[0], "happy");
    }

    #[test]
    fn test_toml_override_replaces_only_named_entries() {
        let tables = KeywordTables::from_toml_str(
            r#"
            [playlist]
            Happy = ["sunshine", " summer ", ""]

            [track]
            fear = ["spooky"]
            "#,
        )
        .unwrap();

        assert_eq!(
            tables.playlist.get(Emotion::Happy).unwrap(),
            &["sunshine".to_string(), "summer".to_string()]
        );
        assert_eq!(tables.playlist.get(Emotion::Sad).unwrap()[0], "sad songs");
        assert_eq!(tables.track.get(Emotion::Fear).unwrap(), &["spooky".to_string()]);
    }

    #[test]
    fn test_toml_rejects_bad_entries() {
        assert!(matches!(
            KeywordTables::from_toml_str("[playlist]\nbored = [\"x\"]"),
            Err(KeywordTableError::UnknownEmotion(_))
        ));
        assert!(matches!(
            KeywordTables::from_toml_str("[track]\nsad = []"),
            Err(KeywordTableError::EmptyList(_))
        ));
        assert!(matches!(
            KeywordTables::from_toml_str("[playlist"),
            Err(KeywordTableError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(KeywordTables::from_toml_str("").unwrap(), KeywordTables::default());
    }
}
