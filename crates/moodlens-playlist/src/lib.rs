//! moodlens-playlist: mood-to-music resolution.
//!
//! Maps a detected emotion onto keyword searches against the Spotify Web
//! API and picks a playlist (or a handful of tracks) to show.

pub mod keywords;
pub mod resolver;
pub mod search;
pub mod spotify;

pub use keywords::{KeywordTableError, KeywordTables, MoodKeywordTable, FALLBACK_KEYWORD};
pub use resolver::{pair_queries, PlaylistResolver, ResolveError, ResolverConfig, TrackResolver};
pub use search::{MusicSearch, PlaylistCandidate, SearchError, TrackCandidate};
pub use spotify::{SpotifyClient, SpotifyConfig};
