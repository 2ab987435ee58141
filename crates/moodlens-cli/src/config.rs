use moodlens_playlist::{ResolverConfig, SpotifyConfig};
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Number of warmup frames to discard after opening the camera.
    pub warmup_frames: usize,
    /// Fail classification when no face is found instead of using the whole image.
    pub enforce_detection: bool,
    /// Minimum SCRFD score for a face.
    pub detection_threshold: f32,
    /// Optional TOML file overriding the mood keyword tables.
    pub keywords_path: Option<PathBuf>,
    /// Playlist results requested per search.
    pub playlist_limit: usize,
    /// Wall-clock budget for playlist retries.
    pub retry_budget_ms: u64,
    /// Pause between playlist attempts.
    pub retry_delay_ms: u64,
    /// Columns in the rendered gallery grid.
    pub gallery_columns: usize,
    pub spotify: SpotifyConfig,
}

impl Config {
    /// Load configuration from `MOODLENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("MOODLENS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| moodlens_core::default_model_dir());

        Self {
            camera_device: std::env::var("MOODLENS_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            warmup_frames: env_parse("MOODLENS_WARMUP_FRAMES", 4),
            enforce_detection: env_flag("MOODLENS_ENFORCE_DETECTION", false),
            detection_threshold: env_parse("MOODLENS_DETECTION_THRESHOLD", 0.5),
            keywords_path: std::env::var("MOODLENS_KEYWORDS").ok().map(PathBuf::from),
            playlist_limit: env_parse("MOODLENS_PLAYLIST_LIMIT", 5),
            retry_budget_ms: env_parse("MOODLENS_RETRY_BUDGET_MS", 5000),
            retry_delay_ms: env_parse("MOODLENS_RETRY_DELAY_MS", 250),
            gallery_columns: env_parse::<usize>("MOODLENS_GALLERY_COLUMNS", 4).max(1),
            spotify: SpotifyConfig::from_env(),
        }
    }

    /// Path to the FER+ emotion model.
    pub fn ferplus_model_path(&self) -> String {
        self.model_dir
            .join(moodlens_core::FERPLUS_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(moodlens_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            result_limit: self.playlist_limit,
            retry_budget: Duration::from_millis(self.retry_budget_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(v: &str) -> bool {
    !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}
