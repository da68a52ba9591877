use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use facematch_core::matcher::DEFAULT_PROGRESS_STEP;

/// Search service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads running searches.
    pub workers: usize,
    /// Inclusive cosine similarity threshold for a match.
    pub match_threshold: f32,
    /// Minimum progress increase between two published updates.
    pub progress_step: f32,
    /// How long a finished task is kept before eviction. `None` keeps it
    /// until it is deleted.
    pub result_ttl: Option<Duration>,
    /// How often the daemon sweeps for expired tasks.
    pub evict_interval: Duration,
    /// Directory containing the ArcFace ONNX model.
    pub model_dir: PathBuf,
    /// Directory of `<person>.json` gallery files.
    pub gallery_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            match_threshold: 0.5,
            progress_step: DEFAULT_PROGRESS_STEP,
            result_ttl: None,
            evict_interval: Duration::from_secs(60),
            model_dir: facematch_core::default_model_dir(),
            gallery_dir: data_dir().join("persons"),
        }
    }
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ttl_secs = env_u64("FACEMATCH_RESULT_TTL_SECS", 0);

        Self {
            workers: env_usize("FACEMATCH_WORKERS", defaults.workers).max(1),
            match_threshold: env_f32_in(
                "FACEMATCH_MATCH_THRESHOLD",
                defaults.match_threshold,
                -1.0..=1.0,
            ),
            progress_step: env_f32_in("FACEMATCH_PROGRESS_STEP", defaults.progress_step, 0.0..=1.0),
            result_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            evict_interval: Duration::from_secs(
                env_u64("FACEMATCH_EVICT_INTERVAL_SECS", defaults.evict_interval.as_secs()).max(1),
            ),
            model_dir: std::env::var("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            gallery_dir: std::env::var("FACEMATCH_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.gallery_dir),
        }
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("arcface_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`env_f32`], but NaN or values outside `range` fall back to `default`.
fn env_f32_in(key: &str, default: f32, range: RangeInclusive<f32>) -> f32 {
    let value = env_f32(key, default);
    if range.contains(&value) {
        value
    } else {
        tracing::warn!(key, value, default, "out-of-range setting; using default");
        default
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
