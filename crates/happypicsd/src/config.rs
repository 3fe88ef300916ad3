use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Which history variant the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No accounts; history lives in the session only.
    Volatile,
    /// Email/password accounts; history persisted per user.
    Durable,
}

impl Mode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "volatile" | "session" => Some(Mode::Volatile),
            "durable" | "persistent" => Some(Mode::Durable),
            _ => None,
        }
    }
}

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Listen address (default: 127.0.0.1:8501).
    pub bind: String,
    pub mode: Mode,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file (durable mode).
    pub db_path: PathBuf,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Width of history thumbnails, in pixels.
    pub thumbnail_width: u32,
    /// Base URL of the identity service REST API.
    pub identity_endpoint: String,
    /// API key for the identity service. Required in durable mode.
    pub identity_api_key: Option<String>,
    /// Pending analyze requests the engine thread may queue.
    pub engine_queue_depth: usize,
    /// Sessions idle for longer than this are dropped, history included.
    pub session_ttl: Duration,
}

impl Config {
    /// Load configuration from `HAPPYPICS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("HAPPYPICS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| happypics_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("happypics");

        let db_path = std::env::var("HAPPYPICS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("history.db"));

        let mode = match std::env::var("HAPPYPICS_MODE") {
            Ok(v) => Mode::parse(&v).unwrap_or_else(|| {
                tracing::warn!(value = %v, "unrecognized HAPPYPICS_MODE, using volatile");
                Mode::Volatile
            }),
            Err(_) => Mode::Volatile,
        };

        Self {
            bind: std::env::var("HAPPYPICS_BIND").unwrap_or_else(|_| "127.0.0.1:8501".to_string()),
            mode,
            model_dir,
            db_path,
            max_upload_bytes: env_usize("HAPPYPICS_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            thumbnail_width: env_u32("HAPPYPICS_THUMBNAIL_WIDTH", 100),
            identity_endpoint: std::env::var("HAPPYPICS_IDENTITY_ENDPOINT")
                .unwrap_or_else(|_| happypics_auth::provider::DEFAULT_ENDPOINT.to_string()),
            identity_api_key: std::env::var("HAPPYPICS_IDENTITY_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            engine_queue_depth: env_usize("HAPPYPICS_ENGINE_QUEUE_DEPTH", 4).max(1),
            session_ttl: Duration::from_secs(env_u64("HAPPYPICS_SESSION_TTL", 3600).max(1)),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the FER+ emotion model.
    pub fn ferplus_model_path(&self) -> String {
        self.model_dir
            .join("emotion-ferplus-8.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
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

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
