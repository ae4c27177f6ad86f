use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance threshold for a positive match (strict less-than).
    pub match_threshold: f64,
    /// Scope applied to requests that carry no X-Scope header.
    pub default_scope: String,
    /// Base URL of the Nominatim-compatible reverse-geocoding service.
    pub geocode_endpoint: String,
    /// Timeout in seconds for a reverse-geocoding call.
    pub geocode_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `TIMECLOCK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("timeclock");

        let db_path = std::env::var("TIMECLOCK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("timeclock.db"));

        let model_dir = std::env::var("TIMECLOCK_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        Self {
            bind_addr: std::env::var("TIMECLOCK_BIND")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_path,
            model_dir,
            match_threshold: env_f64("TIMECLOCK_MATCH_THRESHOLD", 0.5),
            default_scope: std::env::var("TIMECLOCK_DEFAULT_SCOPE")
                .unwrap_or_else(|_| "default".to_string()),
            geocode_endpoint: std::env::var("TIMECLOCK_GEOCODE_ENDPOINT")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            geocode_timeout_secs: env_u64("TIMECLOCK_GEOCODE_TIMEOUT_SECS", 10),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedding_model_path(&self) -> String {
        self.model_dir
            .join("face_recognition_resnet_v1.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
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
