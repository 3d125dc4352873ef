use std::path::PathBuf;

/// Command line configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the descriptor encryption key file.
    pub key_path: PathBuf,
    /// Whether stored descriptors are encrypted at rest.
    pub encrypt: bool,
    /// Euclidean distance below which a scan counts as a match.
    pub match_threshold: f32,
    /// Trailing window in which a repeated scan is treated as a duplicate.
    pub duplicate_window_secs: u64,
}

impl Config {
    /// Load configuration from `GATEHOUSE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("gatehouse");

        let db_path = std::env::var("GATEHOUSE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gatehouse.db"));

        let key_path = std::env::var("GATEHOUSE_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("descriptor.key"));

        Self {
            db_path,
            key_path,
            encrypt: std::env::var("GATEHOUSE_ENCRYPT")
                .map(|v| v != "0")
                .unwrap_or(true),
            match_threshold: env_f32(
                "GATEHOUSE_MATCH_THRESHOLD",
                gatehouse_core::DEFAULT_MATCH_THRESHOLD,
            ),
            duplicate_window_secs: env_u64(
                "GATEHOUSE_DUPLICATE_WINDOW_SECS",
                gatehouse_core::DEFAULT_DUPLICATE_WINDOW_SECS,
            ),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
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
