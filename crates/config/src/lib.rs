use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Gateway configuration, populated once at startup. Every recognized
/// environment key is listed here; nothing else is consulted.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub sqlite_db_path: String,
    pub cookie_secure: bool,
    /// Seconds a public torrent seeds before auto-pause.
    pub public_seed_duration: i64,
    /// Seconds a private torrent seeds before auto-pause.
    pub private_seed_duration: i64,
    pub auto_pause_seeding: bool,
    pub maintenance_interval_seconds: u64,
    pub status_retention_days: i64,
    pub stream_idle_seconds: u64,
    pub stream_dir: PathBuf,
    /// Status observations further apart than this count as offline.
    pub max_status_gap_seconds: i64,
    pub dispatch_timeout_seconds: u64,
    /// Hook directory observers may watch; the gateway only guarantees the
    /// transfer and action tables it reads from are populated.
    pub callback_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment, reading a `.env` file first
    /// when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse("PORT", "8144")?,
            sqlite_db_path: env::var("SQLITE_DB_PATH")
                .unwrap_or_else(|_| "torrent_gateway.db".to_string()),
            cookie_secure: parse_bool("COOKIE_SECURE", false)?,
            public_seed_duration: parse("PUBLIC_SEED_DURATION", "86400")?,
            private_seed_duration: parse("PRIVATE_SEED_DURATION", "604800")?,
            auto_pause_seeding: parse_bool("AUTO_PAUSE_SEEDING", true)?,
            maintenance_interval_seconds: parse("MAINTENANCE_INTERVAL_SECONDS", "300")?,
            status_retention_days: parse("STATUS_RETENTION_DAYS", "30")?,
            stream_idle_seconds: parse("STREAM_IDLE_SECONDS", "600")?,
            stream_dir: env::var("STREAM_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("torrent-gateway-streams")),
            max_status_gap_seconds: parse("MAX_STATUS_GAP_SECONDS", "300")?,
            dispatch_timeout_seconds: parse("DISPATCH_TIMEOUT_SECONDS", "10")?,
            callback_dir: env::var("CALLBACK_DIR").ok().map(PathBuf::from),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw,
    })
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        // Scoped to keys this test does not set.
        let config = Config::from_env().unwrap();
        assert_eq!(config.private_seed_duration, 7 * 24 * 3600);
        assert_eq!(config.public_seed_duration, 24 * 3600);
        assert_eq!(config.maintenance_interval_seconds, 300);
        assert_eq!(config.stream_idle_seconds, 600);
        assert!(config.auto_pause_seeding);
    }

    #[test]
    fn bool_parser_accepts_common_spellings() {
        // A dedicated key so parallel tests reading the real config are
        // unaffected.
        env::set_var("GATEWAY_TEST_FLAG", "off");
        assert!(!parse_bool("GATEWAY_TEST_FLAG", true).unwrap());
        env::set_var("GATEWAY_TEST_FLAG", "YES");
        assert!(parse_bool("GATEWAY_TEST_FLAG", false).unwrap());
        env::set_var("GATEWAY_TEST_FLAG", "maybe");
        assert!(parse_bool("GATEWAY_TEST_FLAG", false).is_err());
        env::remove_var("GATEWAY_TEST_FLAG");
    }
}
