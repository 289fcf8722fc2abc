//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Origins allowed by CORS when `HOME_DASHBOARD_CORS_ORIGINS` is unset.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file (`:memory:` for a throwaway database).
    pub db_path: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Create the default appliance set on first start.
    pub auto_seed_defaults: bool,
    /// Origins allowed to call the API from a browser.
    pub cors_origins: Vec<String>,
    /// How many readings the dashboard and the readings listing return.
    pub recent_readings_limit: usize,
    /// Directory for daily rolling log files (stdout only when unset).
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/home-dashboard.db"),
            port: 8000,
            auto_seed_defaults: true,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            recent_readings_limit: 200,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `HOME_DASHBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("HOME_DASHBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let port = match lookup("HOME_DASHBOARD_PORT") {
            Some(raw) => parse_number("HOME_DASHBOARD_PORT", &raw)?,
            None => defaults.port,
        };

        let auto_seed_defaults = lookup("HOME_DASHBOARD_AUTO_SEED_DEFAULTS")
            .map(|raw| parse_flag(&raw))
            .unwrap_or(defaults.auto_seed_defaults);

        let cors_origins = match lookup("HOME_DASHBOARD_CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        let recent_readings_limit = match lookup("HOME_DASHBOARD_RECENT_READINGS") {
            Some(raw) => parse_number("HOME_DASHBOARD_RECENT_READINGS", &raw)?,
            None => defaults.recent_readings_limit,
        };

        let log_dir = lookup("HOME_DASHBOARD_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            db_path,
            port,
            auto_seed_defaults,
            cors_origins,
            recent_readings_limit,
            log_dir,
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
