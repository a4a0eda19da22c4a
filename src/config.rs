//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// HTTP server configuration.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Bind address (from FBA_PLANNER_HOST)
    pub host: Option<String>,
    /// Bind port (from FBA_PLANNER_PORT)
    pub port: Option<u16>,
    /// SQLite file (from FBA_PLANNER_DATABASE_PATH); platform data dir when unset
    pub database_path: Option<PathBuf>,
    /// Allowed CORS origins (from FBA_PLANNER_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("FBA_PLANNER_HOST").ok();

        let port = std::env::var("FBA_PLANNER_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok());

        let database_path = std::env::var("FBA_PLANNER_DATABASE_PATH")
            .ok()
            .map(PathBuf::from);

        let cors_origins = std::env::var("FBA_PLANNER_CORS_ORIGINS").ok().map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            host,
            port,
            database_path,
            cors_origins,
        }
    }

    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }
}

/// Configuration of an editing session talking to a remote server.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// API base URL (from FBA_PLANNER_URL)
    pub server_url: String,
    /// Quiet window before an edit triggers a recompute (from FBA_PLANNER_DEBOUNCE_MS)
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let server_url = std::env::var("FBA_PLANNER_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let debounce = std::env::var("FBA_PLANNER_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);

        Self {
            server_url,
            debounce,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_falls_back_to_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");

        let config = ServerConfig {
            host: Some("0.0.0.0".into()),
            port: Some(9000),
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn session_defaults() {
        let config = SessionConfig::default().with_debounce(Duration::from_millis(50));
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.debounce, Duration::from_millis(50));
    }
}
