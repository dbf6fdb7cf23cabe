//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// SQLite database file (from ML_CONSTRUCTOR_DB). `None` uses the
    /// platform data directory.
    pub database_path: Option<PathBuf>,
    /// Bind address (from ML_CONSTRUCTOR_HOST)
    pub host: String,
    /// Bind port (from ML_CONSTRUCTOR_PORT)
    pub port: u16,
    /// Allowed CORS origins (from ML_CONSTRUCTOR_CORS_ORIGINS, comma-separated).
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_path = std::env::var("ML_CONSTRUCTOR_DB").ok().map(PathBuf::from);

        let host = std::env::var("ML_CONSTRUCTOR_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = std::env::var("ML_CONSTRUCTOR_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let cors_origins = std::env::var("ML_CONSTRUCTOR_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .filter(|origins| !origins.is_empty());

        Self {
            database_path,
            host,
            port,
            cors_origins,
        }
    }

    /// Local development defaults: in-place database, any origin.
    pub fn local() -> Self {
        Self {
            database_path: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: None,
        }
    }

    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            cors_origins: Some(origins),
            ..Self::local()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
