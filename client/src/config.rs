//! Configuration module for the DougChat terminal client.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DOUGCHAT_SERVER_URL` | Yes | - | Server URL (e.g., `https://chat.example.com`) |
//! | `DOUGCHAT_SESSION_PATH` | No | `~/.dougchat/session` | File holding the persisted access token |
//!
//! # Example
//!
//! ```no_run
//! use dougchat_client::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Server URL: {}", config.server_url);
//! ```

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;

/// Default session directory name relative to home.
const DEFAULT_SESSION_DIR: &str = ".dougchat";

/// Default session file name inside the session directory.
const DEFAULT_SESSION_FILE: &str = "session";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the DougChat client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the DougChat server, without a trailing slash.
    pub server_url: String,

    /// Path of the file holding the persisted access token.
    pub session_path: PathBuf,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `DOUGCHAT_SERVER_URL` is not set or is not an http(s) URL
    /// - The home directory cannot be determined and no session path is set
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: DOUGCHAT_SERVER_URL
        let server_url = env::var("DOUGCHAT_SERVER_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DOUGCHAT_SERVER_URL".to_string()))?;

        // Optional: DOUGCHAT_SESSION_PATH (default: ~/.dougchat/session)
        let session_path = match env::var("DOUGCHAT_SESSION_PATH") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs
                    .home_dir()
                    .join(DEFAULT_SESSION_DIR)
                    .join(DEFAULT_SESSION_FILE)
            }
        };

        let config = Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            session_path,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "DOUGCHAT_SERVER_URL".to_string(),
                message: format!("expected an http(s) URL, got '{}'", self.server_url),
            });
        }
        Ok(())
    }
}
