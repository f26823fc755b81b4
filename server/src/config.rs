//! Server configuration module.
//!
//! Parses configuration from environment variables for the DougChat server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DOUGCHAT_SUPABASE_URL` | Yes* | - | URL of the Supabase project |
//! | `DOUGCHAT_SUPABASE_ANON_KEY` | Yes* | - | Supabase anon/public key for API calls |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `DOUGCHAT_TRUST_CLIENT_EMAIL` | No | false | Store the body `email` without checking the session |
//! | `DOUGCHAT_SECURE_COOKIES` | No | true | Mark the session cookie `Secure` |
//! | `DOUGCHAT_UNSAFE_MEMORY_BACKEND` | No | false | In-memory store and auth (dev only) |
//!
//! *Not required if `DOUGCHAT_UNSAFE_MEMORY_BACKEND=true`

use std::env;

use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Where messages and accounts are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// A hosted Supabase project.
    Supabase { url: String, anon_key: String },

    /// Process-local storage; everything is lost on restart.
    Memory,
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Storage and auth backend.
    pub backend: Backend,

    /// When true, `POST /api/messages` stores the body `email` as given
    /// instead of the signed-in user's email.
    pub trust_client_email: bool,

    /// When true, the session cookie carries the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Supabase variables are missing while the memory backend is off
    /// - Environment variables have invalid format
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dougchat_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let memory_backend = parse_bool_env("DOUGCHAT_UNSAFE_MEMORY_BACKEND", false)?;
        let trust_client_email = parse_bool_env("DOUGCHAT_TRUST_CLIENT_EMAIL", false)?;
        let secure_cookies = parse_bool_env("DOUGCHAT_SECURE_COOKIES", true)?;

        let backend = if memory_backend {
            warn!(
                "DOUGCHAT_UNSAFE_MEMORY_BACKEND is enabled - messages and accounts are kept \
                 in memory only. Do not use in production!"
            );
            Backend::Memory
        } else {
            Backend::Supabase {
                url: required_env("DOUGCHAT_SUPABASE_URL")?,
                anon_key: required_env("DOUGCHAT_SUPABASE_ANON_KEY")?,
            }
        };

        let config = Self {
            port,
            backend,
            trust_client_email,
            secure_cookies,
        };

        config.validate()?;

        if config.trust_client_email {
            warn!(
                "DOUGCHAT_TRUST_CLIENT_EMAIL is enabled - message senders are taken from \
                 the request body without session verification"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Backend::Supabase { url, .. } = &self.backend {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidFormat {
                    var: "DOUGCHAT_SUPABASE_URL".to_string(),
                    message: format!("expected an http(s) URL, got '{url}'"),
                });
            }
        }

        Ok(())
    }

    /// Configuration for tests and local runs: memory backend, port 8080.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            port: DEFAULT_PORT,
            backend: Backend::Memory,
            trust_client_email: false,
            secure_cookies: false,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

/// Parse a boolean environment variable.
///
/// Accepts `true`/`false`/`1`/`0` (case-insensitive); unset means `default`.
fn parse_bool_env(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(ConfigError::InvalidFormat {
                var: name.to_string(),
                message: format!("expected 'true' or 'false', got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}
