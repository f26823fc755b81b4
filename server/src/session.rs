//! Session token store for the in-memory auth backend.
//!
//! Maps opaque access tokens to the signed-in [`User`]. Sessions have a
//! default one-hour TTL, matching the lifetime of a Supabase access token.
//!
//! # Token Format
//!
//! Session tokens are 32 bytes of cryptographically secure random data,
//! base64-url encoded without padding, resulting in 43 character tokens.
//!
//! # Thread Safety
//!
//! The [`SessionStore`] uses interior mutability with [`RwLock`] for
//! thread-safe access across async tasks.
//!
//! # Example
//!
//! ```rust
//! use dougchat_server::auth::User;
//! use dougchat_server::session::{SessionStore, SessionStoreConfig};
//!
//! let store = SessionStore::new(SessionStoreConfig::default());
//! let user = User { id: "user-123".to_string(), email: Some("user@example.com".to_string()) };
//!
//! let token = store.create_session(user).expect("store has capacity");
//!
//! if let Some(user) = store.validate_session(&token) {
//!     println!("Valid session for user: {}", user.id);
//! }
//! ```

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::auth::User;

/// Default session TTL (1 hour).
const DEFAULT_TTL_SECS: u64 = 3600;

/// Maximum number of sessions.
const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Size of the random token in bytes.
const TOKEN_BYTES: usize = 32;

/// Expected length of base64-url encoded token (43 characters).
const TOKEN_LENGTH: usize = 43;

/// Errors that can occur during session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session store has reached maximum capacity.
    #[error("session store at maximum capacity ({max_capacity} sessions)")]
    AtCapacity {
        /// The maximum number of sessions allowed.
        max_capacity: usize,
    },
}

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Maximum number of concurrent sessions.
    pub max_capacity: usize,

    /// Time-to-live for new sessions.
    pub ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl SessionStoreConfig {
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        Self { max_capacity, ttl }
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: User,
    expires_at: Instant,
}

impl Session {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory session store.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionStoreConfig,
}

impl SessionStore {
    /// Creates a new session store with the given configuration.
    pub fn new(config: SessionStoreConfig) -> Self {
        debug!(
            max_capacity = config.max_capacity,
            ttl_secs = config.ttl.as_secs(),
            "Creating new session store"
        );
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Creates a new session for the given user and returns its token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AtCapacity`] if the store has reached
    /// its maximum capacity.
    pub fn create_session(&self, user: User) -> Result<String, SessionError> {
        let token = generate_session_token();

        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.config.max_capacity {
            warn!(
                capacity = sessions.len(),
                max_capacity = self.config.max_capacity,
                "Session store at capacity, rejecting new session"
            );
            return Err(SessionError::AtCapacity {
                max_capacity: self.config.max_capacity,
            });
        }

        trace!(
            user_id = %user.id,
            ttl_secs = self.config.ttl.as_secs(),
            "Creating new session"
        );

        sessions.insert(
            token.clone(),
            Session {
                user,
                expires_at: Instant::now() + self.config.ttl,
            },
        );

        Ok(token)
    }

    /// Returns the user owning `token`, or `None` if it is unknown or expired.
    ///
    /// An expired session is removed on access.
    pub fn validate_session(&self, token: &str) -> Option<User> {
        if token.len() != TOKEN_LENGTH {
            trace!(token_len = token.len(), "Invalid token length");
            return None;
        }

        {
            let sessions = self.sessions.read().unwrap();
            match sessions.get(token) {
                Some(session) if !session.is_expired() => {
                    trace!(user_id = %session.user.id, "Session validated");
                    return Some(session.user.clone());
                }
                Some(_) => {}
                None => {
                    trace!("Session token not found");
                    return None;
                }
            }
        }

        self.sessions.write().unwrap().remove(token);
        trace!("Removed expired session during validation");
        None
    }

    /// Removes a session. Returns true if it existed.
    pub fn remove_session(&self, token: &str) -> bool {
        let removed = self.sessions.write().unwrap().remove(token);
        if let Some(ref session) = removed {
            trace!(user_id = %session.user.id, "Session removed");
        }
        removed.is_some()
    }

    /// Returns the current number of sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    /// Removes all expired sessions and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap();
        let initial_len = sessions.len();

        sessions.retain(|_, session| !session.is_expired());

        let removed = initial_len - sessions.len();
        if removed > 0 {
            debug!(
                removed_count = removed,
                remaining_count = sessions.len(),
                "Cleaned up expired sessions"
            );
        }

        removed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.sessions.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("SessionStore")
            .field("session_count", &len)
            .field("config", &self.config)
            .finish()
    }
}

/// Generates a cryptographically secure session token.
fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
