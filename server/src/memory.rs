//! In-memory message store and auth provider for local development.
//!
//! [`MemoryBackend`] stands in for Supabase when the server runs with
//! `DOUGCHAT_UNSAFE_MEMORY_BACKEND=true`. Nothing survives a restart.
//! Passwords are hashed with Argon2 and sessions live in a [`SessionStore`].
//!
//! Error messages mirror the ones Supabase returns so that the forms behave
//! the same against either backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth::{AuthError, AuthProvider, AuthSession, Credentials, User};
use crate::session::{SessionStore, SessionStoreConfig};
use crate::store::{MessageStore, StoreError};
use crate::types::{Message, NewMessage};

/// Minimum password length accepted on sign-up.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Salt size in bytes for password hashes.
const SALT_BYTES: usize = 16;

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password_hash: String,
}

/// Process-local implementation of [`MessageStore`] and [`AuthProvider`].
#[derive(Debug)]
pub struct MemoryBackend {
    messages: RwLock<Vec<Message>>,
    accounts: RwLock<HashMap<String, Account>>,
    sessions: Arc<SessionStore>,
}

impl MemoryBackend {
    /// Creates an empty backend with default session settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_session_config(SessionStoreConfig::default())
    }

    /// Creates an empty backend with custom session settings.
    #[must_use]
    pub fn with_session_config(config: SessionStoreConfig) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            accounts: RwLock::new(HashMap::new()),
            sessions: Arc::new(SessionStore::new(config)),
        }
    }

    /// Number of stored messages.
    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Periodically drops expired sessions.
    pub fn spawn_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sessions.cleanup_expired();
            }
        })
    }

    fn issue_session(&self, user: User) -> Result<AuthSession, AuthError> {
        let access_token = self.sessions.create_session(user.clone()).map_err(|e| {
            error!(error = %e, "Failed to create session");
            AuthError::Unavailable(e.to_string())
        })?;
        Ok(AuthSession { access_token, user })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn latest(
        &self,
        _access_token: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().unwrap();
        Ok(messages.iter().rev().skip(offset).take(limit).cloned().collect())
    }

    async fn insert(
        &self,
        _access_token: Option<&str>,
        row: NewMessage,
    ) -> Result<Vec<Message>, StoreError> {
        let mut messages = self.messages.write().unwrap();

        // Keep created_at strictly increasing so insertion order is the display order.
        let mut created_at = Utc::now();
        if let Some(last) = messages.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + ChronoDuration::microseconds(1);
            }
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            email: row.email,
            message: row.message,
            created_at,
        };
        messages.push(message.clone());

        debug!(message_id = %message.id, "Stored message in memory");
        Ok(vec![message])
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        self.sessions
            .validate_session(access_token)
            .ok_or(AuthError::Unauthorized)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let email = normalize_email(&credentials.email)?;
        if credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Rejected(format!(
                "Password should be at least {MIN_PASSWORD_LENGTH} characters."
            )));
        }

        if self.accounts.read().unwrap().contains_key(&email) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }

        let password_hash = hash_password(credentials.password.clone()).await?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: Some(email.clone()),
        };

        {
            let mut accounts = self.accounts.write().unwrap();
            // A concurrent sign-up may have won the race while hashing.
            if accounts.contains_key(&email) {
                return Err(AuthError::Rejected("User already registered".to_string()));
            }
            accounts.insert(
                email,
                Account {
                    user: user.clone(),
                    password_hash,
                },
            );
        }

        info!(user_id = %user.id, "Registered in-memory account");
        self.issue_session(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let invalid = || AuthError::Rejected("Invalid login credentials".to_string());

        let email = normalize_email(&credentials.email).map_err(|_| invalid())?;
        let account = self
            .accounts
            .read()
            .unwrap()
            .get(&email)
            .cloned()
            .ok_or_else(invalid)?;

        if !verify_password(credentials.password.clone(), account.password_hash).await? {
            debug!(user_id = %account.user.id, "Password mismatch");
            return Err(invalid());
        }

        self.issue_session(account.user)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.sessions.remove_session(access_token);
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::Rejected(
            "Unable to validate email address: invalid format".to_string(),
        )),
    }
}

async fn hash_password(plain: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let mut salt_bytes = [0u8; SALT_BYTES];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Unavailable(format!("failed to encode salt: {e}")))?;

        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AuthError::Unavailable(e.to_string())
            })
    })
    .await
    .map_err(|e| AuthError::Unavailable(format!("password hashing task failed: {e}")))?
}

async fn verify_password(plain: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            AuthError::Unavailable(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::Unavailable(format!("password verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_returns_newest_first_with_offset() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend
                .insert(None, NewMessage::new(&format!("msg {i}"), "a@example.com"))
                .await
                .unwrap();
        }

        let page = backend.latest(None, 1, 2).await.unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["msg 3", "msg 2"]);
    }

    #[tokio::test]
    async fn insert_assigns_increasing_timestamps() {
        let backend = MemoryBackend::new();
        let first = backend.insert(None, NewMessage::new("a", "x@y.z")).await.unwrap();
        let second = backend.insert(None, NewMessage::new("b", "x@y.z")).await.unwrap();

        assert!(second[0].created_at > first[0].created_at);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(backend.message_count(), 2);
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let backend = MemoryBackend::new();
        let credentials = Credentials::new("Alice@Example.com", "password1");

        let registered = backend.sign_up(&credentials).await.expect("should sign up");
        assert_eq!(registered.user.email.as_deref(), Some("alice@example.com"));

        let session = backend.sign_in(&credentials).await.expect("should sign in");
        assert_eq!(session.user, registered.user);

        let user = backend.get_user(&session.access_token).await.unwrap();
        assert_eq!(user.id, registered.user.id);
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicate_email() {
        let backend = MemoryBackend::new();
        let credentials = Credentials::new("bob@example.com", "password1");
        backend.sign_up(&credentials).await.unwrap();

        let result = backend.sign_up(&credentials).await;
        assert_eq!(
            result,
            Err(AuthError::Rejected("User already registered".to_string()))
        );
    }

    #[tokio::test]
    async fn sign_up_rejects_short_password() {
        let backend = MemoryBackend::new();
        let result = backend.sign_up(&Credentials::new("c@example.com", "123")).await;
        assert!(matches!(result, Err(AuthError::Rejected(msg)) if msg.contains("at least 6")));
    }

    #[tokio::test]
    async fn sign_in_rejects_wrong_password() {
        let backend = MemoryBackend::new();
        backend
            .sign_up(&Credentials::new("d@example.com", "password1"))
            .await
            .unwrap();

        let result = backend
            .sign_in(&Credentials::new("d@example.com", "password2"))
            .await;
        assert_eq!(
            result,
            Err(AuthError::Rejected("Invalid login credentials".to_string()))
        );
    }

    #[tokio::test]
    async fn sign_out_invalidates_token() {
        let backend = MemoryBackend::new();
        let session = backend
            .sign_up(&Credentials::new("e@example.com", "password1"))
            .await
            .unwrap();

        backend.sign_out(&session.access_token).await.unwrap();

        assert_eq!(
            backend.get_user(&session.access_token).await,
            Err(AuthError::Unauthorized)
        );
    }
}
