//! Authentication provider abstraction and session token extraction.
//!
//! Credentials and sessions are owned by an external auth provider. The server
//! never checks a password itself; it forwards credentials through
//! [`AuthProvider`] and only ever reads back the user's id and email.
//!
//! # Session tokens
//!
//! A session is identified by the provider's access token. Browsers carry it
//! in the `HttpOnly` cookie [`SESSION_COOKIE`]; the terminal client sends it
//! as `Authorization: Bearer <token>`. The cookie wins when both are present.

use std::fmt;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the cookie carrying the access token.
pub const SESSION_COOKIE: &str = "dougchat-session";

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider-assigned user id.
    pub id: String,

    /// The user's email address, if the provider has one.
    pub email: Option<String>,
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: User,
}

/// Email/password pair submitted by the login and register forms.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Errors returned by an auth provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The provider refused the request. The message is shown to the user as is.
    #[error("{0}")]
    Rejected(String),

    /// The access token is missing, invalid or expired.
    #[error("invalid or expired session")]
    Unauthorized,

    /// The provider could not be reached.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

/// Sign-in, sign-up, sign-out and current-user lookup.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolves the user owning `access_token`.
    async fn get_user(&self, access_token: &str) -> Result<User, AuthError>;

    /// Creates an account and signs it in.
    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    /// Signs in with email and password.
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    /// Revokes the session identified by `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

/// Reads the access token from the session cookie or the bearer header.
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Resolves the current user for a request, if any.
///
/// An invalid token and an unreachable provider both count as "no session";
/// the latter is logged so that outages are visible.
pub async fn resolve_user(provider: &dyn AuthProvider, headers: &HeaderMap) -> Option<User> {
    let token = extract_access_token(headers)?;

    match provider.get_user(&token).await {
        Ok(user) => Some(user),
        Err(AuthError::Unauthorized) => {
            debug!("Session token rejected by auth provider");
            None
        }
        Err(err) => {
            warn!(error = %err, "Failed to resolve session, treating request as anonymous");
            None
        }
    }
}
