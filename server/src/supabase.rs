//! Supabase client for the messages table and user authentication.
//!
//! This module provides a client for the two Supabase services DougChat uses:
//! - PostgREST (`/rest/v1/messages`) for reading and inserting chat messages
//! - GoTrue (`/auth/v1/*`) for sign-up, sign-in, sign-out and user lookup
//!
//! # Architecture
//!
//! The [`SupabaseClient`] is shared across the application (via `Arc`) and
//! implements both [`MessageStore`] and [`AuthProvider`]. It includes:
//! - A 5 second timeout on every request
//! - A start-up readiness probe with exponential backoff
//! - Structured error handling with [`SupabaseError`]
//!
//! Queries and inserts are not retried: a failed request surfaces straight to
//! the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use dougchat_server::supabase::SupabaseClient;
//! use dougchat_server::store::MessageStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SupabaseClient::new(
//!         "https://your-project.supabase.co",
//!         "your-anon-key",
//!     )?;
//!
//!     client.wait_until_ready().await?;
//!
//!     for message in client.latest(Some("user-access-token"), 0, 20).await? {
//!         println!("{}: {}", message.email, message.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, AuthProvider, AuthSession, Credentials, User};
use crate::store::{MessageStore, StoreError};
use crate::types::{Message, NewMessage, MESSAGES_TABLE};

/// Default timeout for Supabase API requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of attempts for the start-up readiness probe.
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (100ms).
const BASE_BACKOFF_MS: u64 = 100;

/// Maximum delay cap for exponential backoff (10 seconds).
const MAX_BACKOFF_MS: u64 = 10_000;

/// Maximum jitter to add to backoff delay (100ms).
const MAX_JITTER_MS: u64 = 100;

/// Errors that can occur when interacting with Supabase.
///
/// The variants let callers tell user mistakes (wrong password, expired
/// token) apart from infrastructure failures (timeouts, outages).
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// The provided access token is invalid or expired.
    #[error("unauthorized: invalid or expired JWT")]
    Unauthorized,

    /// Supabase refused the request with a user-facing message, e.g.
    /// "Invalid login credentials".
    #[error("{0}")]
    Rejected(String),

    /// The request to Supabase timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Supabase is unreachable.
    #[error("supabase unavailable: {0}")]
    Unavailable(String),

    /// Failed to parse the response from Supabase.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client configuration error, such as an HTTP client that cannot be built.
    #[error("client configuration error: {0}")]
    Configuration(String),

    /// All readiness probe attempts have failed.
    #[error("all {attempts} retry attempts failed: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error encountered.
        last_error: String,
    },
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Timeout(_) | SupabaseError::Unavailable(_) => {
                StoreError::Unavailable(err.to_string())
            }
            SupabaseError::InvalidResponse(msg) => StoreError::InvalidResponse(msg),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

impl From<SupabaseError> for AuthError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Unauthorized => AuthError::Unauthorized,
            SupabaseError::Rejected(msg) => AuthError::Rejected(msg),
            other => AuthError::Unavailable(other.to_string()),
        }
    }
}

/// Response format of `/auth/v1/user`.
#[derive(Debug, Deserialize)]
struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

impl From<SupabaseUserResponse> for User {
    fn from(user: SupabaseUserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// Response format of `/auth/v1/token` and `/auth/v1/signup`.
///
/// Sign-up answers with a bare user object (no token) when the project
/// requires email confirmation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionResponse {
    Session {
        access_token: String,
        user: SupabaseUserResponse,
    },
    PendingConfirmation(SupabaseUserResponse),
}

/// Error body returned by GoTrue and PostgREST.
///
/// GoTrue has used both `msg` and `error_description` over time; PostgREST
/// uses `message`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
            .filter(|m| !m.is_empty())
    }
}

/// Client for interacting with Supabase services.
///
/// # Thread Safety
///
/// The client uses an internal `reqwest::Client` which is already
/// designed to be shared across threads. Wrap in `Arc` for sharing.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    /// The underlying HTTP client.
    http_client: Client,

    /// The base URL of the Supabase project (e.g., `https://xxx.supabase.co`).
    base_url: String,

    /// The Supabase anonymous/public key for API authentication.
    anon_key: String,
}

impl SupabaseClient {
    /// Creates a new Supabase client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The Supabase project URL (e.g., `https://xxx.supabase.co`)
    /// * `anon_key` - The Supabase anonymous/public key
    ///
    /// # Errors
    ///
    /// Returns [`SupabaseError::Configuration`] if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Result<Self, SupabaseError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let anon_key = anon_key.into();

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                SupabaseError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            http_client,
            base_url,
            anon_key,
        })
    }

    /// Returns the base URL of the Supabase project.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{MESSAGES_TABLE}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    /// Reads a page of messages, newest first.
    ///
    /// The query runs as the owner of `access_token` so row-level security
    /// sees the signed-in user. Without a token it runs as the `anon` role.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Timeout`] / [`SupabaseError::Unavailable`] on network failure
    /// - [`SupabaseError::Rejected`] if PostgREST refuses the query
    /// - [`SupabaseError::InvalidResponse`] if the rows cannot be parsed
    pub async fn select_latest(
        &self,
        access_token: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, SupabaseError> {
        let url = self.rest_url();
        debug!(url = %url, offset, limit, "Selecting latest messages");

        let request = self
            .http_client
            .get(&url)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(self.anon_key.as_str()));

        let response = self.send(request).await?;
        let response = check_status(response, "select messages").await?;

        let rows: Vec<Message> = response.json().await.map_err(|e| {
            SupabaseError::InvalidResponse(format!("failed to parse message rows: {e}"))
        })?;

        debug!(count = rows.len(), "Selected messages");
        Ok(rows)
    }

    /// Inserts one message row as the owner of `access_token` and returns the
    /// stored representation.
    ///
    /// # Errors
    ///
    /// Same as [`select_latest`](Self::select_latest).
    pub async fn insert_message(
        &self,
        access_token: Option<&str>,
        row: &NewMessage,
    ) -> Result<Vec<Message>, SupabaseError> {
        let url = self.rest_url();
        debug!(url = %url, "Inserting message");

        let request = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(self.anon_key.as_str()))
            .header("Prefer", "return=representation")
            .json(&[row]);

        let response = self.send(request).await?;
        let response = check_status(response, "insert message").await?;

        let rows: Vec<Message> = response.json().await.map_err(|e| {
            SupabaseError::InvalidResponse(format!("failed to parse inserted rows: {e}"))
        })?;

        debug!(count = rows.len(), "Inserted message");
        Ok(rows)
    }

    /// Looks up the user owning an access token via `/auth/v1/user`.
    ///
    /// This approach is simpler than local JWT validation and automatically
    /// handles token revocation.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Unauthorized`] - The token is invalid or expired
    /// - [`SupabaseError::Timeout`] - The request timed out (5 second limit)
    /// - [`SupabaseError::Unavailable`] - Supabase is unreachable
    /// - [`SupabaseError::InvalidResponse`] - Failed to parse the response
    pub async fn fetch_user(&self, access_token: &str) -> Result<User, SupabaseError> {
        let url = self.auth_url("user");
        debug!(url = %url, "Validating access token with Supabase");

        let request = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = self.send(request).await?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            debug!("Access token rejected: unauthorized");
            return Err(SupabaseError::Unauthorized);
        }

        let response = check_status(response, "fetch user").await?;
        let user: SupabaseUserResponse = response.json().await.map_err(|e| {
            SupabaseError::InvalidResponse(format!("failed to parse user response: {e}"))
        })?;

        debug!(user_id = %user.id, "Access token validated");
        Ok(user.into())
    }

    /// Signs in with email and password (`grant_type=password`).
    ///
    /// # Errors
    ///
    /// [`SupabaseError::Rejected`] carries GoTrue's message, e.g.
    /// "Invalid login credentials".
    pub async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthSession, SupabaseError> {
        let url = self.auth_url("token");
        debug!(url = %url, "Signing in with password");

        let request = self
            .http_client
            .post(&url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&credential_body(credentials));

        let response = self.send(request).await?;
        let response = check_status(response, "sign in").await?;
        parse_session(response).await
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns [`SupabaseError::Rejected`] when GoTrue refuses the sign-up,
    /// and also when the project requires email confirmation, since no
    /// session is issued in that case.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, SupabaseError> {
        let url = self.auth_url("signup");
        debug!(url = %url, "Signing up");

        let request = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&credential_body(credentials));

        let response = self.send(request).await?;
        let response = check_status(response, "sign up").await?;
        parse_session(response).await
    }

    /// Revokes a session via `/auth/v1/logout`.
    ///
    /// An already-invalid token counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), SupabaseError> {
        let url = self.auth_url("logout");
        debug!(url = %url, "Signing out");

        let request = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = self.send(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Sign-out with expired token, nothing to revoke");
            return Ok(());
        }

        check_status(response, "sign out").await?;
        Ok(())
    }

    /// Checks that the auth service answers its health endpoint.
    pub async fn health(&self) -> Result<(), SupabaseError> {
        let url = self.auth_url("health");
        let request = self.http_client.get(&url).header("apikey", &self.anon_key);
        let response = self.send(request).await?;
        check_status(response, "health check").await?;
        Ok(())
    }

    /// Probes Supabase until it answers, with exponential backoff.
    ///
    /// It will retry up to 5 times before failing, with delays calculated as:
    ///
    /// ```text
    /// delay = min(2^attempt * 100ms + random(0, 100ms), 10s)
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SupabaseError::RetriesExhausted`] if all attempts fail.
    /// The server should exit with an error if this occurs during startup.
    pub async fn wait_until_ready(&self) -> Result<(), SupabaseError> {
        let mut last_error = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self.health().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempt = attempt + 1, "Supabase reachable after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();

                    if attempt < MAX_RETRY_ATTEMPTS - 1 {
                        let delay = calculate_backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRY_ATTEMPTS,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "Supabase health check failed, retrying"
                        );
                        sleep(delay).await;
                    } else {
                        error!(
                            attempts = MAX_RETRY_ATTEMPTS,
                            error = %e,
                            "Supabase health check failed, no more retries"
                        );
                    }
                }
            }
        }

        Err(SupabaseError::RetriesExhausted {
            attempts: MAX_RETRY_ATTEMPTS,
            last_error,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SupabaseError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                SupabaseError::Timeout(REQUEST_TIMEOUT)
            } else if e.is_connect() {
                SupabaseError::Unavailable(format!("connection failed: {e}"))
            } else {
                SupabaseError::Unavailable(format!("request failed: {e}"))
            }
        })
    }
}

#[async_trait]
impl MessageStore for SupabaseClient {
    async fn latest(
        &self,
        access_token: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.select_latest(access_token, offset, limit).await?)
    }

    async fn insert(
        &self,
        access_token: Option<&str>,
        row: NewMessage,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.insert_message(access_token, &row).await?)
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        Ok(self.fetch_user(access_token).await?)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        Ok(SupabaseClient::sign_up(self, credentials).await?)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        Ok(self.sign_in_with_password(credentials).await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        Ok(SupabaseClient::sign_out(self, access_token).await?)
    }
}

fn credential_body(credentials: &Credentials) -> serde_json::Value {
    serde_json::json!({
        "email": credentials.email,
        "password": credentials.password,
    })
}

/// Maps non-success statuses to errors.
///
/// 4xx answers carrying a message become [`SupabaseError::Rejected`]; anything
/// else becomes [`SupabaseError::InvalidResponse`].
async fn check_status(response: Response, operation: &str) -> Result<Response, SupabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status.is_client_error() {
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        if let Some(message) = parsed.into_message() {
            debug!(status = %status, operation, "Supabase rejected request");
            return Err(SupabaseError::Rejected(message));
        }
    }

    error!(status = %status, operation, body = %body, "Unexpected response from Supabase");
    Err(SupabaseError::InvalidResponse(format!(
        "unexpected status {status}: {body}"
    )))
}

async fn parse_session(response: Response) -> Result<AuthSession, SupabaseError> {
    let session: SessionResponse = response.json().await.map_err(|e| {
        SupabaseError::InvalidResponse(format!("failed to parse session response: {e}"))
    })?;

    match session {
        SessionResponse::Session { access_token, user } => {
            debug!(user_id = %user.id, "Session issued");
            Ok(AuthSession {
                access_token,
                user: user.into(),
            })
        }
        SessionResponse::PendingConfirmation(user) => {
            info!(user_id = %user.id, "Sign-up pending email confirmation");
            Err(SupabaseError::Rejected(
                "Check your email to confirm your account before logging in".to_string(),
            ))
        }
    }
}

/// Calculates the backoff delay for a given retry attempt.
///
/// Uses exponential backoff with jitter:
/// `delay = min(2^attempt * 100ms + random(0, 100ms), 10s)`
fn calculate_backoff_delay(attempt: u32) -> Duration {
    let exponential_ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_ms = rand::rng().random_range(0..=MAX_JITTER_MS);
    let total_ms = exponential_ms.saturating_add(jitter_ms).min(MAX_BACKOFF_MS);
    Duration::from_millis(total_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a test client pointing to a mock server.
    fn create_test_client(mock_server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(mock_server.uri(), "test-anon-key")
            .expect("failed to create test client")
    }

    fn row(id: &str, text: &str, created_at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "email": "user@example.com",
            "message": text,
            "created_at": created_at,
        })
    }

    // ==================== SupabaseClient::new tests ====================

    #[test]
    fn new_trims_trailing_slashes_from_url() {
        let client = SupabaseClient::new("https://test.supabase.co///", "anon-key")
            .expect("should create client");
        assert_eq!(client.base_url(), "https://test.supabase.co");
        assert_eq!(client.rest_url(), "https://test.supabase.co/rest/v1/messages");
    }

    // ==================== messages table tests ====================

    #[tokio::test]
    async fn select_latest_queries_newest_first() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "20"))
            .and(query_param("offset", "40"))
            .and(header("apikey", "test-anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                row("2", "second", "2024-05-01T10:01:00+00:00"),
                row("1", "first", "2024-05-01T10:00:00+00:00"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let rows = client.select_latest(None, 40, 20).await.expect("should select");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "2");
        assert_eq!(rows[1].message, "first");
    }

    #[tokio::test]
    async fn select_latest_reports_rejection_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "42P01",
                "message": "relation \"public.messages\" does not exist"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.select_latest(None, 0, 20).await;

        assert!(matches!(result, Err(SupabaseError::Rejected(msg)) if msg.contains("does not exist")));
    }

    #[tokio::test]
    async fn select_latest_returns_invalid_response_on_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.select_latest(None, 0, 20).await;

        assert!(matches!(result, Err(SupabaseError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn insert_message_requests_representation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(serde_json::json!([
                {"message": "hello", "email": "user@example.com"}
            ])))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
                row("7", "hello", "2024-05-01T10:00:00+00:00"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let rows = client
            .insert_message(None, &NewMessage::new("  hello ", "user@example.com"))
            .await
            .expect("should insert");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "7");
        assert_eq!(rows[0].message, "hello");
    }

    #[tokio::test]
    async fn message_queries_run_as_the_signed_in_user() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(header("apikey", "test-anon-key"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                row("1", "first", "2024-05-01T10:00:00+00:00"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .and(header("apikey", "test-anon-key"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
                row("2", "hi", "2024-05-01T10:01:00+00:00"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        // Anything still authorized with the anon key is refused, as RLS would.
        Mock::given(path("/rest/v1/messages"))
            .and(header("Authorization", "Bearer test-anon-key"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "code": "42501",
                "message": "new row violates row-level security policy"
            })))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        let rows = MessageStore::latest(&client, Some("user-jwt"), 0, 20)
            .await
            .expect("should select as user");
        assert_eq!(rows[0].id, "1");

        let inserted = MessageStore::insert(
            &client,
            Some("user-jwt"),
            NewMessage::new("hi", "user@example.com"),
        )
        .await
        .expect("should insert as user");
        assert_eq!(inserted[0].id, "2");
    }

    #[tokio::test]
    async fn message_queries_fall_back_to_anon_key_without_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(header("Authorization", "Bearer test-anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let rows = client.select_latest(None, 0, 20).await.expect("should select");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn store_errors_convert_to_store_error() {
        let client =
            SupabaseClient::new("http://127.0.0.1:1", "key").expect("should create client");

        let result = MessageStore::latest(&client, None, 0, 20).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    // ==================== auth tests ====================

    #[tokio::test]
    async fn fetch_user_returns_user_on_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("apikey", "test-anon-key"))
            .and(header("Authorization", "Bearer valid-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-123",
                "email": "user@example.com"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let user = client.fetch_user("valid-jwt").await.expect("should fetch user");

        assert_eq!(user.id, "user-123");
        assert_eq!(user.email, Some("user@example.com".to_string()));
    }

    #[tokio::test]
    async fn fetch_user_returns_unauthorized_on_401() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = AuthProvider::get_user(&client, "expired").await;

        assert_eq!(result, Err(AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn sign_in_returns_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(body_json(serde_json::json!({
                "email": "user@example.com",
                "password": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "jwt-abc",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "refresh",
                "user": {"id": "user-1", "email": "user@example.com"}
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let session = client
            .sign_in_with_password(&Credentials::new("user@example.com", "secret"))
            .await
            .expect("should sign in");

        assert_eq!(session.access_token, "jwt-abc");
        assert_eq!(session.user.id, "user-1");
    }

    #[tokio::test]
    async fn sign_in_surfaces_provider_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = AuthProvider::sign_in(&client, &Credentials::new("a@b.c", "wrong")).await;

        assert_eq!(
            result,
            Err(AuthError::Rejected("Invalid login credentials".to_string()))
        );
    }

    #[tokio::test]
    async fn sign_in_surfaces_legacy_error_description() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Email not confirmed"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client
            .sign_in_with_password(&Credentials::new("a@b.c", "pw"))
            .await;

        assert!(matches!(result, Err(SupabaseError::Rejected(msg)) if msg == "Email not confirmed"));
    }

    #[tokio::test]
    async fn sign_up_pending_confirmation_is_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-9",
                "email": "new@example.com",
                "confirmation_sent_at": "2024-05-01T10:00:00Z"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client
            .sign_up(&Credentials::new("new@example.com", "password1"))
            .await;

        assert!(matches!(result, Err(SupabaseError::Rejected(_))));
    }

    #[tokio::test]
    async fn sign_up_returns_session_when_autoconfirmed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "jwt-new",
                "user": {"id": "user-9", "email": "new@example.com"}
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let session = client
            .sign_up(&Credentials::new("new@example.com", "password1"))
            .await
            .expect("should sign up");

        assert_eq!(session.access_token, "jwt-new");
        assert_eq!(session.user.email.as_deref(), Some("new@example.com"));
    }

    #[tokio::test]
    async fn sign_out_treats_expired_token_as_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.sign_out("expired").await.is_ok());
    }

    // ==================== readiness tests ====================

    #[tokio::test]
    async fn wait_until_ready_succeeds_after_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.wait_until_ready().await.is_ok());
    }

    #[tokio::test]
    async fn wait_until_ready_returns_error_after_max_attempts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/health"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Server Error"))
            .expect(5)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.wait_until_ready().await;

        assert!(matches!(
            result,
            Err(SupabaseError::RetriesExhausted { attempts: 5, .. })
        ));
    }

    // ==================== calculate_backoff_delay tests ====================

    #[test]
    fn calculate_backoff_delay_is_capped_at_max() {
        let delay = calculate_backoff_delay(100);
        assert!(delay.as_millis() <= MAX_BACKOFF_MS as u128 + MAX_JITTER_MS as u128);
    }

    #[test]
    fn calculate_backoff_delay_grows_with_attempt() {
        let first = calculate_backoff_delay(0).as_millis();
        let fourth = calculate_backoff_delay(3).as_millis();
        // 100..=200ms versus 800..=900ms
        assert!(first <= 200);
        assert!(fourth >= 800);
    }

    // ==================== error conversion tests ====================

    #[test]
    fn supabase_error_converts_to_auth_error() {
        assert_eq!(
            AuthError::from(SupabaseError::Unauthorized),
            AuthError::Unauthorized
        );
        assert!(matches!(
            AuthError::from(SupabaseError::Timeout(Duration::from_secs(5))),
            AuthError::Unavailable(_)
        ));
    }

    #[test]
    fn supabase_error_timeout_display() {
        let err = SupabaseError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "request timed out after 5s");
    }
}
