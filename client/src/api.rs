//! HTTP client for the DougChat server API.
//!
//! Every request carries the persisted access token as a bearer token when
//! one is available. Redirects are never followed: the server answers a
//! signed-out request for a protected route with `307 → /auth`, which this
//! client reports as [`ApiError::NotAuthenticated`].

use std::time::Duration;

use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::types::{AuthSession, Credentials, ErrorBody, Message, User};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors returned by [`ChatApi`].
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No valid session; sign in first.
    #[error("not signed in")]
    NotAuthenticated,

    /// The server rejected the request with a message meant for the user.
    #[error("{0}")]
    Rejected(String),

    /// Server returned an error status.
    #[error("server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    message: &'a str,
    email: &'a str,
}

/// Client for the chat and auth endpoints of one server.
#[derive(Clone)]
pub struct ChatApi {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for ChatApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApi")
            .field("base_url", &self.base_url)
            .field("signed_in", &self.access_token.is_some())
            .finish()
    }
}

impl ChatApi {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Fetches one page of messages in ascending order.
    ///
    /// `offset` 0 is the newest page; larger offsets walk back in time.
    pub async fn fetch_page(&self, offset: usize) -> Result<Vec<Message>, ApiError> {
        let request = self
            .authorized(self.client.get(self.url("/api/messages")))
            .query(&[("offset", offset)]);
        let response = check(request.send().await?).await?;
        let messages: Vec<Message> = response.json().await?;
        debug!(offset, count = messages.len(), "Fetched message page");
        Ok(messages)
    }

    /// Sends a message and returns the inserted row(s).
    pub async fn create_message(&self, message: &str, email: &str) -> Result<Vec<Message>, ApiError> {
        let request = self
            .authorized(self.client.post(self.url("/api/messages")))
            .json(&SendMessageBody { message, email });
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Returns the signed-in user, or `None` when there is no valid session.
    pub async fn current_user(&self) -> Result<Option<User>, ApiError> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let request = self.authorized(self.client.get(self.url("/api/user")));
        match check(request.send().await?).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ApiError::NotAuthenticated) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Signs in with email and password.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, ApiError> {
        self.authenticate("/auth/login", credentials).await
    }

    /// Creates an account and signs it in.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, ApiError> {
        self.authenticate("/auth/register", credentials).await
    }

    /// Ends the current session on the server.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let request = self.authorized(self.client.post(self.url("/logout")));
        check(request.send().await?).await?;
        Ok(())
    }

    async fn authenticate(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<AuthSession, ApiError> {
        let request = self.client.post(self.url(path)).json(credentials);
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Maps non-success statuses to [`ApiError`].
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status.is_redirection() {
        return Err(ApiError::NotAuthenticated);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error)
        .unwrap_or(body);

    if status == StatusCode::BAD_REQUEST {
        Err(ApiError::Rejected(message))
    } else {
        Err(ApiError::ServerError {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row(id: &str, text: &str) -> serde_json::Value {
        json!({
            "id": id,
            "email": "ann@example.com",
            "message": text,
            "created_at": "2024-05-01T12:30:00Z"
        })
    }

    #[tokio::test]
    async fn fetch_page_sends_offset_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages"))
            .and(query_param("offset", "20"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row("1", "a"), row("2", "b")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("tok-1".to_string())).unwrap();
        let messages = api.fetch_page(20).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "1");
        assert_eq!(messages[1].message, "b");
    }

    #[tokio::test]
    async fn redirect_to_auth_means_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "/auth"))
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), None).unwrap();
        let err = api.fetch_page(0).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
    }

    #[tokio::test]
    async fn server_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "Error fetching messages"})),
            )
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("tok".to_string())).unwrap();
        match api.fetch_page(0).await.unwrap_err() {
            ApiError::ServerError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Error fetching messages");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_message_posts_text_and_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages"))
            .and(body_json(json!({"message": "hello", "email": "ann@example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row("7", "hello")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("tok".to_string())).unwrap();
        let inserted = api.create_message("hello", "ann@example.com").await.unwrap();
        assert_eq!(inserted[0].id, "7");
    }

    #[tokio::test]
    async fn current_user_without_token_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), None).unwrap();
        assert_eq!(api.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn current_user_maps_unauthorized_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Not authenticated"})))
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("stale".to_string())).unwrap();
        assert_eq!(api.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn current_user_returns_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "email": "ann@example.com"})),
            )
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("tok".to_string())).unwrap();
        let user = api.current_user().await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("ann@example.com"));
    }

    #[tokio::test]
    async fn sign_in_rejection_message_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "ann@example.com", "password": "wrong"})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "Invalid login credentials"})),
            )
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), None).unwrap();
        let err = api
            .sign_in(&Credentials::new("ann@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn sign_up_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "user": {"id": "u9", "email": "new@example.com"}
            })))
            .mount(&server)
            .await;

        let api = ChatApi::new(format!("{}/", server.uri()), None).unwrap();
        let session = api
            .sign_up(&Credentials::new("new@example.com", "password1"))
            .await
            .unwrap();
        assert_eq!(session.access_token, "new-token");
        assert_eq!(session.user.id, "u9");
    }

    #[tokio::test]
    async fn sign_out_posts_to_logout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = ChatApi::new(server.uri(), Some("tok".to_string())).unwrap();
        tokio_test::assert_ok!(api.sign_out().await);
    }
}
