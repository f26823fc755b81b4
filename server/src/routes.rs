//! HTTP route handlers for the DougChat server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /` - Chat page
//! - `GET /auth` - Login / registration page
//! - `GET /api/messages` - Latest page of messages, ascending
//! - `POST /api/messages` - Insert a message and publish it
//! - `POST /auth/login`, `POST /auth/register` - Start a session
//! - `POST /logout` - End the session
//! - `GET /api/user` - Current user
//! - `GET /realtime/{channel}` - WebSocket subscription to insert events
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration
//! - The message store and auth provider (Supabase or in-memory)
//! - The realtime channel fed by successful inserts
//! - Compiled page templates
//! - Server start time for uptime reporting
//!
//! Every route sits behind [`gate_routes`], which redirects between `/auth`
//! and `/` and hands the resolved user to the handlers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dougchat_server::config::Config;
//! use dougchat_server::memory::MemoryBackend;
//! use dougchat_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let state = AppState::from_backend(Config::in_memory(), backend).unwrap();
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket},
        DefaultBodyLimit, Path, Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{
    extract_access_token, resolve_user, AuthProvider, AuthSession, Credentials, User,
    SESSION_COOKIE,
};
use crate::config::Config;
use crate::error::{ApiError, ErrorResponse};
use crate::middleware::gate_routes;
use crate::pages::{AuthMode, Pages};
use crate::realtime::{ChangeFilter, RealtimeChannel, MESSAGES_CHANNEL};
use crate::store::{fetch_page, MessageStore};
use crate::types::{ChangeEvent, ChangeKind, Message, NewMessage};

// ============================================================================
// Constants
// ============================================================================

/// Maximum body size for message and auth requests (64 KB).
const MAX_BODY_SIZE: usize = 64 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Where messages are read from and inserted into.
    pub store: Arc<dyn MessageStore>,

    /// Sign-in, sign-up and session lookup.
    pub auth: Arc<dyn AuthProvider>,

    /// Insert notifications for WebSocket subscribers.
    pub realtime: RealtimeChannel,

    /// Compiled HTML templates.
    pub pages: Arc<Pages>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from separate store and auth implementations.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] if the bundled templates fail to compile.
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            config: Arc::new(config),
            store,
            auth,
            realtime: RealtimeChannel::new(),
            pages: Arc::new(Pages::new()?),
            start_time: Instant::now(),
        })
    }

    /// Creates application state from one backend serving both roles.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] if the bundled templates fail to compile.
    pub fn from_backend<B>(config: Config, backend: Arc<B>) -> Result<Self, minijinja::Error>
    where
        B: MessageStore + AuthProvider + 'static,
    {
        let store: Arc<dyn MessageStore> = backend.clone();
        let auth: Arc<dyn AuthProvider> = backend;
        Self::new(config, store, auth)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("realtime", &self.realtime)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes and the route gate.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_chat_page))
        .route("/auth", get(get_auth_page))
        .route("/api/messages", get(get_messages).post(post_message))
        .route("/auth/login", post(post_login))
        .route("/auth/register", post(post_register))
        .route("/logout", post(post_logout))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/api/user", get(get_user))
        .route("/realtime/{channel}", get(get_realtime))
        .route("/health", get(get_health))
        .layer(middleware::from_fn_with_state(state.clone(), gate_routes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Pages
// ============================================================================

/// GET / - Chat page with the latest messages rendered server-side.
///
/// A store failure renders an empty list; the page script can still receive
/// realtime inserts.
async fn get_chat_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<User>>,
) -> Result<Html<String>, ApiError> {
    let token = extract_access_token(&headers);
    let messages = match fetch_page(state.store.as_ref(), token.as_deref(), 0).await {
        Ok(messages) => messages,
        Err(err) => {
            error!(error = %err, "Failed to load messages for chat page");
            Vec::new()
        }
    };

    let email = user.as_ref().and_then(|Extension(u)| u.email.as_deref());
    state
        .pages
        .render_chat(email, &messages)
        .map(Html)
        .map_err(|err| {
            error!(error = %err, "Failed to render chat page");
            ApiError::Internal
        })
}

/// Query parameters for the auth page.
#[derive(Debug, Default, Deserialize)]
pub struct AuthPageQuery {
    /// `login` or `register` (default).
    pub mode: Option<AuthMode>,
}

/// GET /auth - Registration form, or the login form with `?mode=login`.
async fn get_auth_page(
    State(state): State<AppState>,
    Query(query): Query<AuthPageQuery>,
) -> Result<Html<String>, ApiError> {
    state
        .pages
        .render_auth(query.mode.unwrap_or_default())
        .map(Html)
        .map_err(|err| {
            error!(error = %err, "Failed to render auth page");
            ApiError::Internal
        })
}

// ============================================================================
// /api/messages
// ============================================================================

/// Query parameters for the message list.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Number of most recent rows to skip.
    pub offset: Option<usize>,
}

/// GET /api/messages - Up to 20 messages in ascending `created_at` order.
///
/// # Responses
///
/// - `200 OK` - JSON array of messages
/// - `500 Internal Server Error` - `{"error":"Error fetching messages"}`
async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let offset = query.offset.unwrap_or(0);
    let token = extract_access_token(&headers);

    match fetch_page(state.store.as_ref(), token.as_deref(), offset).await {
        Ok(messages) => {
            debug!(offset, count = messages.len(), "Fetched messages");
            Ok(Json(messages))
        }
        Err(err) => {
            error!(offset, error = %err, "Error fetching messages");
            Err(ApiError::FetchMessages)
        }
    }
}

/// Request body for `POST /api/messages`.
#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    message: String,
    #[serde(default)]
    email: Option<String>,
}

/// POST /api/messages - Insert one message.
///
/// The sender is the session user unless `DOUGCHAT_TRUST_CLIENT_EMAIL` is
/// set, in which case the body `email` is stored as given.
///
/// # Responses
///
/// - `200 OK` - JSON array with the inserted row
/// - `400 Bad Request` - message empty after trimming
/// - `500 Internal Server Error` - `{"error":"Error creating message"}`
async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<User>>,
    body: Bytes,
) -> Result<Json<Vec<Message>>, ApiError> {
    let request: SendMessageRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "Failed to parse message body");
        ApiError::CreateMessage
    })?;

    let session_email = user.and_then(|Extension(u)| u.email);
    let email = sender_email(
        state.config.trust_client_email,
        session_email,
        request.email,
    )?;

    let row = NewMessage::new(&request.message, email);
    if row.is_empty() {
        debug!("Rejected empty message");
        return Err(ApiError::EmptyMessage);
    }

    let token = extract_access_token(&headers);
    let inserted = state
        .store
        .insert(token.as_deref(), row)
        .await
        .map_err(|err| {
            error!(error = %err, "Error creating message");
            ApiError::CreateMessage
        })?;

    for message in &inserted {
        let receivers = state.realtime.publish(ChangeEvent::insert(message));
        trace!(message_id = %message.id, receivers, "Published insert");
    }

    info!(count = inserted.len(), "Message created");
    Ok(Json(inserted))
}

/// Picks the email stored with a new message.
fn sender_email(
    trust_client: bool,
    session_email: Option<String>,
    body_email: Option<String>,
) -> Result<String, ApiError> {
    if trust_client {
        return body_email
            .or(session_email)
            .ok_or(ApiError::CreateMessage);
    }

    let Some(session_email) = session_email else {
        warn!("Message submitted without a session email");
        return Err(ApiError::NotAuthenticated);
    };

    if let Some(body_email) = body_email {
        if body_email != session_email {
            warn!("Body email does not match session, using session email");
        }
    }

    Ok(session_email)
}

// ============================================================================
// Auth endpoints
// ============================================================================

/// POST /auth/login - Sign in with email and password.
async fn post_login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<AuthSession>), ApiError> {
    let credentials = parse_credentials(&body)?;
    let session = state.auth.sign_in(&credentials).await.map_err(|err| {
        debug!(error = %err, "Sign-in failed");
        ApiError::from(err)
    })?;

    info!(user_id = %session.user.id, "User signed in");
    Ok(start_session(&state, jar, session))
}

/// POST /auth/register - Create an account and sign it in.
async fn post_register(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<AuthSession>), ApiError> {
    let credentials = parse_credentials(&body)?;
    let session = state.auth.sign_up(&credentials).await.map_err(|err| {
        debug!(error = %err, "Sign-up failed");
        ApiError::from(err)
    })?;

    info!(user_id = %session.user.id, "User registered");
    Ok(start_session(&state, jar, session))
}

/// POST /logout - Revoke the session and clear the cookie. Always 204.
async fn post_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(token) = extract_access_token(&headers) {
        if let Err(err) = state.auth.sign_out(&token).await {
            warn!(error = %err, "Sign-out failed, clearing cookie anyway");
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

/// GET /api/user - The signed-in user, or 401.
async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    resolve_user(state.auth.as_ref(), &headers)
        .await
        .map(Json)
        .ok_or(ApiError::NotAuthenticated)
}

fn parse_credentials(body: &[u8]) -> Result<Credentials, ApiError> {
    let credentials: Credentials = serde_json::from_slice(body).map_err(|err| {
        debug!(error = %err, "Failed to parse credentials");
        ApiError::AuthRejected("Email and password are required".to_string())
    })?;

    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::AuthRejected(
            "Email and password are required".to_string(),
        ));
    }

    Ok(credentials)
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    session: AuthSession,
) -> (CookieJar, Json<AuthSession>) {
    let cookie = Cookie::build((SESSION_COOKIE, session.access_token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(state.config.secure_cookies)
        .build();

    (jar.add(cookie), Json(session))
}

// ============================================================================
// GET /realtime/{channel} - WebSocket Subscription
// ============================================================================

/// Query parameters for a realtime subscription.
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQuery {
    /// Only this kind of change (`INSERT`).
    pub event: Option<ChangeKind>,

    /// Only changes in this schema.
    pub schema: Option<String>,

    /// Only changes to this table.
    pub table: Option<String>,
}

impl RealtimeQuery {
    /// Builds a [`ChangeFilter`] from the query parameters.
    fn to_filter(&self) -> ChangeFilter {
        let mut filter = ChangeFilter::new();

        if let Some(kind) = self.event {
            filter = filter.with_event(kind);
        }

        if let Some(ref schema) = self.schema {
            filter = filter.with_schema(schema.clone());
        }

        if let Some(ref table) = self.table {
            filter = filter.with_table(table.clone());
        }

        filter
    }
}

/// GET /realtime/{channel} - WebSocket subscription to insert events.
///
/// Only the `messages` channel exists; any other name is a 404.
///
/// # WebSocket Protocol
///
/// Once connected, the server sends each matching [`ChangeEvent`] as a JSON
/// text frame. Frames from the client other than close are ignored.
async fn get_realtime(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<RealtimeQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if channel != MESSAGES_CHANNEL {
        debug!(channel = %channel, "Unknown realtime channel");
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("unknown channel: {channel}"))),
        )
            .into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let filter = query.to_filter();
    info!(filter = ?filter, "Realtime client connecting");

    ws.on_upgrade(move |socket| handle_realtime_socket(socket, state.realtime, filter))
}

/// Relays matching change events to one WebSocket client until it leaves.
async fn handle_realtime_socket(
    socket: WebSocket,
    realtime: RealtimeChannel,
    filter: ChangeFilter,
) {
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = realtime.subscribe();

    info!("Realtime client connected");

    let forward_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if !filter.matches(&event) {
                        continue;
                    }

                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if let Err(err) = sender.send(WsMessage::Text(json.into())).await {
                                debug!(error = %err, "Failed to send change event");
                                break;
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "Failed to serialize change event");
                        }
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Realtime client lagged, skipped events");
                }
                Err(RecvError::Closed) => {
                    debug!("Realtime channel closed");
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(WsMessage::Close(_)) => {
                debug!("Realtime client sent close frame");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "Realtime socket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!("Realtime client disconnected");
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of open realtime subscriptions.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint. Not gated.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.realtime.subscriber_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
