//! Privacy tests for credentials and session tokens in logs.
//!
//! Access tokens and passwords must never appear in log output, even at
//! TRACE level.
//!
//! # Test Approach
//!
//! 1. Use a custom tracing subscriber Layer to capture all log messages
//! 2. Exercise the session store, Supabase client and HTTP handlers
//! 3. Verify that the sensitive values do NOT appear in captured logs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dougchat_server::auth::{AuthProvider, Credentials, User};
use dougchat_server::config::Config;
use dougchat_server::memory::MemoryBackend;
use dougchat_server::routes::{create_router, AppState};
use dougchat_server::session::{SessionStore, SessionStoreConfig};
use dougchat_server::supabase::SupabaseClient;

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// A buffer for capturing log output during tests.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that captures log events for inspection.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);

        let message = format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        );

        self.capture.logs.lock().unwrap().push(message);
    }
}

/// A visitor that collects all event fields into a string.
#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

/// Runs a test closure with log capture at TRACE level.
fn with_log_capture<F>(test_fn: F) -> String
where
    F: FnOnce(),
{
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    tracing::subscriber::with_default(subscriber, test_fn);

    capture.get_logs()
}

/// Async version of [`with_log_capture`].
///
/// Uses a current-thread runtime so the default subscriber covers every
/// spawned task.
async fn with_log_capture_async<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;

    capture.get_logs()
}

fn assert_not_in_logs(logs: &str, value: &str, value_name: &str, context: &str) {
    assert!(
        !logs.contains(value),
        "{value_name} found in logs during {context}!\nValue: {value}\nLogs:\n{logs}"
    );
}

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
    }
}

const TEST_JWT: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
    eyJzdWIiOiIxMjM0NTY3ODkwIiwibmFtZSI6IkpvaG4gRG9lIiwiaWF0IjoxNTE2MjM5MDIyfQ.\
    SflKxwRJSMeKKF2QT4fwpMeJf36POk6yJV_adQssw5c";

// ============================================================================
// Session store
// ============================================================================

#[test]
fn session_token_not_logged_on_create_validate_remove() {
    let store = SessionStore::new(SessionStoreConfig::default());
    let mut token = String::new();

    let logs = with_log_capture(|| {
        token = store.create_session(user("alice")).expect("should create session");
        assert!(store.validate_session(&token).is_some());
        assert!(store.remove_session(&token));
    });

    assert!(!logs.is_empty(), "expected some trace output");
    assert_not_in_logs(&logs, &token, "session token", "session lifecycle");
}

#[test]
fn session_token_not_logged_on_expiry() {
    let store = SessionStore::new(SessionStoreConfig::new(10, Duration::from_millis(5)));
    let token = store.create_session(user("bob")).unwrap();
    std::thread::sleep(Duration::from_millis(15));

    let logs = with_log_capture(|| {
        assert!(store.validate_session(&token).is_none());
        store.cleanup_expired();
    });

    assert_not_in_logs(&logs, &token, "session token", "session expiry");
}

#[test]
fn session_store_debug_does_not_leak_tokens() {
    let store = SessionStore::default();
    let token = store.create_session(user("carol")).unwrap();

    let debug = format!("{store:?}");
    assert!(!debug.contains(&token));
    assert!(debug.contains("session_count"));
}

// ============================================================================
// Supabase client
// ============================================================================

#[tokio::test]
async fn jwt_not_logged_on_user_lookup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "user-abc123",
            "email": "jwt-user@example.com"
        })))
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::new(mock_server.uri(), "test-anon-key").unwrap();

    let logs = with_log_capture_async(|| async {
        assert!(client.fetch_user(TEST_JWT).await.is_ok());
    })
    .await;

    assert_not_in_logs(&logs, "eyJ", "JWT prefix", "user lookup");
}

#[tokio::test]
async fn jwt_not_logged_on_rejection_or_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::new(mock_server.uri(), "test-anon-key").unwrap();

    let logs = with_log_capture_async(|| async {
        assert!(client.fetch_user(TEST_JWT).await.is_err());
    })
    .await;

    assert_not_in_logs(&logs, TEST_JWT, "JWT", "server error during user lookup");
}

#[tokio::test]
async fn password_not_logged_on_failed_sign_in() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::new(mock_server.uri(), "test-anon-key").unwrap();
    let credentials = Credentials::new("dan@example.com", "correct-horse-battery");

    let logs = with_log_capture_async(|| async {
        let err = client.sign_in_with_password(&credentials).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    })
    .await;

    assert_not_in_logs(&logs, "correct-horse-battery", "password", "failed sign-in");
}

// ============================================================================
// HTTP handlers
// ============================================================================

#[tokio::test]
async fn login_flow_does_not_leak_password_or_token() {
    let backend = Arc::new(MemoryBackend::new());
    let registered = backend
        .sign_up(&Credentials::new("erin@example.com", "s3cret-passphrase"))
        .await
        .unwrap();
    let state = AppState::from_backend(Config::in_memory(), backend).unwrap();
    let app = create_router(state);

    let logs = with_log_capture_async(|| async {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"erin@example.com","password":"s3cret-passphrase"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/messages")
                    .header(
                        header::COOKIE,
                        format!("dougchat-session={}", registered.access_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    })
    .await;

    assert_not_in_logs(&logs, "s3cret-passphrase", "password", "login flow");
    assert_not_in_logs(&logs, &registered.access_token, "session token", "login flow");
}
