//! Route gating between the auth page and the chat.
//!
//! Every request that is not a static asset resolves the current session
//! through the [`AuthProvider`](crate::auth::AuthProvider):
//!
//! - signed in and under `/auth` → `307` to `/`
//! - signed out and under a protected prefix → `307` to `/auth`
//! - anything else passes through
//!
//! A resolved [`User`](crate::auth::User) is stored in the request extensions
//! for the handlers downstream.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::debug;

use crate::auth::resolve_user;
use crate::routes::AppState;

/// Path prefixes that require a session.
pub const PROTECTED_PREFIXES: &[&str] = &["/"];

/// Where signed-out users are sent.
pub const AUTH_PATH: &str = "/auth";

/// Where signed-in users are sent.
pub const HOME_PATH: &str = "/";

const EXCLUDED_PREFIXES: &[&str] = &["/static/", "/_next/static", "/_next/image"];
// `/api/user` and `/logout` answer for themselves (401 / idempotent 204).
const EXCLUDED_PATHS: &[&str] = &["/favicon.ico", "/health", "/api/user", "/logout"];
const EXCLUDED_EXTENSIONS: &[&str] = &[".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"];

/// Outcome of the gate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(&'static str),
}

/// Returns true for static assets and probes that skip the session lookup.
#[must_use]
pub fn is_excluded(path: &str) -> bool {
    EXCLUDED_PATHS.contains(&path)
        || EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p))
        || EXCLUDED_EXTENSIONS
            .iter()
            .any(|ext| path.to_ascii_lowercase().ends_with(ext))
}

/// Returns true if `path` is `/auth` or below it.
#[must_use]
pub fn is_auth_path(path: &str) -> bool {
    path == AUTH_PATH || path.starts_with("/auth/")
}

/// Returns true if `path` needs a session. The auth pages never do.
#[must_use]
pub fn is_protected(path: &str) -> bool {
    !is_auth_path(path) && PROTECTED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Decides what to do with a non-excluded request.
#[must_use]
pub fn decide(path: &str, has_session: bool) -> GateDecision {
    if has_session && is_auth_path(path) {
        GateDecision::Redirect(HOME_PATH)
    } else if !has_session && is_protected(path) {
        GateDecision::Redirect(AUTH_PATH)
    } else {
        GateDecision::Pass
    }
}

/// Axum middleware applying [`decide`] to every request.
pub async fn gate_routes(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_excluded(&path) {
        return next.run(req).await;
    }

    let user = resolve_user(state.auth.as_ref(), req.headers()).await;

    match decide(&path, user.is_some()) {
        GateDecision::Redirect(target) => {
            debug!(path = %path, target, "Redirecting request");
            Redirect::temporary(target).into_response()
        }
        GateDecision::Pass => {
            if let Some(user) = user {
                req.extensions_mut().insert(user);
            }
            next.run(req).await
        }
    }
}
