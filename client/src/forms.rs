//! Login and registration forms.
//!
//! [`AuthForm`] holds the field values and inline error of the auth page and
//! toggles between its two modes. It starts on registration.

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use crate::api::{ApiError, ChatApi};
use crate::types::{AuthSession, Credentials};

/// Shown when either field is left empty.
pub const REQUIRED_FIELDS_MESSAGE: &str = "Email and password are required";

/// Which form is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    Login,
    #[default]
    Register,
}

impl AuthMode {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Login => "Log in to your account",
            Self::Register => "Create a new account",
        }
    }

    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Login => "Don't have an account?",
            Self::Register => "Already have an account?",
        }
    }

    #[must_use]
    pub fn toggle_label(self) -> &'static str {
        match self {
            Self::Login => "Create an account",
            Self::Register => "Log in",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Login => Self::Register,
            Self::Register => Self::Login,
        }
    }
}

/// Sign-in and sign-up calls the forms depend on.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, ApiError>;
    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, ApiError>;
}

#[async_trait]
impl AuthBackend for ChatApi {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, ApiError> {
        ChatApi::sign_in(self, credentials).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, ApiError> {
        ChatApi::sign_up(self, credentials).await
    }
}

/// Result of submitting the form.
#[derive(Debug)]
pub enum FormOutcome {
    /// Signed in; continue to the chat page.
    SignedIn(AuthSession),
    /// A required field is empty. Nothing was sent.
    Invalid,
    /// The server refused; see [`AuthForm::error`].
    Failed,
}

/// Field values and inline error of the auth page.
#[derive(Default)]
pub struct AuthForm {
    mode: AuthMode,
    email: String,
    password: Zeroizing<String>,
    error: Option<String>,
}

impl std::fmt::Debug for AuthForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthForm")
            .field("mode", &self.mode)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("error", &self.error)
            .finish()
    }
}

impl AuthForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mode: AuthMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Switches between login and registration, clearing any error.
    pub fn toggle(&mut self) {
        self.mode = self.mode.toggled();
        self.error = None;
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    /// Replaces the password. The previous value is wiped.
    pub fn set_password(&mut self, password: Zeroizing<String>) {
        self.password = password;
    }

    /// The inline error from the last submit, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Submits the form for the current mode.
    ///
    /// The server's rejection message is kept verbatim as the inline error.
    /// The password is wiped after a successful submit.
    pub async fn submit<A: AuthBackend + ?Sized>(&mut self, backend: &A) -> FormOutcome {
        let email = self.email.trim();
        if email.is_empty() || self.password.is_empty() {
            self.error = Some(REQUIRED_FIELDS_MESSAGE.to_string());
            return FormOutcome::Invalid;
        }

        let credentials = Credentials::new(email, self.password.as_str());
        let result = match self.mode {
            AuthMode::Login => backend.sign_in(&credentials).await,
            AuthMode::Register => backend.sign_up(&credentials).await,
        };

        match result {
            Ok(session) => {
                self.error = None;
                self.password = Zeroizing::new(String::new());
                FormOutcome::SignedIn(session)
            }
            Err(err) => {
                debug!(mode = ?self.mode, error = %err, "Auth form rejected");
                self.error = Some(err.to_string());
                FormOutcome::Failed
            }
        }
    }
}
