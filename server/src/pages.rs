//! Server-rendered HTML pages.
//!
//! Templates live in `server/templates/` and are compiled into the binary.
//! Names end in `.html`, so minijinja auto-escapes every interpolated value.

use minijinja::{context, Environment};
use serde::Deserialize;

use crate::store::PAGE_SIZE;
use crate::types::Message;

/// Which form the auth page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Login,
    #[default]
    Register,
}

impl AuthMode {
    fn title(self) -> &'static str {
        match self {
            Self::Login => "Log in to your account",
            Self::Register => "Create a new account",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::Login => "Don't have an account?",
            Self::Register => "Already have an account?",
        }
    }

    fn toggle_label(self) -> &'static str {
        match self {
            Self::Login => "Create an account",
            Self::Register => "Log in",
        }
    }

    fn toggled(self) -> Self {
        match self {
            Self::Login => Self::Register,
            Self::Register => Self::Login,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}

/// Compiled page templates.
///
/// Interpolated text is HTML-escaped, including `'` and `/`.
#[derive(Debug)]
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    /// Compiles the bundled templates.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] if a template fails to parse.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("chat.html", include_str!("../templates/chat.html"))?;
        env.add_template("auth.html", include_str!("../templates/auth.html"))?;
        Ok(Self { env })
    }

    /// Renders the chat page with its initial, ascending page of messages.
    pub fn render_chat(
        &self,
        user_email: Option<&str>,
        messages: &[Message],
    ) -> Result<String, minijinja::Error> {
        let message_ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();

        self.env.get_template("chat.html")?.render(context! {
            user_email => user_email,
            messages => messages,
            message_ids => message_ids,
            page_size => PAGE_SIZE,
        })
    }

    /// Renders the login or register form.
    pub fn render_auth(&self, mode: AuthMode) -> Result<String, minijinja::Error> {
        self.env.get_template("auth.html")?.render(context! {
            title => mode.title(),
            mode => mode.as_str(),
            submit_label => match mode {
                AuthMode::Login => "Log in",
                AuthMode::Register => "Sign up",
            },
            prompt => mode.prompt(),
            toggle_label => mode.toggle_label(),
            toggle_mode => mode.toggled().as_str(),
        })
    }
}
