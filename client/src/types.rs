//! Wire types shared by the client API, realtime feed and chat page.

use chrono::{DateTime, Local};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use zeroize::Zeroizing;

/// A chat message as rendered by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub email: String,
    pub message: String,
    pub created_at: String,
}

impl Message {
    /// Builds a message from an untyped realtime row.
    ///
    /// Returns `None` unless `id`, `email`, `message` and `created_at` are all
    /// present and non-empty. Numeric ids are accepted and rendered as strings.
    #[must_use]
    pub fn from_payload(row: &Value) -> Option<Self> {
        let id = match row.get("id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };

        let text_field = |name: &str| -> Option<String> {
            row.get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let message = Self {
            email: text_field("email")?,
            message: text_field("message")?,
            created_at: text_field("created_at")?,
            id,
        };

        (!message.id.is_empty()).then_some(message)
    }

    /// Formats the message as a single terminal line.
    #[must_use]
    pub fn display_line(&self) -> String {
        let time = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|ts| ts.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_else(|_| self.created_at.clone());
        format!("[{time}] {}: {}", self.email, self.message)
    }
}

/// The signed-in user as reported by `GET /api/user`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Result of a successful sign-in or sign-up.
///
/// Debug output never includes the access token.
#[derive(Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: User,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Email and password submitted to the auth endpoints.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    password: Zeroizing<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Credentials", 2)?;
        state.serialize_field("email", &self.email)?;
        state.serialize_field("password", self.password.as_str())?;
        state.end()
    }
}

/// Error body returned by the server on failed requests.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}
