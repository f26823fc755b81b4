//! DougChat client - terminal front end for a DougChat server.
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`types`]: Messages, users and credentials as sent over the wire
//! - [`api`]: HTTP client for the chat and auth endpoints
//! - [`realtime`]: WebSocket subscription to message inserts
//! - [`page`]: Chat page state (initial fetch, realtime inserts, sending, paging)
//! - [`forms`]: Login and registration forms
//! - [`prompt`]: Terminal prompts, with a no-echo password reader
//! - [`session`]: Persisted access token

pub mod api;
pub mod config;
pub mod forms;
pub mod page;
pub mod prompt;
pub mod realtime;
pub mod session;
pub mod types;

pub use api::{ApiError, ChatApi};
pub use config::{Config, ConfigError};
pub use forms::{AuthBackend, AuthForm, AuthMode, FormOutcome};
pub use page::{ChatBackend, ChatPage, PageError, PageMode, SubmitOutcome, PAGE_SIZE};
pub use realtime::{subscribe, RealtimeError, Subscription};
pub use session::{SessionFile, SessionFileError};
pub use types::{AuthSession, Credentials, Message, User};
