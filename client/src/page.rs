//! The chat page: message list state, realtime inserts, sending and paging.
//!
//! One component serves both the push-only and the paginated variant, chosen
//! by [`PageMode`]. Messages are kept ascending by arrival and keyed by id, so
//! a row that arrives both through the initial fetch and the realtime feed is
//! shown once.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiError, ChatApi};
use crate::types::Message;

/// Rows per page, matching the server.
pub const PAGE_SIZE: usize = 20;

/// Errors surfaced by [`ChatPage`] operations.
#[derive(Error, Debug)]
pub enum PageError {
    /// A page of messages could not be loaded.
    #[error("failed to load messages: {0}")]
    Fetch(#[source] ApiError),

    /// The signed-in user could not be looked up.
    #[error("failed to look up the current user: {0}")]
    Identity(#[source] ApiError),

    /// The message could not be sent.
    #[error("failed to send message: {0}")]
    Send(#[source] ApiError),
}

/// Which variant of the page to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageMode {
    /// Initial page plus realtime inserts.
    #[default]
    PushOnly,
    /// Additionally loads older pages when the top of the list is reached.
    Paginated,
}

/// What a call to [`ChatPage::submit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    EmptyDraft,
    NoUser,
}

/// Server calls the page depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One page of messages, ascending, skipping the `offset` newest rows.
    async fn fetch_page(&self, offset: usize) -> Result<Vec<Message>, ApiError>;

    /// Email of the signed-in user, if there is one.
    async fn current_email(&self) -> Result<Option<String>, ApiError>;

    async fn send_message(&self, message: &str, email: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn fetch_page(&self, offset: usize) -> Result<Vec<Message>, ApiError> {
        ChatApi::fetch_page(self, offset).await
    }

    async fn current_email(&self) -> Result<Option<String>, ApiError> {
        Ok(self.current_user().await?.and_then(|user| user.email))
    }

    async fn send_message(&self, message: &str, email: &str) -> Result<(), ApiError> {
        self.create_message(message, email).await.map(|_| ())
    }
}

/// State of the chat page for one mount.
#[derive(Debug)]
pub struct ChatPage<B> {
    backend: B,
    mode: PageMode,
    messages: Vec<Message>,
    ids: HashSet<String>,
    draft: String,
    is_loading: bool,
    has_more: bool,
    scroll_to_latest: bool,
}

impl<B: ChatBackend> ChatPage<B> {
    /// Fetches the newest page and builds the page state.
    ///
    /// In paginated mode a short initial page already means there is nothing
    /// older to load.
    pub async fn mount(backend: B, mode: PageMode) -> Result<Self, PageError> {
        let initial = backend.fetch_page(0).await.map_err(PageError::Fetch)?;

        let mut page = Self {
            backend,
            mode,
            messages: Vec::with_capacity(initial.len()),
            ids: HashSet::new(),
            draft: String::new(),
            is_loading: false,
            has_more: mode == PageMode::Paginated && initial.len() >= PAGE_SIZE,
            scroll_to_latest: true,
        };
        for message in initial {
            if page.ids.insert(message.id.clone()) {
                page.messages.push(message);
            }
        }

        debug!(count = page.messages.len(), ?mode, "Chat page mounted");
        Ok(page)
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn mode(&self) -> PageMode {
        self.mode
    }

    /// Messages in display order, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Returns true once after the view should jump to the newest message.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_latest)
    }

    /// Applies a realtime insert.
    ///
    /// Rows missing a required field and rows already shown are dropped.
    /// Returns the appended message.
    pub fn on_insert(&mut self, row: &Value) -> Option<&Message> {
        let Some(message) = Message::from_payload(row) else {
            debug!("Dropping realtime row with missing fields");
            return None;
        };

        if !self.ids.insert(message.id.clone()) {
            debug!(id = %message.id, "Ignoring duplicate realtime row");
            return None;
        }

        self.messages.push(message);
        self.scroll_to_latest = true;
        self.messages.last()
    }

    /// Sends the draft as the signed-in user.
    ///
    /// Does nothing when the trimmed draft is empty or nobody is signed in.
    /// The draft is cleared only after a successful send; the sent message
    /// shows up through the realtime feed, not here.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, PageError> {
        let text = self.draft.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::EmptyDraft);
        }

        let Some(email) = self
            .backend
            .current_email()
            .await
            .map_err(PageError::Identity)?
        else {
            return Ok(SubmitOutcome::NoUser);
        };

        self.backend
            .send_message(text, &email)
            .await
            .map_err(PageError::Send)?;
        self.draft.clear();
        Ok(SubmitOutcome::Sent)
    }

    /// Marks an older-page load as started when the top of the list becomes
    /// visible. Returns the offset to fetch, or `None` when paging is off,
    /// exhausted or already in flight.
    pub fn begin_load_older(&mut self) -> Option<usize> {
        if self.mode != PageMode::Paginated || self.is_loading || !self.has_more {
            return None;
        }
        self.is_loading = true;
        Some(self.messages.len())
    }

    /// Completes a load started by [`Self::begin_load_older`], prepending the
    /// rows and returning how many were added.
    pub fn finish_load_older(
        &mut self,
        result: Result<Vec<Message>, ApiError>,
    ) -> Result<usize, PageError> {
        self.is_loading = false;

        let older = match result {
            Ok(older) => older,
            Err(err) => {
                warn!(error = %err, "Failed to load older messages");
                return Err(PageError::Fetch(err));
            }
        };

        if older.len() < PAGE_SIZE {
            self.has_more = false;
        }

        let mut fresh: Vec<Message> = older
            .into_iter()
            .filter(|message| self.ids.insert(message.id.clone()))
            .collect();
        let added = fresh.len();
        fresh.append(&mut self.messages);
        self.messages = fresh;

        debug!(added, has_more = self.has_more, "Loaded older messages");
        Ok(added)
    }

    /// Loads the next older page in place.
    pub async fn load_older(&mut self) -> Result<usize, PageError> {
        let Some(offset) = self.begin_load_older() else {
            return Ok(0);
        };
        let result = self.backend.fetch_page(offset).await;
        self.finish_load_older(result)
    }
}
