//! Message store abstraction.
//!
//! The messages table lives in an external service. [`MessageStore`] is the
//! seam between the HTTP handlers and whichever backend holds the rows:
//! [`SupabaseClient`](crate::supabase::SupabaseClient) in production and
//! [`MemoryBackend`](crate::memory::MemoryBackend) for local development.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Message, NewMessage};

/// Number of messages returned per page.
pub const PAGE_SIZE: usize = 20;

/// Errors returned by a message store.
///
/// These never reach HTTP clients verbatim; handlers log them and answer with
/// a generic error body.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the query or insert.
    #[error("message store rejected request: {0}")]
    Rejected(String),

    /// The store answered with something that is not a list of rows.
    #[error("invalid message store response: {0}")]
    InvalidResponse(String),
}

/// Read/insert access to the messages table.
///
/// `access_token` is the requesting user's session token. Stores that enforce
/// per-user access run the query as that user; `None` means an anonymous
/// caller.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns up to `limit` messages ordered by `created_at` descending,
    /// skipping the `offset` most recent ones.
    async fn latest(
        &self,
        access_token: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Inserts one row and returns the stored row(s).
    async fn insert(
        &self,
        access_token: Option<&str>,
        row: NewMessage,
    ) -> Result<Vec<Message>, StoreError>;
}

/// Fetches one page of messages in display order (ascending `created_at`).
///
/// The newest page is read descending so that the limit applies to the most
/// recent rows, then put into ascending order before it is returned.
pub async fn fetch_page(
    store: &dyn MessageStore,
    access_token: Option<&str>,
    offset: usize,
) -> Result<Vec<Message>, StoreError> {
    let mut rows = store.latest(access_token, offset, PAGE_SIZE).await?;
    sort_for_display(&mut rows);
    Ok(rows)
}

/// Orders rows ascending by `created_at`.
///
/// Rows arrive newest-first, so they are reversed before the stable sort; rows
/// sharing a timestamp then keep their insertion order.
pub fn sort_for_display(rows: &mut [Message]) {
    rows.reverse();
    rows.sort_by_key(|row| row.created_at);
}
