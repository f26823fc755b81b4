//! Realtime channel for message-insert notifications.
//!
//! Every row inserted through the Messages API is published here as a
//! [`ChangeEvent`] and fanned out to WebSocket subscribers. It uses tokio's
//! broadcast channel for multi-producer, multi-consumer delivery.
//!
//! # Architecture
//!
//! - [`RealtimeChannel`] - the hub that distributes change events
//! - [`ChangeFilter`] - per-subscriber criteria (event, schema, table)
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use dougchat_server::realtime::{ChangeFilter, RealtimeChannel};
//! use dougchat_server::types::{ChangeEvent, ChangeKind, Message};
//!
//! let channel = RealtimeChannel::new();
//! let mut rx = channel.subscribe();
//!
//! let message = Message {
//!     id: "1".to_string(),
//!     email: "user@example.com".to_string(),
//!     message: "hello".to_string(),
//!     created_at: Utc::now(),
//! };
//! channel.publish(ChangeEvent::insert(&message));
//!
//! let filter = ChangeFilter::new()
//!     .with_event(ChangeKind::Insert)
//!     .with_schema("public")
//!     .with_table("messages");
//! assert!(filter.matches(&rx.try_recv().unwrap()));
//! ```

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::types::{ChangeEvent, ChangeKind};

/// Name of the only channel clients may join.
pub const MESSAGES_CHANNEL: &str = "messages";

/// Default channel capacity.
///
/// Subscribers that fall further behind than this receive
/// `RecvError::Lagged` and skip the dropped events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Fan-out hub for change events.
///
/// `RealtimeChannel` is `Clone`; clones share the same underlying sender.
#[derive(Debug, Clone)]
pub struct RealtimeChannel {
    sender: Sender<ChangeEvent>,
}

impl RealtimeChannel {
    /// Creates a channel with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a channel with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created realtime channel");
        Self { sender }
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New realtime subscriber"
        );
        rx
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers reached; 0 when nobody listens.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        trace!(
            row_id = event.row_id().unwrap_or("<none>"),
            table = %event.table,
            "Publishing change event"
        );

        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No realtime subscribers for change event");
                0
            }
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RealtimeChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Which change events a subscriber wants.
///
/// All set criteria must match; unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    pub event: Option<ChangeKind>,
    pub schema: Option<String>,
    pub table: Option<String>,
}

impl ChangeFilter {
    /// Creates a filter that matches every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event(mut self, event: ChangeKind) -> Self {
        self.event = Some(event);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Returns true if `event` passes every set criterion.
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(kind) = self.event {
            if event.event != kind {
                return false;
            }
        }

        if let Some(ref schema) = self.schema {
            if &event.schema != schema {
                return false;
            }
        }

        if let Some(ref table) = self.table {
            if &event.table != table {
                return false;
            }
        }

        true
    }
}
