//! Realtime change feed
//!
//! Per-conversation-key subscriptions delivering newly inserted message rows.
//! The transport behind [`ChangeFeed`] is external; this module fixes the
//! interface: a subscription is an explicit handle with a mandatory symmetric
//! unsubscribe, released automatically when the handle is dropped so a
//! half-torn-down subscription cannot leak. [`RealtimeHub`] is the in-process
//! implementation used by the state layer's tests and for local loopback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Buffered rows per subscription before the feed drops new ones.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Realtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The feed is shut down and cannot accept subscriptions.
    #[error("realtime feed closed")]
    Closed,
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// An inserted row of the message table, as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Row identifier.
    pub id: String,
    /// Sender display name.
    pub sender: String,
    /// Canonical conversation key the row belongs to.
    pub channel_name: String,
    /// Text body or media URL, depending on `kind`.
    pub content: String,
    /// Optional caption for image messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Message kind discriminant.
    pub kind: String,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Subscription to insert events for one conversation key.
///
/// Dropping the subscription unsubscribes from the feed.
pub struct FeedSubscription {
    key: String,
    rx: mpsc::Receiver<MessageRow>,
    _guard: FeedGuard,
}

impl FeedSubscription {
    /// The conversation key this subscription is filtered to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Receive the next inserted row; `None` once the feed closes.
    pub async fn recv(&mut self) -> Option<MessageRow> {
        self.rx.recv().await
    }
}

struct FeedGuard {
    hub: Weak<Mutex<HubInner>>,
    key: String,
    id: u64,
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut inner = hub.lock();
            if let Some(subscribers) = inner.subscribers.get_mut(&self.key) {
                subscribers.retain(|(id, _)| *id != self.id);
                if subscribers.is_empty() {
                    inner.subscribers.remove(&self.key);
                }
            }
        }
    }
}

/// Subscription source for insert events on the message table.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to inserts whose `channel_name` equals `key`.
    async fn subscribe(&self, key: &str) -> Result<FeedSubscription>;
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<String, Vec<(u64, mpsc::Sender<MessageRow>)>>,
}

/// In-process change feed keyed by `channel_name`.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<Mutex<HubInner>>,
}

impl RealtimeHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an inserted row to every matching subscriber.
    ///
    /// Returns the number of subscribers the row was delivered to. Closed or
    /// saturated receivers are pruned rather than blocking the publisher.
    pub fn publish(&self, row: MessageRow) -> usize {
        let mut inner = self.inner.lock();
        let Some(subscribers) = inner.subscribers.get_mut(&row.channel_name) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|(_, tx)| match tx.try_send(row.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(key = %row.channel_name, "realtime subscriber lagging; dropping row");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            inner.subscribers.remove(&row.channel_name);
        }
        delivered
    }

    /// Number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChangeFeed for RealtimeHub {
    async fn subscribe(&self, key: &str) -> Result<FeedSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .subscribers
                .entry(key.to_string())
                .or_default()
                .push((id, tx));
            id
        };

        Ok(FeedSubscription {
            key: key.to_string(),
            rx,
            _guard: FeedGuard {
                hub: Arc::downgrade(&self.inner),
                key: key.to_string(),
                id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, key: &str) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            sender: "alice".to_string(),
            channel_name: key.to_string(),
            content: "hello".to_string(),
            caption: None,
            kind: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let hub = RealtimeHub::new();
        let mut sub = hub.subscribe("general").await.unwrap();
        assert_eq!(sub.key(), "general");

        assert_eq!(hub.publish(row("m1", "general")), 1);
        let received = sub.recv().await.unwrap();
        assert_eq!(received.id, "m1");
    }

    #[tokio::test]
    async fn test_publish_routes_by_key() {
        let hub = RealtimeHub::new();
        let mut general = hub.subscribe("general").await.unwrap();
        let _random = hub.subscribe("random").await.unwrap();

        assert_eq!(hub.publish(row("m1", "general")), 1);
        assert_eq!(hub.publish(row("m2", "nobody-listens")), 0);

        assert_eq!(general.recv().await.unwrap().id, "m1");
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = RealtimeHub::new();
        let sub = hub.subscribe("general").await.unwrap();
        assert_eq!(hub.subscriber_count("general"), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count("general"), 0);
        assert_eq!(hub.publish(row("m1", "general")), 0);
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let hub = RealtimeHub::new();
        let mut a = hub.subscribe("general").await.unwrap();
        let mut b = hub.subscribe("general").await.unwrap();

        assert_eq!(hub.publish(row("m1", "general")), 2);
        assert_eq!(a.recv().await.unwrap().id, "m1");
        assert_eq!(b.recv().await.unwrap().id, "m1");
    }

    #[test]
    fn test_message_row_round_trips_snake_case() {
        let json = serde_json::json!({
            "id": "m1",
            "sender": "alice",
            "channel_name": "general",
            "content": "hi",
            "kind": "text",
            "created_at": "2026-01-05T12:00:00Z"
        });
        let row: MessageRow = serde_json::from_value(json).unwrap();
        assert_eq!(row.channel_name, "general");
        assert!(row.caption.is_none());
    }
}
