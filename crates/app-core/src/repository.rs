//! Message repository
//!
//! Append-only store of messages, queryable by conversation key and ordered
//! by creation time. The concrete implementation is the backend's `messages`
//! table; history reads drop malformed rows at the boundary with a warning
//! instead of failing the whole fetch.

use async_trait::async_trait;
use backend_client::realtime::MessageRow;
use backend_client::rest::{RestClient, TableQuery};

use crate::conversation::ConversationKey;
use crate::message::{Message, MessageError, NewMessage, Result};

/// Table holding chat messages.
pub const MESSAGES_TABLE: &str = "messages";

/// Default cap on history rows per conversation.
pub const HISTORY_LIMIT: u32 = 500;

/// The message store at its interface boundary.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message.
    async fn insert(&self, message: &NewMessage) -> Result<()>;

    /// All messages for `key`, ordered by creation time ascending.
    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>>;
}

/// Repository backed by the backend's `messages` table.
#[derive(Debug, Clone)]
pub struct RestMessageRepository {
    rest: RestClient,
}

impl RestMessageRepository {
    /// Create a repository over a REST client.
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl MessageRepository for RestMessageRepository {
    async fn insert(&self, message: &NewMessage) -> Result<()> {
        self.rest
            .insert(MESSAGES_TABLE, message)
            .await
            .map_err(|e| MessageError::Backend(e.to_string()))
    }

    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let query = TableQuery::new(MESSAGES_TABLE)
            .eq("channel_name", key.as_str())
            .order_asc("created_at")
            .limit(HISTORY_LIMIT);

        let rows: Vec<MessageRow> = self
            .rest
            .select(&query)
            .await
            .map_err(|e| MessageError::Backend(e.to_string()))?;

        let messages = rows
            .into_iter()
            .filter_map(|row| match Message::from_row(row) {
                Ok(message) => Some(message),
                Err(error) => {
                    tracing::warn!(key = %key, %error, "dropping malformed message row");
                    None
                }
            })
            .collect();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_client::{token_store, BackendConfig};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repository_for(server: &MockServer) -> RestMessageRepository {
        let config = BackendConfig::new(server.uri(), "test-anon-key");
        RestMessageRepository::new(RestClient::new(config, token_store()))
    }

    #[tokio::test]
    async fn test_history_filters_and_orders_by_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("channel_name", "eq.general"))
            .and(query_param("order", "created_at.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "m1", "sender": "alice", "channel_name": "general",
                    "content": "first", "kind": "text",
                    "created_at": "2026-01-05T12:00:00Z"
                },
                {
                    "id": "m2", "sender": "bob", "channel_name": "general",
                    "content": "second", "kind": "text",
                    "created_at": "2026-01-05T12:01:00Z"
                }
            ])))
            .mount(&server)
            .await;

        let repository = repository_for(&server);
        let history = repository
            .history(&ConversationKey::new("general"))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "m1");
        assert_eq!(history[1].sender, "bob");
    }

    #[tokio::test]
    async fn test_history_skips_malformed_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "m1", "sender": "alice", "channel_name": "general",
                    "content": "fine", "kind": "text",
                    "created_at": "2026-01-05T12:00:00Z"
                },
                {
                    "id": "m2", "sender": "bob", "channel_name": "general",
                    "content": "mystery", "kind": "hologram",
                    "created_at": "2026-01-05T12:01:00Z"
                }
            ])))
            .mount(&server)
            .await;

        let repository = repository_for(&server);
        let history = repository
            .history(&ConversationKey::new("general"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "m1");
    }

    #[tokio::test]
    async fn test_history_surfaces_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let repository = repository_for(&server);
        let result = repository.history(&ConversationKey::new("general")).await;
        assert!(matches!(result, Err(MessageError::Backend(_))));
    }

    #[tokio::test]
    async fn test_insert_posts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let repository = repository_for(&server);
        let message = NewMessage::compose(
            "alice",
            ConversationKey::new("general"),
            crate::message::OutgoingContent::Text("hello".to_string()),
        )
        .unwrap();
        repository.insert(&message).await.unwrap();
    }
}
