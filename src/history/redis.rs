use async_trait::async_trait;
use crate::models::chat::{ ChatMessage, Conversation, Role };
use crate::history::{ HistoryError, HistoryStore };
use chrono::Utc;
use log::error;
use redis::{ Client, AsyncCommands };
use serde::{ Serialize, Deserialize };
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: Role,
    content: String,
    timestamp: i64,
}

impl From<StoredMessage> for ChatMessage {
    fn from(msg: StoredMessage) -> Self {
        ChatMessage { role: msg.role, content: msg.content, timestamp: msg.timestamp }
    }
}

/// One Redis list per session, appended with RPUSH so the list reads
/// oldest-first.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
    ttl: Option<Duration>,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: String, ttl: Option<Duration>) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix,
            ttl,
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

fn decode_entries(entries: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(entries.len());
    for json_entry in entries {
        match serde_json::from_str::<StoredMessage>(json_entry) {
            Ok(msg) => messages.push(msg.into()),
            Err(e) => error!("Error parsing history entry: {}", e),
        }
    }
    messages
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let key = self.key(session_id);

        let message = StoredMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        };

        let json_msg = serde_json::to_string(&message)?;
        let _: i64 = conn.rpush(&key, &json_msg).await?;
        if let Some(ttl) = self.ttl {
            let _: i64 = conn.expire(&key, ttl.as_secs() as i64).await?;
        }
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError> {
        if limit == 0 {
            return Ok(Conversation::empty(session_id));
        }
        let mut conn = self.get_connection().await?;
        let key = self.key(session_id);
        let json_entries: Vec<String> = {
            let (start, stop) = tail_range(limit);
            conn.lrange(&key, start, stop).await?
        };

        Ok(Conversation {
            id: session_id.to_string(),
            messages: decode_entries(&json_entries),
        })
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.key(session_id)).await?;
        Ok(())
    }
}

/// LRANGE bounds selecting the last `limit` entries of a list.
fn tail_range(limit: usize) -> (isize, isize) {
    let count = isize::try_from(limit).unwrap_or(isize::MAX);
    (-count, -1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_prefix() {
        let store = RedisHistoryStore::new("redis://127.0.0.1:6379", "lt:".into(), None).unwrap();
        assert_eq!(store.key("abc"), "lt:abc");
    }

    #[test]
    fn skips_corrupt_entries() {
        let entries = vec![
            r#"{"role":"user","content":"我很難過","timestamp":1}"#.to_string(),
            "not json".to_string(),
            r#"{"role":"assistant","content":"我在","timestamp":2}"#.to_string(),
        ];
        let messages = decode_entries(&entries);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "我在");
    }

    #[test]
    fn tail_range_never_wraps() {
        assert_eq!(tail_range(10), (-10, -1));
        assert_eq!(tail_range(1), (-1, -1));
        assert_eq!(tail_range(usize::MAX), (-isize::MAX, -1));
        assert_eq!(tail_range(1usize << 63), (-isize::MAX, -1));
    }
}
