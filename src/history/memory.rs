use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::time::{ Duration, Instant };
use tokio::sync::RwLock;

use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation, Role };

struct SessionLog {
    messages: Vec<ChatMessage>,
    touched: Instant,
}

impl SessionLog {
    fn expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.map_or(false, |ttl| now.duration_since(self.touched) > ttl)
    }
}

pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, SessionLog>>,
    ttl: Option<Duration>,
}

impl MemoryHistoryStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, log| !log.expired(self.ttl, now));
        if sessions.len() != before {
            debug!("Dropped {} expired session(s)", before - sessions.len());
        }

        let log = sessions.entry(session_id.to_string()).or_insert_with(|| SessionLog {
            messages: Vec::new(),
            touched: now,
        });
        log.messages.push(ChatMessage::new(role, content));
        log.touched = now;
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError> {
        let sessions = self.sessions.read().await;
        let messages = match sessions.get(session_id) {
            Some(log) if !log.expired(self.ttl, Instant::now()) => {
                let start = log.messages.len().saturating_sub(limit);
                log.messages[start..].to_vec()
            }
            _ => Vec::new(),
        };
        Ok(Conversation { id: session_id.to_string(), messages })
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
