mod memory;
mod redis;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ Conversation, Role };

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Redis history error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("History entry encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Unsupported history store type: {0}")]
    UnsupportedType(String),
}

/// Per-session ordered message log. The full log is kept; callers read a
/// trailing window of it.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError>;

    /// The last `limit` messages of the session, oldest first.
    async fn recent(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError>;

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError>;
}

fn ttl_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    let ttl = ttl_from_secs(args.history_ttl_secs);
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new(ttl))),
        "redis" => {
            let store = RedisHistoryStore::new(
                &args.history_host,
                args.history_redis_prefix.clone(),
                ttl
            )?;
            Ok(Arc::new(store))
        }
        _ => Err(HistoryError::UnsupportedType(args.history_type.clone())),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    if args.history_type.eq_ignore_ascii_case("memory") {
        info!("Chat history will be kept in process memory");
    } else {
        info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    }
    create_history_store(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn rejects_unknown_store_type() {
        let args = Args::try_parse_from(["little-tone", "--history-type", "qdrant"]).unwrap();
        assert!(matches!(create_history_store(&args), Err(HistoryError::UnsupportedType(_))));
    }

    #[test]
    fn zero_ttl_means_no_expiry() {
        assert_eq!(ttl_from_secs(0), None);
        assert_eq!(ttl_from_secs(30), Some(Duration::from_secs(30)));
    }
}
