//! Cursor persistence.

use crate::error::{ConsumerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable position per stream name.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, stream: &str) -> Result<Option<u64>>;
    async fn save_cursor(&self, stream: &str, seq: u64) -> Result<()>;
}

/// Non-durable cursor store.
#[derive(Default)]
pub struct MemCursorStore {
    cursors: RwLock<HashMap<String, u64>>,
}

impl MemCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemCursorStore {
    async fn load_cursor(&self, stream: &str) -> Result<Option<u64>> {
        let cursors = self
            .cursors
            .read()
            .map_err(|e| ConsumerError::Cursor(e.to_string()))?;
        Ok(cursors.get(stream).copied())
    }

    async fn save_cursor(&self, stream: &str, seq: u64) -> Result<()> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|e| ConsumerError::Cursor(e.to_string()))?;
        cursors.insert(stream.to_string(), seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_are_independent() {
        let store = MemCursorStore::new();
        assert_eq!(store.load_cursor("firehose").await.unwrap(), None);

        store.save_cursor("firehose", 1000).await.unwrap();
        store.save_cursor("moderation", 7).await.unwrap();
        store.save_cursor("firehose", 1001).await.unwrap();

        assert_eq!(store.load_cursor("firehose").await.unwrap(), Some(1001));
        assert_eq!(store.load_cursor("moderation").await.unwrap(), Some(7));
    }
}
