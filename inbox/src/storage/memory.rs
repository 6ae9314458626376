use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StorageBackend, StorageError};
use crate::message::{sort_newest_first, Message, MessageFilter, MessageUpdate};

/// Process-local backend, used when no database is configured and in tests.
///
/// Ids count up from 1, or down from -1 when the backend stands in for the
/// local cache. It can be switched offline to exercise fallback paths.
pub struct MemoryBackend {
    name: &'static str,
    provisional_ids: bool,
    messages: RwLock<BTreeMap<i64, Message>>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::build("memory", false)
    }

    /// Hands out negative ids, like the SQLite local cache.
    pub fn provisional() -> Self {
        Self::build("memory-local", true)
    }

    fn build(name: &'static str, provisional_ids: bool) -> Self {
        Self {
            name,
            provisional_ids,
            messages: RwLock::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("{} is offline", self.name)));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn stored(id: i64, message: &Message) -> Message {
    let mut message = message.clone();
    message.id = Some(id);
    message.message_type = Some(message.stored_type());
    message
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn insert(&self, message: &Message) -> Result<i64, StorageError> {
        self.check_online()?;
        let mut messages = self.messages.write().await;
        let id = if self.provisional_ids {
            messages.keys().next().map_or(0, |&min| min.min(0)) - 1
        } else {
            messages.keys().next_back().map_or(0, |&max| max.max(0)) + 1
        };
        messages.insert(id, stored(id, message));
        Ok(id)
    }

    async fn put(&self, id: i64, message: &Message) -> Result<(), StorageError> {
        self.check_online()?;
        self.messages.write().await.insert(id, stored(id, message));
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Message>, StorageError> {
        self.check_online()?;
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        self.check_online()?;
        let mut matching: Vec<Message> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        sort_newest_first(&mut matching);

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Message, StorageError> {
        self.check_online()?;
        let mut messages = self.messages.write().await;
        let message = messages.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        message.apply(changes);
        Ok(message.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.check_online()?;
        self.messages
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }
}
