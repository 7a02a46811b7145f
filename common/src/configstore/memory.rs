// In-memory ConfigStore backend for tests and standalone operation.

use super::{ChangeCallback, ConfigStoreBackend, ListenerId};
use crate::errors::RemoteConfigError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type DocKey = (String, String);

/// Backend that keeps documents in process memory and fires listeners
/// synchronously on publish. `set_available(false)` makes every operation
/// fail the way an unreachable remote store would, which is how the
/// degraded-startup path is exercised in tests.
#[derive(Default)]
pub struct InMemoryConfigStore {
    documents: DashMap<DocKey, String>,
    listeners: DashMap<DocKey, Vec<(ListenerId, ChangeCallback)>>,
    next_listener_id: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated availability of the remote store.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of published documents, for assertions.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn check_available(&self) -> Result<(), RemoteConfigError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RemoteConfigError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn key(data_id: &str, group: &str) -> DocKey {
        (group.to_string(), data_id.to_string())
    }
}

#[async_trait]
impl ConfigStoreBackend for InMemoryConfigStore {
    async fn get_config(
        &self,
        data_id: &str,
        group: &str,
        _timeout_ms: u64,
    ) -> Result<String, RemoteConfigError> {
        self.check_available()?;
        self.documents
            .get(&Self::key(data_id, group))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RemoteConfigError::DocumentNotFound(data_id.to_string()))
    }

    async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) -> Result<bool, RemoteConfigError> {
        self.check_available()?;
        let key = Self::key(data_id, group);
        self.documents.insert(key.clone(), content.to_string());

        // Snapshot the listener list before invoking so callbacks can
        // re-enter the store without deadlocking the shard.
        let callbacks: Vec<ChangeCallback> = self
            .listeners
            .get(&key)
            .map(|entry| entry.value().iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(data_id, content);
        }
        Ok(true)
    }

    async fn add_listener(
        &self,
        data_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<ListenerId, RemoteConfigError> {
        self.check_available()?;
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners
            .entry(Self::key(data_id, group))
            .or_default()
            .push((id, callback));
        Ok(id)
    }

    async fn remove_listener(&self, data_id: &str, group: &str, listener: ListenerId) {
        if let Some(mut entry) = self.listeners.get_mut(&Self::key(data_id, group)) {
            entry.value_mut().retain(|(id, _)| *id != listener);
        }
    }
}
