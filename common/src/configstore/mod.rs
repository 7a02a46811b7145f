// ConfigStore integration: the remote key/value configuration service that
// owns job documents and process properties.
//
// `ConfigStoreBackend` is the seam over the remote service itself;
// `ConfigClient` layers the merged property view, per-key listener fan-out,
// and document publishing on top of whichever backend is wired in.

pub mod client;
pub mod http;
pub mod memory;

pub use client::ConfigClient;
pub use http::HttpConfigStore;
pub use memory::InMemoryConfigStore;

use crate::errors::RemoteConfigError;
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque handle for a registered backend listener.
pub type ListenerId = u64;

/// Callback invoked with `(data_id, new_content)` when a subscribed document
/// changes. Callbacks must return promptly; long work belongs on a channel.
pub type ChangeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Remote configuration service interface: get/publish/subscribe over named
/// documents ("data ids") within a group.
#[async_trait]
pub trait ConfigStoreBackend: Send + Sync {
    /// Fetch a document. `RemoteConfigError::DocumentNotFound` when the data
    /// id has never been published; other variants are transient.
    async fn get_config(
        &self,
        data_id: &str,
        group: &str,
        timeout_ms: u64,
    ) -> Result<String, RemoteConfigError>;

    /// Publish a document, replacing any previous content. Returns whether
    /// the remote side accepted the write.
    async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) -> Result<bool, RemoteConfigError>;

    /// Register a change listener for one document. The callback receives
    /// the full updated content on every change.
    async fn add_listener(
        &self,
        data_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<ListenerId, RemoteConfigError>;

    /// Deregister a listener. Best-effort; unknown ids are ignored.
    async fn remove_listener(&self, data_id: &str, group: &str, listener: ListenerId);
}
