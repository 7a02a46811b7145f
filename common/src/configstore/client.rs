// ConfigStore adapter: merged property view, document publishing, and
// listener fan-out over a pluggable backend.

use super::{ChangeCallback, ConfigStoreBackend, ListenerId};
use crate::config::{ConfigStoreConfig, DocumentFormat};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Callback invoked with `(key, new_value)` when a watched property changes.
pub type KeyCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

struct DocListener {
    data_id: String,
    callback: ChangeCallback,
    installed: Option<ListenerId>,
}

/// Client-side adapter over the ConfigStore.
///
/// Property reads see a merged view, in order of precedence: the local cache
/// populated from published documents, the process environment, the remote
/// store fetched on demand, then the supplied default. Document listeners
/// that cannot be installed (remote unavailable) are deferred and retried on
/// the next `refresh`.
pub struct ConfigClient {
    backend: Arc<dyn ConfigStoreBackend>,
    group: String,
    primary_data_id: String,
    format: DocumentFormat,
    timeout_ms: u64,
    cache: Arc<DashMap<String, String>>,
    key_subscribers: Arc<DashMap<String, Vec<KeyCallback>>>,
    doc_listeners: Mutex<Vec<DocListener>>,
    /// Set once the per-key dispatch listener on the primary document exists
    /// (as a queued entry; installation may still be pending).
    dispatcher_registered: Mutex<bool>,
}

impl ConfigClient {
    pub fn new(backend: Arc<dyn ConfigStoreBackend>, config: &ConfigStoreConfig) -> Self {
        Self {
            backend,
            group: config.group.clone(),
            primary_data_id: config.data_id.clone(),
            format: config.format,
            timeout_ms: config.timeout_ms,
            cache: Arc::new(DashMap::new()),
            key_subscribers: Arc::new(DashMap::new()),
            doc_listeners: Mutex::new(Vec::new()),
            dispatcher_registered: Mutex::new(false),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Re-fetch the primary document into the cache and retry any deferred
    /// listener installations.
    pub async fn refresh(&self) {
        match self
            .backend
            .get_config(&self.primary_data_id, &self.group, self.timeout_ms)
            .await
        {
            Ok(content) => {
                self.apply_document(&content);
            }
            Err(crate::errors::RemoteConfigError::DocumentNotFound(_)) => {
                debug!(data_id = %self.primary_data_id, "Primary document not published yet");
            }
            Err(e) => {
                warn!(
                    data_id = %self.primary_data_id,
                    error = %e,
                    "ConfigStore unavailable, serving from cache, environment and defaults"
                );
            }
        }

        self.install_pending_listeners().await;
    }

    async fn install_pending_listeners(&self) {
        let mut listeners = self.doc_listeners.lock().await;
        for listener in listeners.iter_mut().filter(|l| l.installed.is_none()) {
            match self
                .backend
                .add_listener(&listener.data_id, &self.group, listener.callback.clone())
                .await
            {
                Ok(id) => {
                    debug!(data_id = %listener.data_id, "Config listener installed");
                    listener.installed = Some(id);
                }
                Err(e) => {
                    warn!(
                        data_id = %listener.data_id,
                        error = %e,
                        "Config listener deferred, will retry on next refresh"
                    );
                }
            }
        }
    }

    /// Parse a document in the configured format and merge it into the
    /// cache, dispatching per-key subscribers for every changed property.
    /// Returns whether any values were loaded.
    fn apply_document(&self, content: &str) -> bool {
        let Some(properties) = parse_document(content, self.format) else {
            warn!(
                data_id = %self.primary_data_id,
                format = ?self.format,
                "Document does not match the configured format, no values loaded"
            );
            return false;
        };

        merge_properties(&self.cache, &self.key_subscribers, properties);
        true
    }

    /// Read a property through the merged view.
    pub async fn get_string(&self, key: &str, default: &str) -> String {
        if let Some(value) = self.cache.get(key) {
            return value.value().clone();
        }

        if let Some(value) = env_lookup(key) {
            return value;
        }

        // Remote fetched on demand: one refresh, then re-check the cache.
        self.refresh().await;
        if let Some(value) = self.cache.get(key) {
            return value.value().clone();
        }

        default.to_string()
    }

    pub async fn get_int(&self, key: &str, default: i64) -> i64 {
        let raw = self.get_string(key, &default.to_string()).await;
        raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Property is not an integer, using default");
            default
        })
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        let raw = self.get_string(key, &default.to_string()).await;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                warn!(key, value = %raw, "Property is not a boolean, using default");
                default
            }
        }
    }

    /// Best-effort push of a document to the ConfigStore. The local cache is
    /// updated when the primary document is republished successfully.
    pub async fn publish_config(&self, content: &str, data_id: &str, group: &str) -> bool {
        match self.backend.publish_config(data_id, group, content).await {
            Ok(true) => {
                if data_id == self.primary_data_id && group == self.group {
                    self.apply_document(content);
                }
                true
            }
            Ok(false) => {
                warn!(data_id, "ConfigStore rejected publish");
                false
            }
            Err(e) => {
                warn!(data_id, error = %e, "Failed to publish to ConfigStore");
                false
            }
        }
    }

    /// Register a listener. A key that names a document (by its `.json` /
    /// `.yaml` extension) subscribes to that document's full content; any
    /// other key subscribes to per-property changes of the primary document.
    pub async fn add_listener(&self, key_or_data_id: &str, callback: KeyCallback) {
        if key_or_data_id.ends_with(".json") || key_or_data_id.ends_with(".yaml") {
            self.add_document_listener(key_or_data_id, callback).await;
        } else {
            self.add_key_listener(key_or_data_id, callback).await;
        }
    }

    /// Subscribe to full-content changes of one document.
    pub async fn add_document_listener(&self, data_id: &str, callback: ChangeCallback) {
        {
            let mut listeners = self.doc_listeners.lock().await;
            listeners.push(DocListener {
                data_id: data_id.to_string(),
                callback,
                installed: None,
            });
        }
        self.install_pending_listeners().await;
    }

    /// Subscribe to changes of one property path in the primary document.
    /// The per-document callback from the backend is translated into per-key
    /// dispatch by an internal adapter listener.
    pub async fn add_key_listener(&self, key: &str, callback: KeyCallback) {
        self.key_subscribers
            .entry(key.to_string())
            .or_default()
            .push(callback);
        self.ensure_dispatcher().await;
    }

    async fn ensure_dispatcher(&self) {
        {
            let mut registered = self.dispatcher_registered.lock().await;
            if *registered {
                return;
            }
            *registered = true;
        }

        let cache = self.cache.clone();
        let subscribers = self.key_subscribers.clone();
        let format = self.format;
        let dispatch: ChangeCallback = Arc::new(move |data_id, content| {
            let Some(properties) = parse_document(content, format) else {
                warn!(data_id, "Changed document does not match the configured format");
                return;
            };
            merge_properties(&cache, &subscribers, properties);
        });

        let primary = self.primary_data_id.clone();
        self.add_document_listener(&primary, dispatch).await;
    }

    /// Release listeners and the cache. Remote-side deregistration is
    /// best-effort.
    pub async fn shutdown(&self) {
        let mut listeners = self.doc_listeners.lock().await;
        for listener in listeners.drain(..) {
            if let Some(id) = listener.installed {
                self.backend
                    .remove_listener(&listener.data_id, &self.group, id)
                    .await;
            }
        }
        self.cache.clear();
        self.key_subscribers.clear();
    }
}

/// Merge parsed properties into the cache, dispatching per-key subscribers
/// for every value that actually changed.
fn merge_properties(
    cache: &DashMap<String, String>,
    subscribers: &DashMap<String, Vec<KeyCallback>>,
    properties: HashMap<String, String>,
) {
    for (key, value) in properties {
        let changed = cache
            .insert(key.clone(), value.clone())
            .map_or(true, |old| old != value);
        if changed {
            if let Some(entry) = subscribers.get(&key) {
                for callback in entry.value() {
                    callback(&key, &value);
                }
            }
        }
    }
}

/// Look up a property path in the process environment, both verbatim and in
/// UPPER_SNAKE form (`scheduler.pool.size` → `SCHEDULER_POOL_SIZE`).
fn env_lookup(key: &str) -> Option<String> {
    if let Ok(value) = std::env::var(key) {
        return Some(value);
    }
    let upper = key.replace(['.', '-'], "_").to_uppercase();
    std::env::var(upper).ok()
}

/// Parse a document into flat property paths. Flat JSON objects keep their
/// first-level keys; YAML documents have nested mappings flattened to dotted
/// leaves. Returns None when the content does not match the format.
fn parse_document(content: &str, format: DocumentFormat) -> Option<HashMap<String, String>> {
    match format {
        DocumentFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(content).ok()?;
            let object = value.as_object()?;
            let mut properties = HashMap::new();
            for (key, value) in object {
                properties.insert(key.clone(), json_scalar_to_string(value));
            }
            Some(properties)
        }
        DocumentFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(content).ok()?;
            let mapping = value.as_mapping()?;
            let mut properties = HashMap::new();
            flatten_yaml_mapping("", mapping, &mut properties);
            Some(properties)
        }
    }
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_yaml_mapping(
    prefix: &str,
    mapping: &serde_yaml::Mapping,
    out: &mut HashMap<String, String>,
) {
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            serde_yaml::Value::Mapping(nested) => flatten_yaml_mapping(&path, nested, out),
            serde_yaml::Value::String(s) => {
                out.insert(path, s.clone());
            }
            serde_yaml::Value::Bool(b) => {
                out.insert(path, b.to_string());
            }
            serde_yaml::Value::Number(n) => {
                out.insert(path, n.to_string());
            }
            _ => {}
        }
    }
}
