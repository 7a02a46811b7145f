// HTTP ConfigStore backend speaking a Nacos-style REST surface.
//
// Change listeners are implemented as per-document polling tasks that diff a
// content digest; the remote long-poll protocol is out of scope for the core.

use super::{ChangeCallback, ConfigStoreBackend, ListenerId};
use crate::config::ConfigStoreConfig;
use crate::errors::RemoteConfigError;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct HttpConfigStore {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    poll_interval: Duration,
    watchers: DashMap<ListenerId, CancellationToken>,
    next_listener_id: AtomicU64,
}

impl HttpConfigStore {
    pub fn new(config: &ConfigStoreConfig) -> Result<Self, RemoteConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RemoteConfigError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.server_addr.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            watchers: DashMap::new(),
            next_listener_id: AtomicU64::new(0),
        })
    }

    fn configs_url(&self) -> String {
        format!("{}/v1/cs/configs", self.base_url)
    }

    fn digest(content: &str) -> u64 {
        let hash = Sha256::digest(content.as_bytes());
        u64::from_be_bytes(hash[..8].try_into().expect("sha256 yields 32 bytes"))
    }
}

#[async_trait]
impl ConfigStoreBackend for HttpConfigStore {
    async fn get_config(
        &self,
        data_id: &str,
        group: &str,
        timeout_ms: u64,
    ) -> Result<String, RemoteConfigError> {
        let response = self
            .client
            .get(self.configs_url())
            .query(&[
                ("dataId", data_id),
                ("group", group),
                ("tenant", &self.namespace),
            ])
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.text().await?)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(RemoteConfigError::DocumentNotFound(data_id.to_string()))
        } else {
            Err(RemoteConfigError::Unavailable(format!(
                "unexpected status {} for data id {}",
                status, data_id
            )))
        }
    }

    async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) -> Result<bool, RemoteConfigError> {
        let response = self
            .client
            .post(self.configs_url())
            .form(&[
                ("dataId", data_id),
                ("group", group),
                ("tenant", &self.namespace),
                ("content", content),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RemoteConfigError::PublishRejected {
                data_id: data_id.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let body = response.text().await?;
        Ok(body.trim() == "true")
    }

    async fn add_listener(
        &self,
        data_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<ListenerId, RemoteConfigError> {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        self.watchers.insert(id, token.clone());

        let client = self.client.clone();
        let url = self.configs_url();
        let namespace = self.namespace.clone();
        let data_id = data_id.to_string();
        let group = group.to_string();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last_digest: Option<u64> = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(data_id = %data_id, "Config watcher cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }

                let response = client
                    .get(&url)
                    .query(&[
                        ("dataId", data_id.as_str()),
                        ("group", group.as_str()),
                        ("tenant", namespace.as_str()),
                    ])
                    .send()
                    .await;

                let content = match response {
                    Ok(resp) if resp.status().is_success() => match resp.text().await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(data_id = %data_id, error = %e, "Config watcher read failed");
                            continue;
                        }
                    },
                    Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => continue,
                    Ok(resp) => {
                        warn!(data_id = %data_id, status = %resp.status(), "Config watcher poll failed");
                        continue;
                    }
                    Err(e) => {
                        warn!(data_id = %data_id, error = %e, "Config watcher poll failed");
                        continue;
                    }
                };

                let digest = Self::digest(&content);
                if last_digest != Some(digest) {
                    // First observation primes the digest without firing.
                    if last_digest.is_some() {
                        callback(&data_id, &content);
                    }
                    last_digest = Some(digest);
                }
            }
        });

        Ok(id)
    }

    async fn remove_listener(&self, _data_id: &str, _group: &str, listener: ListenerId) {
        if let Some((_, token)) = self.watchers.remove(&listener) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = HttpConfigStore::digest("content");
        let b = HttpConfigStore::digest("content");
        let c = HttpConfigStore::digest("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut config = ConfigStoreConfig {
            server_addr: "http://localhost:8848/".to_string(),
            namespace: "public".to_string(),
            group: "DEFAULT_GROUP".to_string(),
            data_id: "scheduler.properties.json".to_string(),
            format: crate::config::DocumentFormat::Json,
            timeout_ms: 3000,
            poll_interval_seconds: 10,
        };
        let store = HttpConfigStore::new(&config).unwrap();
        assert_eq!(store.configs_url(), "http://localhost:8848/v1/cs/configs");

        config.server_addr = "http://localhost:8848".to_string();
        let store = HttpConfigStore::new(&config).unwrap();
        assert_eq!(store.configs_url(), "http://localhost:8848/v1/cs/configs");
    }
}
