// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment tag (dev, test, prod). Isolates the natural-key space of
    /// jobs. Overridable with APP_ENVIRONMENT.
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub config_store: ConfigStoreConfig,
    pub scheduler: SchedulerSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

/// ConfigStore endpoint settings. `server_addr` empty means no remote store;
/// the adapter then serves from cache, process environment, and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreConfig {
    pub server_addr: String,
    pub namespace: String,
    pub group: String,
    /// Primary document holding process-level properties.
    pub data_id: String,
    /// Document format, selected by extension: "json" or "yaml".
    pub format: DocumentFormat,
    pub timeout_ms: u64,
    /// Change-detection poll cadence for the HTTP backend.
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Grace period granted to in-flight fires on shutdown.
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Recognised plain environment variables: APP_ENVIRONMENT selects the
    /// deployment tag; CONFIG_SERVER_ADDR / CONFIG_NAMESPACE / CONFIG_GROUP
    /// point the ConfigStore adapter at its endpoint.
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("APP_ENVIRONMENT") {
            if !env.is_empty() {
                self.environment = env;
            }
        }
        if let Ok(addr) = std::env::var("CONFIG_SERVER_ADDR") {
            if !addr.is_empty() {
                self.config_store.server_addr = addr;
            }
        }
        if let Ok(ns) = std::env::var("CONFIG_NAMESPACE") {
            if !ns.is_empty() {
                self.config_store.namespace = ns;
            }
        }
        if let Ok(group) = std::env::var("CONFIG_GROUP") {
            if !group.is_empty() {
                self.config_store.group = group;
            }
        }
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.environment.is_empty() {
            return Err("environment cannot be empty".to_string());
        }

        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.config_store.group.is_empty() {
            return Err("ConfigStore group cannot be empty".to_string());
        }
        if self.config_store.data_id.is_empty() {
            return Err("ConfigStore data_id cannot be empty".to_string());
        }
        if self.config_store.poll_interval_seconds == 0 {
            return Err("ConfigStore poll_interval_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/job_center".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            config_store: ConfigStoreConfig {
                server_addr: String::new(),
                namespace: "public".to_string(),
                group: "DEFAULT_GROUP".to_string(),
                data_id: "scheduler.properties.json".to_string(),
                format: DocumentFormat::Json,
                timeout_ms: 3000,
                poll_interval_seconds: 10,
            },
            scheduler: SchedulerSettings {
                shutdown_grace_seconds: 5,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
