//! Configuration management for the File Transfer Server

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default chunk size: 100KB
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Maximum upload size: 250MB
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 250 * 1024 * 1024;

/// Topic chunk records are published on
pub const DEFAULT_UPLOAD_TOPIC: &str = "file/upload/request";

/// Per-subscriber buffer of the in-process channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Any S3-compatible endpoint (AWS, MinIO, S3Ninja, R2)
    S3,
    /// Process-local store, contents are lost on exit
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub max_upload_size: usize,
    pub upload_topic: String,
    pub channel_capacity: usize,
    /// Idle time after which an incomplete session is evicted. `None` keeps sessions forever.
    pub session_ttl: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            upload_topic: DEFAULT_UPLOAD_TOPIC.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            session_ttl: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::S3,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "file-transfer".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                force_path_style: true,
            },
            transfer: TransferConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env::var("STORAGE_PROVIDER")
            .unwrap_or_else(|_| "s3".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageProvider::Memory,
            "s3" => StorageProvider::S3,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        // The in-memory provider needs no credentials; fall back to defaults for it.
        let defaults = Config::default();
        let required = |name: &'static str, fallback: &str| -> Result<String, ConfigError> {
            match (env::var(name), provider) {
                (Ok(value), _) => Ok(value),
                (Err(_), StorageProvider::Memory) => Ok(fallback.to_string()),
                (Err(_), StorageProvider::S3) => Err(ConfigError::Missing(name)),
            }
        };

        let chunk_size = parse_var("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        let ttl_secs: u64 = parse_var("SESSION_TTL_SECS", 0)?;

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
            },
            storage: StorageConfig {
                provider,
                endpoint: required("AWS_S3_ENDPOINT", &defaults.storage.endpoint)?,
                bucket: required("AWS_BUCKET_NAME", &defaults.storage.bucket)?,
                access_key: required("AWS_ACCESS_KEY_ID", &defaults.storage.access_key)?,
                secret_key: required("AWS_SECRET_ACCESS_KEY", &defaults.storage.secret_key)?,
                region: env::var("AWS_REGION").ok(),
                force_path_style: parse_var("AWS_S3_FORCE_PATH_STYLE", true)?,
            },
            transfer: TransferConfig {
                chunk_size,
                max_upload_size: parse_var("MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE)?,
                upload_topic: env::var("UPLOAD_TOPIC")
                    .unwrap_or_else(|_| DEFAULT_UPLOAD_TOPIC.to_string()),
                channel_capacity: parse_var("CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?,
                session_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            },
        })
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
