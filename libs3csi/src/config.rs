//! Driver configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! the `MINIO_*` environment variables.  The binary applies its command-line
//! flags on top and calls [`DriverConfig::validate`] last.
//!
//! ```yaml
//! endpoint: quic://0.0.0.0:10000
//! node_id: worker-1
//! s3:
//!   endpoint: https://minio.example.com:9000
//!   region: us-east-1
//!   bucket_prefix: pvc
//! tls:
//!   cert_path: /etc/s3csi/tls.crt
//!   key_path: /etc/s3csi/tls.key
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::StoreConfig;

pub const DEFAULT_ENDPOINT: &str = "quic://0.0.0.0:10000";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MOUNT_BINARY_S3: &str = "/usr/bin/mount-s3";
pub const DEFAULT_MOUNT_BINARY: &str = "/bin/mount";
pub const DEFAULT_DRIVER_NAME: &str = "s3.csi.rk8s.io";

pub const ENV_S3_ENDPOINT: &str = "MINIO_ENDPOINT";
pub const ENV_S3_REGION: &str = "MINIO_REGION";
pub const ENV_BUCKET_PREFIX: &str = "MINIO_BUCKET_PREFIX";
pub const ENV_ACCESS_KEY: &str = "MINIO_ACCESSKEY";
pub const ENV_SECRET_KEY: &str = "MINIO_SECRETKEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("{name} binary not found at {path}")]
    BinaryNotFound { name: &'static str, path: PathBuf },
}

/// Complete driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Listen address, `quic://host:port`.
    pub endpoint: String,
    pub node_id: String,
    /// S3 FUSE bridge used for staging.
    pub mount_binary_s3: PathBuf,
    /// System `mount` used for publishing bind mounts.
    pub mount_binary: PathBuf,
    pub tls: TlsConfig,
    pub s3: S3Config,
    pub credentials: S3Credentials,
    pub meta: Meta,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            node_id: String::new(),
            mount_binary_s3: PathBuf::from(DEFAULT_MOUNT_BINARY_S3),
            mount_binary: PathBuf::from(DEFAULT_MOUNT_BINARY),
            tls: TlsConfig::default(),
            s3: S3Config::default(),
            credentials: S3Credentials::default(),
            meta: Meta::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// Object store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    /// Prepended to every bucket name as `<prefix>-<volume>`.
    pub bucket_prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: DEFAULT_REGION.to_owned(),
            bucket_prefix: String::new(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl S3Credentials {
    pub fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &str| if v.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("S3Credentials")
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &mask(&self.secret_key))
            .finish()
    }
}

/// Identity reported through `GetPluginInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub driver_name: String,
    pub driver_version: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            driver_name: DEFAULT_DRIVER_NAME.to_owned(),
            driver_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl DriverConfig {
    /// Defaults, overlaid with `path` when given, overlaid with the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Override settings from environment variables.  Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = var(ENV_S3_ENDPOINT) {
            self.s3.endpoint = v;
        }
        if let Some(v) = var(ENV_S3_REGION) {
            self.s3.region = v;
        }
        if let Some(v) = var(ENV_BUCKET_PREFIX) {
            self.s3.bucket_prefix = v;
        }
        if let Some(v) = var(ENV_ACCESS_KEY) {
            self.credentials.access_key = v;
        }
        if let Some(v) = var(ENV_SECRET_KEY) {
            self.credentials.secret_key = v;
        }
    }

    /// Check required settings and fill in derived defaults.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }
        if self.node_id.is_empty() {
            return Err(ConfigError::Missing("node_id"));
        }
        if self.s3.endpoint.is_empty() {
            return Err(ConfigError::Missing("s3.endpoint"));
        }
        if self.tls.cert_path.is_none() {
            return Err(ConfigError::Missing("tls.cert_path"));
        }
        if self.tls.key_path.is_none() {
            return Err(ConfigError::Missing("tls.key_path"));
        }
        if self.s3.region.is_empty() {
            self.s3.region = DEFAULT_REGION.to_owned();
        }
        // Staging reports InvalidArgument for each volume instead.
        if !self.credentials.is_complete() {
            warn!("S3 credentials are not configured, staging will be refused");
        }
        Ok(())
    }

    /// Both mount binaries must exist before the driver starts serving.
    pub fn preflight(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("S3 mount", &self.mount_binary_s3),
            ("mount", &self.mount_binary),
        ] {
            if !path.is_file() {
                return Err(ConfigError::BinaryNotFound {
                    name,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            endpoint_url: self.s3.endpoint.clone(),
            region: self.s3.region.clone(),
            access_key: self.credentials.access_key.clone(),
            secret_key: self.credentials.secret_key.clone(),
        }
    }
}
