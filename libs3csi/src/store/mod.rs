//! Bucket management against an S3-compatible object store.
//!
//! [`BucketStore`] is the narrow contract the Controller needs: existence,
//! idempotent creation and idempotent deletion.  A missing bucket is reported
//! through the typed [`StoreError::NotFound`] variant so callers never have to
//! match on error text.

mod memory;
mod s3;
mod sigv4;

use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use thiserror::Error;
use tracing::warn;

pub use memory::InMemoryBucketStore;
pub use s3::S3BucketStore;

/// Failures reported by a [`BucketStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bucket does not exist.
    #[error("bucket {0} not found")]
    NotFound(String),

    /// The endpoint could not be turned into a request URL.
    #[error("invalid object store endpoint {0}")]
    InvalidEndpoint(String),

    /// The request never produced a response.
    #[error("{operation} {bucket}: {source}")]
    Request {
        operation: &'static str,
        bucket: String,
        #[source]
        source: reqwest::Error,
    },

    /// The object store answered with an error status.
    #[error("{operation} {bucket}: HTTP {status} {code}")]
    Service {
        operation: &'static str,
        bucket: String,
        status: u16,
        /// S3 error code such as `AccessDenied`, or the HTTP reason phrase.
        code: String,
    },
}

/// Bucket lifecycle primitives.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Whether the bucket exists.
    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Create the bucket unless it already exists.
    async fn create_bucket(&self, name: &str) -> Result<(), StoreError>;

    /// Delete the bucket and its content.  An absent bucket is either a
    /// no-op or [`StoreError::NotFound`]; callers treat both as success.
    async fn delete_bucket(&self, name: &str) -> Result<(), StoreError>;
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Endpoint URL, e.g. `https://minio.example.com:9000`.
    pub endpoint_url: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl StoreConfig {
    /// `https` endpoints use TLS, `http` endpoints do not.  Anything that
    /// cannot be parsed into a URL with a host keeps TLS on.
    pub fn use_tls(&self) -> bool {
        match Url::parse(&self.endpoint_url) {
            Ok(url) if url.host_str().is_some() => url.scheme() == "https",
            Ok(_) => {
                warn!(endpoint = %self.endpoint_url, "endpoint has no host, assuming TLS");
                true
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint_url, error = %e, "cannot parse endpoint, assuming TLS");
                true
            }
        }
    }

    /// `host[:port]` of the endpoint, or the raw endpoint string when it
    /// cannot be parsed.
    pub fn endpoint(&self) -> String {
        match Url::parse(&self.endpoint_url) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_owned(),
                (None, _) => self.endpoint_url.clone(),
            },
            Err(_) => self.endpoint_url.clone(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
