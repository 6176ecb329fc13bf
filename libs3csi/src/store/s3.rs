//! [`BucketStore`] that speaks the S3 REST API with path-style addressing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info, instrument};

use super::sigv4::Signer;
use super::{BucketStore, StoreConfig, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REGION: &str = "us-east-1";
/// MinIO removes a non-empty bucket when this header is set.
const FORCE_DELETE_HEADER: &str = "x-minio-force-delete";

/// Bucket operations against an S3-compatible endpoint.
pub struct S3BucketStore {
    client: Client,
    base_url: String,
    host: String,
    config: StoreConfig,
}

impl S3BucketStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let host = config.endpoint();
        if host.is_empty() || host.contains('/') {
            return Err(StoreError::InvalidEndpoint(config.endpoint_url.clone()));
        }
        let scheme = if config.use_tls() { "https" } else { "http" };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| StoreError::Request {
                operation: "build client",
                bucket: String::new(),
                source,
            })?;

        debug!(endpoint = %host, scheme, region = %config.region, "S3 bucket store initialized");
        Ok(Self {
            client,
            base_url: format!("{scheme}://{host}"),
            host,
            config,
        })
    }

    fn region(&self) -> &str {
        if self.config.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.config.region
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        bucket: &str,
        body: Vec<u8>,
        force_delete: bool,
    ) -> Result<(StatusCode, String), StoreError> {
        let path = format!("/{bucket}");
        let signer = Signer {
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
            region: self.region(),
        };
        let signed = signer.sign(
            method.as_str(),
            &self.host,
            &path,
            &body,
            chrono::Utc::now(),
        );

        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("authorization", signed.authorization);
        if force_delete {
            request = request.header(FORCE_DELETE_HEADER, "true");
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let request_error = |source| StoreError::Request {
            operation,
            bucket: bucket.to_owned(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let text = response.text().await.map_err(request_error)?;
        Ok((status, text))
    }

    fn service_error(
        operation: &'static str,
        bucket: &str,
        status: StatusCode,
        body: &str,
    ) -> StoreError {
        let code = error_code(body)
            .map(str::to_owned)
            .or_else(|| status.canonical_reason().map(str::to_owned))
            .unwrap_or_default();
        if status == StatusCode::NOT_FOUND || code == "NoSuchBucket" {
            return StoreError::NotFound(bucket.to_owned());
        }
        StoreError::Service {
            operation,
            bucket: bucket.to_owned(),
            status: status.as_u16(),
            code,
        }
    }

    fn create_body(&self) -> Vec<u8> {
        let region = self.region();
        if region == DEFAULT_REGION {
            return Vec::new();
        }
        format!(
            "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <LocationConstraint>{region}</LocationConstraint></CreateBucketConfiguration>"
        )
        .into_bytes()
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    #[instrument(skip(self))]
    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        let (status, body) = self
            .send("head bucket", Method::HEAD, name, Vec::new(), false)
            .await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Self::service_error("head bucket", name, s, &body)),
        }
    }

    #[instrument(skip(self))]
    async fn create_bucket(&self, name: &str) -> Result<(), StoreError> {
        if self.bucket_exists(name).await? {
            debug!("bucket already exists");
            return Ok(());
        }

        let (status, body) = self
            .send("create bucket", Method::PUT, name, self.create_body(), false)
            .await?;
        if status.is_success() {
            info!("bucket created");
            return Ok(());
        }
        // Lost a race against a concurrent create of the same name.
        if status == StatusCode::CONFLICT && error_code(&body) == Some("BucketAlreadyOwnedByYou") {
            debug!("bucket created concurrently");
            return Ok(());
        }
        Err(Self::service_error("create bucket", name, status, &body))
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        if !self.bucket_exists(name).await? {
            debug!("bucket already absent");
            return Ok(());
        }

        let (status, body) = self
            .send("delete bucket", Method::DELETE, name, Vec::new(), true)
            .await?;
        if status.is_success() {
            info!("bucket deleted");
            return Ok(());
        }
        Err(Self::service_error("delete bucket", name, status, &body))
    }
}

/// Content of the `<Code>` element of an S3 XML error document.
fn error_code(body: &str) -> Option<&str> {
    let start = body.find("<Code>")? + "<Code>".len();
    let len = body[start..].find("</Code>")?;
    Some(body[start..start + len].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: String,
    }

    type Responder = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

    /// Minimal HTTP/1.1 server answering one request per connection.
    async fn fake_s3(respond: Arc<Responder>) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let respond = respond.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let header_end = loop {
                        let n = sock.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
                    let mut lines = head.split("\r\n");
                    let mut request_line = lines.next().unwrap().split(' ');
                    let method = request_line.next().unwrap().to_owned();
                    let path = request_line.next().unwrap().to_owned();
                    let headers: HashMap<String, String> = lines
                        .filter_map(|l| l.split_once(':'))
                        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
                        .collect();
                    let len: usize = headers
                        .get("content-length")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    while buf.len() < header_end + len {
                        let n = sock.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();

                    let (status, reply) = respond(&method, &path);
                    log.lock().unwrap().push(Seen {
                        method: method.clone(),
                        path,
                        headers,
                        body,
                    });
                    let payload = if method == "HEAD" { "" } else { reply.as_str() };
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                        payload.len()
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn store(endpoint: &str, region: &str) -> S3BucketStore {
        S3BucketStore::new(StoreConfig {
            endpoint_url: endpoint.into(),
            region: region.into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
        })
        .unwrap()
    }

    fn s3_error(code: &str) -> String {
        format!("<?xml version=\"1.0\"?><Error><Code>{code}</Code><Message>m</Message></Error>")
    }

    #[test]
    fn parses_error_code() {
        assert_eq!(error_code(&s3_error("NoSuchBucket")), Some("NoSuchBucket"));
        assert_eq!(error_code("not xml"), None);
    }

    #[test]
    fn rejects_endpoint_without_host() {
        let err = S3BucketStore::new(StoreConfig::default()).err().unwrap();
        assert!(matches!(err, StoreError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn head_maps_status_to_existence() {
        let (url, seen) = fake_s3(Arc::new(|_: &str, path: &str| match path {
            "/present" => (200, String::new()),
            "/forbidden" => (403, String::new()),
            _ => (404, String::new()),
        }))
        .await;
        let store = store(&url, "us-east-1");

        assert!(store.bucket_exists("present").await.unwrap());
        assert!(!store.bucket_exists("absent").await.unwrap());
        let err = store.bucket_exists("forbidden").await.unwrap_err();
        assert!(matches!(err, StoreError::Service { status: 403, .. }));

        let seen = seen.lock().unwrap();
        let first = &seen[0];
        assert_eq!(first.method, "HEAD");
        assert!(
            first.headers["authorization"]
                .starts_with("AWS4-HMAC-SHA256 Credential=ak/")
        );
        assert!(first.headers.contains_key("x-amz-date"));
    }

    #[tokio::test]
    async fn create_puts_location_constraint_outside_default_region() {
        let (url, seen) = fake_s3(Arc::new(|method: &str, _: &str| match method {
            "HEAD" => (404, String::new()),
            _ => (200, String::new()),
        }))
        .await;

        store(&url, "eu-west-1").create_bucket("data").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].method, "PUT");
        assert_eq!(seen[1].path, "/data");
        assert!(seen[1].body.contains("<LocationConstraint>eu-west-1</LocationConstraint>"));
    }

    #[tokio::test]
    async fn create_skips_existing_bucket() {
        let (url, seen) = fake_s3(Arc::new(|_: &str, _: &str| (200, String::new()))).await;

        store(&url, "us-east-1").create_bucket("data").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "HEAD");
    }

    #[tokio::test]
    async fn create_tolerates_concurrent_creation() {
        let (url, _) = fake_s3(Arc::new(|method: &str, _: &str| match method {
            "HEAD" => (404, String::new()),
            _ => (409, s3_error("BucketAlreadyOwnedByYou")),
        }))
        .await;

        store(&url, "us-east-1").create_bucket("data").await.unwrap();
    }

    #[tokio::test]
    async fn create_reports_foreign_bucket() {
        let (url, _) = fake_s3(Arc::new(|method: &str, _: &str| match method {
            "HEAD" => (404, String::new()),
            _ => (409, s3_error("BucketAlreadyExists")),
        }))
        .await;

        let err = store(&url, "us-east-1")
            .create_bucket("data")
            .await
            .unwrap_err();
        match err {
            StoreError::Service { status, code, .. } => {
                assert_eq!(status, 409);
                assert_eq!(code, "BucketAlreadyExists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_forces_removal_of_content() {
        let (url, seen) = fake_s3(Arc::new(|method: &str, _: &str| match method {
            "HEAD" => (200, String::new()),
            _ => (204, String::new()),
        }))
        .await;

        store(&url, "us-east-1").delete_bucket("data").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].method, "DELETE");
        assert_eq!(seen[1].headers[FORCE_DELETE_HEADER], "true");
    }

    #[tokio::test]
    async fn delete_of_absent_bucket_is_a_no_op() {
        let (url, seen) = fake_s3(Arc::new(|_: &str, _: &str| (404, String::new()))).await;

        store(&url, "us-east-1").delete_bucket("gone").await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_race_reports_not_found() {
        let (url, _) = fake_s3(Arc::new(|method: &str, _: &str| match method {
            "HEAD" => (200, String::new()),
            _ => (404, s3_error("NoSuchBucket")),
        }))
        .await;

        let err = store(&url, "us-east-1")
            .delete_bucket("gone")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "gone"));
    }
}
