//! Object storage for re-hosted cover images.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use visapress_shared::{ObjectStorageConfig, PipelineError, Result, read_secret};

use crate::{ImageData, ObjectStore, build_client, error_body};

/// Upload timeout in seconds.
const UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Content-addressed key for an image: `covers/<sha256>.<ext>`.
///
/// Uploading the same bytes twice yields the same key.
pub fn content_key(data: &ImageData) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&data.bytes);
    format!("covers/{:x}.{}", hasher.finalize(), extension_for(&data.content_type))
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "jpg",
    }
}

/// [`ObjectStore`] backed by `POST {endpoint}/object/{bucket}/{key}`.
pub struct HttpObjectStore {
    http: Client,
    endpoint: String,
    bucket: String,
    public_base: String,
    api_key: String,
}

impl HttpObjectStore {
    pub fn new(config: &ObjectStorageConfig, api_key: impl Into<String>) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(PipelineError::config("object_storage.endpoint is not set"));
        }
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let public_base = if config.public_base_url.trim().is_empty() {
            format!("{endpoint}/object/public")
        } else {
            config.public_base_url.trim_end_matches('/').to_string()
        };
        Ok(Self {
            http: build_client(UPLOAD_TIMEOUT_SECS)?,
            endpoint,
            bucket: config.bucket.clone(),
            public_base,
            api_key: api_key.into(),
        })
    }

    /// Build a store reading the API key from the env var named in config.
    pub fn from_env(config: &ObjectStorageConfig) -> Result<Self> {
        let key = read_secret(&config.api_key_env)?;
        Self::new(config, key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{key}", self.public_base, self.bucket)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip_all, fields(key = %key, bytes = data.bytes.len()))]
    async fn put(&self, key: &str, data: &ImageData) -> Result<String> {
        let url = format!("{}/object/{}/{key}", self.endpoint, self.bucket);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, data.content_type.as_str())
            .header("x-upsert", "true")
            .body(data.bytes.clone())
            .send()
            .await
            .map_err(|e| PipelineError::enrichment("image_upload", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(PipelineError::enrichment(
                "image_upload",
                format!("object storage error ({status}): {body}"),
            ));
        }

        let public = self.public_url(key);
        debug!(url = %public, "image uploaded");
        Ok(public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jpeg(bytes: &[u8]) -> ImageData {
        ImageData {
            bytes: bytes.to_vec(),
            content_type: "image/jpeg".into(),
        }
    }

    #[test]
    fn key_is_content_addressed() {
        let a = content_key(&jpeg(b"same"));
        let b = content_key(&jpeg(b"same"));
        let c = content_key(&jpeg(b"other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("covers/"));
        assert!(a.ends_with(".jpg"));
        // sha256 hex digest is 64 chars
        assert_eq!(a.len(), "covers/".len() + 64 + ".jpg".len());
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/webp; charset=binary"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }

    #[test]
    fn missing_endpoint_is_config_error() {
        let config = ObjectStorageConfig::default();
        assert!(matches!(
            HttpObjectStore::new(&config, "key"),
            Err(PipelineError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn put_uploads_and_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/blog-images/covers/abc.jpg"))
            .and(header("authorization", "Bearer store-key"))
            .and(header("content-type", "image/jpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Key": "blog-images/covers/abc.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ObjectStorageConfig {
            endpoint: format!("{}/storage/v1", server.uri()),
            public_base_url: "https://cdn.test".into(),
            ..ObjectStorageConfig::default()
        };
        let store = HttpObjectStore::new(&config, "store-key").unwrap();
        let url = store.put("covers/abc.jpg", &jpeg(b"bytes")).await.unwrap();
        assert_eq!(url, "https://cdn.test/blog-images/covers/abc.jpg");
    }

    #[tokio::test]
    async fn upload_rejection_is_enrichment_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let config = ObjectStorageConfig {
            endpoint: server.uri(),
            ..ObjectStorageConfig::default()
        };
        let store = HttpObjectStore::new(&config, "store-key").unwrap();
        let err = store.put("covers/x.jpg", &jpeg(b"x")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EnrichmentFailed {
                step: "image_upload",
                ..
            }
        ));
    }

    #[test]
    fn public_url_defaults_to_endpoint() {
        let config = ObjectStorageConfig {
            endpoint: "https://proj.test/storage/v1/".into(),
            ..ObjectStorageConfig::default()
        };
        let store = HttpObjectStore::new(&config, "k").unwrap();
        assert_eq!(
            store.public_url("covers/a.jpg"),
            "https://proj.test/storage/v1/object/public/blog-images/covers/a.jpg"
        );
    }
}
