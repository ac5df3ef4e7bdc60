//! Unsplash photo search.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, instrument};
use visapress_shared::{PipelineError, Result, UnsplashConfig, read_secret};

use crate::{ImageData, Photo, PhotoSearch, build_client, error_body};

/// Maximum image size accepted for re-hosting (15 MB).
const MAX_IMAGE_BYTES: usize = 15 * 1024 * 1024;

/// [`PhotoSearch`] backed by `GET {base_url}/search/photos`.
pub struct UnsplashClient {
    http: Client,
    base_url: String,
    access_key: String,
    max_image_bytes: usize,
}

impl UnsplashClient {
    pub fn new(config: &UnsplashConfig, access_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: access_key.into(),
            max_image_bytes: MAX_IMAGE_BYTES,
        })
    }

    /// Override the download size cap.
    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    /// Build a client reading the access key from the env var named in config.
    pub fn from_env(config: &UnsplashConfig) -> Result<Self> {
        let key = read_secret(&config.access_key_env)?;
        Self::new(config, key)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    urls: Urls,
    #[serde(default)]
    links: Option<Links>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct Urls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    name: String,
}

#[async_trait]
impl PhotoSearch for UnsplashClient {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(&self, query: &str) -> Result<Option<Photo>> {
        let url = format!("{}/search/photos", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("per_page", "1"),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::enrichment("image_search", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(PipelineError::enrichment(
                "image_search",
                format!("Unsplash API error ({status}): {body}"),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::enrichment("image_search", e.to_string()))?;

        let photo = parsed.results.into_iter().next().map(|r| Photo {
            image_url: r.urls.regular,
            page_url: r.links.and_then(|l| l.html),
            photographer: r
                .user
                .map(|u| u.name)
                .unwrap_or_else(|| "Unknown".to_string()),
        });
        debug!(found = photo.is_some(), "photo search finished");
        Ok(photo)
    }

    #[instrument(skip_all, fields(url = %photo.image_url))]
    async fn download(&self, photo: &Photo) -> Result<ImageData> {
        let mut response = self
            .http
            .get(&photo.image_url)
            .send()
            .await
            .map_err(|e| PipelineError::enrichment("image_download", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::enrichment(
                "image_download",
                format!("HTTP {status}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let too_large = |size: u64| {
            PipelineError::enrichment("image_download", format!("image too large ({size} bytes)"))
        };
        if let Some(len) = response.content_length() {
            if len > self.max_image_bytes as u64 {
                return Err(too_large(len));
            }
        }

        // The declared length may be absent or wrong; cap while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::enrichment("image_download", e.to_string()))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > self.max_image_bytes {
                return Err(too_large(bytes.len() as u64));
            }
        }

        if bytes.is_empty() {
            return Err(PipelineError::enrichment("image_download", "empty image body"));
        }

        Ok(ImageData {
            bytes,
            content_type,
        })
    }
}
