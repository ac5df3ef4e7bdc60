//! External collaborators of the content pipeline.
//!
//! Each collaborator is a trait so pipeline stages can run against the HTTP
//! clients in production and against in-memory fakes in tests:
//!
//! | Trait | HTTP client |
//! |---|---|
//! | [`TextGenerator`] | [`OpenRouterClient`] |
//! | [`PhotoSearch`] | [`UnsplashClient`] |
//! | [`ObjectStore`] | [`HttpObjectStore`] |
//! | [`CacheInvalidator`] | [`RevalidateHook`] |
//!
//! Every call is a single attempt bounded by the client timeout. Retrying is
//! left to the operator.

mod object_store;
mod openrouter;
mod revalidate;
mod unsplash;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use visapress_shared::{PipelineError, Result};

pub use object_store::{HttpObjectStore, content_key};
pub use openrouter::OpenRouterClient;
pub use revalidate::{NoopInvalidator, RevalidateHook};
pub use unsplash::UnsplashClient;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("Visapress/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

/// A single-turn prompt.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Model output plus usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Large language model backend.
///
/// Failures are reported as [`PipelineError::GenerationFailed`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// A stock photo chosen for an article.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    /// Direct URL of the image file.
    pub image_url: String,
    /// Page on the stock-photo site.
    pub page_url: Option<String>,
    pub photographer: String,
}

impl Photo {
    /// Credit line shown under the cover image.
    pub fn attribution(&self) -> String {
        format!("Photo by {} on Unsplash", self.photographer)
    }
}

/// Downloaded image bytes.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Stock-photo search.
#[async_trait]
pub trait PhotoSearch: Send + Sync {
    /// Top result for `query`, or `None` when nothing matches.
    async fn search(&self, query: &str) -> Result<Option<Photo>>;

    /// Fetch the image file of a search result.
    async fn download(&self, photo: &Photo) -> Result<ImageData>;
}

/// Durable object storage for re-hosted images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return its public URL.
    async fn put(&self, key: &str, data: &ImageData) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Cache invalidation
// ---------------------------------------------------------------------------

/// Drops cached renderings of site routes after a publish.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, paths: &[String]) -> Result<()>;
}

/// Build a reqwest client with the shared user agent and a request timeout.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {e}")))
}

/// Read an error response body for diagnostics, capped to a short preview.
async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    visapress_shared::preview(&body).to_string()
}
