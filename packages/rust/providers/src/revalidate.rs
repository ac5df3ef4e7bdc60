//! Page-cache revalidation hook.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;
use visapress_shared::{PipelineError, Result, SiteConfig, read_secret};

use crate::{CacheInvalidator, build_client, error_body};

const REVALIDATE_TIMEOUT_SECS: u64 = 10;

/// [`CacheInvalidator`] that posts `{"paths": [...]}` to the site.
pub struct RevalidateHook {
    http: Client,
    url: Url,
    secret: Option<String>,
}

#[derive(Serialize)]
struct RevalidateRequest<'a> {
    paths: &'a [String],
}

impl RevalidateHook {
    pub fn new(url: &str, secret: Option<String>) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| PipelineError::config(format!("invalid revalidate_url '{url}': {e}")))?;
        Ok(Self {
            http: build_client(REVALIDATE_TIMEOUT_SECS)?,
            url,
            secret,
        })
    }

    /// Build the hook from `[site]`, or `None` when `revalidate_url` is empty.
    ///
    /// A missing secret env var is tolerated; the request is then sent
    /// without credentials.
    pub fn from_config(site: &SiteConfig) -> Result<Option<Self>> {
        if site.revalidate_url.trim().is_empty() {
            return Ok(None);
        }
        let secret = read_secret(&site.revalidate_secret_env).ok();
        Self::new(&site.revalidate_url, secret).map(Some)
    }
}

#[async_trait]
impl CacheInvalidator for RevalidateHook {
    #[instrument(skip_all, fields(paths = paths.len()))]
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        let mut request = self
            .http
            .post(self.url.clone())
            .json(&RevalidateRequest { paths });
        if let Some(secret) = &self.secret {
            request = request.header(AUTHORIZATION, format!("Bearer {secret}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::enrichment("cache_invalidation", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(PipelineError::enrichment(
                "cache_invalidation",
                format!("revalidate hook error ({status}): {body}"),
            ));
        }
        debug!("cache invalidated");
        Ok(())
    }
}

/// Invalidator used when no revalidation endpoint is configured.
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        debug!(paths = paths.len(), "cache invalidation disabled");
        Ok(())
    }
}
