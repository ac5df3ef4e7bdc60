//! Pipeline stages for Visapress.
//!
//! The [`Pipeline`] holds the datastore and every external collaborator.
//! Each stage is an independently invocable method, grouped by module:
//!
//! - [`planner`]: `create_plan`
//! - [`bulk`]: `bulk_create_plans`
//! - [`generator`]: `generate_content`
//! - [`publisher`]: `publish_content`
//! - [`approval`]: approve / reject / reset operations

pub mod approval;
pub mod bulk;
pub mod generator;
pub mod planner;
pub mod prompts;
pub mod publisher;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use visapress_providers::{CacheInvalidator, NoopInvalidator, ObjectStore, PhotoSearch, TextGenerator};
use visapress_shared::{AppConfig, PipelineError};
use visapress_storage::Storage;

pub use bulk::{BulkProgress, BulkReport, BulkRequest, CreatedPlan, FailedSubject, SilentBulkProgress};
pub use generator::GenerationOutcome;
pub use planner::{PlanOutcome, PlanRequest};
pub use publisher::PublishOutcome;

/// Accepted range for the number of topics in one plan.
pub const TOPIC_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

/// Stage settings taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public origin of the site, without trailing slash.
    pub site_url: String,
    /// Path segment articles are routed under.
    pub route_prefix: String,
    pub secondary_locale: Option<String>,
    pub default_topic_count: u32,
    pub bulk_delay: Duration,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            site_url: config.site.base_url.trim_end_matches('/').to_string(),
            route_prefix: config.site.route_prefix.trim_matches('/').to_string(),
            secondary_locale: config.site.secondary_locale.clone(),
            default_topic_count: config.pipeline.default_topic_count,
            bulk_delay: Duration::from_millis(config.pipeline.bulk_delay_ms),
        }
    }

    /// Route path of an article, e.g. `/blog/italy-visa-guide`.
    pub fn route_path(&self, slug: &str) -> String {
        if self.route_prefix.is_empty() {
            format!("/{slug}")
        } else {
            format!("/{}/{slug}", self.route_prefix)
        }
    }

    /// Absolute URL of an article.
    pub fn public_url(&self, slug: &str) -> String {
        format!("{}{}", self.site_url, self.route_path(slug))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Stock photo search plus the storage images are re-hosted on.
#[derive(Clone)]
pub struct ImageServices {
    pub photos: Arc<dyn PhotoSearch>,
    pub store: Arc<dyn ObjectStore>,
}

/// A best-effort step that failed without aborting its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentFailure {
    pub step: String,
    pub message: String,
}

impl EnrichmentFailure {
    /// Record `err` as a failure of `step`, logging it.
    ///
    /// An [`PipelineError::EnrichmentFailed`] keeps its own step name.
    pub(crate) fn record(step: &'static str, err: PipelineError) -> Self {
        let (step, message) = match err {
            PipelineError::EnrichmentFailed { step, message } => (step, message),
            other => (step, other.to_string()),
        };
        warn!(step, error = %message, "enrichment step failed");
        Self {
            step: step.to_string(),
            message,
        }
    }
}

/// Datastore and collaborators shared by all stages.
pub struct Pipeline {
    storage: Storage,
    llm: Arc<dyn TextGenerator>,
    images: Option<ImageServices>,
    invalidator: Arc<dyn CacheInvalidator>,
    settings: Settings,
}

impl Pipeline {
    pub fn new(storage: Storage, llm: Arc<dyn TextGenerator>, settings: Settings) -> Self {
        Self {
            storage,
            llm,
            images: None,
            invalidator: Arc::new(NoopInvalidator),
            settings,
        }
    }

    /// Enable cover images.
    pub fn with_images(mut self, images: ImageServices) -> Self {
        self.images = Some(images);
        self
    }

    /// Invalidate cached pages after a publish.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory collaborators for stage tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use visapress_providers::{Completion, ImageData, Photo, Prompt};
    use visapress_shared::{Result, Subject, new_id};

    use super::*;

    /// Replays scripted completions in order.
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn complete(&self, _prompt: &Prompt) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PipelineError::GenerationFailed("no scripted reply".into())));
            next.map(|text| Completion {
                text,
                model: "test/model".into(),
                tokens_in: 10,
                tokens_out: 20,
            })
        }
    }

    /// Photo search that either finds one photo or fails like a timeout.
    pub struct FakePhotos {
        pub fail: bool,
    }

    #[async_trait]
    impl PhotoSearch for FakePhotos {
        async fn search(&self, _query: &str) -> Result<Option<Photo>> {
            if self.fail {
                return Err(PipelineError::enrichment(
                    "image_search",
                    "operation timed out",
                ));
            }
            Ok(Some(Photo {
                image_url: "https://images.test/photo.jpg".into(),
                page_url: Some("https://unsplash.test/photos/1".into()),
                photographer: "Ada Lovelace".into(),
            }))
        }

        async fn download(&self, _photo: &Photo) -> Result<ImageData> {
            Ok(ImageData {
                bytes: b"jpeg bytes".to_vec(),
                content_type: "image/jpeg".into(),
            })
        }
    }

    /// Object store that records keys and returns a CDN URL.
    #[derive(Default)]
    pub struct MemoryStore {
        pub keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, key: &str, _data: &ImageData) -> Result<String> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("https://cdn.test/blog-images/{key}"))
        }
    }

    /// Invalidator that records paths, or fails every call.
    #[derive(Default)]
    pub struct RecordingInvalidator {
        pub fail: bool,
        pub paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CacheInvalidator for RecordingInvalidator {
        async fn invalidate(&self, paths: &[String]) -> Result<()> {
            if self.fail {
                return Err(PipelineError::enrichment("cache_invalidation", "HTTP 500"));
            }
            self.paths.lock().unwrap().extend_from_slice(paths);
            Ok(())
        }
    }

    pub async fn temp_storage() -> Storage {
        let path = std::env::temp_dir().join(format!("vp_core_test_{}.db", new_id()));
        Storage::open(&path).await.expect("open test db")
    }

    pub fn settings() -> Settings {
        Settings {
            site_url: "https://visas.test".into(),
            route_prefix: "blog".into(),
            secondary_locale: None,
            default_topic_count: 20,
            bulk_delay: Duration::ZERO,
        }
    }

    pub async fn pipeline_with(llm: Arc<dyn TextGenerator>) -> Pipeline {
        Pipeline::new(temp_storage().await, llm, settings())
    }

    pub async fn seed_subject(pipeline: &Pipeline, name: &str) -> Subject {
        let slug = name.to_lowercase();
        pipeline
            .storage()
            .insert_subject(name, &slug)
            .await
            .expect("insert subject")
    }

    /// A planning response with `n` well-formed topics.
    pub fn topics_json(n: usize) -> String {
        let topics: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Topic {i}"),
                    "slug": format!("topic-{i}"),
                    "description": "desc",
                    "category": "visa_procedures",
                    "search_intent": "informational",
                    "target_keywords": ["visa"],
                    "search_volume": 100,
                    "keyword_difficulty": 30,
                    "target_word_count": 1200,
                    "outline": ["Intro", "Steps"],
                    "internal_link_opportunities": [],
                    "priority": (i % 10) + 1,
                    "reasoning": "demand"
                })
            })
            .collect();
        serde_json::json!({ "topics": topics }).to_string()
    }

    /// An article-generation response.
    pub fn article_json(image_query: Option<&str>) -> String {
        let mut article = serde_json::json!({
            "title": "Rome on a budget",
            "slug": "rome-on-a-budget",
            "content": "<h2>Intro</h2><p>Rome can be cheap if you plan ahead.</p>",
            "meta_title": "Rome on a budget",
            "meta_description": "How to visit Rome without overspending.",
            "internal_links": [
                {"url": "/blog/italy-visa", "anchor": "Italy visa guide", "position": 1, "context": "before you go"}
            ],
            "readability_score": 70,
            "seo_score": 85
        });
        if let Some(q) = image_query {
            article["image_search_query"] = serde_json::Value::String(q.to_string());
        }
        article.to_string()
    }

    #[test]
    fn route_and_url_from_settings() {
        let s = settings();
        assert_eq!(s.route_path("rome"), "/blog/rome");
        assert_eq!(s.public_url("rome"), "https://visas.test/blog/rome");

        let bare = Settings {
            route_prefix: String::new(),
            ..settings()
        };
        assert_eq!(bare.route_path("rome"), "/rome");
    }

    #[test]
    fn enrichment_failure_keeps_step_of_enrichment_errors() {
        let f = EnrichmentFailure::record(
            "image",
            PipelineError::enrichment("image_upload", "HTTP 403"),
        );
        assert_eq!(f.step, "image_upload");
        assert_eq!(f.message, "HTTP 403");

        let f = EnrichmentFailure::record("route", PipelineError::PersistenceFailed("busy".into()));
        assert_eq!(f.step, "route");
        assert!(f.message.contains("busy"));
    }
}
