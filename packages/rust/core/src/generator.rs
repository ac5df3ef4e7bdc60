//! Article generator: one approved topic becomes one content row.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use visapress_providers::content_key;
use visapress_sanitizer::{count_words, sanitize_article};
use visapress_shared::{
    Content, ContentStatus, CoverImage, PipelineError, Result, TopicStatus, new_id, transition,
};

use crate::{EnrichmentFailure, ImageServices, Pipeline, prompts};

/// Result of a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub content_id: String,
    pub word_count: u32,
    pub has_image: bool,
    pub enrichment_failures: Vec<EnrichmentFailure>,
}

impl Pipeline {
    /// Generate the article for an `approved` topic.
    ///
    /// The topic moves to `generating` before the model is called. A failed
    /// generation leaves it there; [`Pipeline::reset_topic`] puts it back.
    /// Image failures are not fatal: the content is saved without a cover.
    #[instrument(skip_all, fields(topic_id = %topic_id))]
    pub async fn generate_content(&self, topic_id: &str) -> Result<GenerationOutcome> {
        let topic = self
            .storage
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("topic", topic_id))?;
        transition(&topic.id, topic.status, TopicStatus::Generating)?;

        let subject = self
            .storage
            .get_subject(&topic.subject_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("subject", &topic.subject_id))?;

        if !self
            .storage
            .update_topic_status(&topic.id, TopicStatus::Approved, TopicStatus::Generating)
            .await?
        {
            // Another caller moved the topic first.
            let current = self
                .storage
                .get_topic(&topic.id)
                .await?
                .map(|t| t.status)
                .unwrap_or(topic.status);
            return Err(PipelineError::invalid_state(
                "topic",
                &topic.id,
                current.to_string(),
                TopicStatus::Generating.to_string(),
            ));
        }
        info!(title = %topic.proposal.title.primary, "generating article");

        let prompt = prompts::article(&topic, &subject, self.settings.secondary_locale.as_deref());
        let completion = self.llm.complete(&prompt).await.inspect_err(|e| {
            error!(error = %e, "article generation failed; topic left in generating");
        })?;
        let draft = sanitize_article(&completion.text, &topic.proposal.title).inspect_err(|e| {
            error!(error = %e, "article response unusable; topic left in generating");
        })?;

        let mut enrichment_failures = Vec::new();
        let cover_image = match (&draft.image_query, &self.images) {
            (Some(query), Some(images)) => match resolve_cover(images, query).await {
                Ok(cover) => cover,
                Err(e) => {
                    enrichment_failures.push(EnrichmentFailure::record("image", e));
                    None
                }
            },
            (Some(_), None) => {
                debug!("image services not configured; skipping cover");
                None
            }
            (None, _) => None,
        };

        let now = Utc::now();
        let word_count = count_words(&draft.body);
        let content = Content {
            id: new_id(),
            topic_id: topic.id.clone(),
            subject_id: topic.subject_id.clone(),
            title: draft.title,
            slug: draft.slug,
            body: draft.body,
            meta_title: draft.meta_title,
            meta_description: draft.meta_description,
            target_keywords: topic.proposal.target_keywords.clone(),
            cover_image,
            internal_links: draft.internal_links,
            word_count,
            readability_score: draft.readability_score,
            seo_score: draft.seo_score,
            model: completion.model,
            tokens_in: completion.tokens_in,
            tokens_out: completion.tokens_out,
            status: ContentStatus::Review,
            publish_ref: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_generated_content(&content).await?;

        let has_image = content.cover_image.is_some();
        info!(
            content_id = %content.id,
            word_count,
            has_image,
            tokens_out = content.tokens_out,
            "article ready for review"
        );

        Ok(GenerationOutcome {
            content_id: content.id,
            word_count,
            has_image,
            enrichment_failures,
        })
    }
}

/// Search, download and re-host a cover photo.
///
/// `Ok(None)` means the search found nothing, which is not a failure.
async fn resolve_cover(images: &ImageServices, query: &str) -> Result<Option<CoverImage>> {
    let Some(photo) = images.photos.search(query).await? else {
        debug!(%query, "no photo found");
        return Ok(None);
    };
    let data = images.photos.download(&photo).await?;
    let key = content_key(&data);
    let url = images.store.put(&key, &data).await?;
    Ok(Some(CoverImage {
        url,
        attribution: photo.attribution(),
        source_url: photo.page_url,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use visapress_shared::{Period, PlanStatus};

    use super::*;
    use crate::test_support::{
        FakePhotos, MemoryStore, ScriptedLlm, article_json, pipeline_with, seed_subject,
        topics_json,
    };
    use crate::{Pipeline, PlanRequest};

    /// Plan one auto-approved topic and return its id.
    async fn approved_topic(pipeline: &Pipeline) -> String {
        let italy = seed_subject(pipeline, "Italy").await;
        let mut request = PlanRequest::new(&italy.id, Period::new(2025, 6).unwrap());
        request.topic_count = Some(1);
        request.auto_approve = true;
        let plan = pipeline.create_plan(&request).await.unwrap();
        let topics = pipeline.storage().list_topics(&plan.plan_id, None).await.unwrap();
        topics[0].id.clone()
    }

    #[tokio::test]
    async fn generates_content_with_cover() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(topics_json(1)),
            Ok(article_json(Some("rome skyline"))),
        ]));
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline_with(llm).await.with_images(ImageServices {
            photos: Arc::new(FakePhotos { fail: false }),
            store: store.clone(),
        });
        let topic_id = approved_topic(&pipeline).await;

        let outcome = pipeline.generate_content(&topic_id).await.expect("generate");
        assert!(outcome.has_image);
        assert!(outcome.enrichment_failures.is_empty());
        assert_eq!(outcome.word_count, 9);

        let content = pipeline
            .storage()
            .get_content(&outcome.content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.status, ContentStatus::Review);
        assert_eq!(content.target_keywords, vec!["visa".to_string()]);
        let cover = content.cover_image.expect("cover");
        assert!(cover.url.starts_with("https://cdn.test/blog-images/covers/"));
        assert_eq!(cover.attribution, "Photo by Ada Lovelace on Unsplash");
        assert_eq!(store.keys.lock().unwrap().len(), 1);

        let topic = pipeline.storage().get_topic(&topic_id).await.unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Review);
    }

    #[tokio::test]
    async fn image_timeout_still_saves_content() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(topics_json(1)),
            Ok(article_json(Some("rome skyline"))),
        ]));
        let pipeline = pipeline_with(llm).await.with_images(ImageServices {
            photos: Arc::new(FakePhotos { fail: true }),
            store: Arc::new(MemoryStore::default()),
        });
        let topic_id = approved_topic(&pipeline).await;

        let outcome = pipeline.generate_content(&topic_id).await.expect("generate");
        assert!(!outcome.has_image);
        assert_eq!(outcome.enrichment_failures.len(), 1);
        assert_eq!(outcome.enrichment_failures[0].step, "image_search");

        let content = pipeline
            .storage()
            .get_content(&outcome.content_id)
            .await
            .unwrap()
            .unwrap();
        assert!(content.cover_image.is_none());
    }

    #[tokio::test]
    async fn no_image_query_means_no_cover_and_no_failure() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(topics_json(1)), Ok(article_json(None))]));
        let pipeline = pipeline_with(llm).await;
        let topic_id = approved_topic(&pipeline).await;

        let outcome = pipeline.generate_content(&topic_id).await.unwrap();
        assert!(!outcome.has_image);
        assert!(outcome.enrichment_failures.is_empty());
    }

    #[tokio::test]
    async fn pending_topic_is_invalid_state() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(topics_json(1))]));
        let pipeline = pipeline_with(llm.clone()).await;
        let italy = seed_subject(&pipeline, "Italy").await;
        let mut request = PlanRequest::new(&italy.id, Period::new(2025, 6).unwrap());
        request.topic_count = Some(1);
        let plan = pipeline.create_plan(&request).await.unwrap();
        let topic = &pipeline.storage().list_topics(&plan.plan_id, None).await.unwrap()[0];

        let err = pipeline.generate_content(&topic.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { entity: "topic", .. }));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn failed_generation_leaves_topic_generating_and_blocks_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(topics_json(1)),
            Ok("not json at all".into()),
        ]));
        let pipeline = pipeline_with(llm).await;
        let topic_id = approved_topic(&pipeline).await;

        let err = pipeline.generate_content(&topic_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));

        let topic = pipeline.storage().get_topic(&topic_id).await.unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Generating);

        let err = pipeline.generate_content(&topic_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { .. }));

        let plan = pipeline.storage().get_plan(&topic.plan_id).await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Generating);
    }

    #[tokio::test]
    async fn missing_topic_is_not_found() {
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::new(vec![]))).await;
        let err = pipeline.generate_content("nope").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "topic", .. }));
    }
}
