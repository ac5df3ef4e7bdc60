//! Publisher: promotes an approved content row into the public store.
//!
//! The post insert is the only step that decides who publishes. Everything
//! after it is a list of independent steps; a failed step is logged and
//! reported in [`PublishOutcome::enrichment_failures`] without undoing the
//! post.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use visapress_shared::{
    Content, ContentStatus, Lifecycle, PipelineError, PlanStatus, PublishedPost, Result,
    TopicStatus, new_id, transition,
};

use crate::{EnrichmentFailure, Pipeline};

/// Result of a successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub published_entity_id: String,
    pub url: String,
    pub enrichment_failures: Vec<EnrichmentFailure>,
}

impl Pipeline {
    /// Publish an `approved` content row.
    ///
    /// Returns [`PipelineError::AlreadyPublished`] with the existing post when
    /// the content was published before or by a concurrent caller. A post
    /// left behind by an interrupted publish is finished before that error
    /// is returned.
    #[instrument(skip_all, fields(content_id = %content_id))]
    pub async fn publish_content(&self, content_id: &str) -> Result<PublishOutcome> {
        let content = self
            .storage
            .get_content(content_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("content", content_id))?;

        if let Some(existing) = &content.publish_ref {
            let slug = match self.storage.get_post_by_content(&content.id).await? {
                Some(post) => post.slug,
                None => content.slug.clone(),
            };
            return Err(PipelineError::AlreadyPublished {
                entity_id: existing.clone(),
                url: self.settings.public_url(&slug),
            });
        }
        transition(&content.id, content.status, ContentStatus::Published)?;

        let post = post_from(&content, Utc::now());
        if !self.storage.insert_post(&post).await? {
            let existing = self
                .storage
                .get_post_by_content(&content.id)
                .await?
                .ok_or_else(|| {
                    PipelineError::PersistenceFailed(format!(
                        "post for content {} vanished after conflict",
                        content.id
                    ))
                })?;
            info!(post_id = %existing.id, "post already exists; finishing it");
            let outcome = self.complete_publish(&content, existing).await?;
            return Err(PipelineError::AlreadyPublished {
                entity_id: outcome.published_entity_id,
                url: outcome.url,
            });
        }
        info!(post_id = %post.id, "post created");

        let outcome = self.complete_publish(&content, post).await?;
        info!(
            post_id = %outcome.published_entity_id,
            url = %outcome.url,
            failed_steps = outcome.enrichment_failures.len(),
            "content published"
        );
        Ok(outcome)
    }

    /// Everything after the post insert. Each step is idempotent, so a
    /// retry after an interruption picks up where the last attempt stopped.
    async fn complete_publish(
        &self,
        content: &Content,
        mut post: PublishedPost,
    ) -> Result<PublishOutcome> {
        let mut failures = Vec::new();

        match self.claim_route(content, &post).await {
            Ok(slug) => {
                if slug != post.slug {
                    if let Err(e) = self.storage.update_post_slug(&post.id, &slug).await {
                        failures.push(EnrichmentFailure::record("route", e));
                    }
                    post.slug = slug;
                }
            }
            Err(e) => failures.push(EnrichmentFailure::record("route", e)),
        }
        let route = self.settings.route_path(&post.slug);
        let url = self.settings.public_url(&post.slug);

        if let Err(e) = self
            .storage
            .link_subject_post(&content.subject_id, &post.id)
            .await
        {
            failures.push(EnrichmentFailure::record("subject_link", e));
        }

        self.mark_published(content, &post.id, post.created_at).await?;

        if let Err(e) = self.finish_topic(&content.topic_id).await {
            failures.push(EnrichmentFailure::record("topic_status", e));
        }

        let mut paths = vec![route];
        if !self.settings.route_prefix.is_empty() {
            paths.push(format!("/{}", self.settings.route_prefix));
        }
        if let Err(e) = self.invalidator.invalidate(&paths).await {
            failures.push(EnrichmentFailure::record("cache_invalidation", e));
        }

        Ok(PublishOutcome {
            published_entity_id: post.id,
            url,
            enrichment_failures: failures,
        })
    }

    /// Find a route path for the post and return the slug it is served under.
    ///
    /// Paths owned by another post are skipped; candidates are the content
    /// slug, then the slug suffixed with the subject, then with the post id.
    async fn claim_route(&self, content: &Content, post: &PublishedPost) -> Result<String> {
        let subject_slug = self
            .storage
            .get_subject(&content.subject_id)
            .await?
            .map(|s| s.slug);
        let candidates = route_candidates(&content.slug, subject_slug.as_deref(), &post.id);

        for slug in candidates {
            let path = self.settings.route_path(&slug);
            if self.storage.insert_route(&path, &post.id).await? {
                return Ok(slug);
            }
            match self.storage.get_route_target(&path).await? {
                Some(owner) if owner == post.id => return Ok(slug),
                Some(owner) => debug!(%path, %owner, "route taken; trying next"),
                None => {
                    return Err(PipelineError::enrichment(
                        "route",
                        format!("path {path} was not stored"),
                    ));
                }
            }
        }
        Err(PipelineError::enrichment(
            "route",
            format!("no free path for slug {}", content.slug),
        ))
    }

    /// Write the publish reference. A lost compare-and-set is fine when the
    /// row already points at this post.
    async fn mark_published(
        &self,
        content: &Content,
        post_id: &str,
        at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if self
            .storage
            .mark_content_published(&content.id, post_id, at)
            .await?
        {
            return Ok(());
        }
        let current = self.storage.get_content(&content.id).await?;
        match current {
            Some(c) if c.publish_ref.as_deref() == Some(post_id) => Ok(()),
            Some(c) => Err(PipelineError::PersistenceFailed(format!(
                "content {} changed during publish (status `{}`)",
                c.id, c.status
            ))),
            None => Err(PipelineError::not_found("content", &content.id)),
        }
    }

    /// Move the topic to `published` and roll its plan up when nothing is
    /// left to publish.
    async fn finish_topic(&self, topic_id: &str) -> Result<()> {
        let topic = self
            .storage
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("topic", topic_id))?;
        if topic.status != TopicStatus::Published {
            transition(&topic.id, topic.status, TopicStatus::Published)?;
            if !self
                .storage
                .update_topic_status(&topic.id, topic.status, TopicStatus::Published)
                .await?
            {
                warn!(topic_id = %topic.id, "topic status changed concurrently");
            }
        }
        self.roll_up_plan(&topic.plan_id).await
    }

    /// Mark a plan `published` once it has no open topics.
    pub(crate) async fn roll_up_plan(&self, plan_id: &str) -> Result<()> {
        if self.storage.count_open_topics(plan_id).await? > 0 {
            return Ok(());
        }
        let Some(plan) = self.storage.get_plan(plan_id).await? else {
            return Err(PipelineError::not_found("plan", plan_id));
        };
        if !plan.status.can_transition_to(PlanStatus::Published) {
            return Ok(());
        }
        if self
            .storage
            .update_plan_status(plan_id, plan.status, PlanStatus::Published)
            .await?
        {
            info!(%plan_id, "plan fully published");
        }
        Ok(())
    }
}

fn post_from(content: &Content, now: chrono::DateTime<Utc>) -> PublishedPost {
    PublishedPost {
        id: new_id(),
        source_content_id: content.id.clone(),
        title: content.title.clone(),
        slug: content.slug.clone(),
        body: content.body.clone(),
        meta_title: content.meta_title.clone(),
        meta_description: content.meta_description.clone(),
        cover_image_url: content.cover_image.as_ref().map(|c| c.url.clone()),
        created_at: now,
    }
}

/// Slugs to try for a route, most readable first. The last one embeds the
/// random tail of the post id and is unique per post.
fn route_candidates(slug: &str, subject_slug: Option<&str>, post_id: &str) -> Vec<String> {
    let mut candidates = vec![slug.to_string()];
    if let Some(subject) = subject_slug.filter(|s| !s.is_empty() && !slug.ends_with(*s)) {
        candidates.push(format!("{slug}-{subject}"));
    }
    let tail: String = post_id
        .chars()
        .rev()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    candidates.push(format!("{slug}-{tail}"));
    candidates
}
