//! Approval, rejection and recovery operations.

use tracing::{info, instrument, warn};

use visapress_shared::{
    ContentStatus, Lifecycle, PipelineError, PlanStatus, Result, Topic, TopicStatus, transition,
};

use crate::Pipeline;

impl Pipeline {
    /// Approve a `pending` topic.
    ///
    /// Bumps the plan's approval counter; the first approval on a plan in
    /// `review` moves it to `generating`.
    #[instrument(skip_all, fields(topic_id = %topic_id))]
    pub async fn approve_topic(&self, topic_id: &str) -> Result<()> {
        let topic = self.move_topic(topic_id, TopicStatus::Approved).await?;
        self.storage.increment_plan_approved(&topic.plan_id).await?;

        if let Some(plan) = self.storage.get_plan(&topic.plan_id).await? {
            if plan.status == PlanStatus::Review
                && self
                    .storage
                    .update_plan_status(&plan.id, PlanStatus::Review, PlanStatus::Generating)
                    .await?
            {
                info!(plan_id = %plan.id, "plan moved to generating");
            }
        }
        info!("topic approved");
        Ok(())
    }

    /// Reject a `pending` or `approved` topic. Rejection is terminal.
    ///
    /// Rejecting an approved topic takes its approval off the plan counter.
    #[instrument(skip_all, fields(topic_id = %topic_id))]
    pub async fn reject_topic(&self, topic_id: &str) -> Result<()> {
        let topic = self.move_topic(topic_id, TopicStatus::Rejected).await?;
        if topic.status == TopicStatus::Approved {
            self.storage.decrement_plan_approved(&topic.plan_id).await?;
        }
        info!("topic rejected");
        // The rejected topic may have been the last one keeping the plan open.
        self.roll_up_plan(&topic.plan_id).await
    }

    /// Put a topic stuck in `generating` back to `approved`.
    ///
    /// Operator recovery after a failed generation; never run automatically.
    #[instrument(skip_all, fields(topic_id = %topic_id))]
    pub async fn reset_topic(&self, topic_id: &str) -> Result<()> {
        let topic = self.load_topic(topic_id).await?;
        if !topic.status.can_reset() {
            return Err(PipelineError::invalid_state(
                TopicStatus::ENTITY,
                &topic.id,
                topic.status.as_str(),
                TopicStatus::Approved.as_str(),
            ));
        }
        if self.storage.get_content_for_topic(&topic.id).await?.is_some() {
            return Err(PipelineError::validation(format!(
                "topic {} already has generated content",
                topic.id
            )));
        }
        self.compare_and_set_topic(&topic, TopicStatus::Approved).await?;
        warn!("topic reset from generating to approved");
        Ok(())
    }

    /// Approve a content row in `review`.
    #[instrument(skip_all, fields(content_id = %content_id))]
    pub async fn approve_content(&self, content_id: &str) -> Result<()> {
        self.move_content(content_id, ContentStatus::Approved).await?;
        info!("content approved");
        Ok(())
    }

    /// Reject a content row in `review`. Rejection is terminal.
    #[instrument(skip_all, fields(content_id = %content_id))]
    pub async fn reject_content(&self, content_id: &str) -> Result<()> {
        self.move_content(content_id, ContentStatus::Rejected).await?;
        info!("content rejected");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_topic(&self, topic_id: &str) -> Result<Topic> {
        self.storage
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("topic", topic_id))
    }

    async fn move_topic(&self, topic_id: &str, to: TopicStatus) -> Result<Topic> {
        let topic = self.load_topic(topic_id).await?;
        transition(&topic.id, topic.status, to)?;
        self.compare_and_set_topic(&topic, to).await?;
        Ok(topic)
    }

    async fn compare_and_set_topic(&self, topic: &Topic, to: TopicStatus) -> Result<()> {
        if self
            .storage
            .update_topic_status(&topic.id, topic.status, to)
            .await?
        {
            return Ok(());
        }
        let current = self.load_topic(&topic.id).await?.status;
        Err(PipelineError::invalid_state(
            TopicStatus::ENTITY,
            &topic.id,
            current.as_str(),
            to.as_str(),
        ))
    }

    async fn move_content(&self, content_id: &str, to: ContentStatus) -> Result<()> {
        let content = self
            .storage
            .get_content(content_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("content", content_id))?;
        transition(&content.id, content.status, to)?;
        if self
            .storage
            .update_content_status(&content.id, content.status, to)
            .await?
        {
            return Ok(());
        }
        Err(PipelineError::invalid_state(
            ContentStatus::ENTITY,
            &content.id,
            content.status.as_str(),
            to.as_str(),
        ))
    }
}
