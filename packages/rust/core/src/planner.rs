//! Topic planner: one LLM call turns a subject and period into a Plan of
//! topic proposals.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use visapress_sanitizer::{ParseMode, sanitize_topics};
use visapress_shared::{
    AutoSchedule, Period, PipelineError, Plan, PlanStatus, Result, Topic, TopicProposal,
    TopicStatus, new_id, transition,
};

use crate::{Pipeline, TOPIC_COUNT_RANGE, prompts};

/// Input of [`Pipeline::create_plan`].
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub subject_id: String,
    pub period: Period,
    /// Defaults to `pipeline.default_topic_count`.
    pub topic_count: Option<u32>,
    /// Insert topics as `approved` and move the plan straight to `generating`.
    pub auto_approve: bool,
    pub auto_schedule: Option<AutoSchedule>,
}

impl PlanRequest {
    pub fn new(subject_id: impl Into<String>, period: Period) -> Self {
        Self {
            subject_id: subject_id.into(),
            period,
            topic_count: None,
            auto_approve: false,
            auto_schedule: None,
        }
    }
}

/// Result of a successful plan creation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub plan_id: String,
    pub topics_generated: u32,
    /// Whether the topic array had to be salvaged from a broken response.
    pub recovered: bool,
    /// Proposals discarded for lacking a title.
    pub dropped: usize,
}

impl Pipeline {
    /// Create a plan and its topics for one subject.
    ///
    /// On failure the plan stays in `planning` with no topics attached.
    #[instrument(skip_all, fields(subject_id = %request.subject_id, period = %request.period))]
    pub async fn create_plan(&self, request: &PlanRequest) -> Result<PlanOutcome> {
        let count = request
            .topic_count
            .unwrap_or(self.settings.default_topic_count);
        if !TOPIC_COUNT_RANGE.contains(&count) {
            return Err(PipelineError::validation(format!(
                "topic count must be between {} and {}, got {count}",
                TOPIC_COUNT_RANGE.start(),
                TOPIC_COUNT_RANGE.end()
            )));
        }

        let subject = self
            .storage
            .get_subject(&request.subject_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("subject", &request.subject_id))?;

        let now = Utc::now();
        let plan = Plan {
            id: new_id(),
            subject_id: subject.id.clone(),
            period: request.period,
            requested_topics: count,
            status: PlanStatus::Planning,
            generated_topics: 0,
            approved_topics: 0,
            auto_schedule: request.auto_schedule,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_plan(&plan).await?;
        info!(plan_id = %plan.id, count, "plan created");

        let prompt = prompts::topic_plan(
            &subject,
            request.period,
            count,
            self.settings.secondary_locale.as_deref(),
        );
        let completion = self.llm.complete(&prompt).await.inspect_err(|e| {
            error!(plan_id = %plan.id, error = %e, "topic generation failed");
        })?;

        let sanitized = sanitize_topics(&completion.text).inspect_err(|e| {
            error!(plan_id = %plan.id, error = %e, "topic response unusable");
        })?;
        if sanitized.mode == ParseMode::Recovered {
            warn!(
                plan_id = %plan.id,
                salvaged = sanitized.topics.len(),
                "topic response was truncated; kept well-formed prefix"
            );
        }
        if sanitized.topics.is_empty() {
            return Err(PipelineError::GenerationFailed(
                "model returned no usable topics".into(),
            ));
        }

        let mut proposals = sanitized.topics;
        if proposals.len() > count as usize {
            warn!(
                returned = proposals.len(),
                requested = count,
                "model returned extra topics; keeping the first ones"
            );
            proposals.truncate(count as usize);
        }

        let (topic_status, next_plan_status) = if request.auto_approve {
            (TopicStatus::Approved, PlanStatus::Generating)
        } else {
            (TopicStatus::Pending, PlanStatus::Review)
        };
        transition(&plan.id, plan.status, next_plan_status)?;

        let provenance = format!("llm:{}", completion.model);
        let topics = build_topics(&plan, proposals, topic_status, &provenance);
        let inserted = self
            .storage
            .insert_plan_topics(&plan.id, &topics, next_plan_status)
            .await?;

        info!(
            plan_id = %plan.id,
            topics = inserted,
            status = %next_plan_status,
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            "plan ready"
        );

        Ok(PlanOutcome {
            plan_id: plan.id,
            topics_generated: inserted,
            recovered: sanitized.mode == ParseMode::Recovered,
            dropped: sanitized.dropped,
        })
    }
}

/// Turn proposals into topic rows, highest priority first.
///
/// With an auto-schedule, the i-th topic in that order gets
/// `start_date + floor(i * 7 / posts_per_week)`.
fn build_topics(
    plan: &Plan,
    mut proposals: Vec<TopicProposal>,
    status: TopicStatus,
    provenance: &str,
) -> Vec<Topic> {
    proposals.sort_by(|a, b| b.priority.cmp(&a.priority));
    let now = Utc::now();
    proposals
        .into_iter()
        .enumerate()
        .map(|(i, proposal)| Topic {
            id: new_id(),
            plan_id: plan.id.clone(),
            subject_id: plan.subject_id.clone(),
            proposal,
            status,
            provenance: provenance.to_string(),
            scheduled_for: plan.auto_schedule.map(|s| s.date_for(i)),
            created_at: now,
            updated_at: now,
        })
        .collect()
}
