//! Bulk plan fan-out across many subjects.
//!
//! Subjects run one after another with a fixed pause in between. Each
//! subject is its own failure boundary: an error becomes an entry in
//! [`BulkReport::failed_subjects`] and the loop moves on.

use serde::Serialize;
use tracing::{info, instrument, warn};

use visapress_shared::{AutoSchedule, Period, PipelineError, Result};

use crate::Pipeline;
use crate::planner::{PlanOutcome, PlanRequest};

/// Input of [`Pipeline::bulk_create_plans`].
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub subject_ids: Vec<String>,
    pub period: Period,
    pub topics_per_subject: Option<u32>,
    pub auto_approve: bool,
    pub auto_schedule: Option<AutoSchedule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedPlan {
    pub subject_id: String,
    pub plan_id: String,
    pub topics: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSubject {
    pub subject_id: String,
    pub error: String,
}

/// Aggregate of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub requested: usize,
    pub created_plans: Vec<CreatedPlan>,
    pub failed_subjects: Vec<FailedSubject>,
    pub total_topics_created: u32,
}

impl BulkReport {
    /// Fold per-subject outcomes into a report.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<PlanOutcome>)>,
    {
        outcomes
            .into_iter()
            .fold(Self::default(), |mut report, (subject_id, outcome)| {
                report.requested += 1;
                match outcome {
                    Ok(plan) => {
                        report.total_topics_created += plan.topics_generated;
                        report.created_plans.push(CreatedPlan {
                            subject_id,
                            plan_id: plan.plan_id,
                            topics: plan.topics_generated,
                        });
                    }
                    Err(e) => report.failed_subjects.push(FailedSubject {
                        subject_id,
                        error: e.to_string(),
                    }),
                }
                report
            })
    }
}

/// Progress callbacks for a bulk run.
pub trait BulkProgress: Send + Sync {
    /// Called before a subject starts.
    fn subject_started(&self, subject_id: &str, current: usize, total: usize);
    /// Called after a subject finishes, successfully or not.
    fn subject_finished(&self, subject_id: &str, outcome: &Result<PlanOutcome>);
    /// Called once with the final report.
    fn done(&self, report: &BulkReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentBulkProgress;

impl BulkProgress for SilentBulkProgress {
    fn subject_started(&self, _subject_id: &str, _current: usize, _total: usize) {}
    fn subject_finished(&self, _subject_id: &str, _outcome: &Result<PlanOutcome>) {}
    fn done(&self, _report: &BulkReport) {}
}

impl Pipeline {
    /// Create one plan per subject.
    ///
    /// Only an empty subject list is an error; per-subject failures are
    /// reported in the returned [`BulkReport`].
    #[instrument(skip_all, fields(subjects = request.subject_ids.len(), period = %request.period))]
    pub async fn bulk_create_plans(
        &self,
        request: &BulkRequest,
        progress: &dyn BulkProgress,
    ) -> Result<BulkReport> {
        if request.subject_ids.is_empty() {
            return Err(PipelineError::validation("no subjects given"));
        }

        let total = request.subject_ids.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, subject_id) in request.subject_ids.iter().enumerate() {
            if i > 0 && !self.settings.bulk_delay.is_zero() {
                tokio::time::sleep(self.settings.bulk_delay).await;
            }
            progress.subject_started(subject_id, i + 1, total);

            let plan_request = PlanRequest {
                subject_id: subject_id.clone(),
                period: request.period,
                topic_count: request.topics_per_subject,
                auto_approve: request.auto_approve,
                auto_schedule: request.auto_schedule,
            };
            let outcome = self.create_plan(&plan_request).await;
            if let Err(e) = &outcome {
                warn!(%subject_id, error = %e, "subject failed; continuing");
            }
            progress.subject_finished(subject_id, &outcome);
            outcomes.push((subject_id.clone(), outcome));
        }

        let report = BulkReport::from_outcomes(outcomes);
        info!(
            requested = report.requested,
            created = report.created_plans.len(),
            failed = report.failed_subjects.len(),
            topics = report.total_topics_created,
            "bulk run finished"
        );
        progress.done(&report);
        Ok(report)
    }
}
