//! Plan persistence.

use chrono::Utc;
use libsql::params;
use visapress_shared::{
    AutoSchedule, Lifecycle, Period, PipelineError, Plan, PlanStatus, Result,
};

use crate::Storage;
use crate::rows::{int, opt_date, status, text, timestamp};

const PLAN_COLUMNS: &str = "id, subject_id, period, requested_topics, status, generated_topics, \
     approved_topics, schedule_start, posts_per_week, created_at, updated_at";

impl Storage {
    /// Insert a new plan record.
    pub async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        self.check_writable()?;
        let (schedule_start, posts_per_week) = match &plan.auto_schedule {
            Some(s) => (
                Some(s.start_date.format("%Y-%m-%d").to_string()),
                Some(i64::from(s.posts_per_week)),
            ),
            None => (None, None),
        };
        self.conn
            .execute(
                "INSERT INTO plans (id, subject_id, period, requested_topics, status,
                   generated_topics, approved_topics, schedule_start, posts_per_week,
                   created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    plan.id.as_str(),
                    plan.subject_id.as_str(),
                    plan.period.to_string(),
                    i64::from(plan.requested_topics),
                    plan.status.as_str(),
                    i64::from(plan.generated_topics),
                    i64::from(plan.approved_topics),
                    schedule_start,
                    posts_per_week,
                    plan.created_at.to_rfc3339(),
                    plan.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }

    /// Get a plan by ID.
    pub async fn get_plan(&self, id: &str) -> Result<Option<Plan>> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_plan(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// List plans, newest first, optionally for one subject.
    pub async fn list_plans(&self, subject_id: Option<&str>) -> Result<Vec<Plan>> {
        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM plans
             WHERE (?1 IS NULL OR subject_id = ?1)
             ORDER BY created_at DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![subject_id])
            .await
            .map_err(PipelineError::persistence)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_plan(&row)?);
        }
        Ok(results)
    }

    /// Move a plan from `from` to `to`. Returns `false` if the plan was not in `from`.
    pub async fn update_plan_status(
        &self,
        id: &str,
        from: PlanStatus,
        to: PlanStatus,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE plans SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now.as_str(), id, from.as_str()],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }

    /// Bump the approved-topic counter of a plan.
    pub async fn increment_plan_approved(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE plans SET approved_topics = approved_topics + 1, updated_at = ?1
                 WHERE id = ?2",
                params![now.as_str(), id],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }

    /// Take back one approval, never going below zero.
    pub async fn decrement_plan_approved(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE plans SET approved_topics = MAX(approved_topics - 1, 0), updated_at = ?1
                 WHERE id = ?2",
                params![now.as_str(), id],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }
}

fn row_to_plan(row: &libsql::Row) -> Result<Plan> {
    let period: Period = text(row, 2)?.parse()?;
    let auto_schedule = match (opt_date(row, 7)?, row.get::<i64>(8).ok()) {
        (Some(start_date), Some(per_week)) => Some(AutoSchedule {
            start_date,
            posts_per_week: per_week as u32,
        }),
        _ => None,
    };
    Ok(Plan {
        id: text(row, 0)?,
        subject_id: text(row, 1)?,
        period,
        requested_topics: int(row, 3)? as u32,
        status: status(row, 4)?,
        generated_topics: int(row, 5)? as u32,
        approved_topics: int(row, 6)? as u32,
        auto_schedule,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}
