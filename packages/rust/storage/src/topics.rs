//! Topic persistence.

use chrono::Utc;
use libsql::params;
use visapress_shared::{
    Category, Lifecycle, LocalizedTitle, PipelineError, PlanStatus, Result, SearchIntent, Topic,
    TopicProposal, TopicStatus,
};

use crate::Storage;
use crate::rows::{int, json_list, opt_date, opt_text, status, text, timestamp, to_json};

const TOPIC_COLUMNS: &str = "id, plan_id, subject_id, title, title_secondary, slug, description, \
     category, search_intent, target_keywords, search_volume, keyword_difficulty, \
     target_word_count, outline, link_opportunities, priority, status, provenance, reasoning, \
     scheduled_for, created_at, updated_at";

impl Storage {
    /// Insert a plan's topics and advance the plan in one transaction.
    ///
    /// The plan moves from `planning` to `next` with `generated_topics` set to
    /// the number of rows written. If any insert fails, nothing is kept.
    pub async fn insert_plan_topics(
        &self,
        plan_id: &str,
        topics: &[Topic],
        next: PlanStatus,
    ) -> Result<u32> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(PipelineError::persistence)?;

        let outcome = async {
            for topic in topics {
                insert_topic_row(&tx, topic).await?;
            }

            let approved = topics
                .iter()
                .filter(|t| t.status == TopicStatus::Approved)
                .count() as i64;
            let now = Utc::now().to_rfc3339();
            let changed = tx
                .execute(
                    "UPDATE plans SET status = ?1, generated_topics = ?2,
                       approved_topics = approved_topics + ?3, updated_at = ?4
                     WHERE id = ?5 AND status = ?6",
                    params![
                        next.as_str(),
                        topics.len() as i64,
                        approved,
                        now.as_str(),
                        plan_id,
                        PlanStatus::Planning.as_str()
                    ],
                )
                .await
                .map_err(PipelineError::persistence)?;

            if changed != 1 {
                return Err(PipelineError::PersistenceFailed(format!(
                    "plan {plan_id} is no longer in planning"
                )));
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                tx.commit().await.map_err(PipelineError::persistence)?;
                Ok(topics.len() as u32)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, plan_id, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Get a topic by ID.
    pub async fn get_topic(&self, id: &str) -> Result<Option<Topic>> {
        let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_topic(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// List a plan's topics, highest priority first, optionally by status.
    pub async fn list_topics(
        &self,
        plan_id: &str,
        status: Option<TopicStatus>,
    ) -> Result<Vec<Topic>> {
        let sql = format!(
            "SELECT {TOPIC_COLUMNS} FROM topics
             WHERE plan_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY priority DESC, created_at"
        );
        let mut rows = self
            .conn
            .query(&sql, params![plan_id, status.map(|s| s.as_str())])
            .await
            .map_err(PipelineError::persistence)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_topic(&row)?);
        }
        Ok(results)
    }

    /// Move a topic from `from` to `to`. Returns `false` if the topic was not in `from`.
    pub async fn update_topic_status(
        &self,
        id: &str,
        from: TopicStatus,
        to: TopicStatus,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE topics SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now.as_str(), id, from.as_str()],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }

    /// Topics of a plan that are neither published nor rejected.
    pub async fn count_open_topics(&self, plan_id: &str) -> Result<u32> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM topics
                 WHERE plan_id = ?1 AND status NOT IN (?2, ?3)",
                params![
                    plan_id,
                    TopicStatus::Published.as_str(),
                    TopicStatus::Rejected.as_str()
                ],
            )
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(int(&row, 0)? as u32),
            Ok(None) => Ok(0),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }
}

async fn insert_topic_row(conn: &libsql::Connection, topic: &Topic) -> Result<()> {
    let p = &topic.proposal;
    conn.execute(
        "INSERT INTO topics (id, plan_id, subject_id, title, title_secondary, slug, description,
           category, search_intent, target_keywords, search_volume, keyword_difficulty,
           target_word_count, outline, link_opportunities, priority, status, provenance,
           reasoning, scheduled_for, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
           ?18, ?19, ?20, ?21, ?22)",
        params![
            topic.id.as_str(),
            topic.plan_id.as_str(),
            topic.subject_id.as_str(),
            p.title.primary.as_str(),
            p.title.secondary.as_deref(),
            p.slug.as_str(),
            p.description.as_str(),
            p.category.as_str(),
            p.search_intent.as_str(),
            to_json(&p.target_keywords)?,
            i64::from(p.search_volume),
            i64::from(p.keyword_difficulty),
            i64::from(p.target_word_count),
            to_json(&p.outline)?,
            to_json(&p.link_opportunities)?,
            i64::from(p.priority),
            topic.status.as_str(),
            topic.provenance.as_str(),
            p.reasoning.as_str(),
            topic.scheduled_for.map(|d| d.format("%Y-%m-%d").to_string()),
            topic.created_at.to_rfc3339(),
            topic.updated_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(PipelineError::persistence)?;
    Ok(())
}

fn row_to_topic(row: &libsql::Row) -> Result<Topic> {
    let category = text(row, 7)?;
    let intent = text(row, 8)?;
    Ok(Topic {
        id: text(row, 0)?,
        plan_id: text(row, 1)?,
        subject_id: text(row, 2)?,
        proposal: TopicProposal {
            title: LocalizedTitle {
                primary: text(row, 3)?,
                secondary: opt_text(row, 4),
            },
            slug: text(row, 5)?,
            description: text(row, 6)?,
            category: Category::parse(&category).ok_or_else(|| {
                PipelineError::PersistenceFailed(format!("unknown category '{category}'"))
            })?,
            search_intent: SearchIntent::parse(&intent).unwrap_or(SearchIntent::DEFAULT),
            target_keywords: json_list(row, 9)?,
            search_volume: int(row, 10)? as u32,
            keyword_difficulty: int(row, 11)? as u8,
            target_word_count: int(row, 12)? as u32,
            outline: json_list(row, 13)?,
            link_opportunities: json_list(row, 14)?,
            priority: int(row, 15)? as u8,
            reasoning: text(row, 18)?,
        },
        status: status(row, 16)?,
        provenance: text(row, 17)?,
        scheduled_for: opt_date(row, 19)?,
        created_at: timestamp(row, 20)?,
        updated_at: timestamp(row, 21)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::{plan_for, test_storage, topic_for};

    use super::*;

    #[tokio::test]
    async fn batch_insert_advances_plan() {
        let storage = test_storage().await;
        let subject = storage.insert_subject("Italy", "italy").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();

        let topics = vec![
            topic_for(&plan, "Rome on a budget", TopicStatus::Pending),
            topic_for(&plan, "Italian visa fees", TopicStatus::Pending),
        ];
        let inserted = storage
            .insert_plan_topics(&plan.id, &topics, PlanStatus::Review)
            .await
            .expect("insert topics");
        assert_eq!(inserted, 2);

        let plan = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Review);
        assert_eq!(plan.generated_topics, 2);
        assert_eq!(plan.approved_topics, 0);

        let listed = storage.list_topics(&plan.id, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].proposal.target_keywords, vec!["kw".to_string()]);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let storage = test_storage().await;
        let subject = storage.insert_subject("Italy", "italy").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();

        let first = topic_for(&plan, "Rome on a budget", TopicStatus::Pending);
        let mut duplicate = topic_for(&plan, "Duplicate id", TopicStatus::Pending);
        duplicate.id = first.id.clone();

        let result = storage
            .insert_plan_topics(&plan.id, &[first, duplicate], PlanStatus::Review)
            .await;
        assert!(matches!(result, Err(PipelineError::PersistenceFailed(_))));

        assert!(storage.list_topics(&plan.id, None).await.unwrap().is_empty());
        let plan = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Planning);
        assert_eq!(plan.generated_topics, 0);
    }

    #[tokio::test]
    async fn auto_approved_batch_counts_approvals() {
        let storage = test_storage().await;
        let subject = storage.insert_subject("Japan", "japan").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();

        let topics = vec![
            topic_for(&plan, "Cherry blossom season", TopicStatus::Approved),
            topic_for(&plan, "JR pass explained", TopicStatus::Approved),
        ];
        storage
            .insert_plan_topics(&plan.id, &topics, PlanStatus::Generating)
            .await
            .unwrap();

        let plan = storage.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Generating);
        assert_eq!(plan.approved_topics, 2);
        let approved = storage
            .list_topics(&plan.id, Some(TopicStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 2);
    }

    #[tokio::test]
    async fn topic_status_cas_and_open_count() {
        let storage = test_storage().await;
        let subject = storage.insert_subject("Italy", "italy").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();
        let topic = topic_for(&plan, "Venice in winter", TopicStatus::Approved);
        storage
            .insert_plan_topics(&plan.id, std::slice::from_ref(&topic), PlanStatus::Generating)
            .await
            .unwrap();

        assert!(
            storage
                .update_topic_status(&topic.id, TopicStatus::Approved, TopicStatus::Generating)
                .await
                .unwrap()
        );
        // A second caller loses the race.
        assert!(
            !storage
                .update_topic_status(&topic.id, TopicStatus::Approved, TopicStatus::Generating)
                .await
                .unwrap()
        );
        assert_eq!(storage.count_open_topics(&plan.id).await.unwrap(), 1);

        storage
            .update_topic_status(&topic.id, TopicStatus::Generating, TopicStatus::Review)
            .await
            .unwrap();
        storage
            .update_topic_status(&topic.id, TopicStatus::Review, TopicStatus::Published)
            .await
            .unwrap();
        assert_eq!(storage.count_open_topics(&plan.id).await.unwrap(), 0);
    }
}
