//! Generated article persistence.

use chrono::Utc;
use libsql::params;
use visapress_shared::{
    Content, ContentStatus, CoverImage, Lifecycle, LocalizedTitle, PipelineError, Result,
    TopicStatus,
};

use crate::Storage;
use crate::rows::{int, json_list, opt_text, opt_timestamp, real, status, text, timestamp, to_json};

const CONTENT_COLUMNS: &str = "id, topic_id, subject_id, title, title_secondary, slug, body, \
     meta_title, meta_description, target_keywords, cover_image_url, cover_attribution, \
     cover_source_url, internal_links, word_count, readability_score, seo_score, model, \
     tokens_in, tokens_out, status, publish_ref, published_at, created_at, updated_at";

impl Storage {
    /// Store a freshly generated content row and move its topic to `review`.
    ///
    /// Both writes happen in one transaction. The topic must still be in
    /// `generating`; otherwise nothing is written.
    pub async fn insert_generated_content(&self, content: &Content) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(PipelineError::persistence)?;

        let outcome = async {
            insert_content_row(&tx, content).await?;
            let changed = tx
                .execute(
                    "UPDATE topics SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                    params![
                        TopicStatus::Review.as_str(),
                        Utc::now().to_rfc3339(),
                        content.topic_id.as_str(),
                        TopicStatus::Generating.as_str()
                    ],
                )
                .await
                .map_err(PipelineError::persistence)?;
            if changed != 1 {
                return Err(PipelineError::PersistenceFailed(format!(
                    "topic {} left `generating` during generation",
                    content.topic_id
                )));
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await.map_err(PipelineError::persistence),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, content_id = %content.id, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Get a content row by ID.
    pub async fn get_content(&self, id: &str) -> Result<Option<Content>> {
        self.query_one_content("id", id).await
    }

    /// Get the content row generated for a topic, if any.
    pub async fn get_content_for_topic(&self, topic_id: &str) -> Result<Option<Content>> {
        self.query_one_content("topic_id", topic_id).await
    }

    async fn query_one_content(&self, column: &str, value: &str) -> Result<Option<Content>> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM contents WHERE {column} = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![value])
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_content(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// List content rows, newest first, optionally by status.
    pub async fn list_contents(&self, status: Option<ContentStatus>) -> Result<Vec<Content>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM contents
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![status.map(|s| s.as_str())])
            .await
            .map_err(PipelineError::persistence)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_content(&row)?);
        }
        Ok(results)
    }

    /// Move a content row from `from` to `to`. Returns `false` if it was not in `from`.
    pub async fn update_content_status(
        &self,
        id: &str,
        from: ContentStatus,
        to: ContentStatus,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE contents SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now.as_str(), id, from.as_str()],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }
}

async fn insert_content_row(conn: &libsql::Connection, content: &Content) -> Result<()> {
    let cover = content.cover_image.as_ref();
    conn.execute(
        "INSERT INTO contents (id, topic_id, subject_id, title, title_secondary, slug, body,
           meta_title, meta_description, target_keywords, cover_image_url, cover_attribution,
           cover_source_url, internal_links, word_count, readability_score, seo_score, model,
           tokens_in, tokens_out, status, publish_ref, published_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
           ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        params![
            content.id.as_str(),
            content.topic_id.as_str(),
            content.subject_id.as_str(),
            content.title.primary.as_str(),
            content.title.secondary.as_deref(),
            content.slug.as_str(),
            content.body.as_str(),
            content.meta_title.as_str(),
            content.meta_description.as_str(),
            to_json(&content.target_keywords)?,
            cover.map(|c| c.url.as_str()),
            cover.map(|c| c.attribution.as_str()),
            cover.and_then(|c| c.source_url.as_deref()),
            to_json(&content.internal_links)?,
            i64::from(content.word_count),
            content.readability_score,
            content.seo_score,
            content.model.as_str(),
            content.tokens_in as i64,
            content.tokens_out as i64,
            content.status.as_str(),
            content.publish_ref.as_deref(),
            content.published_at.map(|t| t.to_rfc3339()),
            content.created_at.to_rfc3339(),
            content.updated_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(PipelineError::persistence)?;
    Ok(())
}

fn row_to_content(row: &libsql::Row) -> Result<Content> {
    let cover_image = opt_text(row, 10).map(|url| CoverImage {
        url,
        attribution: opt_text(row, 11).unwrap_or_default(),
        source_url: opt_text(row, 12),
    });
    Ok(Content {
        id: text(row, 0)?,
        topic_id: text(row, 1)?,
        subject_id: text(row, 2)?,
        title: LocalizedTitle {
            primary: text(row, 3)?,
            secondary: opt_text(row, 4),
        },
        slug: text(row, 5)?,
        body: text(row, 6)?,
        meta_title: text(row, 7)?,
        meta_description: text(row, 8)?,
        target_keywords: json_list(row, 9)?,
        cover_image,
        internal_links: json_list(row, 13)?,
        word_count: int(row, 14)? as u32,
        readability_score: real(row, 15)?,
        seo_score: real(row, 16)?,
        model: text(row, 17)?,
        tokens_in: int(row, 18)? as u64,
        tokens_out: int(row, 19)? as u64,
        status: status(row, 20)?,
        publish_ref: opt_text(row, 21),
        published_at: opt_timestamp(row, 22)?,
        created_at: timestamp(row, 23)?,
        updated_at: timestamp(row, 24)?,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use visapress_shared::{Content, ContentStatus, CoverImage, InternalLink, Topic, new_id};

    pub fn content_for(topic: &Topic, status: ContentStatus) -> Content {
        Content {
            id: new_id(),
            topic_id: topic.id.clone(),
            subject_id: topic.subject_id.clone(),
            title: topic.proposal.title.clone(),
            slug: topic.proposal.slug.clone(),
            body: "<p>Hello world</p>".into(),
            meta_title: "Meta".into(),
            meta_description: "Meta description".into(),
            target_keywords: topic.proposal.target_keywords.clone(),
            cover_image: Some(CoverImage {
                url: "https://cdn.test/blog-images/abc.jpg".into(),
                attribution: "Photo by Ada on Unsplash".into(),
                source_url: None,
            }),
            internal_links: vec![InternalLink {
                url: "/blog/italy-visa".into(),
                anchor: "visa guide".into(),
                position: 0,
                context: "see the".into(),
            }],
            word_count: 2,
            readability_score: 71.5,
            seo_score: 80.0,
            model: "test/model".into(),
            tokens_in: 120,
            tokens_out: 900,
            status,
            publish_ref: None,
            published_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use visapress_shared::PlanStatus;

    use super::fixtures::content_for;
    use super::*;
    use crate::test_support::{plan_for, test_storage, topic_for};

    async fn generating_topic(storage: &Storage) -> visapress_shared::Topic {
        let subject = storage.insert_subject("Italy", "italy").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();
        let topic = topic_for(&plan, "Rome on a budget", TopicStatus::Generating);
        storage
            .insert_plan_topics(&plan.id, std::slice::from_ref(&topic), PlanStatus::Generating)
            .await
            .unwrap();
        topic
    }

    #[tokio::test]
    async fn generated_content_moves_topic_to_review() {
        let storage = test_storage().await;
        let topic = generating_topic(&storage).await;
        let content = content_for(&topic, ContentStatus::Review);

        storage.insert_generated_content(&content).await.expect("insert");

        let found = storage.get_content(&content.id).await.unwrap().expect("content");
        assert_eq!(found.cover_image, content.cover_image);
        assert_eq!(found.internal_links, content.internal_links);
        assert_eq!(found.tokens_out, 900);
        assert!(found.publish_ref.is_none());

        let by_topic = storage.get_content_for_topic(&topic.id).await.unwrap();
        assert_eq!(by_topic.map(|c| c.id), Some(content.id));

        let topic = storage.get_topic(&topic.id).await.unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Review);
    }

    #[tokio::test]
    async fn topic_moved_elsewhere_blocks_insert() {
        let storage = test_storage().await;
        let topic = generating_topic(&storage).await;
        storage
            .update_topic_status(&topic.id, TopicStatus::Generating, TopicStatus::Approved)
            .await
            .unwrap();

        let content = content_for(&topic, ContentStatus::Review);
        assert!(storage.insert_generated_content(&content).await.is_err());
        assert!(storage.get_content(&content.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn content_without_cover_roundtrips() {
        let storage = test_storage().await;
        let topic = generating_topic(&storage).await;
        let mut content = content_for(&topic, ContentStatus::Review);
        content.cover_image = None;
        storage.insert_generated_content(&content).await.unwrap();

        let found = storage.get_content(&content.id).await.unwrap().unwrap();
        assert!(found.cover_image.is_none());
    }

    #[tokio::test]
    async fn status_filter_and_cas() {
        let storage = test_storage().await;
        let topic = generating_topic(&storage).await;
        let content = content_for(&topic, ContentStatus::Review);
        storage.insert_generated_content(&content).await.unwrap();

        assert!(
            storage
                .update_content_status(&content.id, ContentStatus::Review, ContentStatus::Approved)
                .await
                .unwrap()
        );
        assert!(
            !storage
                .update_content_status(&content.id, ContentStatus::Review, ContentStatus::Rejected)
                .await
                .unwrap()
        );

        let approved = storage
            .list_contents(Some(ContentStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert!(
            storage
                .list_contents(Some(ContentStatus::Review))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
