//! Public content store: posts, routes and subject cross-references.
//!
//! `posts.source_content_id` is unique, so [`Storage::insert_post`] is the
//! single point where two concurrent publishers of the same content are
//! told apart. The loser gets `false` back and reads the winner's row.

use chrono::{DateTime, Utc};
use libsql::params;
use visapress_shared::{
    ContentStatus, Lifecycle, LocalizedTitle, PipelineError, PublishedPost, Result,
};

use crate::Storage;
use crate::rows::{opt_text, text, timestamp};

const POST_COLUMNS: &str = "id, source_content_id, title, title_secondary, slug, body, \
     meta_title, meta_description, cover_image_url, created_at";

impl Storage {
    /// Insert a post. Returns `false` when the source content already has one.
    pub async fn insert_post(&self, post: &PublishedPost) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "INSERT INTO posts (id, source_content_id, title, title_secondary, slug, body,
                   meta_title, meta_description, cover_image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(source_content_id) DO NOTHING",
                params![
                    post.id.as_str(),
                    post.source_content_id.as_str(),
                    post.title.primary.as_str(),
                    post.title.secondary.as_deref(),
                    post.slug.as_str(),
                    post.body.as_str(),
                    post.meta_title.as_str(),
                    post.meta_description.as_str(),
                    post.cover_image_url.as_deref(),
                    post.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }

    /// Get the post created from a content row, if any.
    pub async fn get_post_by_content(&self, content_id: &str) -> Result<Option<PublishedPost>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE source_content_id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![content_id])
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// Change the slug a post is served under.
    pub async fn update_post_slug(&self, post_id: &str, slug: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE posts SET slug = ?1 WHERE id = ?2",
                params![slug, post_id],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }

    /// Map `path` to a post. Returns `false` if the path is already taken.
    pub async fn insert_route(&self, path: &str, post_id: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "INSERT INTO routes (path, post_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO NOTHING",
                params![path, post_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }

    /// The post a route path points at.
    pub async fn get_route_target(&self, path: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT post_id FROM routes WHERE path = ?1", params![path])
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(text(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// Associate a post with its subject. Re-linking is a no-op.
    pub async fn link_subject_post(&self, subject_id: &str, post_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO subject_posts (subject_id, post_id) VALUES (?1, ?2)
                 ON CONFLICT(subject_id, post_id) DO NOTHING",
                params![subject_id, post_id],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }

    /// Posts linked to a subject.
    pub async fn list_subject_posts(&self, subject_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT post_id FROM subject_posts WHERE subject_id = ?1 ORDER BY post_id",
                params![subject_id],
            )
            .await
            .map_err(PipelineError::persistence)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(text(&row, 0)?);
        }
        Ok(results)
    }

    /// Set the publish reference of an approved content row.
    ///
    /// The reference is written at most once: returns `false` if the row
    /// already carries one or is no longer `approved`.
    pub async fn mark_content_published(
        &self,
        content_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writable()?;
        let at = at.to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE contents
                 SET publish_ref = ?1, published_at = ?2, status = ?3, updated_at = ?2
                 WHERE id = ?4 AND publish_ref IS NULL AND status = ?5",
                params![
                    post_id,
                    at.as_str(),
                    ContentStatus::Published.as_str(),
                    content_id,
                    ContentStatus::Approved.as_str()
                ],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(changed == 1)
    }
}

fn row_to_post(row: &libsql::Row) -> Result<PublishedPost> {
    Ok(PublishedPost {
        id: text(row, 0)?,
        source_content_id: text(row, 1)?,
        title: LocalizedTitle {
            primary: text(row, 2)?,
            secondary: opt_text(row, 3),
        },
        slug: text(row, 4)?,
        body: text(row, 5)?,
        meta_title: text(row, 6)?,
        meta_description: text(row, 7)?,
        cover_image_url: opt_text(row, 8),
        created_at: timestamp(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use visapress_shared::{Content, PlanStatus, TopicStatus, new_id};

    use super::*;
    use crate::contents::fixtures::content_for;
    use crate::test_support::{plan_for, test_storage, topic_for};

    async fn approved_content(storage: &Storage) -> Content {
        let subject = storage.insert_subject("Italy", "italy").await.unwrap();
        let plan = plan_for(&subject.id);
        storage.insert_plan(&plan).await.unwrap();
        let topic = topic_for(&plan, "Rome on a budget", TopicStatus::Generating);
        storage
            .insert_plan_topics(&plan.id, std::slice::from_ref(&topic), PlanStatus::Generating)
            .await
            .unwrap();
        let content = content_for(&topic, ContentStatus::Review);
        storage.insert_generated_content(&content).await.unwrap();
        storage
            .update_content_status(&content.id, ContentStatus::Review, ContentStatus::Approved)
            .await
            .unwrap();
        content
    }

    fn post_from(content: &Content) -> PublishedPost {
        PublishedPost {
            id: new_id(),
            source_content_id: content.id.clone(),
            title: content.title.clone(),
            slug: content.slug.clone(),
            body: content.body.clone(),
            meta_title: content.meta_title.clone(),
            meta_description: content.meta_description.clone(),
            cover_image_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_post_for_same_content_is_ignored() {
        let storage = test_storage().await;
        let content = approved_content(&storage).await;

        let first = post_from(&content);
        let second = post_from(&content);
        assert!(storage.insert_post(&first).await.unwrap());
        assert!(!storage.insert_post(&second).await.unwrap());

        let stored = storage.get_post_by_content(&content.id).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn routes_are_unique_and_subject_links_idempotent() {
        let storage = test_storage().await;
        let content = approved_content(&storage).await;
        let post = post_from(&content);
        storage.insert_post(&post).await.unwrap();

        assert!(storage.insert_route("/blog/rome", &post.id).await.unwrap());
        assert!(!storage.insert_route("/blog/rome", &post.id).await.unwrap());
        assert_eq!(
            storage.get_route_target("/blog/rome").await.unwrap(),
            Some(post.id.clone())
        );

        storage.link_subject_post(&content.subject_id, &post.id).await.unwrap();
        storage.link_subject_post(&content.subject_id, &post.id).await.unwrap();
        assert_eq!(
            storage.list_subject_posts(&content.subject_id).await.unwrap(),
            vec![post.id]
        );
    }

    #[tokio::test]
    async fn post_slug_can_be_changed() {
        let storage = test_storage().await;
        let content = approved_content(&storage).await;
        let post = post_from(&content);
        storage.insert_post(&post).await.unwrap();

        storage.update_post_slug(&post.id, "rome-italy").await.unwrap();
        let stored = storage.get_post_by_content(&content.id).await.unwrap().unwrap();
        assert_eq!(stored.slug, "rome-italy");
    }

    #[tokio::test]
    async fn publish_ref_is_set_once() {
        let storage = test_storage().await;
        let content = approved_content(&storage).await;
        let post = post_from(&content);
        storage.insert_post(&post).await.unwrap();

        assert!(
            storage
                .mark_content_published(&content.id, &post.id, Utc::now())
                .await
                .unwrap()
        );
        assert!(
            !storage
                .mark_content_published(&content.id, "other", Utc::now())
                .await
                .unwrap()
        );

        let stored = storage.get_content(&content.id).await.unwrap().unwrap();
        assert_eq!(stored.publish_ref.as_deref(), Some(post.id.as_str()));
        assert_eq!(stored.status, ContentStatus::Published);
        assert!(stored.published_at.is_some());
    }
}
