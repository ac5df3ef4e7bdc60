//! libSQL storage layer for the content pipeline.
//!
//! The [`Storage`] struct wraps a libSQL database holding subjects, plans,
//! topics, generated contents, and the public content store (posts, routes,
//! subject cross-references).
//!
//! **Access rules:**
//! - Pipeline stages: read-write via [`Storage::open`]
//! - Listing and inspection commands: read-only via [`Storage::open_readonly`]
//!
//! Status changes are written as compare-and-set updates
//! (`WHERE status = <expected>`), so two callers racing on the same record
//! cannot both win.

mod contents;
mod migrations;
mod plans;
mod publish;
mod rows;
mod topics;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use visapress_shared::{PipelineError, Result, Subject, new_id};

use crate::rows::text;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PipelineError::persistence)?;

        let conn = db.connect().map_err(PipelineError::persistence)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.enable_foreign_keys().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PipelineError::persistence)?;

        let conn = db.connect().map_err(PipelineError::persistence)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn enable_foreign_keys(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(PipelineError::persistence)?;
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PipelineError::PersistenceFailed(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PipelineError::PersistenceFailed(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subject operations
    // -----------------------------------------------------------------------

    /// Insert a subject (country). Returns the stored record.
    pub async fn insert_subject(&self, name: &str, slug: &str) -> Result<Subject> {
        self.check_writable()?;
        let subject = Subject {
            id: new_id(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO subjects (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    subject.id.as_str(),
                    subject.name.as_str(),
                    subject.slug.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(PipelineError::persistence)?;
        Ok(subject)
    }

    /// Get a subject by ID.
    pub async fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, slug FROM subjects WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(PipelineError::persistence)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_subject(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::persistence(e)),
        }
    }

    /// List all subjects ordered by name.
    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        let mut rows = self
            .conn
            .query("SELECT id, name, slug FROM subjects ORDER BY name", params![])
            .await
            .map_err(PipelineError::persistence)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_subject(&row)?);
        }
        Ok(results)
    }
}

fn row_to_subject(row: &libsql::Row) -> Result<Subject> {
    Ok(Subject {
        id: text(row, 0)?,
        name: text(row, 1)?,
        slug: text(row, 2)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;
    use visapress_shared::{
        Category, LocalizedTitle, Period, Plan, PlanStatus, SearchIntent, Topic, TopicProposal,
        TopicStatus,
    };

    /// Create a temp file storage for testing.
    pub async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("vp_test_{}.db", new_id()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub fn plan_for(subject_id: &str) -> Plan {
        Plan {
            id: new_id(),
            subject_id: subject_id.to_string(),
            period: Period::new(2025, 6).unwrap(),
            requested_topics: 3,
            status: PlanStatus::Planning,
            generated_topics: 0,
            approved_topics: 0,
            auto_schedule: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn topic_for(plan: &Plan, title: &str, status: TopicStatus) -> Topic {
        Topic {
            id: new_id(),
            plan_id: plan.id.clone(),
            subject_id: plan.subject_id.clone(),
            proposal: TopicProposal {
                title: LocalizedTitle {
                    primary: title.to_string(),
                    secondary: None,
                },
                slug: title.to_lowercase().replace(' ', "-"),
                description: "desc".into(),
                category: Category::Culture,
                search_intent: SearchIntent::Informational,
                target_keywords: vec!["kw".into()],
                search_volume: 100,
                keyword_difficulty: 20,
                target_word_count: 1200,
                outline: vec!["Intro".into()],
                link_opportunities: vec![],
                priority: 5,
                reasoning: String::new(),
            },
            status,
            provenance: "test".into(),
            scheduled_for: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
