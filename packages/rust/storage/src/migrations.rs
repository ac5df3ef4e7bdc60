//! SQL migration definitions for the Visapress database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Pipeline schema: subjects, plans, topics, contents",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Countries the site writes about (owned by the CMS)
CREATE TABLE IF NOT EXISTS subjects (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    slug       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- One plan per (subject, period) request; duplicates allowed
CREATE TABLE IF NOT EXISTS plans (
    id               TEXT PRIMARY KEY,
    subject_id       TEXT NOT NULL REFERENCES subjects(id),
    period           TEXT NOT NULL,
    requested_topics INTEGER NOT NULL,
    status           TEXT NOT NULL,
    generated_topics INTEGER NOT NULL DEFAULT 0,
    approved_topics  INTEGER NOT NULL DEFAULT 0,
    schedule_start   TEXT,
    posts_per_week   INTEGER,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_plans_subject ON plans(subject_id, period);

-- Proposed article ideas
CREATE TABLE IF NOT EXISTS topics (
    id                 TEXT PRIMARY KEY,
    plan_id            TEXT NOT NULL REFERENCES plans(id),
    subject_id         TEXT NOT NULL REFERENCES subjects(id),
    title              TEXT NOT NULL,
    title_secondary    TEXT,
    slug               TEXT NOT NULL,
    description        TEXT NOT NULL,
    category           TEXT NOT NULL CHECK (category IN
                         ('visa_procedures', 'travel_planning', 'practical_info', 'culture', 'comparison')),
    search_intent      TEXT NOT NULL,
    target_keywords    TEXT NOT NULL,
    search_volume      INTEGER NOT NULL,
    keyword_difficulty INTEGER NOT NULL,
    target_word_count  INTEGER NOT NULL,
    outline            TEXT NOT NULL,
    link_opportunities TEXT NOT NULL,
    priority           INTEGER NOT NULL,
    status             TEXT NOT NULL,
    provenance         TEXT NOT NULL,
    reasoning          TEXT NOT NULL,
    scheduled_for      TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_topics_plan ON topics(plan_id, status);

-- Generated article bodies, at most one per topic
CREATE TABLE IF NOT EXISTS contents (
    id                TEXT PRIMARY KEY,
    topic_id          TEXT NOT NULL UNIQUE REFERENCES topics(id),
    subject_id        TEXT NOT NULL REFERENCES subjects(id),
    title             TEXT NOT NULL,
    title_secondary   TEXT,
    slug              TEXT NOT NULL,
    body              TEXT NOT NULL,
    meta_title        TEXT NOT NULL,
    meta_description  TEXT NOT NULL,
    target_keywords   TEXT NOT NULL,
    cover_image_url   TEXT,
    cover_attribution TEXT,
    cover_source_url  TEXT,
    internal_links    TEXT NOT NULL,
    word_count        INTEGER NOT NULL,
    readability_score REAL NOT NULL,
    seo_score         REAL NOT NULL,
    model             TEXT NOT NULL,
    tokens_in         INTEGER NOT NULL,
    tokens_out        INTEGER NOT NULL,
    status            TEXT NOT NULL,
    publish_ref       TEXT UNIQUE,
    published_at      TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_contents_status ON contents(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Public content store: posts, routes, subject_posts",
            sql: r#"
-- Public CMS records; one per source content row
CREATE TABLE IF NOT EXISTS posts (
    id                TEXT PRIMARY KEY,
    source_content_id TEXT NOT NULL UNIQUE REFERENCES contents(id),
    title             TEXT NOT NULL,
    title_secondary   TEXT,
    slug              TEXT NOT NULL,
    body              TEXT NOT NULL,
    meta_title        TEXT NOT NULL,
    meta_description  TEXT NOT NULL,
    cover_image_url   TEXT,
    created_at        TEXT NOT NULL
);

-- URL routing table
CREATE TABLE IF NOT EXISTS routes (
    path       TEXT PRIMARY KEY,
    post_id    TEXT NOT NULL REFERENCES posts(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_routes_post ON routes(post_id);

-- Subject to post cross-reference
CREATE TABLE IF NOT EXISTS subject_posts (
    subject_id TEXT NOT NULL REFERENCES subjects(id),
    post_id    TEXT NOT NULL REFERENCES posts(id),
    PRIMARY KEY (subject_id, post_id)
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
