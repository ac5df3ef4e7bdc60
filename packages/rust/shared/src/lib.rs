//! Shared types, error model, and configuration for Visapress.
//!
//! This crate is the foundation depended on by all other Visapress crates.
//! It provides:
//! - [`PipelineError`]: the unified error taxonomy
//! - Domain records ([`Plan`], [`Topic`], [`Content`], [`PublishedPost`])
//! - The pipeline state machine ([`PlanStatus`], [`TopicStatus`], [`ContentStatus`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod state;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ObjectStorageConfig, OpenRouterConfig, PipelineConfig, SiteConfig,
    UnsplashConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    read_secret, validate_api_key,
};
pub use error::{PipelineError, Result, preview};
pub use state::{ContentStatus, Lifecycle, PlanStatus, TopicStatus, transition};
pub use types::{
    ArticleDraft, AutoSchedule, Category, Content, CoverImage, InternalLink, LinkOpportunity,
    LocalizedTitle, Period, Plan, PublishedPost, SearchIntent, Subject, Topic, TopicProposal,
    new_id,
};
