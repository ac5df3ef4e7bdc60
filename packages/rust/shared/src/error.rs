//! Error types for Visapress.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Maximum number of characters of raw model output carried in diagnostics.
const PREVIEW_CHARS: usize = 200;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The LLM call errored, timed out, or returned nothing usable.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Model output could not be parsed, even after recovery.
    #[error("malformed response: {message} (preview: {preview:?})")]
    MalformedResponse { message: String, preview: String },

    /// A stage was invoked on an entity whose status does not allow it.
    #[error("invalid state: {entity} {id} is `{from}`, cannot move to `{to}`")]
    InvalidState {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// The content record already has a published entity.
    #[error("already published as {entity_id} at {url}")]
    AlreadyPublished { entity_id: String, url: String },

    /// Datastore read or write error.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// A best-effort step failed; the primary record still exists.
    #[error("enrichment step `{step}` failed: {message}")]
    EnrichmentFailed { step: &'static str, message: String },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller input rejected before any work started.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error, keeping a bounded preview of `raw`.
    pub fn malformed(msg: impl Into<String>, raw: &str) -> Self {
        Self::MalformedResponse {
            message: msg.into(),
            preview: preview(raw).to_string(),
        }
    }

    /// Create an invalid-state error for an entity stuck in `from`.
    pub fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a persistence error from any displayable source.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::PersistenceFailed(err.to_string())
    }

    /// Create an enrichment error for a named step.
    pub fn enrichment(step: &'static str, msg: impl Into<String>) -> Self {
        Self::EnrichmentFailed {
            step,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the unit of work it was raised in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EnrichmentFailed { .. })
    }
}

/// Return at most the first [`PREVIEW_CHARS`] characters of `raw`.
pub fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
