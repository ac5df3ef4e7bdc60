//! Pipeline state machine.
//!
//! Each pipeline entity carries an explicit status enum. Legal moves are
//! listed once per entity in [`Lifecycle::can_transition_to`], and every
//! stage calls [`transition`] before touching the datastore.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Shared behaviour of the per-entity status enums.
pub trait Lifecycle: Copy + Eq + fmt::Debug + Sized + 'static {
    /// Entity name used in diagnostics (`plan`, `topic`, `content`).
    const ENTITY: &'static str;

    /// All variants, in lifecycle order.
    const ALL: &'static [Self];

    /// Storage representation.
    fn as_str(&self) -> &'static str;

    /// Whether moving from `self` to `next` is a legal forward transition.
    fn can_transition_to(&self, next: Self) -> bool;

    /// Parse the storage representation.
    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
    }
}

/// Check a transition, returning the target status or `InvalidState`.
pub fn transition<S: Lifecycle>(id: &str, from: S, to: S) -> Result<S> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(PipelineError::invalid_state(
            S::ENTITY,
            id,
            from.as_str(),
            to.as_str(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Plan lifecycle: `planning → review → generating → published`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planning,
    Review,
    Generating,
    Published,
}

impl Lifecycle for PlanStatus {
    const ENTITY: &'static str = "plan";
    const ALL: &'static [Self] = &[
        Self::Planning,
        Self::Review,
        Self::Generating,
        Self::Published,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Review => "review",
            Self::Generating => "generating",
            Self::Published => "published",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Planning, Review)
                | (Planning, Generating)
                | (Review, Generating)
                | (Generating, Published)
        )
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Topic lifecycle: `pending → approved → generating → review → published`.
///
/// `rejected` is terminal and reachable from `pending` or `approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Pending,
    Approved,
    Generating,
    Review,
    Published,
    Rejected,
}

impl TopicStatus {
    /// Operator recovery for a generation that died mid-flight.
    ///
    /// Not part of the forward table: only `generating → approved`.
    pub fn can_reset(&self) -> bool {
        matches!(self, Self::Generating)
    }
}

impl Lifecycle for TopicStatus {
    const ENTITY: &'static str = "topic";
    const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Approved,
        Self::Generating,
        Self::Review,
        Self::Published,
        Self::Rejected,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Generating => "generating",
            Self::Review => "review",
            Self::Published => "published",
            Self::Rejected => "rejected",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use TopicStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Rejected)
                | (Approved, Generating)
                | (Generating, Review)
                | (Review, Published)
        )
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Content lifecycle: `review → approved → published`, or `review → rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Review,
    Approved,
    Published,
    Rejected,
}

impl Lifecycle for ContentStatus {
    const ENTITY: &'static str = "content";
    const ALL: &'static [Self] = &[
        Self::Review,
        Self::Approved,
        Self::Published,
        Self::Rejected,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Rejected => "rejected",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use ContentStatus::*;
        matches!(
            (self, next),
            (Review, Approved) | (Review, Rejected) | (Approved, Published)
        )
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display!(PlanStatus, TopicStatus, ContentStatus);
