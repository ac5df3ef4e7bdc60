//! Core domain records for the content pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::state::{ContentStatus, PlanStatus, TopicStatus};

/// Generate a new time-sortable record identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Category / SearchIntent
// ---------------------------------------------------------------------------

/// Closed set of topic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    VisaProcedures,
    TravelPlanning,
    PracticalInfo,
    Culture,
    Comparison,
}

impl Category {
    /// Substituted for any value outside the closed set.
    pub const DEFAULT: Self = Self::PracticalInfo;

    pub const ALL: [Self; 5] = [
        Self::VisaProcedures,
        Self::TravelPlanning,
        Self::PracticalInfo,
        Self::Culture,
        Self::Comparison,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VisaProcedures => "visa_procedures",
            Self::TravelPlanning => "travel_planning",
            Self::PracticalInfo => "practical_info",
            Self::Culture => "culture",
            Self::Comparison => "comparison",
        }
    }

    /// Exact match on the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Soft target share of a plan, in percent.
    pub fn target_share(&self) -> u32 {
        match self {
            Self::VisaProcedures => 30,
            Self::TravelPlanning => 35,
            Self::PracticalInfo => 20,
            Self::Culture => 10,
            Self::Comparison => 5,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Search intent of a topic's target query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    Informational,
    Navigational,
    Commercial,
    Transactional,
}

impl SearchIntent {
    pub const DEFAULT: Self = Self::Informational;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informational => "informational",
            Self::Navigational => "navigational",
            Self::Commercial => "commercial",
            Self::Transactional => "transactional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Informational,
            Self::Navigational,
            Self::Commercial,
            Self::Transactional,
        ]
        .into_iter()
        .find(|i| i.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// A planning period (calendar month), written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PipelineError> {
        if !(1..=12).contains(&month) {
            return Err(PipelineError::validation(format!(
                "period month must be 1-12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// First day of the period.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// English month name, for prompts.
    pub fn month_name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "January", "February", "March", "April", "May", "June", "July", "August",
            "September", "October", "November", "December",
        ];
        NAMES[(self.month as usize).saturating_sub(1) % 12]
    }
}

impl From<NaiveDate> for Period {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::validation(format!("invalid period '{s}', expected YYYY-MM"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Small value types
// ---------------------------------------------------------------------------

/// A title in the site's primary language plus an optional translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedTitle {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

/// A spot in a planned article where an internal link would fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOpportunity {
    pub anchor: String,
    pub context: String,
}

/// An internal link placed inside a generated article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalLink {
    pub url: String,
    pub anchor: String,
    /// Paragraph index the link belongs to.
    pub position: u32,
    pub context: String,
}

/// A cover image re-hosted on durable object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverImage {
    pub url: String,
    /// Photographer credit, e.g. `Photo by Jane Doe on Unsplash`.
    pub attribution: String,
    /// Page on the stock-photo site the image came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Spread topics of a plan over a publishing calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSchedule {
    pub start_date: NaiveDate,
    pub posts_per_week: u32,
}

impl AutoSchedule {
    /// Publication date for the `index`-th topic (0-based).
    pub fn date_for(&self, index: usize) -> NaiveDate {
        let per_week = self.posts_per_week.max(1) as u64;
        let offset_days = (index as u64 * 7) / per_week;
        self.start_date + chrono::Days::new(offset_days)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A subject (country) articles are written about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// "Generate topics for subject X in period Y."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub subject_id: String,
    pub period: Period,
    pub requested_topics: u32,
    pub status: PlanStatus,
    pub generated_topics: u32,
    pub approved_topics: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_schedule: Option<AutoSchedule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One sanitized topic proposal, as produced from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProposal {
    pub title: LocalizedTitle,
    pub slug: String,
    pub description: String,
    pub category: Category,
    pub search_intent: SearchIntent,
    pub target_keywords: Vec<String>,
    pub search_volume: u32,
    /// 0–100.
    pub keyword_difficulty: u8,
    pub target_word_count: u32,
    pub outline: Vec<String>,
    pub link_opportunities: Vec<LinkOpportunity>,
    /// 1–10, higher first.
    pub priority: u8,
    pub reasoning: String,
}

/// A persisted topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub plan_id: String,
    pub subject_id: String,
    #[serde(flatten)]
    pub proposal: TopicProposal,
    pub status: TopicStatus,
    /// Where the topic came from, e.g. `ai:<model>`.
    pub provenance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sanitized article, as produced from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: LocalizedTitle,
    pub slug: String,
    /// HTML body.
    pub body: String,
    pub meta_title: String,
    pub meta_description: String,
    pub internal_links: Vec<InternalLink>,
    /// Stock-photo search phrase, if the model proposed one.
    pub image_query: Option<String>,
    pub readability_score: f64,
    pub seo_score: f64,
}

/// A persisted article body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub topic_id: String,
    pub subject_id: String,
    pub title: LocalizedTitle,
    pub slug: String,
    pub body: String,
    pub meta_title: String,
    pub meta_description: String,
    pub target_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<CoverImage>,
    pub internal_links: Vec<InternalLink>,
    pub word_count: u32,
    pub readability_score: f64,
    pub seo_score: f64,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub status: ContentStatus,
    /// Id of the published entity; set at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public CMS record created from one content row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    pub source_content_id: String,
    pub title: LocalizedTitle,
    pub slug: String,
    pub body: String,
    pub meta_title: String,
    pub meta_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
