//! Prompt templates for planning and article generation.

use std::fmt::Write as _;

use visapress_providers::Prompt;
use visapress_sanitizer::TOPICS_FIELD;
use visapress_shared::{Category, Period, Subject, Topic};

const PLANNER_SYSTEM: &str = "You are an SEO content strategist for a visa consultancy. \
You plan blog articles that answer real questions travellers ask before, during and after a \
visa application. Reply with a single JSON object and nothing else.";

const WRITER_SYSTEM: &str = "You are an expert travel and immigration writer. You write \
accurate, practical, well-structured articles in semantic HTML (h2, h3, p, ul, ol, strong). \
Never invent fees, processing times or legal requirements you are unsure of; point readers to \
official sources instead. Reply with a single JSON object and nothing else.";

/// Prompt asking for `count` topic proposals about `subject` for `period`.
pub fn topic_plan(
    subject: &Subject,
    period: Period,
    count: u32,
    secondary_locale: Option<&str>,
) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(
        user,
        "Propose exactly {count} blog topics about {name} for {month} {year}.",
        name = subject.name,
        month = period.month_name(),
        year = period.year,
    );
    user.push_str("\nAim for this category mix (soft targets):\n");
    for category in Category::ALL {
        let _ = writeln!(user, "- {}: {}%", category.as_str(), category.target_share());
    }
    user.push_str(
        "\nConsider seasonality for the month, upcoming policy changes and evergreen \
         questions. Avoid duplicate angles.\n",
    );
    if let Some(locale) = secondary_locale {
        let _ = writeln!(
            user,
            "\nGive every title a `{locale}` translation in `title.secondary`."
        );
    }
    let _ = write!(
        user,
        r#"
Respond with JSON of this shape:
{{
  "{TOPICS_FIELD}": [
    {{
      "title": {{"primary": "...", "secondary": "..."}},
      "slug": "kebab-case-slug",
      "description": "one or two sentences",
      "category": "one of: {categories}",
      "search_intent": "informational | navigational | transactional | commercial",
      "target_keywords": ["..."],
      "search_volume": 0,
      "keyword_difficulty": 0,
      "target_word_count": 1500,
      "outline": ["H2 heading", "..."],
      "internal_link_opportunities": [{{"anchor": "...", "context": "..."}}],
      "priority": 1,
      "reasoning": "why this topic now"
    }}
  ]
}}
Priority runs from 1 (low) to 10 (high); keyword_difficulty from 0 to 100."#,
        categories = Category::ALL.map(|c| c.as_str()).join(", "),
    );

    Prompt::new(PLANNER_SYSTEM, user)
}

/// Prompt asking for the full article of an approved topic.
pub fn article(topic: &Topic, subject: &Subject, secondary_locale: Option<&str>) -> Prompt {
    let p = &topic.proposal;
    let mut user = String::new();
    let _ = writeln!(user, "Write a blog article about {}.", subject.name);
    let _ = writeln!(user, "Title: {}", p.title.primary);
    if !p.description.is_empty() {
        let _ = writeln!(user, "Angle: {}", p.description);
    }
    let _ = writeln!(user, "Category: {}", p.category.as_str());
    let _ = writeln!(user, "Search intent: {}", p.search_intent.as_str());
    let _ = writeln!(user, "Target length: about {} words", p.target_word_count);
    if !p.target_keywords.is_empty() {
        let _ = writeln!(user, "Keywords to cover: {}", p.target_keywords.join(", "));
    }
    if !p.outline.is_empty() {
        user.push_str("Outline:\n");
        for heading in &p.outline {
            let _ = writeln!(user, "- {heading}");
        }
    }
    if !p.link_opportunities.is_empty() {
        user.push_str("Internal link opportunities:\n");
        for link in &p.link_opportunities {
            let _ = writeln!(user, "- \"{}\" ({})", link.anchor, link.context);
        }
    }
    if let Some(locale) = secondary_locale {
        let _ = writeln!(user, "Also give the title in `{locale}` as `title.secondary`.");
    }
    user.push_str(
        r#"
Respond with JSON of this shape:
{
  "title": {"primary": "...", "secondary": "..."},
  "slug": "kebab-case-slug",
  "content": "<h2>...</h2><p>...</p>",
  "meta_title": "at most 60 characters",
  "meta_description": "at most 160 characters",
  "internal_links": [{"url": "/blog/...", "anchor": "...", "position": 0, "context": "..."}],
  "image_search_query": "2-4 words describing a fitting landscape photo",
  "readability_score": 0,
  "seo_score": 0
}
Scores run from 0 to 100 and are your own estimate."#,
    );

    Prompt::new(WRITER_SYSTEM, user)
}
