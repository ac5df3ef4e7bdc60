//! Topic proposal sanitization.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use visapress_shared::{
    Category, LinkOpportunity, LocalizedTitle, Result, SearchIntent, TopicProposal,
};

use crate::coerce;
use crate::text::slug_or_fallback;
use crate::{ParseMode, extract_array};

/// Array field the planning prompt asks the model to fill.
pub const TOPICS_FIELD: &str = "topics";

const DEFAULT_SEARCH_VOLUME: f64 = 0.0;
const DEFAULT_DIFFICULTY: u32 = 50;
const DEFAULT_WORD_COUNT: u32 = 1_500;
const DEFAULT_PRIORITY: u32 = 5;

/// Sanitized topics plus how the array was obtained.
#[derive(Debug, Clone)]
pub struct SanitizedTopics {
    pub topics: Vec<TopicProposal>,
    pub mode: ParseMode,
    /// Elements dropped because they had no usable title.
    pub dropped: usize,
}

/// Parse a planning response into topic proposals.
pub fn sanitize_topics(raw: &str) -> Result<SanitizedTopics> {
    let extracted = extract_array(raw, TOPICS_FIELD)?;
    let total = extracted.items.len();

    let topics: Vec<TopicProposal> = extracted
        .items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| sanitize_topic(v, i))
        .collect();

    let dropped = total - topics.len();
    if dropped > 0 {
        warn!(dropped, total, "dropped topic proposals without a title");
    }

    Ok(SanitizedTopics {
        topics,
        mode: extracted.mode,
        dropped,
    })
}

/// Coerce one untyped topic object. Returns `None` when no title is present.
pub fn sanitize_topic(value: &Value, index: usize) -> Option<TopicProposal> {
    let Value::Object(map) = value else {
        debug!(index, "topic element is not an object");
        return None;
    };

    let title = title_of(map)?;

    let slug = slug_or_fallback(
        coerce::opt_string(map.get("slug")).as_deref(),
        &title.primary,
    );

    let category = coerce::enum_or_default(
        map.get("category"),
        "category",
        Category::parse,
        Category::DEFAULT,
    );

    let search_intent = coerce::enum_or_default(
        coerce::first_value(map, &["search_intent", "intent"]),
        "search_intent",
        SearchIntent::parse,
        SearchIntent::DEFAULT,
    );

    let search_volume = coerce::number_in(
        coerce::first_value(map, &["search_volume", "estimated_search_volume"]),
        DEFAULT_SEARCH_VOLUME,
        0.0,
        u32::MAX as f64,
    )
    .round() as u32;

    Some(TopicProposal {
        slug,
        description: coerce::string(map.get("description")),
        category,
        search_intent,
        target_keywords: coerce::string_list(
            coerce::first_value(map, &["target_keywords", "keywords"]),
        ),
        search_volume,
        keyword_difficulty: coerce::int_in(
            coerce::first_value(map, &["keyword_difficulty", "difficulty"]),
            DEFAULT_DIFFICULTY,
            0,
            100,
        ) as u8,
        target_word_count: coerce::int_in(
            coerce::first_value(map, &["target_word_count", "word_count"]),
            DEFAULT_WORD_COUNT,
            300,
            6_000,
        ),
        outline: coerce::string_list(map.get("outline")),
        link_opportunities: link_opportunities(coerce::first_value(
            map,
            &["internal_link_opportunities", "link_opportunities"],
        )),
        priority: coerce::int_in(map.get("priority"), DEFAULT_PRIORITY, 1, 10) as u8,
        reasoning: coerce::string(map.get("reasoning")),
        title,
    })
}

/// `title` may be a string or `{primary, secondary}`; the secondary title
/// may also arrive as `title_secondary`.
fn title_of(map: &Map<String, Value>) -> Option<LocalizedTitle> {
    let (primary, nested_secondary) = match map.get("title") {
        Some(Value::Object(t)) => (
            coerce::first_string(t, &["primary", "en"]),
            coerce::first_string(t, &["secondary", "translated"]),
        ),
        other => (coerce::opt_string(other), None),
    };

    let primary = primary?;
    let secondary =
        nested_secondary.or_else(|| coerce::first_string(map, &["title_secondary", "title_translated"]));

    Some(LocalizedTitle { primary, secondary })
}

fn link_opportunities(value: Option<&Value>) -> Vec<LinkOpportunity> {
    coerce::array(value)
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(LinkOpportunity {
                anchor: s.trim().to_string(),
                context: String::new(),
            }),
            Value::Object(m) => {
                let anchor = coerce::first_string(m, &["anchor", "anchor_text"])?;
                Some(LinkOpportunity {
                    anchor,
                    context: coerce::string(m.get("context")),
                })
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_topic() {
        let v = json!({
            "title": {"primary": "Italy tourist visa guide", "secondary": "Guida visto Italia"},
            "slug": "Italy Tourist Visa Guide",
            "description": "Everything for a first application",
            "category": "visa_procedures",
            "search_intent": "informational",
            "target_keywords": ["italy visa", "schengen italy"],
            "search_volume": 5400,
            "keyword_difficulty": 42,
            "target_word_count": 1800,
            "outline": ["Who needs a visa", "Documents", "Fees"],
            "internal_link_opportunities": [{"anchor": "Schengen rules", "context": "intro"}],
            "priority": 9,
            "reasoning": "High volume, seasonal peak"
        });
        let t = sanitize_topic(&v, 0).expect("topic");
        assert_eq!(t.title.secondary.as_deref(), Some("Guida visto Italia"));
        assert_eq!(t.slug, "italy-tourist-visa-guide");
        assert_eq!(t.category, Category::VisaProcedures);
        assert_eq!(t.search_volume, 5400);
        assert_eq!(t.outline.len(), 3);
        assert_eq!(t.link_opportunities[0].anchor, "Schengen rules");
        assert_eq!(t.priority, 9);
    }

    #[test]
    fn invalid_category_coerced_to_practical_info() {
        let v = json!({"title": "Packing list", "category": "invalid_value"});
        let t = sanitize_topic(&v, 0).expect("topic");
        assert_eq!(t.category, Category::PracticalInfo);
    }

    #[test]
    fn category_label_is_normalized() {
        let v = json!({"title": "Trip budget", "category": "Travel Planning"});
        assert_eq!(sanitize_topic(&v, 0).unwrap().category, Category::TravelPlanning);
    }

    #[test]
    fn hostile_values_become_defaults() {
        let v = json!({
            "title": "Local etiquette",
            "category": null,
            "search_volume": "unknown",
            "keyword_difficulty": {"score": 3},
            "target_word_count": null,
            "priority": "NaN",
            "target_keywords": "etiquette, customs",
            "outline": {"a": 1},
            "internal_link_opportunities": 17
        });
        let t = sanitize_topic(&v, 0).expect("topic");
        assert_eq!(t.category, Category::DEFAULT);
        assert_eq!(t.search_volume, 0);
        assert_eq!(t.keyword_difficulty, 50);
        assert_eq!(t.target_word_count, 1500);
        assert_eq!(t.priority, 5);
        assert!(t.target_keywords.is_empty());
        assert!(t.outline.is_empty());
        assert!(t.link_opportunities.is_empty());
    }

    #[test]
    fn every_category_input_lands_in_closed_set() {
        for raw in [json!(null), json!(42), json!("CULTURE"), json!("other"), json!(["culture"])] {
            let v = json!({"title": "x", "category": raw});
            let t = sanitize_topic(&v, 0).unwrap();
            assert!(Category::ALL.contains(&t.category));
        }
    }

    #[test]
    fn untitled_topics_dropped() {
        let raw = r#"{"topics": [{"title": "Kept"}, {"description": "no title"}, "text", {"title": ""}]}"#;
        let out = sanitize_topics(raw).expect("sanitize");
        assert_eq!(out.topics.len(), 1);
        assert_eq!(out.dropped, 3);
    }

    #[test]
    fn turkish_title_keeps_its_letters_in_slug() {
        let v = json!({"title": "Çin Vizesi Başvurusu Nasıl Yapılır"});
        assert_eq!(
            sanitize_topic(&v, 0).unwrap().slug,
            "cin-vizesi-basvurusu-nasil-yapilir"
        );
    }

    #[test]
    fn unsluggable_title_still_gets_a_slug() {
        let v = json!({"title": "???", "slug": ""});
        let slug = sanitize_topic(&v, 0).unwrap().slug;
        assert!(slug.starts_with("article-"));
    }

    #[test]
    fn slug_falls_back_to_title() {
        let v = json!({"title": "Best time to visit Japan", "slug": "???"});
        assert_eq!(sanitize_topic(&v, 0).unwrap().slug, "best-time-to-visit-japan");
    }

    #[test]
    fn secondary_title_from_sibling_field() {
        let v = json!({"title": "Visa fees", "title_secondary": "رسوم التأشيرة"});
        let t = sanitize_topic(&v, 0).unwrap();
        assert_eq!(t.title.secondary.as_deref(), Some("رسوم التأشيرة"));
    }
}
