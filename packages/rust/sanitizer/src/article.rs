//! Article sanitization.

use serde_json::Value;

use visapress_shared::{ArticleDraft, InternalLink, LocalizedTitle, PipelineError, Result};

use crate::coerce;
use crate::parse_object;
use crate::text::{slug_or_fallback, strip_html, truncate_chars};

const META_TITLE_MAX: usize = 60;
const META_DESCRIPTION_MAX: usize = 160;

/// Parse an article-generation response.
///
/// The body is mandatory; every other field falls back to something derived
/// from the topic (`fallback_title`) or the body itself.
pub fn sanitize_article(raw: &str, fallback_title: &LocalizedTitle) -> Result<ArticleDraft> {
    let map = parse_object(raw)?;

    let body = coerce::first_string(&map, &["content", "body", "html"])
        .ok_or_else(|| PipelineError::malformed("article body missing", raw))?;

    let title = match map.get("title") {
        Some(Value::Object(t)) => coerce::first_string(t, &["primary", "en"]).map(|primary| {
            LocalizedTitle {
                primary,
                secondary: coerce::first_string(t, &["secondary", "translated"]),
            }
        }),
        other => coerce::opt_string(other).map(|primary| LocalizedTitle {
            primary,
            secondary: coerce::first_string(&map, &["title_secondary", "title_translated"]),
        }),
    }
    .unwrap_or_else(|| fallback_title.clone());

    let slug = slug_or_fallback(
        coerce::opt_string(map.get("slug")).as_deref(),
        &title.primary,
    );

    let meta_title = coerce::opt_string(map.get("meta_title"))
        .unwrap_or_else(|| title.primary.clone());
    let meta_description = coerce::opt_string(map.get("meta_description"))
        .unwrap_or_else(|| strip_html(&body));

    let image_query = coerce::first_string(&map, &["image_search_query", "image_query"]);

    Ok(ArticleDraft {
        slug,
        meta_title: truncate_chars(&meta_title, META_TITLE_MAX),
        meta_description: truncate_chars(&meta_description, META_DESCRIPTION_MAX),
        internal_links: internal_links(map.get("internal_links")),
        image_query,
        readability_score: coerce::number_in(map.get("readability_score"), 0.0, 0.0, 100.0),
        seo_score: coerce::number_in(map.get("seo_score"), 0.0, 0.0, 100.0),
        title,
        body,
    })
}

fn internal_links(value: Option<&Value>) -> Vec<InternalLink> {
    coerce::array(value)
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let Value::Object(m) = item else {
                return None;
            };
            let url = coerce::first_string(m, &["url", "href"])?;
            let anchor = coerce::first_string(m, &["anchor", "anchor_text", "text"])?;
            Some(InternalLink {
                url,
                anchor,
                position: coerce::int_in(m.get("position"), i as u32, 0, u32::MAX),
                context: coerce::string(m.get("context")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> LocalizedTitle {
        LocalizedTitle {
            primary: "Fallback title".into(),
            secondary: None,
        }
    }

    #[test]
    fn full_article() {
        let raw = r#"```json
{
  "title": "Italy visa requirements in 2025",
  "slug": "italy-visa-requirements-2025",
  "content": "<h2>Overview</h2><p>Italy is part of the Schengen area.</p>",
  "meta_title": "Italy Visa Requirements 2025",
  "meta_description": "A step-by-step guide to applying for an Italian visa.",
  "internal_links": [
    {"url": "/blog/schengen-insurance", "anchor": "travel insurance", "position": 2, "context": "documents"},
    {"url": "", "anchor": "dropped"}
  ],
  "image_search_query": "rome colosseum sunset",
  "readability_score": 68.5,
  "seo_score": "82"
}
```"#;
        let a = sanitize_article(raw, &fallback()).expect("article");
        assert_eq!(a.title.primary, "Italy visa requirements in 2025");
        assert_eq!(a.internal_links.len(), 1);
        assert_eq!(a.internal_links[0].position, 2);
        assert_eq!(a.image_query.as_deref(), Some("rome colosseum sunset"));
        assert_eq!(a.seo_score, 82.0);
        assert_eq!(a.readability_score, 68.5);
    }

    #[test]
    fn missing_body_is_malformed() {
        let err = sanitize_article(r#"{"title": "No body"}"#, &fallback()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));
    }

    #[test]
    fn sparse_article_uses_fallbacks() {
        let raw = r#"{"content": "<p>Short body about visas.</p>", "readability_score": 250, "internal_links": "none"}"#;
        let a = sanitize_article(raw, &fallback()).expect("article");
        assert_eq!(a.title, fallback());
        assert_eq!(a.slug, "fallback-title");
        assert_eq!(a.meta_title, "Fallback title");
        assert_eq!(a.meta_description, "Short body about visas.");
        assert_eq!(a.readability_score, 100.0);
        assert_eq!(a.seo_score, 0.0);
        assert!(a.internal_links.is_empty());
        assert!(a.image_query.is_none());
    }

    #[test]
    fn meta_fields_are_bounded() {
        let long = "word ".repeat(100);
        let raw = serde_json::json!({
            "content": "<p>body</p>",
            "meta_title": long,
            "meta_description": long,
        })
        .to_string();
        let a = sanitize_article(&raw, &fallback()).expect("article");
        assert!(a.meta_title.chars().count() <= 60);
        assert!(a.meta_description.chars().count() <= 160);
    }

    #[test]
    fn link_position_defaults_to_index() {
        let raw = r#"{"content": "<p>x</p>", "internal_links": [{"url": "/a", "anchor": "a"}, {"url": "/b", "anchor": "b", "position": null}]}"#;
        let a = sanitize_article(raw, &fallback()).expect("article");
        assert_eq!(a.internal_links[0].position, 0);
        assert_eq!(a.internal_links[1].position, 1);
    }
}
