//! Optional enrichment of page records before they are written.
//!
//! The core never interprets wikitext. Enrichers run only when a conversion
//! job is configured with one, and only fill the derived `categories` and
//! `tags` fields.

use crate::models::PageRecord;
use once_cell::sync::Lazy;
use regex::Regex;

static CATEGORY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[Category:([^|\]]+?)(?:\|[^\]]+)?\]\]").unwrap());

static INFOBOX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{Infobox[ _]+([^|}<\n]+)").unwrap());

static DISAMBIG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\{\{(?:disambig(?:uation)?|dab|hndis|geodis|disamb|surname|given name|human name disambiguation|place name disambiguation)\b").unwrap()
});

/// Hook run on every admitted record before it is handed to the writer.
pub trait RecordEnricher: Send + Sync {
    fn enrich(&self, page: &mut PageRecord);
}

/// Fills `categories` from `[[Category:...]]` links and `tags` from the
/// infobox kind and disambiguation markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryTagger;

impl RecordEnricher for CategoryTagger {
    fn enrich(&self, page: &mut PageRecord) {
        let Some(text) = page.text.as_deref() else {
            return;
        };

        page.categories = Some(extract_categories(text));

        let mut tags = Vec::new();
        if let Some(kind) = extract_infobox_kind(text) {
            tags.push(format!("infobox:{}", kind));
        }
        if is_disambiguation(text) {
            tags.push("disambiguation".to_string());
        }
        page.tags = Some(tags);
    }
}

pub fn extract_categories(text: &str) -> Vec<String> {
    CATEGORY_REGEX
        .captures_iter(text)
        .map(|c| sanitize_field(c[1].trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercased kind of the first infobox, e.g. `"military conflict"`.
pub fn extract_infobox_kind(text: &str) -> Option<String> {
    INFOBOX_REGEX
        .captures(text)
        .map(|c| c[1].trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

pub fn is_disambiguation(text: &str) -> bool {
    DISAMBIG_REGEX.is_match(text)
}

/// Collapses newlines into spaces so values stay on a single line.
fn sanitize_field(s: &str) -> String {
    if s.contains('\n') || s.contains('\r') {
        s.replace(['\n', '\r'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_simple() {
        let cats = extract_categories("[[Category:Science]]");
        assert_eq!(cats, vec!["Science"]);
    }

    #[test]
    fn category_with_sort_key() {
        let cats = extract_categories("[[Category:People|Smith, John]]");
        assert_eq!(cats, vec!["People"]);
    }

    #[test]
    fn category_newlines_sanitized() {
        let cats = extract_categories("[[Category:Explorers from n\nNew France]]");
        assert_eq!(cats, vec!["Explorers from n New France"]);
    }

    #[test]
    fn category_does_not_match_regular_links() {
        assert!(extract_categories("[[Rust]] and [[Python]]").is_empty());
    }

    #[test]
    fn infobox_kind_is_lowercased() {
        let text = "{{Infobox Military conflict\n| conflict = Marne\n}}";
        assert_eq!(
            extract_infobox_kind(text).as_deref(),
            Some("military conflict")
        );
        assert_eq!(extract_infobox_kind("no box here"), None);
    }

    #[test]
    fn disambiguation_detected() {
        assert!(is_disambiguation("'''Mercury''' may refer to:\n{{disambiguation}}"));
        assert!(!is_disambiguation("Mercury is a planet."));
    }

    #[test]
    fn tagger_fills_derived_fields() {
        let mut page = PageRecord::article(
            "Rust",
            1,
            "{{Infobox programming language\n| name = Rust\n}}\n[[Category:Programming languages]]",
        );
        CategoryTagger.enrich(&mut page);
        assert_eq!(
            page.categories,
            Some(vec!["Programming languages".to_string()])
        );
        assert_eq!(
            page.tags,
            Some(vec!["infobox:programming language".to_string()])
        );
    }

    #[test]
    fn tagger_leaves_redirects_alone() {
        let mut page = PageRecord::redirect("Rust lang", 2, "Rust");
        CategoryTagger.enrich(&mut page);
        assert_eq!(page.categories, None);
        assert_eq!(page.tags, None);
    }
}
