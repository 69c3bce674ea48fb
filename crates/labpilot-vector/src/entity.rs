//! Entity extraction from document text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use labpilot_core::types::Entity;

/// Most entities kept per call.
pub const MAX_ENTITIES: usize = 50;

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b10\.\d{4,9}/[^\s"<>]+"#).unwrap());

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>")\]]+"#).unwrap());

static DATE_ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap());

static MEASUREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d+(?:\.\d+)?\s?(?:mg/mL|mg/ml|µg|ug|ng|mg|kg|mL|ml|µL|uL|mM|µM|uM|nM|°C|nm|µm|mm|cm|min|rpm|%))(?:[^\w]|$)",
    )
    .unwrap()
});

/// Gene and protein style symbols: capitals followed by digits (BRCA1, TP53, IL6R).
static GENE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,6}\d{1,3}[A-Z]?\b").unwrap());

/// Extracts DOIs, URLs, ISO dates, measurements, and gene-like symbols.
#[derive(Debug, Clone, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract entities from `text`, deduplicated by lower-cased text and
    /// label and capped at [`MAX_ENTITIES`].
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut found = Vec::new();

        for m in DOI_RE.find_iter(text) {
            found.push(entity(trim_trailing_punct(m.as_str()), "DOI"));
        }
        for m in URL_RE.find_iter(text) {
            found.push(entity(trim_trailing_punct(m.as_str()), "URL"));
        }
        for m in DATE_ISO_RE.find_iter(text) {
            found.push(entity(m.as_str(), "DATE"));
        }
        for caps in MEASUREMENT_RE.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                found.push(entity(m.as_str(), "MEASUREMENT"));
            }
        }
        for m in GENE_RE.find_iter(text) {
            found.push(entity(m.as_str(), "GENE"));
        }

        dedup(found)
    }
}

/// Merge entity lists, keeping first occurrences, capped at [`MAX_ENTITIES`].
pub fn dedup(entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| seen.insert((e.text.to_lowercase(), e.label.clone())))
        .take(MAX_ENTITIES)
        .collect()
}

fn entity(text: &str, label: &str) -> Entity {
    Entity {
        text: text.to_string(),
        label: label.to_string(),
    }
}

fn trim_trailing_punct(s: &str) -> &str {
    s.trim_end_matches(['.', ',', ';', ':', ')'])
}
