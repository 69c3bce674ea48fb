//! Offline language model built from keyword rules.
//!
//! Classification checks, in order: plot, aggregate, describe, filter, search,
//! and finally falls back to conversation. Column words are grounded against
//! the active dataset's schema case-insensitively; words that match no column
//! are passed through unchanged so the adapters can report them.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use labpilot_core::error::LabpilotError;
use labpilot_core::types::Column;

use crate::model::{Action, Classification, GenerationRequest, LanguageModel, RoutingContext};

// =============================================================================
// Patterns
// =============================================================================

static PLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(plots?|charts?|graphs?|visuali[sz]e|histograms?|scatter\s*plot|pie|boxplot|draw)\b",
    )
    .unwrap()
});

static PLOT_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(histogram|scatter|pie|line|box|bar)(?:plot|chart)?\b").unwrap()
});

static NAMED_CHART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-z]+)\s+(?:chart|plot|graph)\b").unwrap());

static VS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(`[^`]+`|[\w.]+)\s+(?:vs\.?|versus|against)\s+(`[^`]+`|[\w.]+)").unwrap()
});

static BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:grouped by|group by|by|per|for each|for every|across|over)\s+(?:the\s+|each\s+)?(`[^`]+`|[\w.]+)",
    )
    .unwrap()
});

static OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bof\s+(?:the\s+)?(`[^`]+`|[\w.]+)").unwrap());

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\btitled?\s+["']([^"']+)["']"#).unwrap());

static AGG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(average|avg|mean|sum|total|count|number of|how many|minimum|min|maximum|max|median|standard deviation|stdev|std)\b\s*(?:of\s+)?(?:the\s+)?(`[^`]+`|[\w.]+)?",
    )
    .unwrap()
});

static DESCRIBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(describe|description|summary|summari[sz]e|statistics|stats|overview)\b")
        .unwrap()
});

static DOC_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(papers?|documents?|docs|pdfs?|literature|articles?|publications?|protocols?|manuscripts?)\b",
    )
    .unwrap()
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(search|look up|according to|references?|cite|mention(?:s|ed)?)\b").unwrap()
});

static SEARCH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:can you\s+)?(?:search|look up|find|check)\s+(?:in\s+)?(?:the\s+|my\s+)?(?:documents?|papers?|pdfs?|literature)?\s*(?:for|about|on)?\s*",
    )
    .unwrap()
});

static TOP_K_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btop\s+(\d+)\b").unwrap());

static FILTER_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(filter|where|rows|only|having)\b").unwrap());

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(`[^`]+`|[A-Za-z_][\w.]*)\s*(>=|<=|==|!=|=|>|<)\s*('[^']*'|"[^"]*"|-?[\w.]+)"#,
    )
    .unwrap()
});

static OR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bor\b").unwrap());

/// Comparison phrases rewritten to operators, most specific first.
static COMPARISON_PHRASES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\s+(?:is\s+)?greater than or equal to\s+", " >= "),
        (r"(?i)\s+(?:is\s+)?less than or equal to\s+", " <= "),
        (r"(?i)\s+(?:is\s+)?at least\s+", " >= "),
        (r"(?i)\s+(?:is\s+)?at most\s+", " <= "),
        (r"(?i)\s+(?:is\s+)?(?:greater|more|higher|larger|bigger) than\s+", " > "),
        (r"(?i)\s+(?:is\s+)?(?:less|lower|smaller|fewer) than\s+", " < "),
        (r"(?i)\s+(?:is\s+)?(?:above|over|exceeds?|exceeding)\s+", " > "),
        (r"(?i)\s+(?:is\s+)?(?:below|under)\s+", " < "),
        (
            r"(?i)\s+(?:is\s+not|isn't|not equal to|does not equal|doesn't equal)\s+",
            " != ",
        ),
        (r"(?i)\s+(?:is\s+)?(?:equal to|equals)\s+", " == "),
        (r"(?i)\s+is\s+", " == "),
    ]
    .into_iter()
    .map(|(pattern, op)| (Regex::new(pattern).unwrap(), op))
    .collect()
});

static DATASET_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([\w\-]+\.(?:csv|tsv|xlsx|xls))\b").unwrap());

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|good (?:morning|afternoon|evening))\b").unwrap()
});

static THANKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(thanks|thank you|cheers)\b").unwrap());

/// Words captured by the column patterns that never name a column.
const STOPWORDS: &[&str] = &[
    "by", "per", "for", "across", "over", "each", "of", "the", "a", "an", "rows", "row", "samples",
    "entries", "records", "items", "values", "data", "dataset", "results", "distribution",
    "grouped", "group", "all", "it", "this", "that",
];

/// Words that precede "chart" or "plot" without naming a chart kind.
const CHART_FILLER: &[&str] = &[
    "a", "an", "the", "this", "that", "my", "me", "simple", "nice", "quick", "make", "draw",
    "create", "show", "generate", "of", "and", "in", "plot", "new",
];

// =============================================================================
// Model
// =============================================================================

/// Deterministic, offline [`LanguageModel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedModel;

impl RuleBasedModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LanguageModel for RuleBasedModel {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(
        &self,
        text: &str,
        context: &RoutingContext,
    ) -> Result<Classification, LabpilotError> {
        Ok(classify_text(text, context))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LabpilotError> {
        Ok(match &request.result {
            Some(result) => result.summary.clone(),
            None => converse_reply(&request.message, &request.context),
        })
    }
}

/// Classify `text` against the context's schema and loaded names.
pub fn classify_text(text: &str, context: &RoutingContext) -> Classification {
    let columns = context.columns();
    let dataset = mentioned_name(text, &context.dataset_names).or_else(|| {
        DATASET_FILE_RE
            .captures(text)
            .map(|c| c[1].to_string())
    });

    if PLOT_RE.is_match(text) {
        return Classification::new(plot_action(text, columns)).with_dataset(dataset);
    }
    if let Some(action) = aggregate_action(text, columns) {
        return Classification::new(action).with_dataset(dataset);
    }
    if DESCRIBE_RE.is_match(text) && !DOC_NOUN_RE.is_match(text) {
        return Classification::new(Action::Describe).with_dataset(dataset);
    }
    if let Some(conditions) = filter_conditions(text, columns) {
        return Classification::new(Action::Filter { conditions }).with_dataset(dataset);
    }

    let document = mentioned_name(text, &context.document_names);
    if document.is_some() || DOC_NOUN_RE.is_match(text) || SEARCH_RE.is_match(text) {
        let top_k = TOP_K_RE
            .captures(text)
            .and_then(|c| c[1].parse::<usize>().ok());
        return Classification::new(Action::Search {
            query: search_query(text),
            top_k,
        })
        .with_document(document);
    }

    Classification::converse()
}

// =============================================================================
// Action extraction
// =============================================================================

fn plot_action(text: &str, columns: &[Column]) -> Action {
    let plot_type = plot_type(text, columns);
    let title = TITLE_RE.captures(text).map(|c| c[1].trim().to_string());
    let mentioned = mentioned_columns(text, columns);
    let by = capture(&BY_RE, text).map(|c| ground_column(c, columns));
    let of = capture(&OF_RE, text)
        .filter(|c| !is_stopword(c))
        .map(|c| ground_column(c, columns));
    let first_other = |x: &str| mentioned.iter().find(|c| c.as_str() != x).cloned();

    let (x_column, y_column) = if let Some(caps) = VS_RE.captures(text) {
        (
            ground_column(&caps[2], columns),
            Some(ground_column(&caps[1], columns)),
        )
    } else if plot_type == "histogram" {
        (of.or_else(|| mentioned.first().cloned()).unwrap_or_default(), None)
    } else if let Some(by) = by {
        let y = of.filter(|o| *o != by).or_else(|| first_other(&by));
        (by, y)
    } else {
        let x = of.or_else(|| mentioned.first().cloned()).unwrap_or_default();
        let y = first_other(&x);
        (x, y)
    };

    Action::Plot {
        plot_type,
        x_column,
        y_column,
        title,
    }
}

fn plot_type(text: &str, columns: &[Column]) -> String {
    if let Some(caps) = PLOT_TYPE_RE.captures(text) {
        return caps[1].to_lowercase();
    }
    if let Some(caps) = NAMED_CHART_RE.captures(text) {
        let word = caps[1].to_lowercase();
        if !CHART_FILLER.contains(&word.as_str()) && find_column(&word, columns).is_none() {
            return word;
        }
    }
    "bar".to_string()
}

/// Bare words must name a known column to count as an aggregation request.
/// Backticked names are always taken at face value.
fn aggregate_action(text: &str, columns: &[Column]) -> Option<Action> {
    let caps = AGG_RE.captures(text)?;
    let raw_group = BY_RE.captures(text)?.get(1)?.as_str();
    let group = ground_column(raw_group, columns);
    let func = canonical_agg(&caps[1]);

    let raw_value = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|v| !is_stopword(v));
    let known_value = raw_value.and_then(|v| find_column(v, columns));
    let value = known_value
        .or_else(|| {
            mentioned_columns(text, columns)
                .into_iter()
                .find(|c| *c != group)
        })
        .or_else(|| raw_value.map(|v| ground_column(v, columns)))
        .unwrap_or_else(|| group.clone());

    let quoted = raw_group.starts_with('`') || raw_value.is_some_and(|v| v.starts_with('`'));
    let grounded = quoted
        || find_column(&group, columns).is_some()
        || find_column(&value, columns).is_some();
    grounded.then(|| Action::Aggregate {
        group_column: group,
        value_column: value,
        agg_func: Some(func.to_string()),
    })
}

fn canonical_agg(word: &str) -> &'static str {
    match word.to_lowercase().as_str() {
        "sum" | "total" => "sum",
        "count" | "number of" | "how many" => "count",
        "minimum" | "min" => "min",
        "maximum" | "max" => "max",
        "median" => "median",
        "standard deviation" | "stdev" | "std" => "std",
        _ => "mean",
    }
}

/// Turn comparison phrases into a filter expression.
///
/// Returns `None` unless at least one comparison was found and either its
/// left side names a known column or the text reads like a filter request.
fn filter_conditions(text: &str, columns: &[Column]) -> Option<String> {
    let mut normalized = format!(" {} ", text.trim().trim_end_matches(['?', '!']));
    for (re, op) in COMPARISON_PHRASES.iter() {
        normalized = re.replace_all(&normalized, *op).into_owned();
    }

    let mut expression = String::new();
    let mut known_lhs = false;
    let mut last_end = 0;
    for caps in COMPARISON_RE.captures_iter(&normalized) {
        let (Some(whole), Some(lhs), Some(op), Some(rhs)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let gap = &normalized[last_end..whole.start()];
        if !expression.is_empty() {
            expression.push_str(if OR_RE.is_match(gap) { " or " } else { " and " });
        }
        last_end = whole.end();

        // Two-word column names arrive split: "cell line = HeLa".
        let lhs_name = lhs.as_str().trim_matches('`');
        let column = find_column(lhs_name, columns).or_else(|| {
            gap.split_whitespace()
                .last()
                .and_then(|prev| find_column(&format!("{} {}", prev, lhs_name), columns))
        });
        known_lhs |= column.is_some();
        let lhs = format_column(&column.unwrap_or_else(|| lhs_name.to_string()));
        let op = if op.as_str() == "=" { "==" } else { op.as_str() };
        expression.push_str(&format!("{} {} {}", lhs, op, format_operand(rhs.as_str(), columns)));
    }

    if expression.is_empty() || !(known_lhs || FILTER_KEYWORD_RE.is_match(text)) {
        return None;
    }
    Some(expression)
}

fn format_operand(raw: &str, columns: &[Column]) -> String {
    if raw.starts_with('\'') || raw.starts_with('"') {
        return raw.to_string();
    }
    let raw = if raw.len() > 1 { raw.trim_end_matches('.') } else { raw };
    if raw.parse::<f64>().is_ok()
        || matches!(
            raw.to_lowercase().as_str(),
            "true" | "false" | "null" | "none"
        )
    {
        return raw.to_string();
    }
    match find_column(raw, columns) {
        Some(column) => format_column(&column),
        None => format!("'{}'", raw.replace('\'', "\\'")),
    }
}

fn format_column(name: &str) -> String {
    let plain = name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| !c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name)
    }
}

fn search_query(text: &str) -> String {
    let stripped = SEARCH_PREFIX_RE.replace(text, "");
    let query = stripped.trim().trim_end_matches(['?', '.', '!']).trim();
    if query.is_empty() {
        text.trim().to_string()
    } else {
        query.to_string()
    }
}

// =============================================================================
// Grounding helpers
// =============================================================================

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('`'))
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// The schema's spelling of `word`, if it names a column.
fn find_column(word: &str, columns: &[Column]) -> Option<String> {
    let word = word.trim().trim_matches('`');
    columns
        .iter()
        .find(|c| c.name == word)
        .or_else(|| columns.iter().find(|c| normalize(&c.name) == normalize(word)))
        .map(|c| c.name.clone())
}

fn ground_column(word: &str, columns: &[Column]) -> String {
    find_column(word, columns).unwrap_or_else(|| word.trim().trim_matches('`').to_string())
}

/// Schema columns mentioned in `text`, in order of first mention.
fn mentioned_columns(text: &str, columns: &[Column]) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut found: Vec<(usize, String)> = columns
        .iter()
        .filter_map(|c| {
            let lower = c.name.to_lowercase();
            find_word(&haystack, &lower)
                .or_else(|| find_word(&haystack, &lower.replace('_', " ")))
                .map(|pos| (pos, c.name.clone()))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, name)| name).collect()
}

/// The longest of `names` mentioned in `text`, matched case-insensitively
/// with or without its file extension.
fn mentioned_name(text: &str, names: &[String]) -> Option<String> {
    let haystack = text.to_lowercase();
    names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            let stem = lower.rsplit_once('.').map(|(s, _)| s).unwrap_or(&lower);
            find_word(&haystack, &lower).is_some()
                || (stem.chars().count() >= 3 && find_word(&haystack, stem).is_some())
        })
        .max_by_key(|name| name.len())
        .cloned()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of `needle` in `haystack` at word boundaries.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.match_indices(needle).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

// =============================================================================
// Conversation
// =============================================================================

fn converse_reply(message: &str, context: &RoutingContext) -> String {
    let opening = if GREETING_RE.is_match(message) {
        "Hello! I'm Lab Co-Pilot, your assistant for exploring lab data."
    } else if THANKS_RE.is_match(message) {
        "You're welcome!"
    } else {
        "I can help you explore your lab data."
    };

    let mut parts = vec![
        opening.to_string(),
        "Ask me to filter rows, aggregate a column by group, describe the data, \
         plot a chart, or search your uploaded documents."
            .to_string(),
    ];

    match &context.active_dataset {
        Some(active) => {
            let names: Vec<&str> = active.columns.iter().map(|c| c.name.as_str()).collect();
            parts.push(format!(
                "Your active dataset is '{}' with {} rows and columns: {}.",
                active.name,
                active.row_count,
                names.join(", ")
            ));
        }
        None => parts.push(
            "No dataset is loaded yet. Upload a CSV or Excel file to get started.".to_string(),
        ),
    }
    if !context.document_names.is_empty() {
        parts.push(format!(
            "Documents available for search: {}.",
            context.document_names.join(", ")
        ));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActiveDataset, ToolResult};
    use labpilot_core::types::{ColumnType, DatasetId};

    fn column(name: &str, column_type: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            column_type,
        }
    }

    fn context() -> RoutingContext {
        RoutingContext {
            active_dataset: Some(ActiveDataset {
                id: DatasetId::new("d1"),
                name: "genes.csv".to_string(),
                columns: vec![
                    column("gene", ColumnType::String),
                    column("expression", ColumnType::Number),
                    column("condition", ColumnType::String),
                    column("time", ColumnType::Number),
                    column("cell_line", ColumnType::String),
                ],
                row_count: 12,
            }),
            dataset_names: vec!["genes.csv".to_string(), "other.csv".to_string()],
            document_names: vec!["protocol.pdf".to_string()],
            history: vec![],
        }
    }

    fn classify(text: &str) -> Classification {
        classify_text(text, &context())
    }

    #[test]
    fn test_plot_by() {
        assert_eq!(
            classify("plot expression by gene").action,
            Action::Plot {
                plot_type: "bar".into(),
                x_column: "gene".into(),
                y_column: Some("expression".into()),
                title: None,
            }
        );
    }

    #[test]
    fn test_scatter_versus() {
        assert_eq!(
            classify("Scatter plot of Expression vs time").action,
            Action::Plot {
                plot_type: "scatter".into(),
                x_column: "time".into(),
                y_column: Some("expression".into()),
                title: None,
            }
        );
    }

    #[test]
    fn test_histogram_and_title() {
        assert_eq!(
            classify("histogram of expression titled 'Spread'").action,
            Action::Plot {
                plot_type: "histogram".into(),
                x_column: "expression".into(),
                y_column: None,
                title: Some("Spread".into()),
            }
        );
    }

    #[test]
    fn test_unknown_chart_kind_is_passed_through() {
        let Action::Plot { plot_type, .. } = classify("draw a radar chart of expression").action
        else {
            panic!("expected plot");
        };
        assert_eq!(plot_type, "radar");
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(
            classify("What is the average expression by condition?").action,
            Action::Aggregate {
                group_column: "condition".into(),
                value_column: "expression".into(),
                agg_func: Some("mean".into()),
            }
        );
    }

    #[test]
    fn test_count_per_group() {
        assert_eq!(
            classify("how many samples per condition").action,
            Action::Aggregate {
                group_column: "condition".into(),
                value_column: "condition".into(),
                agg_func: Some("count".into()),
            }
        );
    }

    #[test]
    fn test_aggregate_unknown_value_column_passed_through() {
        assert_eq!(
            classify("max foo by gene").action,
            Action::Aggregate {
                group_column: "gene".into(),
                value_column: "foo".into(),
                agg_func: Some("max".into()),
            }
        );
    }

    #[test]
    fn test_aggregate_of_quoted_unknown_columns() {
        assert_eq!(
            classify("average of `foo` by `bar`").action,
            Action::Aggregate {
                group_column: "bar".into(),
                value_column: "foo".into(),
                agg_func: Some("mean".into()),
            }
        );
    }

    #[test]
    fn test_ungrounded_bare_words_are_not_aggregates() {
        assert_eq!(
            classify("how many papers mention autophagy by year").action.name(),
            "search_documents"
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(classify("describe the data").action, Action::Describe);
        assert_eq!(classify("Give me summary statistics").action, Action::Describe);
    }

    #[test]
    fn test_summarize_paper_is_search() {
        assert!(matches!(
            classify("summarize the paper on CRISPR").action,
            Action::Search { .. }
        ));
    }

    #[test]
    fn test_filter_phrases() {
        assert_eq!(
            classify("show rows where expression is greater than 2 and gene is BRCA1").action,
            Action::Filter {
                conditions: "expression > 2 and gene == 'BRCA1'".into()
            }
        );
        assert_eq!(
            classify("filter Time >= 4 or cell line = HeLa").action,
            Action::Filter {
                conditions: "time >= 4 or cell_line == 'HeLa'".into()
            }
        );
    }

    #[test]
    fn test_filter_symbolic() {
        assert_eq!(
            classify("expression < 0.5").action,
            Action::Filter {
                conditions: "expression < 0.5".into()
            }
        );
    }

    #[test]
    fn test_small_talk_is_not_a_filter() {
        assert_eq!(classify("hello, what is this?").action, Action::Converse);
    }

    #[test]
    fn test_search() {
        assert_eq!(
            classify("Search the papers for CRISPR off-target effects").action,
            Action::Search {
                query: "CRISPR off-target effects".into(),
                top_k: None,
            }
        );
        let c = classify("top 3 passages in protocol.pdf about incubation");
        assert_eq!(c.document.as_deref(), Some("protocol.pdf"));
        assert!(matches!(c.action, Action::Search { top_k: Some(3), .. }));
    }

    #[test]
    fn test_dataset_mentions() {
        let c = classify("describe other.csv");
        assert_eq!(c.action, Action::Describe);
        assert_eq!(c.dataset.as_deref(), Some("other.csv"));

        let c = classify("describe missing.xlsx");
        assert_eq!(c.dataset.as_deref(), Some("missing.xlsx"));

        assert_eq!(classify("describe the data").dataset, None);
    }

    #[test]
    fn test_no_dataset_loaded() {
        let ctx = RoutingContext::default();
        assert_eq!(classify_text("tell me a joke", &ctx).action, Action::Converse);
        assert_eq!(classify_text("describe the data", &ctx).action, Action::Describe);
    }

    #[test]
    fn test_mentioned_columns_order() {
        let ctx = context();
        assert_eq!(
            mentioned_columns("time and cell line vs expression", ctx.columns()),
            vec!["time", "cell_line", "expression"]
        );
        assert_eq!(find_word("timeline", "time"), None);
    }

    #[tokio::test]
    async fn test_generate_uses_result_summary() {
        let model = RuleBasedModel::new();
        let request = GenerationRequest {
            message: "describe".into(),
            context: context(),
            result: Some(ToolResult {
                action: "describe_data",
                summary: "Summary statistics for 5 columns.".into(),
                details: None,
            }),
        };
        assert_eq!(
            model.generate(&request).await.unwrap(),
            "Summary statistics for 5 columns."
        );
    }

    #[tokio::test]
    async fn test_generate_conversation() {
        let model = RuleBasedModel::new();
        let reply = model
            .generate(&GenerationRequest {
                message: "Hello there".into(),
                context: RoutingContext::default(),
                result: None,
            })
            .await
            .unwrap();
        assert!(reply.starts_with("Hello!"));
        assert!(reply.contains("No dataset is loaded yet"));

        let reply = model
            .generate(&GenerationRequest {
                message: "what can you do".into(),
                context: context(),
                result: None,
            })
            .await
            .unwrap();
        assert!(reply.contains("'genes.csv' with 12 rows"));
        assert!(reply.contains("protocol.pdf"));
    }
}
