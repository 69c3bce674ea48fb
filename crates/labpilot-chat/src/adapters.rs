//! Capability adapters: uniform, typed wrappers over the analysis engine and
//! the document index.
//!
//! Every operation resolves its dataset or document, validates parameters,
//! and returns a [`CapabilityOutput`]. The chat composer and the HTTP
//! handlers both call through here, so the same request fails the same way
//! on both surfaces.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use labpilot_analysis::{AggFunc, AnalysisEngine, PlotRequest, PlotType};
use labpilot_core::config::SearchConfig;
use labpilot_core::types::{Column, Dataset, DatasetId, DocumentId, PlotSpec, Record, Table};
use labpilot_storage::DatasetRegistry;
use labpilot_vector::{DocumentIndex, SearchHit};

use crate::error::AdapterError;
use crate::model::Action;
use crate::router::{RoutingDecision, Target};

/// Rows quoted back in a result summary.
const SUMMARY_ROWS: usize = 5;
/// Characters of passage text quoted in a search summary.
const SNIPPET_CHARS: usize = 200;
/// Rows forwarded to the language model in result details.
const DETAIL_ROWS: usize = 20;

/// Normalized result of a capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Plain-language description of the result.
    pub summary: String,
}

pub struct CapabilityAdapters {
    datasets: Arc<DatasetRegistry>,
    documents: Arc<DocumentIndex>,
    engine: Arc<dyn AnalysisEngine>,
    search: SearchConfig,
}

impl CapabilityAdapters {
    pub fn new(
        datasets: Arc<DatasetRegistry>,
        documents: Arc<DocumentIndex>,
        engine: Arc<dyn AnalysisEngine>,
        search: SearchConfig,
    ) -> Self {
        Self {
            datasets,
            documents,
            engine,
            search,
        }
    }

    pub fn datasets(&self) -> &Arc<DatasetRegistry> {
        &self.datasets
    }

    pub fn documents(&self) -> &Arc<DocumentIndex> {
        &self.documents
    }

    /// The dataset with `id`, or the active dataset when `id` is `None`.
    pub fn dataset(&self, id: Option<&DatasetId>) -> Result<Arc<Dataset>, AdapterError> {
        match id {
            Some(id) => self
                .datasets
                .get(id)
                .map_err(|e| AdapterError::from_dataset_error(e, id.as_str())),
            None => self
                .datasets
                .active()
                .map_err(|e| AdapterError::Storage(e.to_string()))?
                .ok_or(AdapterError::NoActiveDataset),
        }
    }

    // =========================================================================
    // Data capabilities
    // =========================================================================

    pub fn filter(
        &self,
        id: Option<&DatasetId>,
        conditions: &str,
    ) -> Result<CapabilityOutput, AdapterError> {
        let dataset = self.dataset(id)?;
        if conditions.trim().is_empty() {
            return Err(AdapterError::InvalidExpression(
                "expression is empty".to_string(),
            ));
        }
        let table = self.engine.filter(&dataset, conditions)?;
        let matched = table.row_count();

        let summary = if matched == 0 {
            format!(
                "No rows in '{}' match `{}`.",
                dataset.name,
                conditions.trim()
            )
        } else {
            format!(
                "Found {} of {} rows in '{}' matching `{}`.",
                matched,
                dataset.row_count(),
                dataset.name,
                conditions.trim()
            )
        };
        let details = json!({
            "dataset": dataset.name,
            "conditions": conditions.trim(),
            "matched": matched,
            "total": dataset.row_count(),
            "rows": head(&table.rows, DETAIL_ROWS),
        });
        Ok(CapabilityOutput {
            table: Some(table),
            plot: None,
            details: Some(details),
            summary,
        })
    }

    pub fn aggregate(
        &self,
        id: Option<&DatasetId>,
        group_column: &str,
        value_column: &str,
        agg_func: Option<&str>,
    ) -> Result<CapabilityOutput, AdapterError> {
        let dataset = self.dataset(id)?;
        let func = match agg_func.filter(|f| !f.trim().is_empty()) {
            Some(f) => f.parse::<AggFunc>()?,
            None => AggFunc::default(),
        };
        for (param, value) in [("group_column", group_column), ("value_column", value_column)] {
            if value.trim().is_empty() {
                return Err(AdapterError::InvalidParameter(format!("{} is required", param)));
            }
        }

        let table = self
            .engine
            .aggregate(&dataset, group_column, value_column, func)?;
        let value_key = table.columns.get(1).cloned().unwrap_or_default();
        let preview: Vec<String> = table
            .rows
            .iter()
            .take(SUMMARY_ROWS)
            .map(|row| {
                let key = row.get(group_column).map(|v| v.to_string()).unwrap_or_default();
                let value = row.get(&value_key).map(|v| v.to_string()).unwrap_or_default();
                format!("{}: {}", key, value)
            })
            .collect();

        let mut summary = format!(
            "The {} of {} by {} in '{}' across {} groups",
            func,
            value_column,
            group_column,
            dataset.name,
            table.row_count()
        );
        if preview.is_empty() {
            summary.push('.');
        } else {
            summary.push_str(&format!(": {}", preview.join("; ")));
            if table.row_count() > SUMMARY_ROWS {
                summary.push_str("; ...");
            }
        }

        let details = json!({
            "dataset": dataset.name,
            "group_column": group_column,
            "value_column": value_column,
            "agg_func": func.as_str(),
            "groups": table.row_count(),
            "rows": head(&table.rows, DETAIL_ROWS),
        });
        Ok(CapabilityOutput {
            table: Some(table),
            plot: None,
            details: Some(details),
            summary,
        })
    }

    pub fn describe(&self, id: Option<&DatasetId>) -> Result<CapabilityOutput, AdapterError> {
        let dataset = self.dataset(id)?;
        let description = self.engine.describe(&dataset)?;

        let (numeric, other): (Vec<_>, Vec<_>) = dataset
            .columns
            .iter()
            .partition(|c| c.column_type.is_numeric());
        let mut summary = format!(
            "'{}' has {} rows and {} columns.",
            dataset.name,
            dataset.row_count(),
            dataset.columns.len()
        );
        if !numeric.is_empty() {
            summary.push_str(&format!(" Numeric columns: {}.", column_list(&numeric)));
        }
        if !other.is_empty() {
            summary.push_str(&format!(" Other columns: {}.", column_list(&other)));
        }

        Ok(CapabilityOutput {
            table: Some(description.table),
            plot: None,
            details: Some(description.summary),
            summary,
        })
    }

    pub fn plot(
        &self,
        id: Option<&DatasetId>,
        plot_type: &str,
        x_column: &str,
        y_column: Option<&str>,
        title: Option<&str>,
    ) -> Result<CapabilityOutput, AdapterError> {
        let dataset = self.dataset(id)?;
        let plot_type: PlotType = plot_type.parse()?;
        if x_column.trim().is_empty() {
            return Err(AdapterError::InvalidParameter(
                "x_column is required".to_string(),
            ));
        }
        let request = PlotRequest {
            plot_type,
            x_column: x_column.to_string(),
            y_column: y_column.map(str::to_string),
            title: title.map(str::to_string),
        };
        let spec = self.engine.plot(&dataset, &request)?;

        let subject = match y_column.filter(|y| !y.trim().is_empty()) {
            Some(y) => format!("{} by {}", y, x_column),
            None => x_column.to_string(),
        };
        Ok(CapabilityOutput {
            table: None,
            plot: Some(spec),
            details: Some(json!({
                "dataset": dataset.name,
                "plot_type": plot_type.as_str(),
                "x_column": x_column,
                "y_column": y_column,
            })),
            summary: format!(
                "Here is a {} chart of {} from '{}'.",
                plot_type, subject, dataset.name
            ),
        })
    }

    // =========================================================================
    // Document capabilities
    // =========================================================================

    /// Ranked passages for `query`. `top_k` defaults to the configured value
    /// and is capped at the configured maximum.
    pub async fn search_hits(
        &self,
        query: &str,
        top_k: Option<usize>,
        scope: Option<&DocumentId>,
    ) -> Result<Vec<SearchHit>, AdapterError> {
        if query.trim().is_empty() {
            return Err(AdapterError::EmptyQuery);
        }
        let top_k = top_k
            .unwrap_or(self.search.default_top_k)
            .min(self.search.max_top_k);
        self.documents
            .search(query, top_k, scope)
            .await
            .map_err(|e| {
                AdapterError::from_document_error(
                    e,
                    scope.map(DocumentId::as_str).unwrap_or_default(),
                )
            })
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        scope: Option<&DocumentId>,
    ) -> Result<CapabilityOutput, AdapterError> {
        let hits = self.search_hits(query, top_k, scope).await?;
        let query = query.trim();

        let summary = if hits.is_empty() {
            if self.documents.is_empty() {
                "No documents have been uploaded yet, so there is nothing to search.".to_string()
            } else {
                format!("I found no passages relevant to \"{}\".", query)
            }
        } else {
            let mut lines = vec![format!(
                "Found {} relevant passages for \"{}\":",
                hits.len(),
                query
            )];
            lines.extend(hits.iter().map(|hit| {
                format!(
                    "- {} (chunk {}, score {:.2}): {}",
                    hit.document,
                    hit.chunk_index,
                    hit.score,
                    snippet(&hit.text)
                )
            }));
            lines.join("\n")
        };

        Ok(CapabilityOutput {
            table: None,
            plot: None,
            details: Some(json!(hits)),
            summary,
        })
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run the capability a routing decision selected.
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
    ) -> Result<CapabilityOutput, AdapterError> {
        debug!(action = decision.action.name(), "Executing capability");
        let dataset = match &decision.dataset {
            Some(Target::Resolved(id)) => Some(id),
            Some(Target::Unknown(name)) if decision.action.uses_dataset() => {
                return Err(AdapterError::DatasetNotFound(name.clone()))
            }
            _ => None,
        };

        match &decision.action {
            Action::Filter { conditions } => self.filter(dataset, conditions),
            Action::Aggregate {
                group_column,
                value_column,
                agg_func,
            } => self.aggregate(dataset, group_column, value_column, agg_func.as_deref()),
            Action::Describe => self.describe(dataset),
            Action::Plot {
                plot_type,
                x_column,
                y_column,
                title,
            } => self.plot(
                dataset,
                plot_type,
                x_column,
                y_column.as_deref(),
                title.as_deref(),
            ),
            Action::Search { query, top_k } => {
                let scope = match &decision.document {
                    Some(Target::Resolved(id)) => Some(id),
                    Some(Target::Unknown(name)) => {
                        return Err(AdapterError::DocumentNotFound(name.clone()))
                    }
                    None => None,
                };
                self.search(query, *top_k, scope).await
            }
            Action::Converse => Err(AdapterError::InvalidParameter(
                "no capability selected".to_string(),
            )),
        }
    }
}

fn column_list(columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn head(rows: &[Record], n: usize) -> Vec<&Record> {
    rows.iter().take(n).collect()
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}
