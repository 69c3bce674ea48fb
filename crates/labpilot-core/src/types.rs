use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LabpilotError, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Short opaque identifier: the first 12 hex characters of a v4 UUID.
fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an uploaded tabular dataset.
    DatasetId
);
string_id!(
    /// Identifier of an uploaded document.
    DocumentId
);
string_id!(
    /// Identifier of a conversation session.
    SessionId
);

impl DatasetId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(short_id())
    }
}

impl DocumentId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(short_id())
    }
}

impl SessionId {
    /// The session used when a caller does not name one.
    pub fn default_session() -> Self {
        Self("default".to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::default_session()
    }
}

// =============================================================================
// Scalars and records
// =============================================================================

/// A single cell value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// The column type this value implies, or `None` for null.
    pub fn value_type(&self) -> Option<ColumnType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(ColumnType::Boolean),
            Scalar::Number(_) => Some(ColumnType::Number),
            Scalar::Text(_) => Some(ColumnType::String),
        }
    }

    /// Key used to group rows by this value. Distinguishes `1` from `"1"`.
    pub fn group_key(&self) -> String {
        match self {
            Scalar::Null => "n:".to_string(),
            Scalar::Bool(b) => format!("b:{}", b),
            Scalar::Number(n) => format!("f:{}", n),
            Scalar::Text(s) => format!("s:{}", s),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        if n.is_finite() {
            Scalar::Number(n)
        } else {
            Scalar::Null
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// One row: column name to value.
pub type Record = BTreeMap<String, Scalar>;

// =============================================================================
// Datasets
// =============================================================================

/// Inferred type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Number,
    Boolean,
    String,
    /// Every value in the column is null.
    Null,
}

impl ColumnType {
    /// Whether the column holds numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Number)
    }
}

/// A named, typed column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Parsed tabular data handed over by the ingestion collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// Column order.
    pub columns: Vec<String>,
    /// Rows keyed by column name.
    pub rows: Vec<Record>,
}

impl NewDataset {
    /// Build a dataset description, taking column order from `columns`.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Build a dataset description whose columns are the union of all row keys.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Record>) -> Self {
        let columns: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        Self::new(name, columns.into_iter().collect(), rows)
    }
}

/// An immutable uploaded dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Record>,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    /// Validate and normalize a [`NewDataset`] under the given id.
    ///
    /// Missing keys are filled with null so every record's key set equals the
    /// column list. Keys that are not declared columns, duplicate column names,
    /// and blank column names are rejected.
    pub fn build(id: DatasetId, new: NewDataset) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for name in &new.columns {
            if name.trim().is_empty() {
                return Err(LabpilotError::Validation(
                    "column names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(LabpilotError::Validation(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        let mut rows = Vec::with_capacity(new.rows.len());
        for (i, mut row) in new.rows.into_iter().enumerate() {
            if let Some(extra) = row.keys().find(|k| !seen.contains(k.as_str())) {
                return Err(LabpilotError::Validation(format!(
                    "row {} has undeclared column '{}'",
                    i, extra
                )));
            }
            for name in &new.columns {
                row.entry(name.clone()).or_insert(Scalar::Null);
            }
            rows.push(row);
        }

        let columns = new
            .columns
            .iter()
            .map(|name| Column {
                name: name.clone(),
                column_type: infer_column_type(&rows, name),
            })
            .collect();

        Ok(Self {
            id,
            name: new.name,
            columns,
            rows,
            created_at: Utc::now(),
        })
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column with this exact name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The first `n` rows.
    pub fn preview(&self, n: usize) -> Vec<Record> {
        self.rows.iter().take(n).cloned().collect()
    }

    /// Metadata summary for listings.
    pub fn metadata(&self) -> DatasetMeta {
        DatasetMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
            row_count: self.row_count(),
        }
    }
}

/// Infer a column's type from its non-null values.
///
/// Uniformly numeric or boolean columns get that type; anything mixed is a
/// string column; an all-null column is `Null`.
pub fn infer_column_type(rows: &[Record], column: &str) -> ColumnType {
    let mut inferred: Option<ColumnType> = None;
    for value in rows.iter().filter_map(|r| r.get(column)) {
        match (inferred, value.value_type()) {
            (_, None) => {}
            (None, Some(t)) => inferred = Some(t),
            (Some(a), Some(b)) if a == b => {}
            (Some(_), Some(_)) => return ColumnType::String,
        }
    }
    inferred.unwrap_or(ColumnType::Null)
}

/// Listing entry for a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub id: DatasetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

// =============================================================================
// Documents
// =============================================================================

/// A labelled text span extracted from a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

/// A retrievable span of document text with its embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position within the document, starting at 0.
    pub index: usize,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

/// A document ready to be indexed: chunked and embedded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub name: String,
    pub chunks: Vec<NewChunk>,
    /// Document-level entities.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// A chunk before it receives its position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// An indexed, immutable document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub chunks: Vec<Chunk>,
    pub entities: Vec<Entity>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Metadata summary for listings.
    pub fn metadata(&self) -> DocumentMeta {
        DocumentMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            chunk_count: self.chunk_count(),
        }
    }
}

/// Listing entry for a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub name: String,
    pub chunk_count: usize,
}

// =============================================================================
// Conversation
// =============================================================================

/// Speaker of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// Rows plus their column order. A table never exists without its columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// A copy holding at most `max_rows` rows.
    pub fn truncated(&self, max_rows: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(max_rows).cloned().collect(),
        }
    }
}

/// Opaque chart specification, passed through without interpretation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotSpec(pub serde_json::Value);

impl PlotSpec {
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// One entry in a session's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A plain user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// A plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            plot: None,
            table: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a table.
    pub fn with_table(mut self, table: Option<Table>) -> Self {
        self.table = table;
        self
    }

    /// Attach a chart specification.
    pub fn with_plot(mut self, plot: Option<PlotSpec>) -> Self {
        self.plot = plot;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Scalar)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_generated_ids_are_short_and_unique() {
        let a = DatasetId::generate();
        let b = DatasetId::generate();
        assert_eq!(a.as_str().len(), 12);
        assert_ne!(a, b);
        assert_eq!(DocumentId::generate().as_str().len(), 12);
    }

    #[test]
    fn test_scalar_untagged_serde() {
        let json = r#"[null, true, 2.5, "x"]"#;
        let values: Vec<Scalar> = serde_json::from_str(json).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Number(2.5),
                Scalar::Text("x".to_string())
            ]
        );
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[null,true,2.5,"x"]"#);
    }

    #[test]
    fn test_group_key_distinguishes_types() {
        assert_ne!(
            Scalar::Number(1.0).group_key(),
            Scalar::Text("1".to_string()).group_key()
        );
        assert_eq!(Scalar::Number(1.0).group_key(), Scalar::from(1i64).group_key());
    }

    #[test]
    fn test_non_finite_number_becomes_null() {
        assert_eq!(Scalar::from(f64::NAN), Scalar::Null);
        assert_eq!(Scalar::from(f64::INFINITY), Scalar::Null);
    }

    #[test]
    fn test_build_fills_missing_keys_with_null() {
        let new = NewDataset::new(
            "genes.csv",
            vec!["gene".into(), "expr".into()],
            vec![
                row(&[("gene", "BRCA1".into()), ("expr", 2.45.into())]),
                row(&[("gene", "EGFR".into())]),
            ],
        );
        let ds = Dataset::build(DatasetId::new("d1"), new).unwrap();
        assert_eq!(ds.rows[1].get("expr"), Some(&Scalar::Null));
        for r in &ds.rows {
            let keys: Vec<&String> = r.keys().collect();
            assert_eq!(keys.len(), 2);
        }
    }

    #[test]
    fn test_build_rejects_undeclared_key() {
        let new = NewDataset::new(
            "x",
            vec!["a".into()],
            vec![row(&[("a", 1i64.into()), ("b", 2i64.into())])],
        );
        let err = Dataset::build(DatasetId::new("d1"), new).unwrap_err();
        assert!(err.to_string().contains("undeclared column 'b'"));
    }

    #[test]
    fn test_build_rejects_duplicate_columns() {
        let new = NewDataset::new("x", vec!["a".into(), "a".into()], vec![]);
        assert!(Dataset::build(DatasetId::new("d1"), new).is_err());
    }

    #[test]
    fn test_infer_column_types() {
        let rows = vec![
            row(&[
                ("n", 1i64.into()),
                ("b", true.into()),
                ("s", "x".into()),
                ("m", 1i64.into()),
                ("z", Scalar::Null),
            ]),
            row(&[
                ("n", Scalar::Null),
                ("b", false.into()),
                ("s", "y".into()),
                ("m", "two".into()),
                ("z", Scalar::Null),
            ]),
        ];
        assert_eq!(infer_column_type(&rows, "n"), ColumnType::Number);
        assert_eq!(infer_column_type(&rows, "b"), ColumnType::Boolean);
        assert_eq!(infer_column_type(&rows, "s"), ColumnType::String);
        assert_eq!(infer_column_type(&rows, "m"), ColumnType::String);
        assert_eq!(infer_column_type(&rows, "z"), ColumnType::Null);
    }

    #[test]
    fn test_from_rows_uses_key_union() {
        let new = NewDataset::from_rows(
            "x",
            vec![row(&[("b", 1i64.into())]), row(&[("a", 2i64.into())])],
        );
        assert_eq!(new.columns, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_table_truncated_keeps_columns() {
        let table = Table::new(
            vec!["a".into()],
            (0..10).map(|i| row(&[("a", Scalar::from(i as i64))])).collect(),
        );
        let t = table.truncated(3);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.columns, vec!["a".to_string()]);
    }

    #[test]
    fn test_message_serialization_omits_absent_artifacts() {
        let msg = Message::assistant("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("table").is_none());
        assert!(json.get("plot").is_none());

        let msg = Message::assistant("chart").with_plot(Some(PlotSpec(serde_json::json!({"data": []}))));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["plot"], serde_json::json!({"data": []}));
    }
}
