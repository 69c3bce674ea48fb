//! Route handler functions for all API endpoints.
//!
//! Data and search handlers call the capability adapters directly, bypassing
//! intent routing. Chat handlers go through the chat service. Request and
//! response bodies use camelCase field names.

use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use labpilot_chat::{CapabilityOutput, ChatReply};
use labpilot_core::error::LabpilotError;
use labpilot_core::types::{
    Column, DatasetId, DatasetMeta, DocumentId, DocumentMeta, Entity, Message, NewDataset,
    PlotSpec, Record, SessionId,
};
use labpilot_vector::SearchHit;

use crate::error::ApiError;
use crate::state::AppState;

/// Header that selects the conversation session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Entities echoed back from a document upload.
const UPLOAD_ENTITY_LIMIT: usize = 20;

/// Multipart field carrying an uploaded data file.
const FILE_FIELD: &str = "file";

/// Session named by the request, or the default session.
fn session_id(headers: &HeaderMap) -> SessionId {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionId::new)
        .unwrap_or_default()
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDatasetRequest {
    pub name: String,
    /// Column order. Defaults to the sorted union of row keys.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default)]
    pub dataset_id: Option<DatasetId>,
    pub conditions: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    #[serde(default)]
    pub dataset_id: Option<DatasetId>,
    pub group_column: String,
    pub value_column: String,
    #[serde(default)]
    pub agg_func: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeParams {
    pub dataset_id: Option<DatasetId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotRequest {
    #[serde(default)]
    pub dataset_id: Option<DatasetId>,
    pub plot_type: String,
    pub x_column: String,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub document_id: Option<DocumentId>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    #[serde(alias = "message")]
    pub text: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDatasetResponse {
    pub id: DatasetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
    pub preview_rows: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: DatasetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl From<DatasetMeta> for DatasetSummary {
    fn from(meta: DatasetMeta) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            columns: meta.columns,
            row_count: meta.row_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListResponse {
    pub datasets: Vec<DatasetSummary>,
    pub active_dataset_id: Option<DatasetId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    /// Rows in the full result, before truncation.
    pub row_count: usize,
    pub truncated: bool,
}

/// Result of a direct data operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl OperationResponse {
    fn from_output(output: CapabilityOutput, max_rows: usize) -> Self {
        let table = output.table.map(|table| {
            let row_count = table.row_count();
            let shown = table.truncated(max_rows);
            TableResponse {
                columns: shown.columns,
                rows: shown.rows,
                row_count,
                truncated: row_count > max_rows,
            }
        });
        Self {
            summary: output.summary,
            table,
            plot: output.plot,
            details: output.details,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocumentResponse {
    pub id: DocumentId,
    pub name: String,
    pub chunk_count: usize,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub name: String,
    pub chunk_count: usize,
}

impl From<DocumentMeta> for DocumentSummary {
    fn from(meta: DocumentMeta) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            chunk_count: meta.chunk_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub text: String,
    pub document: String,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub score: f64,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            text: hit.text,
            document: hit.document,
            document_id: hit.document_id,
            chunk_index: hit.chunk_index,
            score: hit.score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatClearResponse {
    pub session_id: SessionId,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub datasets: usize,
    pub documents: usize,
    pub sessions: usize,
    pub llm_provider: String,
}

// =============================================================================
// Data handlers
// =============================================================================

/// POST /api/data/upload - register a new dataset.
///
/// Accepts either a `multipart/form-data` body whose `file` field holds a
/// CSV or TSV file, or a JSON body of already-parsed rows. The new dataset
/// becomes the active one.
pub async fn upload_dataset(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadDatasetResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let new = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        read_data_file(&state, multipart).await?
    } else {
        let Json(body) = Json::<UploadDatasetRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        require("name", &body.name)?;
        match body.columns {
            Some(columns) => NewDataset::new(body.name.trim(), columns, body.rows),
            None => NewDataset::from_rows(body.name.trim(), body.rows),
        }
    };
    let dataset = state.datasets.register(new)?;

    Ok(Json(UploadDatasetResponse {
        id: dataset.id.clone(),
        name: dataset.name.clone(),
        columns: dataset.columns.clone(),
        row_count: dataset.row_count(),
        preview_rows: dataset.preview(state.config.data.preview_rows),
    }))
}

/// Parse the first `file` field of a multipart upload.
async fn read_data_file(state: &AppState, mut multipart: Multipart) -> Result<NewDataset, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("No filename provided.".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let new = state
            .tabular
            .load(&name, &bytes)
            .map_err(LabpilotError::from)?;
        tracing::info!(file = %name, bytes = bytes.len(), rows = new.rows.len(), "Parsed uploaded data file");
        return Ok(new);
    }
    Err(ApiError::BadRequest(format!(
        "multipart upload needs a '{}' field",
        FILE_FIELD
    )))
}

/// GET /api/data/list
pub async fn list_datasets(
    State(state): State<AppState>,
) -> Result<Json<DatasetListResponse>, ApiError> {
    let datasets = state
        .datasets
        .list()?
        .into_iter()
        .map(DatasetSummary::from)
        .collect();
    Ok(Json(DatasetListResponse {
        datasets,
        active_dataset_id: state.datasets.active_id()?,
    }))
}

/// POST /api/data/filter
pub async fn filter_data(
    State(state): State<AppState>,
    Json(body): Json<FilterRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let output = state
        .adapters
        .filter(body.dataset_id.as_ref(), &body.conditions)?;
    Ok(Json(OperationResponse::from_output(
        output,
        state.config.data.max_result_rows,
    )))
}

/// POST /api/data/aggregate
pub async fn aggregate_data(
    State(state): State<AppState>,
    Json(body): Json<AggregateRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let output = state.adapters.aggregate(
        body.dataset_id.as_ref(),
        &body.group_column,
        &body.value_column,
        body.agg_func.as_deref(),
    )?;
    Ok(Json(OperationResponse::from_output(
        output,
        state.config.data.max_result_rows,
    )))
}

/// POST /api/data/describe?datasetId=...
pub async fn describe_data(
    State(state): State<AppState>,
    Query(params): Query<DescribeParams>,
) -> Result<Json<OperationResponse>, ApiError> {
    let output = state.adapters.describe(params.dataset_id.as_ref())?;
    Ok(Json(OperationResponse::from_output(
        output,
        state.config.data.max_result_rows,
    )))
}

/// POST /api/data/plot
pub async fn plot_data(
    State(state): State<AppState>,
    Json(body): Json<PlotRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let output = state.adapters.plot(
        body.dataset_id.as_ref(),
        &body.plot_type,
        &body.x_column,
        body.y_column.as_deref(),
        body.title.as_deref(),
    )?;
    Ok(Json(OperationResponse::from_output(
        output,
        state.config.data.max_result_rows,
    )))
}

// =============================================================================
// Document handlers
// =============================================================================

/// POST /api/documents/upload - chunk, embed and index extracted text.
pub async fn upload_document(
    State(state): State<AppState>,
    Json(body): Json<UploadDocumentRequest>,
) -> Result<Json<UploadDocumentResponse>, ApiError> {
    require("name", &body.name)?;
    let document = state.ingestor.ingest(body.name.trim(), &body.text).await?;

    Ok(Json(UploadDocumentResponse {
        id: document.id.clone(),
        name: document.name.clone(),
        chunk_count: document.chunk_count(),
        entities: document
            .entities
            .iter()
            .take(UPLOAD_ENTITY_LIMIT)
            .cloned()
            .collect(),
    }))
}

/// POST /api/documents/search
pub async fn search_documents(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let hits = state
        .adapters
        .search_hits(&body.query, body.top_k, body.document_id.as_ref())
        .await?;
    Ok(Json(SearchResponse {
        query: body.query.trim().to_string(),
        results: hits.into_iter().map(SearchResult::from).collect(),
    }))
}

/// GET /api/documents/list
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let documents = state
        .documents
        .list()?
        .into_iter()
        .map(DocumentSummary::from)
        .collect();
    Ok(Json(DocumentListResponse { documents }))
}

// =============================================================================
// Chat handlers
// =============================================================================

/// POST /api/chat/message
pub async fn chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatMessageRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let session = session_id(&headers);
    let reply = state.chat.handle_message(&session, &body.text).await?;
    Ok(Json(reply))
}

/// GET /api/chat/history
pub async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let session = session_id(&headers);
    let messages = state.chat.history(&session).await?;
    Ok(Json(ChatHistoryResponse {
        session_id: session,
        messages,
    }))
}

/// POST /api/chat/clear
pub async fn chat_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatClearResponse>, ApiError> {
    let session = session_id(&headers);
    state.chat.clear(&session).await?;
    tracing::info!(session_id = %session, "Chat history cleared");
    Ok(Json(ChatClearResponse {
        session_id: session,
        status: "cleared".to_string(),
    }))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        datasets: state.datasets.len(),
        documents: state.documents.len(),
        sessions: state.chat.sessions().len(),
        llm_provider: state.config.llm.provider.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use labpilot_core::types::{Scalar, Table};

    #[test]
    fn test_session_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), SessionId::default_session());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id(&headers), SessionId::default_session());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("bench-2"));
        assert_eq!(session_id(&headers), SessionId::new("bench-2"));
    }

    #[test]
    fn test_operation_response_truncates() {
        let rows = (0..5)
            .map(|i| Record::from([("n".to_string(), Scalar::from(i as f64))]))
            .collect();
        let output = CapabilityOutput {
            table: Some(Table::new(vec!["n".into()], rows)),
            summary: "five rows".into(),
            ..Default::default()
        };
        let response = OperationResponse::from_output(output, 3);
        let table = response.table.unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.row_count, 5);
        assert!(table.truncated);
    }

    #[test]
    fn test_chat_request_accepts_message_alias() {
        let req: ChatMessageRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(req.text, "hi");
    }
}
