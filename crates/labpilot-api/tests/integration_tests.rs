//! Integration tests for the Labpilot API.
//!
//! Each test builds its own in-memory state and drives the router with
//! `oneshot`, using the rule-based language model.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use tower::ServiceExt;

use labpilot_api::create_router;
use labpilot_api::handlers::{
    DatasetListResponse, DocumentListResponse, HealthResponse, OperationResponse,
    SearchResponse, UploadDatasetResponse, UploadDocumentResponse,
};
use labpilot_api::state::AppState;
use labpilot_chat::RuleBasedModel;
use labpilot_core::config::LabpilotConfig;
use labpilot_vector::RemoteEmbedding;

// =============================================================================
// Helpers
// =============================================================================

fn make_state() -> AppState {
    AppState::new(LabpilotConfig::default(), Arc::new(RuleBasedModel::new()))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat(text: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/chat/message").header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder
        .body(Body::from(json!({ "text": text }).to_string()))
        .unwrap()
}

fn history(session: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/api/chat/history");
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder.body(Body::empty()).unwrap()
}

const BOUNDARY: &str = "labpilot-test-boundary";

fn multipart(uri: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let resp = create_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn genes_body() -> Value {
    json!({
        "name": "genes.csv",
        "columns": ["gene", "expression", "sample"],
        "rows": [
            { "gene": "TP53", "expression": 2.5, "sample": "s1" },
            { "gene": "BRCA1", "expression": 1.0, "sample": "s1" },
            { "gene": "TP53", "expression": 3.5, "sample": "s2" },
            { "gene": "EGFR", "expression": 0.5, "sample": "s2" },
            { "gene": "BRCA1", "expression": 4.0, "sample": "s3" },
            { "gene": "MYC", "expression": 2.0, "sample": "s3" }
        ]
    })
}

async fn upload_genes(state: &AppState) -> UploadDatasetResponse {
    let (status, body) = send(state, post_json("/api/data/upload", genes_body())).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(body).unwrap()
}

const PAPER: &str = "Mutations in TP53 are the most common alteration in human cancer. \
    The p53 protein arrests the cell cycle after DNA damage and can trigger apoptosis. \
    Samples were incubated at 37 C for 24 h before imaging. \
    Full methods are available at https://doi.org/10.1000/xyz123 for reference.";

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let state = make_state();
    let (status, body) = send(&state, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.datasets, 0);
    assert_eq!(health.llm_provider, "rules");
}

// =============================================================================
// Datasets
// =============================================================================

#[tokio::test]
async fn test_upload_dataset() {
    let state = make_state();
    let upload = upload_genes(&state).await;

    assert_eq!(upload.name, "genes.csv");
    assert_eq!(upload.row_count, 6);
    let names: Vec<&str> = upload.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["gene", "expression", "sample"]);
    assert_eq!(upload.preview_rows.len(), 5);
}

#[tokio::test]
async fn test_upload_uses_camel_case_fields() {
    let state = make_state();
    let (_, body) = send(&state, post_json("/api/data/upload", genes_body())).await;
    assert_eq!(body["rowCount"], 6);
    assert!(body["previewRows"].is_array());
    assert_eq!(body["columns"][1]["type"], "number");
}

#[tokio::test]
async fn test_upload_without_columns_uses_row_keys() {
    let state = make_state();
    let (status, body) = send(
        &state,
        post_json(
            "/api/data/upload",
            json!({ "name": "tiny.csv", "rows": [{ "b": 1, "a": "x" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"][0]["name"], "a");
    assert_eq!(body["columns"][1]["name"], "b");
}

#[tokio::test]
async fn test_upload_rejects_blank_name() {
    let state = make_state();
    let mut body = genes_body();
    body["name"] = json!("  ");
    let (status, body) = send(&state, post_json("/api/data/upload", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_upload_rejects_undeclared_column() {
    let state = make_state();
    let (status, _) = send(
        &state,
        post_json(
            "/api/data/upload",
            json!({ "name": "bad.csv", "columns": ["a"], "rows": [{ "a": 1, "b": 2 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

const PLATE_CSV: &str = "well,condition,od600\n\
    A1,control,0.41\n\
    A2,control,0.45\n\
    B1,treated,0.90\n\
    B2,treated,\n";

#[tokio::test]
async fn test_upload_csv_file() {
    let state = make_state();
    let (status, body) = send(
        &state,
        multipart("/api/data/upload", "file", "plate.csv", PLATE_CSV.as_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let upload: UploadDatasetResponse = serde_json::from_value(body.clone()).unwrap();
    assert_eq!(upload.name, "plate.csv");
    assert_eq!(upload.row_count, 4);
    let names: Vec<&str> = upload.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["well", "condition", "od600"]);
    assert_eq!(body["columns"][2]["type"], "number");
    assert_eq!(body["previewRows"][3]["od600"], Value::Null);

    // The parsed file is the active dataset.
    let (status, body) = send(
        &state,
        post_json(
            "/api/data/aggregate",
            json!({ "groupColumn": "condition", "valueColumn": "od600", "aggFunc": "max" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result: OperationResponse = serde_json::from_value(body).unwrap();
    let table = result.table.unwrap();
    assert_eq!(table.row_count, 2);
    assert_eq!(table.rows[1]["od600"], labpilot_core::types::Scalar::Number(0.9));
}

#[tokio::test]
async fn test_upload_unsupported_file_type() {
    let state = make_state();
    let (status, body) = send(
        &state,
        multipart("/api/data/upload", "file", "plate.xlsx", b"PK\x03\x04"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("unsupported file type"));

    let (_, body) = send(&state, get("/api/data/list")).await;
    assert_eq!(body["datasets"], json!([]));
}

#[tokio::test]
async fn test_upload_malformed_csv() {
    let state = make_state();
    let (status, _) = send(
        &state,
        multipart("/api/data/upload", "file", "bad.csv", b"a,b\n1,2,3\n"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_multipart_without_file_field() {
    let state = make_state();
    let (status, body) = send(
        &state,
        multipart("/api/data/upload", "attachment", "plate.csv", PLATE_CSV.as_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("'file'"));
}

#[tokio::test]
async fn test_filter_rejects_deeply_nested_expression() {
    let state = make_state();
    upload_genes(&state).await;
    let conditions = format!("{}expression > 1{}", "(".repeat(20_000), ")".repeat(20_000));
    let (status, body) = send(
        &state,
        post_json("/api/data/filter", json!({ "conditions": conditions })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("expression nested too deeply"));
}

#[tokio::test]
async fn test_reupload_creates_new_active_dataset() {
    let state = make_state();
    let first = upload_genes(&state).await;
    let second = upload_genes(&state).await;
    assert_ne!(first.id, second.id);

    let (status, body) = send(&state, get("/api/data/list")).await;
    assert_eq!(status, StatusCode::OK);
    let list: DatasetListResponse = serde_json::from_value(body).unwrap();
    assert_eq!(list.datasets.len(), 2);
    assert_eq!(list.active_dataset_id, Some(second.id));
}

#[tokio::test]
async fn test_list_empty() {
    let state = make_state();
    let (_, body) = send(&state, get("/api/data/list")).await;
    assert_eq!(body["datasets"], json!([]));
    assert_eq!(body["activeDatasetId"], Value::Null);
}

// =============================================================================
// Direct data operations
// =============================================================================

#[tokio::test]
async fn test_filter() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_json("/api/data/filter", json!({ "conditions": "expression > 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let op: OperationResponse = serde_json::from_value(body).unwrap();
    let table = op.table.unwrap();
    assert_eq!(table.row_count, 3);
    assert!(!table.truncated);
    assert!(op.summary.starts_with("Found 3 of 6 rows"));
}

#[tokio::test]
async fn test_filter_truncates_to_max_result_rows() {
    let mut config = LabpilotConfig::default();
    config.data.max_result_rows = 2;
    let state = AppState::new(config, Arc::new(RuleBasedModel::new()));
    upload_genes(&state).await;

    let (_, body) = send(
        &state,
        post_json("/api/data/filter", json!({ "conditions": "expression >= 0" })),
    )
    .await;
    assert_eq!(body["table"]["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["table"]["rowCount"], 6);
    assert_eq!(body["table"]["truncated"], true);
}

#[tokio::test]
async fn test_filter_unknown_column() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_json("/api/data/filter", json!({ "conditions": "potency > 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("potency"));
}

#[tokio::test]
async fn test_filter_without_dataset() {
    let state = make_state();
    let (status, body) = send(
        &state,
        post_json("/api/data/filter", json!({ "conditions": "expression > 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_filter_unknown_dataset_id() {
    let state = make_state();
    upload_genes(&state).await;
    let (status, _) = send(
        &state,
        post_json(
            "/api/data/filter",
            json!({ "datasetId": "missing", "conditions": "expression > 2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_aggregate_keeps_first_appearance_order() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_json(
            "/api/data/aggregate",
            json!({ "groupColumn": "gene", "valueColumn": "expression", "aggFunc": "sum" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let rows = body["table"]["rows"].as_array().unwrap();
    let genes: Vec<&str> = rows.iter().map(|r| r["gene"].as_str().unwrap()).collect();
    assert_eq!(genes, vec!["TP53", "BRCA1", "EGFR", "MYC"]);
    assert_eq!(rows[0]["expression"].as_f64(), Some(6.0));
    assert_eq!(rows[1]["expression"].as_f64(), Some(5.0));
}

#[tokio::test]
async fn test_aggregate_unsupported_function() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, _) = send(
        &state,
        post_json(
            "/api/data/aggregate",
            json!({ "groupColumn": "gene", "valueColumn": "expression", "aggFunc": "mode" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_describe() {
    let state = make_state();
    let upload = upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_empty(&format!("/api/data/describe?datasetId={}", upload.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["table"].is_object());
    assert!(body["summary"]
        .as_str()
        .unwrap()
        .contains("has 6 rows and 3 columns"));
}

#[tokio::test]
async fn test_describe_active_dataset() {
    let state = make_state();
    upload_genes(&state).await;
    let (status, _) = send(&state, post_empty("/api/data/describe")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_plot() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_json(
            "/api/data/plot",
            json!({ "plotType": "bar", "xColumn": "gene", "yColumn": "expression" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plot"]["data"][0]["type"], "bar");
    assert!(body.get("table").is_none());
}

#[tokio::test]
async fn test_plot_unsupported_type() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(
        &state,
        post_json("/api/data/plot", json!({ "plotType": "radar", "xColumn": "gene" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("radar"));
}

// =============================================================================
// Documents
// =============================================================================

#[tokio::test]
async fn test_upload_and_list_document() {
    let state = make_state();
    let (status, body) = send(
        &state,
        post_json(
            "/api/documents/upload",
            json!({ "name": "p53-review.pdf", "text": PAPER }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let upload: UploadDocumentResponse = serde_json::from_value(body).unwrap();
    assert_eq!(upload.name, "p53-review.pdf");
    assert!(upload.chunk_count >= 1);
    assert!(upload.entities.len() <= 20);

    let (_, body) = send(&state, get("/api/documents/list")).await;
    let list: DocumentListResponse = serde_json::from_value(body).unwrap();
    assert_eq!(list.documents.len(), 1);
    assert_eq!(list.documents[0].id, upload.id);
}

#[tokio::test]
async fn test_upload_empty_document() {
    let state = make_state();
    let (status, _) = send(
        &state,
        post_json("/api/documents/upload", json!({ "name": "blank.pdf", "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_documents() {
    let state = make_state();
    send(
        &state,
        post_json(
            "/api/documents/upload",
            json!({ "name": "p53-review.pdf", "text": PAPER.repeat(4) }),
        ),
    )
    .await;

    let (status, body) = send(
        &state,
        post_json("/api/documents/search", json!({ "query": "p53 apoptosis", "topK": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let search: SearchResponse = serde_json::from_value(body).unwrap();
    assert!(search.results.len() <= 2);
    assert!(!search.results.is_empty());
    for pair in search.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(search.results[0].document, "p53-review.pdf");
}

/// Embeds text along two topic axes, standing in for a remote model.
async fn stub_embeddings(Json(body): Json<Value>) -> Json<Value> {
    let text = body["input"][0].as_str().unwrap_or_default().to_lowercase();
    let axis = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
    Json(json!({
        "object": "list",
        "data": [{ "index": 0, "embedding": [axis("apoptosis"), axis("buffer"), 0.1] }],
    }))
}

#[tokio::test]
async fn test_search_with_remote_embedder_ranks_relevant_chunk_first() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stub = axum::Router::new().route("/v1/embeddings", axum::routing::post(stub_embeddings));
    tokio::spawn(async move { axum::serve(listener, stub).await.unwrap() });

    let embedder = RemoteEmbedding::new(
        format!("http://{}/v1/embeddings", addr),
        "test-key",
        "stub-embed",
        3,
        std::time::Duration::from_secs(5),
    )
    .unwrap();
    let state = AppState::with_embedder(
        LabpilotConfig::default(),
        Arc::new(RuleBasedModel::new()),
        Arc::new(embedder),
    );

    for (name, text) in [
        ("buffers.pdf", "Store the lysis buffer at 4 C and discard after a week."),
        ("death.pdf", "Caspase activation drives apoptosis in stressed cells."),
    ] {
        let (status, _) = send(
            &state,
            post_json("/api/documents/upload", json!({ "name": name, "text": text })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &state,
        post_json("/api/documents/search", json!({ "query": "apoptosis", "topK": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let search: SearchResponse = serde_json::from_value(body).unwrap();
    assert_eq!(search.results.len(), 2);
    assert_eq!(search.results[0].document, "death.pdf");
    assert!(search.results[0].score > search.results[1].score);
}

#[tokio::test]
async fn test_search_empty_query() {
    let state = make_state();
    let (status, _) = send(
        &state,
        post_json("/api/documents/search", json!({ "query": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_unknown_document_scope() {
    let state = make_state();
    let (status, _) = send(
        &state,
        post_json(
            "/api/documents/search",
            json!({ "query": "p53", "documentId": "nope" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_aggregate_returns_table() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(&state, chat("average expression by gene", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["table"]["columns"], json!(["gene", "expression"]));
    assert!(body.get("plot").is_none());

    let (_, body) = send(&state, history(None)).await;
    assert_eq!(body["sessionId"], "default");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn test_chat_unknown_column_is_explained() {
    let state = make_state();
    upload_genes(&state).await;

    let (status, body) = send(&state, chat("average foo by gene", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["text"].as_str().unwrap().contains("no column named 'foo'"));
    assert!(body.get("table").is_none());
    assert!(body.get("plot").is_none());
}

#[tokio::test]
async fn test_chat_empty_message() {
    let state = make_state();
    let (status, body) = send(&state, chat("   ", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "message cannot be empty");

    let (_, body) = send(&state, history(None)).await;
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn test_chat_disabled() {
    let mut config = LabpilotConfig::default();
    config.chat.enabled = false;
    let state = AppState::new(config, Arc::new(RuleBasedModel::new()));
    let (status, _) = send(&state, chat("hello", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_chat_sessions_are_isolated() {
    let state = make_state();
    send(&state, chat("hello", Some("bench-a"))).await;

    let (_, a) = send(&state, history(Some("bench-a"))).await;
    let (_, b) = send(&state, history(Some("bench-b"))).await;
    assert_eq!(a["messages"].as_array().unwrap().len(), 2);
    assert_eq!(b["messages"], json!([]));
}

#[tokio::test]
async fn test_chat_clear() {
    let state = make_state();
    send(&state, chat("hello", None)).await;

    let (status, body) = send(&state, post_empty("/api/chat/clear")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleared");

    let (_, body) = send(&state, history(None)).await;
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn test_unknown_route() {
    let state = make_state();
    let (status, _) = send(&state, get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
