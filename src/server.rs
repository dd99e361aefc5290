//! HTTP API for the retrieval-augmented question-answering service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Hybrid retrieval over indexed documents |
//! | `POST` | `/chat` | Grounded RAG answer over conversation history |
//! | `POST` | `/feedback` | Record a 1-5 rating and optional comment on a chat answer |
//! | `POST` | `/upload` | Upload and index a single file |
//! | `POST` | `/upload-and-query` | Upload, index, and immediately ask a question |
//! | `GET`  | `/document/{id}/file` | Download a document's original bytes |
//! | `GET`  | `/document/{id}/preview` | First N characters of a document's body |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses are `{"detail": "..."}` with the status chosen by
//! [`crate::error::AppError`].
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted, matching an API meant to
//! be called from a browser-based upload/chat client.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::{AppError, AppResult};
use crate::models::SearchRow;
use crate::rag::{self, HistoryTurn};
use crate::retrieve;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;
use crate::threshold::search_endpoint_cutoff;
use crate::upload;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor. `pool` is kept alongside `store` because `chat_feedback`
/// writes aren't part of the [`Store`] trait's contract.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<SqliteStore>,
    embedder: Arc<Embedder>,
    pool: SqlitePool,
}

/// Starts the HTTP server. Binds to `[server].bind` and registers every
/// route handler; runs until the process is terminated.
pub async fn run_server(config: &Config, store: SqliteStore, embedder: Embedder, pool: SqlitePool) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
        embedder: Arc::new(embedder),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/feedback", post(handle_feedback))
        .route("/upload", post(handle_upload))
        .route("/upload-and-query", post(handle_upload_and_query))
        .route("/document/{id}/file", get(handle_document_file))
        .route("/document/{id}/preview", get(handle_document_preview))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: i64,
    #[serde(default = "default_probes")]
    probes: i64,
}

fn default_top_k() -> i64 {
    5
}

fn default_probes() -> i64 {
    10
}

#[derive(Serialize)]
struct SearchResultItem {
    document_id: String,
    project_id: String,
    title: String,
    number: String,
    category: String,
    doc_type: String,
    revision: String,
    filename: String,
    file_type: String,
    date_modified: Option<chrono::DateTime<chrono::Utc>>,
    snippet: String,
    vector_score: f64,
    text_score: f64,
    score: f64,
}

/// Validates the query, runs [`retrieve::retrieve`], then applies the
/// endpoint's own secondary cutoff on top of the tiered result so a broad
/// tier's low-score tail doesn't leak into what otherwise reads as a
/// high-precision response. Returns the bare ordered array §6.1 specifies.
async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Json<Vec<SearchResultItem>>> {
    if req.query.trim().is_empty() {
        return Err(AppError::ValidationFailure("query must not be empty".into()));
    }
    if !(1..=50).contains(&req.top_k) {
        return Err(AppError::ValidationFailure("top_k must be between 1 and 50".into()));
    }
    if !(1..=100).contains(&req.probes) {
        return Err(AppError::ValidationFailure("probes must be between 1 and 100".into()));
    }

    let outcome = retrieve::retrieve(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &state.config,
        &req.query,
        req.project_id.as_deref(),
        req.top_k,
        req.probes,
    )
    .await
    .map_err(|e| AppError::StoreReadError(e.to_string()))?;

    let cutoff = search_endpoint_cutoff(&outcome.rows);
    let results: Vec<SearchResultItem> = outcome
        .rows
        .into_iter()
        .filter(|r| r.score >= cutoff)
        .map(row_to_item)
        .collect();

    Ok(Json(results))
}

fn row_to_item(row: SearchRow) -> SearchResultItem {
    SearchResultItem {
        document_id: row.document_id,
        project_id: row.project_id,
        title: row.title,
        number: row.number,
        category: row.category,
        doc_type: row.doc_type,
        revision: row.revision,
        filename: row.filename,
        file_type: row.file_type,
        date_modified: row.date_modified,
        snippet: row.snippet,
        vector_score: row.vector_score,
        text_score: row.text_score,
        score: row.score,
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequestBody {
    question: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurnBody>,
    #[serde(default = "default_max_context_docs")]
    max_context_docs: i64,
}

#[derive(Deserialize)]
struct ChatTurnBody {
    role: String,
    content: String,
}

fn default_max_context_docs() -> i64 {
    5
}

#[derive(Serialize)]
struct ChatResponse {
    question: String,
    answer: String,
    sources: Vec<SearchResultItem>,
    context_used: String,
    session_id: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequestBody>,
) -> AppResult<Json<ChatResponse>> {
    if req.question.trim().is_empty() {
        return Err(AppError::ValidationFailure("question must not be empty".into()));
    }

    let history: Vec<HistoryTurn> = req
        .history
        .into_iter()
        .map(|t| HistoryTurn {
            role: t.role,
            content: t.content,
        })
        .collect();

    let answer = rag::answer(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &state.config,
        &req.question,
        &history,
        req.max_context_docs,
        req.project_id.as_deref(),
    )
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ChatResponse {
        question: answer.question,
        answer: answer.answer,
        sources: answer.sources.into_iter().map(row_to_item).collect(),
        context_used: answer.context_used,
        session_id: answer.session_id,
    }))
}

// ============ POST /feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    session_id: String,
    rating: i64,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Serialize)]
struct FeedbackResponse {
    status: &'static str,
}

/// Records a 1-5 rating and optional free-text comment against a chat
/// session (§6.1). Not part of the [`Store`] trait since feedback is
/// write-only telemetry with no read path in this service.
async fn handle_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> AppResult<Json<FeedbackResponse>> {
    if !(1..=5).contains(&req.rating) {
        return Err(AppError::ValidationFailure("rating must be between 1 and 5".into()));
    }

    sqlx::query("INSERT INTO chat_feedback (session_id, rating, comment, created_at) VALUES (?, ?, ?, ?)")
        .bind(&req.session_id)
        .bind(req.rating)
        .bind(&req.comment)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&state.pool)
        .await
        .map_err(|e| AppError::StoreWriteError(e.to_string()))?;

    Ok(Json(FeedbackResponse { status: "recorded" }))
}

// ============ POST /upload, POST /upload-and-query ============

#[derive(Serialize)]
struct UploadResponse {
    document_id: String,
    chunks_created: usize,
    text_length: usize,
    project_id: String,
    title: String,
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
    question: Option<String>,
    project_id: Option<String>,
}

async fn read_multipart(mut multipart: Multipart) -> AppResult<UploadedFile> {
    let mut filename = None;
    let mut bytes = None;
    let mut question = None;
    let mut project_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationFailure(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::ValidationFailure(e.to_string()))?
                        .to_vec(),
                );
            }
            "question" => {
                question = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::ValidationFailure(e.to_string()))?,
                );
            }
            "project_id" => {
                project_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::ValidationFailure(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    Ok(UploadedFile {
        filename: filename.ok_or_else(|| AppError::ValidationFailure("missing file field".into()))?,
        bytes: bytes.ok_or_else(|| AppError::ValidationFailure("missing file field".into()))?,
        question,
        project_id,
    })
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let uploaded = read_multipart(multipart).await?;

    let result = upload::upload(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &state.config,
        uploaded.bytes,
        &uploaded.filename,
        None,
        uploaded
            .project_id
            .as_deref()
            .unwrap_or(&state.config.server.default_project_id),
    )
    .await?;

    Ok(Json(UploadResponse {
        document_id: result.document_id,
        chunks_created: result.chunks_created,
        text_length: result.text_length,
        project_id: result.project_id,
        title: result.title,
    }))
}

#[derive(Serialize)]
struct UploadAndQueryResponse {
    upload: UploadResponse,
    answer: String,
    sources: Vec<SearchResultItem>,
    session_id: String,
}

async fn handle_upload_and_query(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UploadAndQueryResponse>> {
    let uploaded = read_multipart(multipart).await?;
    let question = uploaded
        .question
        .clone()
        .ok_or_else(|| AppError::ValidationFailure("missing question field".into()))?;

    let default_project_id = uploaded
        .project_id
        .clone()
        .unwrap_or_else(|| state.config.server.default_project_id.clone());

    let (result, answer) = upload::upload_and_query(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &state.config,
        uploaded.bytes,
        &uploaded.filename,
        &question,
        None,
        &default_project_id,
    )
    .await?;

    Ok(Json(UploadAndQueryResponse {
        upload: UploadResponse {
            document_id: result.document_id,
            chunks_created: result.chunks_created,
            text_length: result.text_length,
            project_id: result.project_id,
            title: result.title,
        },
        answer: answer.answer,
        sources: answer.sources.into_iter().map(row_to_item).collect(),
        session_id: answer.session_id,
    }))
}

// ============ GET /document/{id}/file, GET /document/{id}/preview ============

async fn handle_document_file(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let doc = state
        .store
        .get_document(&id)
        .await
        .map_err(|e| AppError::StoreReadError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(id.clone()))?;

    let bytes = doc
        .file_content
        .ok_or_else(|| AppError::NotFound(format!("{} has no stored file", id)))?;

    Ok((
        [(axum::http::header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", doc.filename))],
        bytes,
    )
        .into_response())
}

#[derive(Deserialize)]
struct PreviewQuery {
    #[serde(default = "default_preview_chars")]
    chars: usize,
}

fn default_preview_chars() -> usize {
    500
}

#[derive(Serialize)]
struct PreviewResponse {
    document_id: String,
    title: String,
    preview: String,
}

async fn handle_document_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PreviewQuery>,
) -> AppResult<Json<PreviewResponse>> {
    let doc = state
        .store
        .get_document(&id)
        .await
        .map_err(|e| AppError::StoreReadError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(id.clone()))?;

    let preview: String = doc.body_text().chars().take(params.chars).collect();

    Ok(Json(PreviewResponse {
        document_id: doc.document_id,
        title: doc.title,
        preview,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
