//! HTTP server for sentirag
//!
//! Exposes retrieval and grounded answers over HTTP using axum.
//!
//! # Endpoints
//!
//! - `GET /` - Bundled single-page UI
//! - `GET /config` - Static configuration and chunk counts
//! - `POST /query` - Ranked chunks for a question
//! - `POST /answer` - Generated answer plus its supporting chunks
//! - `POST /rebuild` - Reload the dataset and swap in a fresh index

use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::context::{AppContext, ConfigSummary, ParamError};
use crate::generation::{self, GenerationError};
use crate::indexer::core::{BuildReport, IndexerError};
use crate::retriever::{RetrievalError, ScoredChunk};

/// Query request body
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,

    /// Results wanted, 1 to 10 (default from config)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Minimum raw similarity, 0.0 to 1.0 (default from config)
    #[serde(default)]
    pub min_score: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,

    #[serde(default)]
    pub top_k: Option<usize>,

    #[serde(default)]
    pub min_score: Option<f64>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub query: String,
    pub answer: String,
    pub results: Vec<ScoredChunk>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// An error already mapped onto its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.0)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.body_text())
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        let status = match err {
            RetrievalError::InvalidQuery => StatusCode::BAD_REQUEST,
            RetrievalError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            RetrievalError::Embedding(_) | RetrievalError::Index(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Run blocking work (SQLite, blocking HTTP) off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("blocking task failed: {e}");
        ApiError::internal("internal task failed")
    })?
}

/// GET / - Bundled UI
async fn index_page(State(ctx): State<Arc<AppContext>>) -> Result<Html<String>, ApiError> {
    let index_file = Path::new(&ctx.config.frontend_dir).join("index.html");
    match tokio::fs::read_to_string(&index_file).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::new(StatusCode::NOT_FOUND, "UI not found."))
        }
        Err(e) => Err(ApiError::internal(format!("failed to read UI: {e}"))),
    }
}

/// GET /config - Static settings, never touches the index
async fn config(State(ctx): State<Arc<AppContext>>) -> Json<ConfigSummary> {
    Json(ctx.config_summary())
}

/// POST /query - Ranked chunks for a question
async fn query(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload?;
    let (top_k, min_score) = ctx.resolve_params(request.top_k, request.min_score)?;

    let text = request.query.clone();
    let results = blocking(move || Ok(ctx.retriever.query(&text, top_k, min_score)?)).await?;

    Ok(Json(QueryResponse {
        query: request.query,
        results,
    }))
}

/// POST /answer - Retrieve, then generate an answer grounded in the hits
async fn answer(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(request) = payload?;
    let Some(generator) = ctx.generator.clone() else {
        return Err(ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            "Answer generation is disabled.",
        ));
    };
    let (top_k, min_score) = ctx.resolve_params(request.top_k, request.min_score)?;
    let max_output_tokens = ctx.resolve_max_output_tokens(request.max_output_tokens)?;

    let text = request.query.clone();
    let (answer, results) = blocking(move || {
        let results = ctx.retriever.query(&text, top_k, min_score)?;
        let answer =
            generation::generate_answer(generator.as_ref(), &text, &results, max_output_tokens)?;
        Ok((answer, results))
    })
    .await?;

    Ok(Json(AnswerResponse {
        query: request.query,
        answer,
        results,
    }))
}

/// POST /rebuild - Reload the dataset; the previous index serves until the swap
async fn rebuild(State(ctx): State<Arc<AppContext>>) -> Result<Json<BuildReport>, ApiError> {
    let report = blocking(move || Ok(ctx.rebuild()?)).await?;
    Ok(Json(report))
}

/// Create the axum router
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_page))
        .route("/config", get(config))
        .route("/query", post(query))
        .route("/answer", post(answer))
        .route("/rebuild", post(rebuild))
        .layer(cors)
        .with_state(ctx)
}

/// Start the server and run until ctrl-c.
pub async fn serve(ctx: Arc<AppContext>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let router = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
