//! server.rs
//!
//! HTTP adapter over `RetrievalEngine`.
//!
//!   POST /train            request a reindex
//!   POST /query            {"text": "...", "k": 3}
//!   GET  /status           corpus listing, pending changes, index summary
//!   POST /upload?name=..   raw file body, stored into the corpus
//!   GET  /healthz

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::engine::{RetrievalEngine, UploadError};
use crate::inference::{QueryError, RetrievedDocument};
use crate::ingest::corpus_scanner::CorpusEntry;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(engine: Arc<RetrievalEngine>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/train", post(post_train))
        .route("/query", post(post_query))
        .route("/status", get(get_status))
        .route("/upload", post(post_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(engine)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(engine: Arc<RetrievalEngine>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

// -------- errors --------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Embedding(e) => ApiError::Upstream(e.to_string()),
            QueryError::Index(e) => {
                error!("query against a broken index: {e}");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::InvalidName(_) | UploadError::Empty => ApiError::BadRequest(e.to_string()),
            UploadError::Io { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

// -------- handlers --------

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn post_train(State(engine): State<Arc<RetrievalEngine>>) -> impl IntoResponse {
    engine.request_reindex();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Indexing started." })),
    )
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub generation: u64,
    pub results: Vec<RetrievedDocument>,
}

async fn post_query(
    State(engine): State<Arc<RetrievalEngine>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let found = engine.search(&req.text, req.k).await?;
    Ok(Json(QueryResponse {
        generation: found.generation,
        results: found.documents,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub last_rebuild: Option<DateTime<Utc>>,
    pub documents: usize,
    pub generation: u64,
    pub reindex_pending: bool,
    pub files: Vec<CorpusEntry>,
}

async fn get_status(
    State(engine): State<Arc<RetrievalEngine>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let overview = engine
        .corpus_overview()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let status = overview.status;
    Ok(Json(StatusResponse {
        new: status.new,
        updated: status.updated,
        deleted: status.deleted,
        last_rebuild: engine.last_rebuild(),
        documents: engine.document_count(),
        generation: engine.generation(),
        reindex_pending: engine.reindex_pending(),
        files: overview.files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: String,
}

async fn post_upload(
    State(engine): State<Arc<RetrievalEngine>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let path = engine.store_upload(&params.name, &body).await?;
    let stored = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "stored": stored, "bytes": body.len() })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::indexing::tests::KeywordEmbedder;
    use std::path::Path;

    fn engine(corpus: &Path, state: &Path) -> Arc<RetrievalEngine> {
        let settings = Settings {
            corpus_dir: corpus.to_path_buf(),
            state_dir: state.to_path_buf(),
            ..Settings::default()
        };
        Arc::new(RetrievalEngine::open(&settings, Arc::new(KeywordEmbedder::new())))
    }

    #[tokio::test]
    async fn query_handler_returns_nearest_documents() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let engine = engine(corpus.path(), state.path());
        std::fs::write(corpus.path().join("a.txt"), "cats are great").unwrap();
        std::fs::write(corpus.path().join("b.txt"), "dogs are loyal").unwrap();
        engine.rebuild_now().await.unwrap();

        let Json(resp) = post_query(
            State(Arc::clone(&engine)),
            Json(QueryRequest {
                text: "feline pets".into(),
                k: Some(1),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.generation, 1);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].id, "a.txt");
    }

    #[tokio::test]
    async fn status_handler_reports_pending_upload() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let engine = engine(corpus.path(), state.path());

        post_upload(
            State(Arc::clone(&engine)),
            Query(UploadParams {
                name: "notes.txt".into(),
            }),
            Bytes::from_static(b"cats"),
        )
        .await
        .unwrap();
        post_train(State(Arc::clone(&engine))).await;

        let Json(status) = get_status(State(engine)).await.unwrap();
        assert_eq!(status.new, vec!["notes.txt".to_string()]);
        assert_eq!(status.documents, 0);
        assert!(status.reindex_pending);
        assert!(status.last_rebuild.is_none());
        assert_eq!(status.files.len(), 1);
        assert_eq!(status.files[0].id, "notes.txt");
        assert_eq!(status.files[0].size, 4);
        assert!(status.files[0].modified_at.is_some());
    }

    #[tokio::test]
    async fn oversized_k_is_answered_not_fatal() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let engine = engine(corpus.path(), state.path());
        std::fs::write(corpus.path().join("a.txt"), "cats are great").unwrap();
        std::fs::write(corpus.path().join("b.txt"), "dogs are loyal").unwrap();
        engine.rebuild_now().await.unwrap();

        let Json(resp) = post_query(
            State(engine),
            Json(QueryRequest {
                text: "kitten".into(),
                k: Some(usize::MAX),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.results[0].id, "a.txt");
    }

    #[tokio::test]
    async fn bad_upload_name_is_a_client_error() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let engine = engine(corpus.path(), state.path());
        let err = post_upload(
            State(engine),
            Query(UploadParams { name: "..".into() }),
            Bytes::from_static(b"x"),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn routes_are_served_over_http() {
        let corpus = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let engine = engine(corpus.path(), state.path());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let app = router(Arc::clone(&engine));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        let http = reqwest::Client::new();
        let base = format!("http://{addr}");

        let resp = http
            .post(format!("{base}/upload?name=a.txt"))
            .body("cats are great")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

        let resp = http.post(format!("{base}/train")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        assert!(engine.reindex_pending());
        engine.rebuild_now().await.unwrap();

        let resp: QueryResponse = http
            .post(format!("{base}/query"))
            .json(&json!({ "text": "kitten" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp.results[0].content, "cats are great");

        let health = http.get(format!("{base}/healthz")).send().await.unwrap();
        assert!(health.status().is_success());

        stop.send(()).unwrap();
        server.await.unwrap();
    }
}
