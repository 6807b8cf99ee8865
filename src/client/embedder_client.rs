//! embedder_client.rs
//!
//! Client for an OpenAI-compatible embeddings endpoint (LM Studio, OpenAI,
//! text-embeddings-inference). Provides single and batch embedding.
//!
//! Assumptions:
//! - The model name and vector dimension are fixed at startup.
//! - One embedding per document (no chunking).
//! - Returned vectors are re-normalized locally so distances are comparable
//!   regardless of what the server does.
//!
//! Example:
//! ```ignore
//! use corpus_rag::client::embedder::Embedder;
//! use corpus_rag::client::embedder_client::EmbedderClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let client = EmbedderClient::new("http://localhost:1234/v1", "text-embedding-3-small", 1536)?;
//!   let vec = client.embed_one("hello world").await?;
//!   println!("dim = {}", vec.len());
//!
//!   Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::embedder::{Embedder, l2_normalize};
use crate::config::EMBED_TIMEOUT_SECS;

/// High-level client for embedding text via an OpenAI-compatible server.
pub struct EmbedderClient {
    http: reqwest::Client,
    /// Base URL to the API (e.g., http://localhost:1234/v1).
    base_url: String,
    /// Embedding model name (e.g., "text-embedding-3-small").
    model: String,
    /// Expected vector dimension; responses are validated against it.
    dimension: usize,
    api_key: Option<String>,
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("empty embedding response")]
    EmptyResponse,

    #[error("embedding count mismatch: sent {sent}, got {got}")]
    CountMismatch { sent: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EmbedderClient {
    pub fn new<U: Into<String>, S: Into<String>>(
        base_url: U,
        model: S,
        dimension: usize,
    ) -> Result<Self, EmbedError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            api_key: None,
        })
    }

    /// Override the timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Result<Self, EmbedError> {
        self.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()?;
        Ok(self)
    }

    /// Sends `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Returns the embeddings URL (POST).
    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    /// Embed multiple texts in a single request.
    ///
    /// Returns raw (not normalized) embeddings in the same order as the inputs.
    pub async fn embed_texts<T: AsRef<str>>(
        &self,
        texts: &[T],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let n = texts.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let data = self.embed_texts_raw(texts).await?;
        order_and_validate(data, n, self.dimension)
    }

    /// Low-level call that performs the HTTP request and returns raw data entries.
    async fn embed_texts_raw<T: AsRef<str>>(
        &self,
        texts: &[T],
    ) -> Result<Vec<EmbeddingDatum>, EmbedError> {
        let input: Vec<String> = texts.iter().map(|t| t.as_ref().to_string()).collect();

        let req = EmbeddingsRequest {
            model: self.model.clone(),
            input,
        };

        let mut builder = self.http.post(self.embeddings_url()).json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Status { status, body });
        }

        let parsed: EmbeddingsResponse = resp.json().await?;
        if parsed.data.is_empty() {
            return Err(EmbedError::EmptyResponse);
        }
        Ok(parsed.data)
    }
}

#[async_trait]
impl Embedder for EmbedderClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = self.embed_texts(texts).await?;
        vectors.iter_mut().for_each(|v| l2_normalize(v));
        Ok(vectors)
    }
}

/// Sorts by the response `index` (some servers already do this) and checks
/// count and dimension.
fn order_and_validate(
    data: Vec<EmbeddingDatum>,
    sent: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if data.len() != sent {
        return Err(EmbedError::CountMismatch {
            sent,
            got: data.len(),
        });
    }

    let mut pairs: Vec<(usize, Vec<f32>)> = data
        .into_iter()
        .enumerate()
        .map(|(pos, d)| (d.index.unwrap_or(pos), d.embedding))
        .collect();
    pairs.sort_by_key(|(i, _)| *i);

    let mut result = Vec::with_capacity(sent);
    for (_, emb) in pairs {
        if emb.len() != dimension {
            return Err(EmbedError::DimMismatch {
                expected: dimension,
                got: emb.len(),
            });
        }
        result.push(emb);
    }
    Ok(result)
}

/// Request payload compatible with OpenAI-style embeddings API.
/// LM Studio mirrors this shape.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

/// Response payload (subset) for embeddings.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    embedding: Vec<f32>,
}
