//! Incremental document retrieval: a corpus directory is scanned, changed
//! documents are extracted and embedded, and a complete vector index is
//! rebuilt and published without disturbing in-flight queries.

pub mod client;
pub mod config;
pub mod engine;
pub mod index;
pub mod indexing;
pub mod inference;
pub mod ingest;
pub mod server;
pub mod terminal;
pub mod transform;

use std::sync::Arc;

use tracing::info;

use crate::client::embedder::{Embedder, HashEmbedder};
use crate::client::embedder_client::{EmbedError, EmbedderClient};
use crate::config::{EmbedProvider, Settings};

/// Builds the embedder selected in `settings`.
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, EmbedError> {
    let embedder: Arc<dyn Embedder> = match settings.embed_provider {
        EmbedProvider::Http => Arc::new(
            EmbedderClient::new(
                settings.embed_base_url.as_str(),
                settings.embed_model.as_str(),
                settings.vector_size,
            )?
            .with_timeout_secs(settings.embed_timeout_secs)?
            .with_api_key(settings.embed_api_key.clone()),
        ),
        EmbedProvider::Hash => Arc::new(HashEmbedder::new(settings.vector_size)),
    };
    info!(
        "embedder: {} (dimension {})",
        embedder.model_name(),
        embedder.dimension()
    );
    Ok(embedder)
}
