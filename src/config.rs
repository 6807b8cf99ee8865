//! config.rs
//!
//! Runtime settings for the retrieval core. Defaults live in the constants
//! below; every field can be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// -------- defaults --------

pub const CORPUS_DIR: &str = "data";
pub const STATE_DIR: &str = ".corpus-rag";
pub const EMBED_BASE_URL: &str = "http://localhost:1234/v1";
pub const EMBED_BASE_MODEL: &str = "text-embedding-all-minilm-l6-v2";
pub const VECTOR_SIZE: usize = 384; // must match model
pub const EMBED_BATCH: usize = 64;
pub const EMBED_TIMEOUT_SECS: u64 = 60;
pub const POLL_INTERVAL_SECS: u64 = 5;
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const TOP_K: usize = 3;
pub const MAX_DOCUMENT_CHARS: usize = 200_000;
pub const HOST: &str = "0.0.0.0";
pub const PORT: u16 = 5000;

// --------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which embedding backend the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
    /// Offline feature-hashing embedder.
    Hash,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub corpus_dir: PathBuf,
    pub state_dir: PathBuf,
    pub embed_provider: EmbedProvider,
    pub embed_base_url: String,
    pub embed_model: String,
    pub embed_api_key: Option<String>,
    pub vector_size: usize,
    pub embed_batch: usize,
    pub embed_timeout_secs: u64,
    pub poll_interval: Duration,
    pub top_k: usize,
    pub max_document_chars: usize,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from(CORPUS_DIR),
            state_dir: PathBuf::from(STATE_DIR),
            embed_provider: EmbedProvider::Http,
            embed_base_url: EMBED_BASE_URL.to_string(),
            embed_model: EMBED_BASE_MODEL.to_string(),
            embed_api_key: None,
            vector_size: VECTOR_SIZE,
            embed_batch: EMBED_BATCH,
            embed_timeout_secs: EMBED_TIMEOUT_SECS,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            top_k: TOP_K,
            max_document_chars: MAX_DOCUMENT_CHARS,
            host: HOST.to_string(),
            port: PORT,
        }
    }
}

impl Settings {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Self::default();

        if let Some(v) = get("CORPUS_DIR") {
            s.corpus_dir = PathBuf::from(v);
        }
        if let Some(v) = get("STATE_DIR") {
            s.state_dir = PathBuf::from(v);
        }
        if let Some(v) = get("EMBED_PROVIDER") {
            s.embed_provider = match v.to_ascii_lowercase().as_str() {
                "http" | "openai" => EmbedProvider::Http,
                "hash" => EmbedProvider::Hash,
                _ => return Err(invalid("EMBED_PROVIDER", v, "expected `http` or `hash`")),
            };
        }
        if let Some(v) = get("EMBED_BASE_URL") {
            s.embed_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("EMBED_MODEL") {
            s.embed_model = v;
        }
        s.embed_api_key = get("EMBED_API_KEY");
        if let Some(v) = get("VECTOR_SIZE") {
            s.vector_size = parse_positive("VECTOR_SIZE", v)?;
        }
        if let Some(v) = get("EMBED_BATCH") {
            s.embed_batch = parse_positive("EMBED_BATCH", v)?;
        }
        if let Some(v) = get("EMBED_TIMEOUT_SECS") {
            s.embed_timeout_secs = parse_positive("EMBED_TIMEOUT_SECS", v)? as u64;
        }
        if let Some(v) = get("POLL_INTERVAL_SECS") {
            let secs: u64 = v.parse().map_err(|e: std::num::ParseIntError| {
                invalid("POLL_INTERVAL_SECS", v.clone(), e.to_string())
            })?;
            if secs < MIN_POLL_INTERVAL_SECS {
                return Err(invalid("POLL_INTERVAL_SECS", v, "must be at least 1 second"));
            }
            s.poll_interval = Duration::from_secs(secs);
        }
        if let Some(v) = get("TOP_K") {
            s.top_k = parse_positive("TOP_K", v)?;
        }
        if let Some(v) = get("MAX_DOCUMENT_CHARS") {
            s.max_document_chars = parse_positive("MAX_DOCUMENT_CHARS", v)?;
        }
        if let Some(v) = get("HOST") {
            s.host = v;
        }
        if let Some(v) = get("PORT") {
            s.port = v.parse().map_err(|e: std::num::ParseIntError| {
                invalid("PORT", v.clone(), e.to_string())
            })?;
        }

        Ok(s)
    }
}

fn parse_positive(key: &'static str, value: String) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(0) => Err(invalid(key, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(key, value, e.to_string())),
    }
}

fn invalid(key: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value,
        reason: reason.into(),
    }
}
