pub mod embedder;
pub mod embedder_client;
