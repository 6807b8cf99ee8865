// src/main.rs
//! Wires the retrieval engine into one of two front-ends:
//! - `corpus-rag serve`  background reindex scheduler + HTTP API
//! - `corpus-rag`        interactive terminal (query / index / status)
//!
//! Settings come from the environment (see `config.rs`), logging from
//! `RUST_LOG` (default `corpus_rag=info`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

use corpus_rag::build_embedder;
use corpus_rag::config::Settings;
use corpus_rag::engine::RetrievalEngine;
use corpus_rag::{server, terminal};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corpus_rag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let embedder = build_embedder(&settings).context("failed to set up the embedder")?;
    let engine = Arc::new(RetrievalEngine::open(&settings, embedder));

    match std::env::args().nth(1).as_deref() {
        Some("serve") => serve(engine, &settings).await,
        None => terminal::terminal(&engine).await,
        Some(other) => bail!("unknown command {other:?}; expected `serve` or no argument"),
    }
}

async fn serve(engine: Arc<RetrievalEngine>, settings: &Settings) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", settings.host, settings.port))?;

    let (stop_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut stop_scheduler = stop_tx.subscribe();
    let mut stop_server = stop_tx.subscribe();

    // pick up whatever changed while we were down
    engine.request_reindex();
    let scheduler = engine.spawn_scheduler(async move {
        let _ = stop_scheduler.recv().await;
    });

    let mut http = tokio::spawn(server::serve(Arc::clone(&engine), addr, async move {
        let _ = stop_server.recv().await;
    }));

    let served = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
            let _ = stop_tx.send(());
            (&mut http).await
        }
        finished = &mut http => {
            let _ = stop_tx.send(());
            finished
        }
    };

    scheduler.await.context("scheduler task panicked")?;
    served.context("http server task panicked")?
}
