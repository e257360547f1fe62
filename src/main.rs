//! Verse engine server binary.
//!
//! There is no CLI surface: the config file path comes from the
//! `VERSE_ENGINE_CONFIG` environment variable (default
//! `./config/engine.toml`), and everything else is read from the config.
//! A malformed or empty corpus aborts startup before the server binds.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use verse_engine::config::{config_path, load_config};
use verse_engine::engine::Engine;
use verse_engine::server::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = config_path();
    let config = load_config(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    let engine = Engine::from_config(&config)
        .await
        .context("engine startup failed")?;

    run_server(&config, Arc::new(engine)).await
}
