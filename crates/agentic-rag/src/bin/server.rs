//! Agentic RAG server binary
//!
//! Run with: cargo run -p agentic-rag --bin agentic-rag-server -- --config rag.toml

use agentic_rag::{
    config::{RagConfig, CONFIG_ENV_VAR},
    providers::{EmbeddingProvider, OllamaEmbedder},
    server::RagServer,
};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "agentic-rag-server", version, about = "Retrieval-augmented chat server", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentic_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                      Agentic RAG                          ║
║        Conversations grounded in your knowledge base      ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config_path = Args::parse().config;
    let config = RagConfig::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("loading config from {}", path.display()),
        None => format!("loading config (set {} or pass --config)", CONFIG_ENV_VAR),
    })?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Conversations: {}", config.storage.conversations_path.display());
    tracing::info!("  - Documents: {}", config.storage.documents_path.display());
    tracing::info!("  - Max query length: {} chars", config.chat.max_query_chars);
    tracing::info!(
        "  - Retrieval: {}",
        if config.retrieval.enabled { "enabled" } else { "disabled" }
    );

    if config.retrieval.enabled {
        tracing::info!("Checking Ollama at {}...", config.embeddings.base_url);
        let embedder = OllamaEmbedder::new(&config.embeddings)?;
        match embedder.health_check().await {
            Ok(true) => tracing::info!("Ollama is running"),
            _ => {
                tracing::warn!("Ollama not available at {}", config.embeddings.base_url);
                tracing::warn!("  Start it with: ollama serve");
                tracing::warn!("  Pull the model: ollama pull {}", config.embeddings.model);
            }
        }
    }

    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/chat                         - Chat turn");
    println!("  GET    /api/conversations/:id/messages   - Transcript");
    println!("  GET    /api/conversations/:id/executions - Execution trace");
    println!("  DELETE /api/conversations/:id            - Delete conversation");
    println!("  POST   /api/search                       - Vector search");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
