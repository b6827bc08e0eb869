use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentirag::config::Config;
use sentirag::context::AppContext;
use sentirag::mcp::server::McpServer;
use sentirag::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sentirag")]
#[command(about = "Retrieval over customer sentiment feedback")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index and serve the HTTP API
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Build the index and serve MCP tools on stdio
    Mcp,

    /// Build the index and run one query, printing JSON results
    Query {
        /// Question to search for
        text: String,

        /// Number of results (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum score (default from config)
        #[arg(long)]
        min_score: Option<f64>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so the MCP stdio transport stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.bind = bind.clone();
    }
    config.validate().context("invalid configuration")?;

    // Blocking HTTP clients are built and first used outside the async runtime.
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    let ctx = Arc::new(AppContext::from_config(config, api_key.as_deref())?);
    let report = ctx
        .rebuild()
        .with_context(|| format!("failed to index {}", ctx.config.dataset_path))?;
    info!(
        records = report.records,
        chunks = report.chunks,
        dimensions = report.dimensions,
        "startup index ready"
    );

    match cli.command {
        Commands::Serve { .. } => {
            let addr: SocketAddr = ctx
                .config
                .bind
                .parse()
                .with_context(|| format!("invalid bind address: {}", ctx.config.bind))?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(ctx.clone(), addr))?;
        }
        Commands::Mcp => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(McpServer::new(ctx.clone()).start())?;
        }
        Commands::Query {
            text,
            top_k,
            min_score,
        } => {
            let (top_k, min_score) = ctx.resolve_params(top_k, min_score)?;
            let results = ctx.retriever.query(&text, top_k, min_score)?;
            let output = serde_json::json!({ "query": text, "results": results });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
