//! Study Agent
//!
//! A ReAct agent that answers questions about class materials. It searches
//! an indexed copy of the materials, keeps long-term memories of the user,
//! and can calculate, tell the time and search the web.

mod api;
mod cli;
mod core;
mod graph;
mod memory;
mod models;
mod rag;
mod store;
mod tools;

use crate::cli::{Cli, Commands, requires_api_key};
use crate::core::config::Config;
use crate::core::logging::init_logging;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);

    print_startup_banner(&config);

    if requires_api_key(&command) && !config.validate_api_key() {
        error!("OPENAI_API_KEY is not set. Add it to .env or the environment.");
        std::process::exit(1);
    }

    if let Err(e) = cli::run(command, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Print startup banner with configuration
fn print_startup_banner(config: &Config) {
    println!("🚀 Study Agent v{}", env!("CARGO_PKG_VERSION"));
    println!("✅ Configuration loaded successfully");
    if !config.openai_base_url.is_empty() {
        println!("   Base URL: {}", config.openai_base_url);
    }
    println!("   Chat Model: {}", config.chat_model);
    println!("   Embedding Model: {}", config.embed_model);
    println!("   Request Timeout: {}s", config.request_timeout);
    println!("   Vector Store: {}", config.chroma_dir.display());
    println!("   Data Directory: {}", config.data_dir.display());
    println!(
        "   Reranking: {}",
        if config.rerank { "Enabled" } else { "Disabled" }
    );
    println!(
        "   Google Search: {}",
        if config.google_search_configured() {
            "Enabled"
        } else {
            "Mock results"
        }
    );
    println!("   Max Loops: {}", config.max_loops);
    println!();
}
