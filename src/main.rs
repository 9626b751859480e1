//! Gmail Reader MCP Server
//!
//! A Model Context Protocol (MCP) server that reads the Gmail inbox and
//! prepares reply and new-message drafts.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gmail_reader_mcp::config::Config;
use gmail_reader_mcp::gmail::auth::Authenticator;
use gmail_reader_mcp::gmail::client::GmailClient;
use gmail_reader_mcp::mcp::server::McpServer;

/// Gmail Reader MCP Server
#[derive(Parser)]
#[command(name = "gmail-reader-mcp")]
#[command(author, version, about = "Gmail MCP server: read the inbox and draft replies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize Gmail access ahead of time and exit
    Auth,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = Config::new().context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Auth) => {
            let authenticator = Authenticator::new(config)
                .await
                .context("Failed to initialize authenticator")?;
            authenticator
                .authenticate_interactive()
                .await
                .context("Authorization failed")?;
            eprintln!("Authentication completed successfully!");
        }
        None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    if !config.oauth_keys_exist() {
        tracing::warn!(
            "Client secret {} not found; tool calls will fail with auth_error until it is in place",
            config.oauth_path.display()
        );
    }

    let base_url = config.api_base_url.clone();
    let authenticator = Authenticator::new(config)
        .await
        .context("Failed to initialize authenticator")?;

    if !authenticator.is_authenticated().await {
        tracing::info!("No cached Gmail token; authorization will start on the first tool call");
    }

    let gmail_client = GmailClient::new(Arc::new(authenticator)).with_base_url(base_url);

    tracing::info!("Gmail MCP server listening on stdio");
    let mut server = McpServer::new(Arc::new(gmail_client));
    server.run_stdio().await.context("MCP server stopped")?;

    Ok(())
}
