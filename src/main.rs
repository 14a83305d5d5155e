//! jmap-mcp-rs: JMAP email MCP server
//!
//! Exposes search, read, mark, move, delete, send, and reply tools over the
//! Model Context Protocol, translating each call into JMAP method calls
//! against a single account.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and transport selection
//! - [`config`]: Environment-driven configuration for the JMAP connection
//! - [`errors`]: Application error model and error text formatting
//! - [`jmap`]: JMAP session discovery, transport, and method-call helpers
//! - [`server`]: MCP handler, tool registration, and the response envelope
//! - [`email`]: Search, read, and mutating email tools
//! - [`submission`]: Send and reply tools (draft, then submit)
//! - [`models`]: Input DTOs and schema-bearing types
//! - [`validation`]: Bounds and format checks on tool inputs
//! - [`filter`]: `Email/query` and `Mailbox/query` filter construction
//! - [`pagination`]: Query pagination metadata

mod config;
mod email;
mod errors;
mod filter;
mod jmap;
mod models;
mod pagination;
mod server;
mod submission;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use config::ServerConfig;
use jmap::{HttpTransport, JmapClient};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use server::JmapMcpServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Path the streamable HTTP service is mounted at
const MCP_PATH: &str = "/mcp";

/// MCP transport to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout
    Stdio,
    /// Streamable HTTP under `/mcp`
    Http,
}

#[derive(Debug, Parser)]
#[command(version, about = "JMAP email MCP server")]
struct Cli {
    /// MCP transport to serve
    #[arg(long, env = "JMAP_MCP_TRANSPORT", value_enum, default_value = "stdio")]
    transport: Transport,
    /// Listen address for the HTTP transport
    #[arg(long, env = "JMAP_MCP_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

/// Application entry point
///
/// Initializes tracing from environment, loads config, discovers the JMAP
/// session, and serves the MCP server over the selected transport. Logs go
/// to stderr so stdout stays reserved for the stdio transport.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// JMAP_SESSION_URL=https://api.fastmail.com/jmap/session \
/// JMAP_BEARER_TOKEN=secret \
/// cargo run -- --transport http --bind 127.0.0.1:8080
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from_env()?;
    let (transport, session) = HttpTransport::connect(&config).await?;
    let account_id = session.resolve_account_id(config.account_id.as_deref())?;
    let client = JmapClient::new(Arc::new(transport), account_id);
    let server = JmapMcpServer::new(client, config.read_only);

    match cli.transport {
        Transport::Stdio => {
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
        }
        Transport::Http => serve_http(server, cli.bind).await?,
    }
    Ok(())
}

/// Serve the streamable HTTP transport until Ctrl-C
async fn serve_http(server: JmapMcpServer, bind: SocketAddr) -> std::io::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    let router = axum::Router::new().nest_service(MCP_PATH, service);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, path = MCP_PATH, "serving MCP over HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
}
