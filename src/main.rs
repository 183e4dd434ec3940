//! Chat Server - Entry Point
//!
//! Parses the command line, binds the listener and hands it to the accept
//! loop.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use textchat::config::{
    CredentialStore, ServerConfig, DEFAULT_MAX_CLIENTS, DEFAULT_MAX_MEMBERS, DEFAULT_MAX_SESSIONS,
};
use textchat::serve;

/// Line-oriented chat server
#[derive(Parser, Debug)]
#[command(name = "textchat_server", version, about)]
struct Cli {
    /// TCP port to listen on (all interfaces)
    port: u16,

    /// JSON file with `[{"id": .., "password": ..}]` entries, replacing the built-in table
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Client registry capacity
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Session registry capacity
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    /// Member capacity of each session
    #[arg(long, default_value_t = DEFAULT_MAX_MEMBERS)]
    max_members: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=textchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("textchat=info")),
        )
        .init();

    let cli = Cli::parse();

    let credentials = match &cli.credentials {
        Some(path) => CredentialStore::from_json_file(path)?,
        None => CredentialStore::default(),
    };
    info!("Loaded {} credential(s)", credentials.len());

    let config = ServerConfig {
        max_clients: cli.max_clients,
        max_sessions: cli.max_sessions,
        max_members: cli.max_members,
        credentials,
    };

    // Start TCP listener
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Chat server listening on port {}", cli.port);

    serve(listener, config).await;

    Ok(())
}
