//! daem0n-mcp — JSON-RPC tool server exposing the `daemon-core` memory
//! engine over stdio or HTTP.
//!
//! Logging goes to stderr (stdout is reserved for JSON-RPC on the stdio
//! transport); `RUST_LOG` controls the filter the usual way.

mod dispatcher;
mod error;
mod protocol;
mod registry;
mod resources;
mod server;
mod tools;

use std::io;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use daemon_core::Config;

use crate::protocol::stdio::StdioTransport;
use crate::registry::ProjectRegistry;
use crate::server::McpServer;

/// JSON-RPC tool server for the daem0n per-project memory engine.
#[derive(Parser, Debug)]
#[command(name = "daemon-mcp", version)]
struct Cli {
    /// Project directory to treat as the default project for resources
    /// that don't name one explicitly (`daem0n://triggered/{file}`).
    #[arg(long)]
    project_path: Option<String>,

    /// Serve over HTTP instead of stdio.
    #[arg(long)]
    http: bool,

    /// HTTP bind host (only used with --http).
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// HTTP bind port (only used with --http).
    #[arg(long, default_value_t = 3100)]
    port: u16,
}

fn warn_unrecognized_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DAEM0N_") && !Config::RECOGNIZED_VARS.contains(&key.as_str()) {
            warn!(var = %key, "unrecognized DAEM0N_ environment variable, ignoring");
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!(version = daemon_core::VERSION, "daem0n-mcp starting");
    warn_unrecognized_env_vars();

    let config = Config::from_env();
    let registry = Arc::new(ProjectRegistry::new(config));

    if let Some(project_path) = &cli.project_path {
        registry.set_default_project(project_path);
    }

    if cli.http {
        #[cfg(feature = "http")]
        {
            let transport = protocol::http::HttpTransport::new(protocol::http::HttpTransportConfig {
                host: cli.host,
                port: cli.port,
            });
            if let Err(e) = transport.run(registry).await {
                error!(error = %e, "http server error");
                std::process::exit(1);
            }
            return;
        }
        #[cfg(not(feature = "http"))]
        {
            error!("--http was requested but this build was compiled without the `http` feature");
            std::process::exit(1);
        }
    }

    let server = McpServer::new(registry);
    let transport = StdioTransport::new();

    info!("starting mcp server on stdio");
    if let Err(e) = transport.run(server).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("daem0n-mcp shutting down");
}
