//! shoko server binary
//!
//! Serves the in-memory file store over TCP.
//!
//! ## Usage
//!
//! ```bash
//! # Run on the default port (5099)
//! shoko-server
//!
//! # Override from a config file, then from flags
//! shoko-server --config shoko.toml --port 6000 --bind 0.0.0.0
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use shoko_server::{FileServer, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// In-memory file service with client cache invalidation.
#[derive(Parser, Debug)]
#[command(name = "shoko-server")]
#[command(about = "In-memory file service with client cache invalidation")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting shoko server on {}:{}...", config.bind_address, config.port);

    let server = FileServer::new(config);
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    ExitCode::SUCCESS
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind_address = bind.clone();
    }
    config.validate()?;
    Ok(config)
}
