//! shoko command-line client.
//!
//! Usage:
//!   shoko create notes.txt --data "hello"
//!   shoko read notes.txt
//!   shoko modify notes.txt --file ./notes.txt
//!   shoko rename notes.txt archive.txt
//!   shoko delete archive.txt
//!   shoko list
//!
//!   # Print cache invalidations as they arrive
//!   shoko watch --identity alice

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use shoko_client::constants::{DEFAULT_HOST, DEFAULT_PORT};
use shoko_client::{ConnectOptions, RpcClient, ServerEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

/// Client for the shoko file service.
#[derive(Parser, Debug)]
#[command(name = "shoko")]
#[command(about = "Client for the shoko file service")]
struct Args {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Service name to look up
    #[arg(long, default_value = shoko_types::SERVICE_NAME)]
    service: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new file
    Create {
        name: String,
        #[command(flatten)]
        content: Content,
    },
    /// Print a file's contents to stdout
    Read { name: String },
    /// Replace a file's contents
    Modify {
        name: String,
        #[command(flatten)]
        content: Content,
    },
    /// Rename a file
    Rename { name: String, new_name: String },
    /// Delete a file
    Delete { name: String },
    /// List file names
    List,
    /// Register for invalidations and print them until interrupted
    Watch {
        /// Identity to register under (default: <username>-<uuid>)
        #[arg(long)]
        identity: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct Content {
    /// Contents as a literal string
    #[arg(long)]
    data: Option<String>,

    /// Read contents from a local file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl Content {
    fn load(self) -> Result<Vec<u8>> {
        match (self.data, self.file) {
            (Some(data), _) => Ok(data.into_bytes()),
            (None, Some(path)) => {
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => anyhow::bail!("either --data or --file is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let options = ConnectOptions {
        service: args.service.clone(),
        ..ConnectOptions::default()
    };
    let client = RpcClient::connect_with((args.host.as_str(), args.port), options)
        .await
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;

    match args.command {
        Command::Create { name, content } => client.create(&name, content.load()?).await?,
        Command::Read { name } => {
            let data = client.read(&name).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Command::Modify { name, content } => client.modify(&name, content.load()?).await?,
        Command::Rename { name, new_name } => client.rename(&name, &new_name).await?,
        Command::Delete { name } => client.delete(&name).await?,
        Command::List => {
            for name in client.list().await? {
                println!("{name}");
            }
        }
        Command::Watch { identity } => {
            let identity = identity.unwrap_or_else(default_identity);
            watch(&client, &identity).await?;
        }
    }

    Ok(())
}

fn default_identity() -> String {
    format!("{}-{}", whoami::username(), uuid::Uuid::new_v4())
}

async fn watch(client: &RpcClient, identity: &str) -> Result<()> {
    let mut events = client.subscribe_events();
    client.register(identity).await?;
    eprintln!("watching as {identity}");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ServerEvent::CacheInvalidated { name }) => println!("invalidate {name}"),
                Ok(ServerEvent::AllInvalidated) => println!("invalidate *"),
                Ok(ServerEvent::Disconnected) | Err(RecvError::Closed) => {
                    anyhow::bail!("connection closed");
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("missed {} invalidations", n),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
