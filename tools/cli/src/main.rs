//! onetime CLI - run the one-time secret server or use the vault directly.
//!
//! Backend settings come from flags or the environment
//! (`REDIS_HOST_NAME`, `REDIS_PORT`, `REDIS_DB_ID`, `REDIS_KEY_TTL_SECONDS`,
//! `STORAGE_FILE_NAME`). They are all required and checked at startup.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use onetime_common::StoreMode;
use onetime_storage::MemoryCache;
use onetime_vault::{DurableConfig, EphemeralConfig, Vault, VaultConfig, DEFAULT_IO_TIMEOUT_MS};

#[derive(Parser)]
#[command(name = "onetime")]
#[command(about = "onetime - Secrets that can be read exactly once")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Backend configuration shared by every subcommand.
#[derive(Args)]
struct StoreArgs {
    /// Redis host name.
    #[arg(long, env = "REDIS_HOST_NAME")]
    redis_host: String,

    /// Redis port.
    #[arg(long, env = "REDIS_PORT")]
    redis_port: u16,

    /// Redis database index.
    #[arg(long, env = "REDIS_DB_ID")]
    redis_db: i64,

    /// Lifetime of an unread ephemeral secret, in seconds.
    #[arg(long, env = "REDIS_KEY_TTL_SECONDS")]
    ttl_seconds: u64,

    /// File holding durable secrets.
    #[arg(long, env = "STORAGE_FILE_NAME")]
    storage_file: PathBuf,

    /// Bound on each backend call, in milliseconds.
    #[arg(long, env = "ONETIME_IO_TIMEOUT_MS", default_value_t = DEFAULT_IO_TIMEOUT_MS)]
    io_timeout_ms: u64,

    /// Keep ephemeral secrets in process memory instead of Redis (development only).
    #[arg(long)]
    memory_cache: bool,
}

impl StoreArgs {
    fn config(&self) -> VaultConfig {
        VaultConfig {
            ephemeral: EphemeralConfig {
                host: self.redis_host.clone(),
                port: self.redis_port,
                db: self.redis_db,
                ttl_secs: self.ttl_seconds,
            },
            durable: DurableConfig {
                path: self.storage_file.clone(),
            },
            io_timeout_ms: self.io_timeout_ms,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API until interrupted.
    Serve {
        /// Address to bind.
        #[arg(long, env = "BACKEND_IP")]
        host: IpAddr,

        /// Port to bind.
        #[arg(long, env = "BACKEND_PORT")]
        port: u16,
    },

    /// Store a secret and print its retrieval key.
    Put {
        /// Storage mode: "ephemeral" or "durable".
        #[arg(short, long)]
        mode: String,

        /// Secret to store (read from stdin when omitted).
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Retrieve and consume a secret.
    Get {
        /// Retrieval key printed by `put`.
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let vault = open_vault(&cli.store).await?;

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(vault, SocketAddr::new(host, port)).await,

        Commands::Put { mode, data } => cmd_put(&vault, &mode, data).await,

        Commands::Get { token } => cmd_get(&vault, &token).await,
    }
}

/// Build the vault from validated configuration.
async fn open_vault(args: &StoreArgs) -> Result<Vault> {
    let config = args.config();
    config.validate().context("Invalid configuration")?;

    if args.memory_cache {
        warn!("Using in-process cache; ephemeral secrets are lost on exit");
        return Vault::with_cache(&config, Arc::new(MemoryCache::new()))
            .context("Failed to open vault");
    }

    Vault::open(&config).await.context("Failed to open vault")
}

/// Run the HTTP server.
async fn cmd_serve(vault: Vault, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    onetime_server::serve(listener, Arc::new(vault), shutdown)
        .await
        .context("HTTP server failed")
}

/// Store a secret.
async fn cmd_put(vault: &Vault, mode: &str, data: Option<String>) -> Result<()> {
    let mode: StoreMode = mode.parse().context("Invalid mode")?;

    let plaintext = match data {
        Some(data) => Zeroizing::new(data),
        None => {
            let mut buf = Zeroizing::new(String::new());
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read secret from stdin")?;
            if buf.ends_with('\n') {
                buf.pop();
                if buf.ends_with('\r') {
                    buf.pop();
                }
            }
            buf
        }
    };

    let token = vault
        .put(mode, &plaintext)
        .await
        .context("Failed to store secret")?;

    println!("{}", token.as_str());
    Ok(())
}

/// Retrieve a secret.
async fn cmd_get(vault: &Vault, token: &str) -> Result<()> {
    let plaintext = Zeroizing::new(
        vault
            .get(token.trim())
            .await
            .context("Failed to retrieve secret")?,
    );

    println!("{}", plaintext.as_str());
    Ok(())
}
