//! OCI registry server

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::Parser;
use registry::{RegistryBuilder, RegistryConfig};
use tracing_subscriber::EnvFilter;

/// Serve an OCI registry.
#[derive(Debug, Parser)]
#[command(name = "registry-server", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: Utf8PathBuf,

    /// Address to listen on.
    #[arg(long, short, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let document = tokio::fs::read_to_string(&args.config).await?;
    let config = RegistryConfig::from_toml(&document)?;
    let options = config.options()?;
    let storage = config.storage.build().await?;

    tracing::info!(
        driver = storage.name(),
        bucket = %config.bucket,
        root = %config.root,
        "opened storage"
    );

    let app = RegistryBuilder::new()
        .storage(storage)
        .bucket(config.bucket)
        .options(options)
        .build();

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("OCI Registry listening on http://{}", args.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
