use clap::Parser;
use signup_service::account::{AccountStore, Argon2Hasher, RegistrationService};
use signup_service::cli::{Cli, Commands};
use signup_service::config::{ConfigSource, ServiceConfig};
use signup_service::error::ServiceError;
use signup_service::rpc::{shutdown_signal, RpcServer};
use signup_service::storage::Storage;
use signup_service::telemetry;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let Cli { config, command } = Cli::parse();

    match command.unwrap_or(Commands::Serve {
        port: None,
        db_path: None,
    }) {
        Commands::Serve { port, db_path } => serve(&config, port, db_path).await,
        Commands::InitConfig { force } => init_config(&config, force),
    }
}

async fn serve(
    config_path: &str,
    port: Option<u16>,
    db_path: Option<String>,
) -> Result<(), ServiceError> {
    let (mut config, source) = ServiceConfig::load_or_default(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.storage.db_path = db_path;
    }

    telemetry::init_tracing(&config.logging.log_level);
    match source {
        ConfigSource::File => info!("Config loaded from {}", config_path),
        ConfigSource::CreatedDefault => {
            info!("Config file not found at '{}'. Wrote defaults.", config_path)
        }
    }

    // Opened once here, shared by every request, flushed after the server stops.
    let storage = Arc::new(Storage::open(&config.storage.db_path)?);
    let accounts = storage.count()?;
    info!(db_path = %config.storage.db_path, accounts, "Account store opened");

    let hasher = Arc::new(Argon2Hasher::new()?);
    let registration = RegistrationService::new(storage.clone(), hasher);

    RpcServer::new(
        registration,
        &config.server.host,
        config.server.port,
        config.server.permissive_cors,
    )
    .start(shutdown_signal())
    .await?;

    let flushed = storage.flush()?;
    info!(bytes = flushed, "Account store flushed, exiting");
    Ok(())
}

fn init_config(config_path: &str, force: bool) -> Result<(), ServiceError> {
    telemetry::init_tracing("info");

    if Path::new(config_path).exists() && !force {
        warn!("{} already exists; pass --force to overwrite", config_path);
        return Ok(());
    }

    ServiceConfig::default().save(config_path)?;
    info!("Wrote default config to {}", config_path);
    Ok(())
}
