//! Hookwire: runs compiled API transactions through lifecycle hooks.
//!
//! Main entry point that wires the crates together: loads configuration,
//! starts the out-of-process hooks handler when one is configured, and runs
//! the transaction pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use hookwire_core::config::AppConfig;
use hookwire_core::error::AppError;
use hookwire_core::{FaultSlot, Transaction};
use hookwire_handler::HookHandlerClient;
use hookwire_hooks::{HookBackend, HookDispatcher, HookRegistry};
use hookwire_runner::{RunReport, TransactionRunner};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match run(config).await {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!("Could not serialize run report: {}", e),
            }
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Run error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Load configuration from an explicit file or from the `config/` directory.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("HOOKWIRE_CONFIG") {
        Ok(path) => AppConfig::load_file(Path::new(&path)),
        Err(_) => {
            let env = std::env::var("HOOKWIRE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Read the compiled transaction list.
fn load_transactions(path: Option<&PathBuf>) -> Result<Vec<Transaction>, AppError> {
    let path = path.ok_or_else(|| {
        AppError::configuration("No transaction file configured (runner.transactions)")
    })?;
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::configuration(format!(
            "Failed to read transactions from '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Main run function
async fn run(config: AppConfig) -> Result<RunReport, AppError> {
    tracing::info!("Starting Hookwire v{}", env!("CARGO_PKG_VERSION"));

    let mut transactions = load_transactions(config.runner.transactions.as_ref())?;
    tracing::info!("Loaded {} transactions", transactions.len());

    let registry = Arc::new(HookRegistry::new());
    let fault = FaultSlot::new();

    let handler = if config.handler.is_remote() {
        let client = HookHandlerClient::start(&config.handler, &registry, fault.clone()).await?;
        tracing::info!(
            pid = client.pid(),
            command = %client.command_line(),
            "Hooks handler ready"
        );
        Some(client)
    } else {
        tracing::info!("No hooks handler language configured, running without remote hooks");
        None
    };

    let mut runner = TransactionRunner::new(
        HookDispatcher::new(Arc::clone(&registry), fault),
        config.runner.clone(),
    );
    if let Some(client) = &handler {
        runner = runner.with_backend(Arc::new(client.clone()) as Arc<dyn HookBackend>);
    }

    let report = runner.run(&mut transactions).await?;

    // The handler is normally stopped by its afterAll hook; a second stop is a no-op.
    if let Some(client) = handler {
        client.stop().await?;
    }

    Ok(report)
}
