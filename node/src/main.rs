// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Attest Node
//!
//! Entry point for the `attest-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger and registries, and
//! serves the HTTP/WS API.
//!
//! - `run`: start the node
//! - `init`: create the data directory and identity key
//! - `verify`: audit the stored chain offline
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use attest_protocol::identity::{IdentityProvider, LocalIdentity};
use attest_protocol::ledger::{Ledger, LedgerStore};
use attest_protocol::LedgerConfig;
use attest_registry::{CertificateRegistry, CopyrightRegistry};
use clap::Parser;
use tokio::signal;

use cli::{AttestNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;

const DEFAULT_LOG_DIRECTIVE: &str =
    "attest_node=info,attest_protocol=info,attest_registry=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AttestNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Verify(args) => verify_chain(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn open_store(data_dir: &Path) -> Result<LedgerStore> {
    let db_path = data_dir.join(cli::DB_DIR_NAME);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(store)
}

/// Opens a database that must already hold a chain. Creates nothing.
fn open_existing_store(data_dir: &Path) -> Result<LedgerStore> {
    let db_path = data_dir.join(cli::DB_DIR_NAME);
    if !db_path.is_dir() {
        bail!("no database at {}", db_path.display());
    }
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    if store.tip_height().context("failed to read chain tip")?.is_none() {
        bail!("database at {} holds no chain", db_path.display());
    }
    Ok(store)
}

/// Starts the API and metrics servers and runs until a shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_DIRECTIVE, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        difficulty = args.difficulty,
        data_dir = %args.data_dir.display(),
        "starting attest-node"
    );

    let key_path = args.key_path();
    let identity = Arc::new(LocalIdentity::from_key_file(&key_path).with_context(|| {
        format!(
            "failed to load identity from {} (run `attest-node init` first)",
            key_path.display()
        )
    })?);
    tracing::info!(address = %identity.current_address(), "identity loaded");

    // --- Ledger & registries ---
    let store = open_store(&args.data_dir)?;
    let ledger = Arc::new(
        Ledger::open(store.clone(), args.ledger_config()).context("failed to open ledger")?,
    );
    let certificates = Arc::new(
        CertificateRegistry::open(Arc::clone(&ledger), &store)
            .context("failed to open certificate registry")?,
    );
    let copyrights = Arc::new(
        CopyrightRegistry::open(Arc::clone(&ledger), &store)
            .context("failed to open copyright registry")?,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(
        NodeMetrics::new().map_err(|e| anyhow::anyhow!("failed to register metrics: {e}"))?,
    );

    let app_state = api::AppState::new(
        ledger,
        certificates,
        copyrights,
        identity,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    store.flush().context("failed to flush database")?;
    tracing::info!("attest-node stopped");
    Ok(())
}

/// Creates the data directory and writes a fresh identity key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("attest_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(cli::KEY_FILE_NAME);
    if key_path.exists() && !args.force {
        bail!(
            "identity key already exists at {} (pass --force to replace it)",
            key_path.display()
        );
    }

    let identity = LocalIdentity::generate();
    write_key_file(&key_path, &identity.keypair().secret_key_hex())?;

    tracing::info!(
        address = %identity.current_address(),
        key_path = %key_path.display(),
        "identity generated"
    );

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Identity key   : {}", key_path.display());
    println!("  Address        : {}", identity.current_address());
    Ok(())
}

fn write_key_file(path: &Path, secret_hex: &str) -> Result<()> {
    std::fs::write(path, secret_hex)
        .with_context(|| format!("failed to write identity key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Prints the stored chain's audit report as JSON. Fails when the chain
/// does not verify.
fn verify_chain(args: cli::VerifyArgs) -> Result<()> {
    logging::init_logging("attest_node=warn,attest_protocol=warn", LogFormat::Pretty);

    let store = open_existing_store(&args.data_dir)?;
    let ledger = Ledger::open(store, LedgerConfig::default()).context("failed to open ledger")?;
    let report = ledger.chain_report();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode chain report")?
    );
    if !report.valid {
        bail!("chain verification failed with {} fault(s)", report.faults.len());
    }
    Ok(())
}

fn print_version() {
    println!("attest-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", attest_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT or SIGTERM. On non-Unix platforms only Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_round_trips_through_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(cli::KEY_FILE_NAME);
        let identity = LocalIdentity::generate();

        write_key_file(&path, &identity.keypair().secret_key_hex()).unwrap();
        let loaded = LocalIdentity::from_key_file(&path).unwrap();
        assert_eq!(loaded.current_address(), identity.current_address());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn audit_refuses_a_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("typo");
        assert!(open_existing_store(&data_dir).is_err());
        assert!(!data_dir.exists());
    }

    #[test]
    fn audit_refuses_an_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        drop(open_store(dir.path()).unwrap());

        assert!(open_existing_store(dir.path()).is_err());
        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.block_count(), 0);
    }

    #[test]
    fn audit_opens_a_stored_chain() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path()).unwrap();
            Ledger::open(store, LedgerConfig::default()).unwrap();
        }
        let store = open_existing_store(dir.path()).unwrap();
        assert_eq!(store.tip_height().unwrap(), Some(0));
    }

    #[test]
    fn open_store_creates_db_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).unwrap();
        assert!(dir.path().join(cli::DB_DIR_NAME).is_dir());
        assert_eq!(store.block_count(), 0);
    }
}
