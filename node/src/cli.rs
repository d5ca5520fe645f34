//! # CLI Interface
//!
//! Command-line arguments for `attest-node`, built with `clap` derive.
//! Every `run` flag falls back to an `ATTEST_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use attest_protocol::config::{
    DEFAULT_DIFFICULTY, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, MAX_CONTENT_BYTES,
};
use attest_protocol::LedgerConfig;
use clap::{Parser, Subcommand};

/// Name of the identity key file inside the data directory.
pub const KEY_FILE_NAME: &str = "identity.key";

/// Name of the sled database directory inside the data directory.
pub const DB_DIR_NAME: &str = "db";

/// Attest ledger node.
///
/// Serves the content ledger, access certificates and copyright records
/// over HTTP, streams ledger events over WebSocket, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "attest-node",
    about = "Attest content-authentication ledger node",
    version,
    propagate_version = true
)]
pub struct AttestNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and a fresh identity key.
    Init(InitArgs),
    /// Audit the stored chain offline and print the report.
    Verify(VerifyArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding the database and identity key.
    #[arg(long, short = 'd', env = "ATTEST_DATA_DIR", default_value = ".attest")]
    pub data_dir: PathBuf,

    /// Port for the HTTP/WebSocket API.
    #[arg(long, env = "ATTEST_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ATTEST_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Leading hex zeros required of new block hashes.
    #[arg(long, env = "ATTEST_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Seconds allowed for mining one block.
    #[arg(long, env = "ATTEST_MINING_TIMEOUT", default_value_t = 30)]
    pub mining_timeout_secs: u64,

    /// Hex-encoded Ed25519 secret key file. Defaults to
    /// `<data-dir>/identity.key`.
    #[arg(long, env = "ATTEST_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "ATTEST_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl RunArgs {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            difficulty: self.difficulty,
            mining_timeout: Duration::from_secs(self.mining_timeout_secs),
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(KEY_FILE_NAME))
    }
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "ATTEST_DATA_DIR", default_value = ".attest")]
    pub data_dir: PathBuf,

    /// Replace an existing identity key.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Data directory whose chain should be audited.
    #[arg(long, short = 'd', env = "ATTEST_DATA_DIR", default_value = ".attest")]
    pub data_dir: PathBuf,
}
