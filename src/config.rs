//! Command line configuration of the two binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Options of `factor_server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "factor_server", version, about = "Serve prime factorizations over RPC")]
pub struct ServerConfig {
    /// Server port for the service
    #[arg(long, default_value_t = 50051)]
    pub port: u16,

    /// Host to listen on, all interfaces by default
    #[arg(long, default_value = "0.0.0.0")]
    pub address: String,

    /// Name of log file
    #[arg(long = "log_file_name", visible_alias = "log-file-name", default_value = "log.txt")]
    pub log_file_name: PathBuf,
}

impl ServerConfig {
    /// `address:port` to bind the listener to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Options of `factor_client`.
#[derive(Debug, Clone, Parser)]
#[command(name = "factor_client", version, about = "Send random factoring requests to a server")]
pub struct ClientConfig {
    /// Server address
    #[arg(long, default_value = "localhost:50051")]
    pub target: String,

    /// Number of factoring tries
    #[arg(long, default_value_t = 1)]
    pub tries: u64,

    /// Should results be kept off stdout
    #[arg(long)]
    pub quiet: bool,

    /// Should we time the run
    #[arg(long)]
    pub time: bool,

    /// Repeat the tries until killed
    #[arg(long)]
    pub forever: bool,

    /// Give up on a reply after this many milliseconds
    #[arg(long = "timeout_ms", visible_alias = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// The per-call timeout, if one was given.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
