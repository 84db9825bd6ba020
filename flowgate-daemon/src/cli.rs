//! CLI argument definitions for flowgate-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Flowgate telemetry collector daemon.
///
/// Receives NetFlow-family export packets over UDP, tracks per-exporter
/// sequence gaps, and forwards normalized flow records downstream.
#[derive(Parser, Debug)]
#[command(name = "flowgate-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to flowgate.toml configuration file.
    #[arg(short, long, default_value = "/etc/flowgate/flowgate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
