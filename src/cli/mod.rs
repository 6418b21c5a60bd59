//! Command-line interface for Pathwarden.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::adversary::{AdversaryKind, MESSAGE_INITIATION_SIZE};

/// Pathwarden - path-aware transport with on-path adversary simulation
#[derive(Parser, Debug)]
#[command(
    name = "pathwarden",
    author,
    version,
    about = "Path-aware datagram transport with simulated on-path adversaries",
    long_about = r#"
Pathwarden sends tunnel datagrams over explicitly chosen network paths and
puts a configurable adversary in front of every send:

  - pass-through                 lets everything through
  - single-destination           blocks the first path seen per destination
  - all-but-one                  leaves exactly one probed path open
  - all-but-one-lossy            as above, and loses the first datagram on it
  - lazy                         single-destination after a few datagrams
  - all-but-one-handshake-aware  never drops handshake-sized datagrams

QUICK START:
  pathwarden simulate --adversary all-but-one --paths 4 --dead 1
  pathwarden config --output pathwarden.toml
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides `[logging] level`
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Disable colored output, including log output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a handshake fan-out against an adversary on a simulated network
    Simulate(SimulateArgs),

    /// Print the fingerprint of a raw path
    Fingerprint(FingerprintArgs),

    /// Generate example configuration
    Config(ConfigArgs),
}

/// Simulate command arguments
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Adversary to run (defaults to the configured one)
    #[arg(short, long, value_enum)]
    pub adversary: Option<AdversaryKind>,

    /// Number of paths between the two peers
    #[arg(short, long, default_value = "4")]
    pub paths: usize,

    /// Number of dead paths (taken from the front of the path list)
    #[arg(short, long, default_value = "1")]
    pub dead: usize,

    /// Fan-out rounds to send
    #[arg(short = 'n', long, default_value = "3")]
    pub rounds: usize,

    /// Datagram size in bytes
    #[arg(short, long, default_value_t = MESSAGE_INITIATION_SIZE)]
    pub size: usize,
}

/// Fingerprint command arguments
#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Raw path bytes, hex encoded
    pub hex: String,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output file (prints to stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
