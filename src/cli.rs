//! Command-line surface: `--conf`, `--foreground`, `--debug`,
//! `--default-config`. Flat, no subcommands — this daemon has a single
//! mode of operation.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(
    name = "gmond",
    version,
    about = "Node-level metric daemon — samples local host metrics, gossips them to a cluster, and serves the aggregated view to clients",
    long_about = None
)]
pub struct Cli {
    /// Path to the configuration file.
    #[clap(long, short, default_value = "/etc/gmond.toml")]
    pub conf: PathBuf,

    /// Whether `--conf` was left at its default (vs. explicitly given).
    /// Tracked so a missing default path can fall back to built-in defaults
    /// while a missing *explicit* path is startup-fatal.
    #[clap(skip)]
    pub conf_was_explicit: bool,

    /// Run in the foreground instead of daemonizing.
    #[clap(long)]
    pub foreground: bool,

    /// Debug verbosity. 0 = configured/env default, 1 = debug, 2+ = trace.
    #[clap(long, default_value = "0")]
    pub debug: u8,

    /// Print the built-in default configuration to stdout and exit.
    #[clap(long)]
    pub default_config: bool,
}

impl Cli {
    pub fn parse_with_explicitness() -> Self {
        let mut cli = Self::parse();
        cli.conf_was_explicit = std::env::args()
            .any(|a| a == "--conf" || a == "-c" || a.starts_with("--conf="));
        cli
    }
}
