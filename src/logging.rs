//! Logging init: one `tracing_subscriber::fmt` subscriber with an
//! `EnvFilter`.
//!
//! `--debug N` overrides the configured/env default: N=0 falls back to the
//! config file's `behavior.debug_level` (itself defaulting to 0, i.e. the
//! env/`warn` default), N=1 forces `debug`, N>=2 forces `trace`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn directive_for(level: u8) -> Option<&'static str> {
    match level {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

/// `cli_debug` is the `--debug N` flag; `config_debug_level` is
/// `behavior.debug_level` from the loaded config file. The CLI flag wins
/// when given (non-zero); otherwise the config's level applies.
pub fn init(cli_debug: u8, config_debug_level: u8) -> Result<()> {
    let level = if cli_debug != 0 { cli_debug } else { config_debug_level };

    let filter = match directive_for(level) {
        Some(d) => EnvFilter::new(d),
        None => EnvFilter::from_default_env().add_directive("warn".parse()?),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
