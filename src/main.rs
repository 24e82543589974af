//! gmond — node-level metric daemon.
//!
//! Samples local host metrics, gossips them to a cluster over UDP, and
//! serves the aggregated cluster-wide view to TCP clients as an XML
//! snapshot. Run `gmond --help` for usage.

use anyhow::Result;

mod cli;
mod config_load;
mod logging;

use cli::Cli;
use gmond_core::{ChannelSet, Runtime};

fn main() -> Result<()> {
    let cli = Cli::parse_with_explicitness();

    if cli.default_config {
        let example = gmond_core::GmondConfig::default_example();
        print!("{}", toml::to_string_pretty(&example)?);
        return Ok(());
    }

    let config = config_load::load(&cli.conf, cli.conf_was_explicit)?;

    logging::init(cli.debug, config.behavior.debug_level)?;

    if let Err(e) = config.behavior.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    gmond_core::privilege::ignore_sigpipe();
    gmond_core::privilege::drop_privileges(config.behavior.setuid, &config.behavior.user)
        .map_err(|e| anyhow::anyhow!(e))?;
    gmond_core::privilege::daemonize(config.behavior.daemonize && !cli.foreground)
        .map_err(|e| anyhow::anyhow!(e))?;

    let channels = ChannelSet::build(&config).map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        udp_ingress = config.udp_recv_channel.len(),
        udp_egress = config.udp_send_channel.len(),
        tcp_accept = config.tcp_accept_channel.len(),
        groups = config.collection_group.len(),
        "gmond starting"
    );

    let mut runtime = Runtime::new(config, channels);
    runtime.run();
}
