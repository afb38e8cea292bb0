use clap::{Arg, Command};
use log::info;
use tokio::signal;

mod config;
mod daemon;

use config::Config;
use daemon::Daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("ndnfwd")
        .version("0.1.0")
        .about("NDN forwarding daemon")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/ndnfw/ndnfwd.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter, overriding the configuration file"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/ndnfw/ndnfwd.toml");
    let mut config = Config::load(config_path)?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    if matches.get_flag("print-config") {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    info!("Starting NDN forwarding daemon");
    info!("Config file: {}", config_path);

    let mut daemon = Daemon::new(config);
    daemon.start()?;

    if let Some(fw) = daemon.forwarder() {
        info!("NDN forwarding daemon started with {} faces", fw.faces().len());
    }

    signal::ctrl_c().await?;

    info!("Shutting down NDN forwarding daemon");
    daemon.stop();
    Ok(())
}
