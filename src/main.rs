// src/main.rs

//! The main entry point for the PagePulse server application.

use anyhow::Result;
use pagepulse::config::Config;
use pagepulse::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("PagePulse version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via --config; otherwise it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
        if let Err(e) = config.validate() {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    }

    // Initial log level comes from RUST_LOG, falling back to the config.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = server::run(config, Arc::new(reload_handle)).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
