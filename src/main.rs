//! CLI Entry Point for mxii-valve
//!
//! Query or move an MX Series II selector valve from the command line.
//!
//! # Usage
//!
//! Read the current port:
//! ```bash
//! mxii-valve --device /dev/ttyUSB0 port
//! ```
//!
//! Move to port 4 on a 6-port valve:
//! ```bash
//! mxii-valve --device /dev/ttyUSB0 --ports 6 move 4
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mxii_valve::config::{ValveConfig, DEFAULT_CONFIG_PATH};
use mxii_valve::hardware::mxii::MxiiValve;
use mxii_valve::logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mxii-valve")]
#[command(about = "Control an MX Series II rotary selector valve", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial device, overrides [serial] port
    #[arg(long)]
    device: Option<String>,

    /// Number of valve ports, overrides [valve] ports
    #[arg(long)]
    ports: Option<u8>,

    /// Log level, overrides [application] log_level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the port the valve is currently at
    Port,

    /// Move the valve to a port and wait until it confirms
    Move {
        /// Target port (1-15)
        port: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ValveConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(device) = cli.device {
        config.serial.port = device;
    }
    if let Some(ports) = cli.ports {
        config.valve.ports = ports;
    }
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate().context("Invalid configuration")?;

    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let mut valve = MxiiValve::from_config(&config)
        .with_context(|| format!("Failed to open valve on {}", config.serial.port))?;

    match cli.command {
        Commands::Port => {
            let port = valve
                .query_current_port()
                .context("Failed to read valve position")?;
            println!("{}", port);
        }
        Commands::Move { port } => {
            let report = valve
                .move_to(port)
                .with_context(|| format!("Failed to move valve to port {}", port))?;
            info!(
                port = %report.port,
                change_commands = report.change_commands,
                polls = report.polls,
                "Move confirmed"
            );
            println!("{}", report.port);
        }
    }

    Ok(())
}
