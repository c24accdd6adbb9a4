// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! Subcommands:
//!
//! - `run`: start the gateway (default when no subcommand is given)
//! - `scan`: discover nearby BT modules
//! - `validate`: check a configuration file without starting
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// sunbridge - solar telemetry gateway
///
/// Polls solar charge controllers, smart batteries, and inverters over
/// Bluetooth LE and republishes their telemetry to an MQTT broker with
/// auto-discovery metadata.
#[derive(Parser, Debug)]
#[command(
    name = "sunbridge",
    author = "Sylvex <contact@sylvex.io>",
    version = sunbridge_core::VERSION,
    about = "BLE-to-MQTT gateway for solar power hardware",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "sunbridge.yaml",
        env = "SUNBRIDGE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "SUNBRIDGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format
    #[arg(long, default_value = "text", env = "SUNBRIDGE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text output.
    Text,
    /// Structured JSON for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// This is the default command when no subcommand is specified.
    /// Connects the configured BT modules, starts one poller per device,
    /// and forwards readings to the broker until terminated.
    Run(RunArgs),

    /// Scan for nearby BT modules
    ///
    /// Lists discovered peripherals with address and signal strength so
    /// their MAC addresses can be copied into the configuration file.
    Scan(ScanArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without touching the radio
    /// or the broker. Useful before deployment.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {}

/// Arguments for the `scan` command.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Show all BLE devices, not only vendor BT modules
    #[arg(short, long)]
    pub all: bool,

    /// Scan duration in seconds
    #[arg(short, long, default_value_t = 15)]
    pub duration: u64,

    /// Bluetooth adapter to scan with (defaults to the configured one)
    #[arg(long)]
    pub adapter: Option<String>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Print the parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::parse_from(["sunbridge"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("sunbridge.yaml"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_scan_args() {
        let cli = Cli::parse_from(["sunbridge", "scan", "--all", "--duration", "30"]);
        match cli.command {
            Some(Commands::Scan(args)) => {
                assert!(args.all);
                assert_eq!(args.duration, 30);
                assert!(args.adapter.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["sunbridge", "validate", "--config", "/etc/sunbridge.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/sunbridge.yaml"));
    }

    #[test]
    fn test_cli_debug_asserts() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
