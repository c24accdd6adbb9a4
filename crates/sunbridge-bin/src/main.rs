// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! sunbridge gateway entry point.

use std::process::ExitCode;

use clap::Parser;

use sunbridge_bin::cli::{Cli, Commands};
use sunbridge_bin::commands;
use sunbridge_bin::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    let result = match &cli.command {
        Some(Commands::Run(args)) => commands::run::execute(&cli.config, args).await,
        Some(Commands::Scan(args)) => commands::scan::execute(&cli.config, args).await,
        Some(Commands::Validate(args)) => commands::validate::execute(&cli.config, args).await,
        Some(Commands::Version) => {
            commands::version::execute();
            Ok(())
        }
        None => commands::run::execute(&cli.config, &Default::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sunbridge failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
