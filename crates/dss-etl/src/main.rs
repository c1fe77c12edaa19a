//! dss-etl - Main entry point

use clap::Parser;
use dss_etl::{Cli, Commands, ConfigCommand};
use dss_etl_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("dss-etl".to_string())
        .build();

    // Environment variables take precedence over the flag
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {}", e);
            log_config
        },
    };

    // The CLI works without logging, so a failed init is not fatal
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> dss_etl::Result<()> {
    let config = cli.resolve_config()?;

    match &cli.command {
        Commands::Extract(args) => dss_etl::commands::extract::run(config, args).await,

        Commands::Materialize { fqid } => dss_etl::commands::materialize::run(config, fqid).await,

        Commands::Status => dss_etl::commands::status::run(&config).await,

        Commands::Clean { all } => dss_etl::commands::clean::run(&config, *all).await,

        Commands::Config { command } => match command {
            ConfigCommand::Show => dss_etl::commands::config::show(&config).await,
        },
    }
}
