//! wendeploy - manifest-driven content deployment

mod cli;
mod commands;

use cli::{Cli, Commands};
use colored::Colorize;
use commands::deploy::DeployOptions;

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logger, verbose raises the level to debug
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = cli.config.as_deref();

    // Run the appropriate command
    let result = match cli.command {
        Commands::Deploy {
            manifest,
            dest,
            components,
            without,
            os,
            keep_orphans,
        } => commands::run_deploy(DeployOptions {
            manifest,
            dest,
            components,
            without,
            os,
            keep_orphans,
            config: cli.config.clone(),
        }),

        Commands::Build { file, source, out } => commands::run_build(file, source, out),

        Commands::Signature { paths } => commands::run_signature(paths),

        Commands::Clean { dest, yes } => commands::run_clean(dest, yes, config),

        Commands::Status { dest } => commands::run_status(dest, config),

        Commands::Init { force } => commands::run_init(force, config),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
