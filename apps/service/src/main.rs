mod config;
mod monitoring;
mod objects;
mod orchestrator;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Host and service monitoring engine
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Object definitions, overriding `paths.objects` from the configuration
    #[arg(short, long)]
    objects: Option<PathBuf>,

    /// Check the object definitions and exit
    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logger::init(&config.logging.level, config.logging.log_format());

    match run(cli, config) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, mut config: Config) -> Result<ExitCode> {
    if let Some(objects) = cli.objects {
        config.paths.objects = objects;
    }
    let definitions = objects::load_definitions(&config.paths.objects)?;

    if cli.verify {
        let (registry, errors) = objects::build_registry(definitions, &config.engine);
        for error in &errors {
            println!("Error: {error}");
        }
        println!("Checked {}: {} entities, {} errors", config.paths.objects.display(), registry.len(), errors.len());
        return Ok(if errors.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    info!("{}", config);
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(Orchestrator::start(config, definitions))?;
    Ok(ExitCode::SUCCESS)
}
