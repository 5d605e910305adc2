use anyhow::Context;
use clap::{Parser, Subcommand};
use sbi_registration::config::{load_config_or_default, Config, ConfigFormat};
use sbi_registration::logging::{init_logging, LoggingConfig};
use sbi_registration::pipeline::{BatchReport, RegistrationPipeline};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sbi-icp")]
#[command(about = "SBI-ICP registration of time-series CT volume stacks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the batch report as JSON
    #[arg(short, long, global = true)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the SBI point cloud of one volume
    Sbi {
        /// Volume directory
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Register one volume onto a reference volume
    Register {
        /// Volume directory to register
        #[arg(short, long)]
        source: PathBuf,

        /// Reference volume directory
        #[arg(short, long)]
        target: PathBuf,
    },

    /// Process every volume in a series directory; the first volume is the reference
    Series {
        /// Directory holding one subdirectory per time point
        #[arg(short = 'R', long)]
        root: PathBuf,

        /// Only build SBI point clouds
        #[arg(long)]
        sbi_only: bool,
    },

    /// Process every series found below a directory
    Recursive {
        #[arg(short = 'R', long)]
        root: PathBuf,

        /// Only build SBI point clouds
        #[arg(long)]
        sbi_only: bool,
    },

    /// Write the effective configuration to a file
    InitConfig {
        #[arg(short, long)]
        output: PathBuf,

        /// Write JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn logging_config(config: &Config, verbose: u8) -> LoggingConfig {
    match verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            global_level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            log_directory: config.logging.log_directory.clone(),
            ..LoggingConfig::development()
        },
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config_or_default(cli.config.as_deref());
    let _logging = init_logging(&logging_config(&config, cli.verbose)).context("Failed to initialize logging")?;

    let pipeline = RegistrationPipeline::new(config);

    let report = match cli.command {
        Commands::Sbi { source } => pipeline.run_single_sbi(&source),
        Commands::Register { source, target } => pipeline.run_single_registration(&source, &target),
        Commands::Series { root, sbi_only } => pipeline.run_series(&root, sbi_only),
        Commands::Recursive { root, sbi_only } => pipeline.run_recursive(&root, sbi_only),
        Commands::InitConfig { output, json } => {
            let format = if json { ConfigFormat::Json } else { ConfigFormat::Toml };
            pipeline.config().save_to_file(&output, format)?;
            tracing::info!(path = %output.display(), "Configuration written");
            return Ok(());
        }
    };

    finish(&report, cli.report.as_deref())
}

fn finish(report: &BatchReport, report_path: Option<&Path>) -> anyhow::Result<()> {
    let summary = report.summary();
    tracing::info!(
        completed = summary.completed,
        skipped = summary.skipped,
        failed = summary.failed,
        "Run finished"
    );

    for failure in report.failures() {
        if let sbi_registration::pipeline::VolumeStatus::Failed { error } = &failure.status {
            tracing::warn!(volume = %failure.volume.display(), stage = failure.stage.as_str(), "{}", error);
        }
    }

    if let Some(path) = report_path {
        report.write_json(path)?;
        tracing::info!(path = %path.display(), "Report written");
    }

    Ok(())
}
