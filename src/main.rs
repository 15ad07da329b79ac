use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use record_linkage::algorithm::linkage::Linker;
use record_linkage::config::RunConfig;
use record_linkage::{output, reader, standard_config};

#[derive(Parser)]
#[command(name = "record-linkage")]
#[command(about = "Deterministic multi-pass record linkage and deduplication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link or deduplicate the configured tables and write the results
    Run {
        /// Run configuration (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Directory for result files, overriding the configuration
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,

        /// Worker threads, overriding the configuration
        #[arg(long, short = 't', env = "LINKAGE_THREADS")]
        threads: Option<usize>,

        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Validate a run configuration against its input tables without linking
    Check {
        /// Run configuration (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
    /// Print the standard five-pass strategy as JSON
    Preset,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Commands::Run {
            config,
            output_dir,
            threads,
            no_progress,
        } => run(&config, output_dir, threads, no_progress),
        Commands::Check { config } => check(&config),
        Commands::Preset => {
            println!("{}", serde_json::to_string_pretty(&standard_config())?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_file(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn run(path: &Path, output_dir: Option<PathBuf>, threads: Option<usize>, no_progress: bool) -> Result<()> {
    let start = Instant::now();
    let mut config = load_config(path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if threads.is_some() {
        config.linkage.parallel.num_threads = threads;
    }
    config.linkage.show_progress = !no_progress;
    info!("{}", config.linkage);

    let (left, right) = reader::load_tables(&config.input).context("Failed to load input tables")?;
    let result = Linker::new(config.linkage.clone())
        .run(&left, right.as_ref())
        .context("Linkage failed")?;

    let written = output::write_results(&config.output_dir, &result, &config.linkage)
        .with_context(|| format!("Failed to write results to {}", config.output_dir.display()))?;
    info!(
        "Wrote {} files to {} in {:.2?}",
        written.len(),
        config.output_dir.display(),
        start.elapsed()
    );
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let (left, right) = reader::load_tables(&config.input).context("Failed to load input tables")?;
    let linker = Linker::new(config.linkage);
    let plan = linker
        .plan(&left, right.as_ref())
        .context("Configuration does not fit the input tables")?;

    for pass in plan.passes() {
        info!(
            "Pass {} ({}): {} comparisons [{}]",
            pass.id,
            pass.label,
            pass.comparisons.len(),
            pass.comparison_names.join(", ")
        );
    }
    info!("Configuration is valid for {} passes", plan.passes().len());
    Ok(())
}
