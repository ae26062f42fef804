use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::catalog::GaiaCsvSource;
use fakesn_core::pipeline::{run_experiment_reported, ExperimentConfig};

use crate::progress::BarReporter;
use crate::summary::{print_experiment_summary, print_report};

#[derive(Args)]
pub struct RunArgs {
    /// Experiment config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Difference image
    #[arg(long, required_unless_present = "config")]
    pub diff: Option<PathBuf>,

    /// Search image
    #[arg(long, required_unless_present = "config")]
    pub search: Option<PathBuf>,

    /// Template image
    #[arg(long, required_unless_present = "config")]
    pub template: Option<PathBuf>,

    /// Gaia archive CSV export covering the field
    #[arg(long)]
    pub gaia: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "fakesn-out")]
    pub output: PathBuf,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid experiment config")?
    } else {
        build_config_from_args(args)?
    };

    print_experiment_summary(&config);

    let reporter = Arc::new(BarReporter::new()?);
    let source = GaiaCsvSource::new(&args.gaia);
    let report = run_experiment_reported(&config, &source, reporter.clone())?;
    reporter.finish();

    print_report(&report);
    Ok(())
}

fn build_config_from_args(args: &RunArgs) -> Result<ExperimentConfig> {
    let (Some(diff), Some(search), Some(template)) = (&args.diff, &args.search, &args.template)
    else {
        anyhow::bail!("--diff, --search and --template are required without --config");
    };
    Ok(ExperimentConfig::new(
        diff.clone(),
        search.clone(),
        template.clone(),
        args.output.clone(),
    ))
}
