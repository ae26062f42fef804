mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fakesn", about = "Fake supernova injection and recovery")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS image metadata and planted fakes
    Info(commands::info::InfoArgs),
    /// Fetch reference stars and select PSF stars
    Stars(commands::stars::StarsArgs),
    /// Build an ePSF model from reference stars
    Epsf(commands::epsf::EpsfArgs),
    /// Plant fakes into an image
    Plant(commands::plant::PlantArgs),
    /// Detect sources in an image
    Detect(commands::detect::DetectArgs),
    /// Match detections against planted fakes
    Efficiency(commands::efficiency::EfficiencyArgs),
    /// Cut matching postage stamps from clean and planted triplets
    Stamps(commands::stamps::StampsArgs),
    /// Run a full injection-recovery experiment on a triplet
    Run(commands::run::RunArgs),
    /// Print or save the default experiment config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Stars(args) => commands::stars::run(args),
        Commands::Epsf(args) => commands::epsf::run(args),
        Commands::Plant(args) => commands::plant::run(args),
        Commands::Detect(args) => commands::detect::run(args),
        Commands::Efficiency(args) => commands::efficiency::run(args),
        Commands::Stamps(args) => commands::stamps::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
