pub mod config;
mod orchestrator;
mod types;

pub use config::{ExperimentConfig, InjectionConfig, LensingConfig, MatchingConfig};
pub use orchestrator::{run_experiment, run_experiment_reported};
pub use types::{ExperimentReport, ExperimentStage, NoOpReporter, ProgressReporter};
