use std::path::PathBuf;

use crate::catalog::FakeCatalogWrite;
use crate::matching::{Confusion, DetectionEfficiency};

/// Experiment stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExperimentStage {
    Reading,
    StarCatalog,
    Epsf,
    HostGalaxies,
    Injection,
    Detection,
    Matching,
    FalsePositives,
    Writing,
}

impl std::fmt::Display for ExperimentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading images"),
            Self::StarCatalog => write!(f, "Fetching star catalog"),
            Self::Epsf => write!(f, "Building ePSF"),
            Self::HostGalaxies => write!(f, "Finding host galaxies"),
            Self::Injection => write!(f, "Planting fakes"),
            Self::Detection => write!(f, "Detecting sources"),
            Self::Matching => write!(f, "Matching fakes"),
            Self::FalsePositives => write!(f, "Counting false positives"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

impl ExperimentStage {
    pub const ALL: [ExperimentStage; 9] = [
        Self::Reading,
        Self::StarCatalog,
        Self::Epsf,
        Self::HostGalaxies,
        Self::Injection,
        Self::Detection,
        Self::Matching,
        Self::FalsePositives,
        Self::Writing,
    ];
}

/// Thread-safe progress reporting for an experiment.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items in
    /// this stage, if known.
    fn begin_stage(&self, _stage: ExperimentStage, _total_items: Option<usize>) {}

    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Everything a finished experiment produced.
#[derive(Clone, Debug)]
pub struct ExperimentReport {
    /// Stars the ePSF was built from; `None` when it was loaded from cache.
    pub psf_stars: Option<usize>,
    pub psf_degraded: Option<bool>,
    pub epsf_cached: bool,
    pub epsf_converged: bool,
    pub epsf_iterations: usize,
    pub hosts: usize,
    pub planted: usize,
    pub detections: usize,
    pub efficiency: DetectionEfficiency,
    pub confusion: Confusion,
    /// Planted diff, search and template images.
    pub planted_images: Vec<PathBuf>,
    pub fake_catalog: FakeCatalogWrite,
    pub efficiency_table: PathBuf,
}
