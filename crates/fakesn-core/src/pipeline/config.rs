use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::CacheConfig;
use crate::consts::{
    DEFAULT_HOST_ELLIPTICITY_CUT, DEFAULT_HOST_MIN_AREA, DEFAULT_MATCH_SEARCH_RADIUS,
};
use crate::detect::DetectionConfig;
use crate::inject::Footprint;
use crate::psf::{EpsfConfig, PsfStarConfig};

/// A full injection-recovery run over one image triplet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub diff: PathBuf,
    pub search: PathBuf,
    pub template: PathBuf,
    /// Directory receiving planted images and tables.
    pub output: PathBuf,
    /// Shared fake catalog extended with this run's fakes.
    #[serde(default)]
    pub append_catalog: Option<PathBuf>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub psf_stars: PsfStarConfig,
    #[serde(default)]
    pub epsf: EpsfConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub lensing: LensingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

impl ExperimentConfig {
    /// Default settings for the given triplet.
    pub fn new(
        diff: impl Into<PathBuf>,
        search: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            diff: diff.into(),
            search: search.into(),
            template: template.into(),
            output: output.into(),
            append_catalog: None,
            cache: CacheConfig::default(),
            psf_stars: PsfStarConfig::default(),
            epsf: EpsfConfig::default(),
            injection: InjectionConfig::default(),
            lensing: LensingConfig::default(),
            detection: DetectionConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub footprint: Footprint,
}

/// Where fakes go around the host galaxy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensingConfig {
    /// Angles (degrees) counter-clockwise from the host major axis.
    pub angles_deg: Vec<f64>,
    /// Distances (template pixels) from the host centroid.
    pub radii_px: Vec<f64>,
    /// Per-placement flux; empty means the default flux for every placement.
    pub fluxes: Vec<f64>,
    pub ellipticity_cut: f64,
    pub cut_cosmic_rays: bool,
    pub min_host_area: usize,
}

impl Default for LensingConfig {
    fn default() -> Self {
        Self {
            angles_deg: vec![0.0, 90.0, 180.0, 270.0],
            radii_px: vec![10.0, 10.0, 10.0, 10.0],
            fluxes: Vec::new(),
            ellipticity_cut: DEFAULT_HOST_ELLIPTICITY_CUT,
            cut_cosmic_rays: true,
            min_host_area: DEFAULT_HOST_MIN_AREA,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Half-width (pixels) of the box a detection must fall in.
    pub search_radius: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_MATCH_SEARCH_RADIUS,
        }
    }
}
