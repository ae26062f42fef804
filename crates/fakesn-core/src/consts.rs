/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Maximum number of fakes planted in a single image. The provenance index
/// is written as a fixed-width three digit field, so 999 is the hard cap.
pub const MAX_N_PLANTS: usize = 999;

/// Width of the zero-padded fake index in header keywords (`FK000X`).
pub const FAKE_INDEX_WIDTH: usize = 3;

/// Side length (pixels) of each PSF star cutout and its overlap box.
pub const PSF_STAR_CUTOUT_SIZE: usize = 25;

/// Stars must exceed this catalog signal-to-noise to feed the ePSF.
pub const DEFAULT_PSF_STAR_SN_THRESHOLD: f64 = 100.0;

/// Below this many clean stars the ePSF is flagged as degraded.
pub const MIN_RECOMMENDED_PSF_STARS: usize = 5;

/// Sigma used for the global sigma-clipped background before star extraction.
pub const PSF_STAR_BACKGROUND_SIGMA: f64 = 2.0;

/// Default ePSF oversampling factor.
pub const DEFAULT_EPSF_OVERSAMPLING: usize = 2;

/// Iteration cap for the ePSF builder.
pub const DEFAULT_EPSF_MAX_ITERS: usize = 10;

/// ePSF recentering tolerance (detector pixels).
pub const DEFAULT_EPSF_ACCURACY: f64 = 1e-3;

/// Flux given to each lensed placement when the caller supplies none.
pub const DEFAULT_FAKE_FLUX: f64 = 1.0e4;

/// Placeholder model identifier recorded for every planted fake.
pub const FAKE_MODEL_PLACEHOLDER: &str = "NA";

/// Conversion from fractional flux error to magnitude error (2.5 / ln 10).
/// First-order approximation, valid only for small fractional errors.
pub const MAGERR_COEFFICIENT: f64 = 1.086;

/// Gaussian FWHM = sigma * 2 sqrt(2 ln 2).
pub const GAUSSIAN_SIGMA_TO_FWHM: f64 = 2.354_820_045_030_949_3;

/// Default detection threshold in background standard deviations.
pub const DEFAULT_DETECT_NSIGMA: f64 = 2.0;

/// Default smoothing kernel FWHM (pixels) before segmentation.
pub const DEFAULT_DETECT_KERNEL_FWHM: f64 = 2.0;

/// Default minimum number of connected pixels for a detection.
pub const DEFAULT_DETECT_NPIXELS: usize = 5;

/// Default deblending contrast (flux fraction a branch needs to split off).
pub const DEFAULT_DEBLEND_CONTRAST: f64 = 0.001;

/// Number of multi-threshold levels used for deblending.
pub const DEFAULT_DEBLEND_NLEVELS: usize = 32;

/// Background mesh box size (pixels).
pub const DEFAULT_BACKGROUND_BOX_SIZE: usize = 100;

/// Sigma clipping threshold for the background mesh.
pub const BACKGROUND_CLIP_SIGMA: f64 = 3.0;

/// Sigma clipping iterations for the background mesh.
pub const BACKGROUND_CLIP_ITERS: usize = 5;

/// Sources more elongated than this are host galaxy candidates.
pub const DEFAULT_HOST_ELLIPTICITY_CUT: f64 = 0.35;

/// Host candidates smaller than this (pixels) are treated as cosmic rays.
pub const DEFAULT_HOST_MIN_AREA: usize = 8;

/// Default half-width (pixels) of the box used to match detections to fakes.
pub const DEFAULT_MATCH_SEARCH_RADIUS: f64 = 2.0;

/// Catalog file extension written next to each image.
pub const DEFAULT_CATALOG_EXTENSION: &str = "ecsv";

/// Extension for serialized ePSF models.
pub const EPSF_MODEL_EXTENSION: &str = "json";

/// Default cache suffix for the star catalog.
pub const DEFAULT_STAR_CATALOG_SUFFIX: &str = "GaiaCat";

/// Default cache suffix for the fake source catalog.
pub const DEFAULT_FAKE_CATALOG_SUFFIX: &str = "fakecat";

/// Default cache suffix for the ePSF model.
pub const DEFAULT_EPSF_SUFFIX: &str = "epsf";

/// Suffix of planted images written by the experiment pipeline.
pub const PLANTED_SUFFIX: &str = "planted";

/// Suffix of the per-fake detection efficiency table.
pub const EFFICIENCY_SUFFIX: &str = "efficiency";

/// Suffix of detection catalogs written by the CLI.
pub const DETECTION_SUFFIX: &str = "detections";
