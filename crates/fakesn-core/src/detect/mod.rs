pub mod background;
pub mod deblend;
pub mod properties;
pub mod segmentation;
pub mod smooth;

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Zip;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{
    BACKGROUND_CLIP_ITERS, BACKGROUND_CLIP_SIGMA, DEFAULT_BACKGROUND_BOX_SIZE,
    DEFAULT_DEBLEND_CONTRAST, DEFAULT_DEBLEND_NLEVELS, DEFAULT_DETECT_KERNEL_FWHM,
    DEFAULT_DETECT_NPIXELS, DEFAULT_DETECT_NSIGMA,
};
use crate::error::Result;
use crate::image::Image;
use crate::io::ecsv;
use crate::stats::SigmaClipParams;

pub use background::{estimate_background, BackgroundMap};
pub use deblend::{deblend_segment, DeblendParams};
pub use properties::{measure_source, DetectionRecord};
pub use segmentation::{label_regions, Segment, SegmentationMap};
pub use smooth::gaussian_smooth;

const META_KEY: &str = "detect_params";

/// Threshold detection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detection threshold above background, in units of background RMS.
    pub nsigma: f64,
    /// FWHM (pixels) of the Gaussian smoothing kernel.
    pub kernel_fwhm: f64,
    /// Minimum connected pixels per source.
    pub npixels: usize,
    pub deblend: bool,
    /// Flux fraction a branch needs to count as its own source.
    pub contrast: f64,
    pub nlevels: usize,
    /// Background mesh tile size (pixels).
    pub box_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            nsigma: DEFAULT_DETECT_NSIGMA,
            kernel_fwhm: DEFAULT_DETECT_KERNEL_FWHM,
            npixels: DEFAULT_DETECT_NPIXELS,
            deblend: false,
            contrast: DEFAULT_DEBLEND_CONTRAST,
            nlevels: DEFAULT_DEBLEND_NLEVELS,
            box_size: DEFAULT_BACKGROUND_BOX_SIZE,
        }
    }
}

/// Sources found on one image together with the parameters used.
#[derive(Clone, Debug)]
pub struct DetectionCatalog {
    pub sources: Vec<DetectionRecord>,
    pub config: DetectionConfig,
}

impl DetectionCatalog {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.sources.iter()
    }

    /// Write as ECSV with the detection parameters under `meta.detect_params`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut meta = BTreeMap::new();
        meta.insert(META_KEY.to_string(), serde_yml::to_value(&self.config)?);
        ecsv::write_table(path, &self.sources, &meta)
    }

    /// Read a catalog written by [`DetectionCatalog::write`]. Missing
    /// parameters fall back to defaults.
    pub fn read(path: &Path) -> Result<Self> {
        let table = ecsv::read_table::<DetectionRecord>(path)?;
        let config = match table.meta.get(META_KEY) {
            Some(value) => serde_yml::from_value(value.clone())?,
            None => DetectionConfig::default(),
        };
        Ok(Self {
            sources: table.rows,
            config,
        })
    }
}

/// Find sources above `background + nsigma * rms`.
///
/// The image is smoothed before thresholding; source properties are
/// measured on the unsmoothed background-subtracted pixels.
pub fn detect_sources(image: &Image, config: &DetectionConfig) -> Result<DetectionCatalog> {
    let clip = SigmaClipParams {
        sigma: BACKGROUND_CLIP_SIGMA,
        max_iters: BACKGROUND_CLIP_ITERS,
    };
    let bkg = estimate_background(&image.data, config.box_size, &clip);
    debug!(
        background = bkg.background_median,
        rms = bkg.rms_median,
        "Estimated background"
    );

    let smoothed = gaussian_smooth(&image.data, config.kernel_fwhm);
    let mut mask = ndarray::Array2::from_elem(image.data.dim(), false);
    Zip::from(&mut mask)
        .and(&smoothed)
        .and(&bkg.background)
        .and(&bkg.rms)
        .for_each(|m, &v, &b, &r| *m = v > b + config.nsigma * r);

    let segmap = label_regions(&mask, config.npixels.max(1));
    let mut subtracted = image.clone();
    subtracted.subtract_background(&bkg.background)?;

    let params = DeblendParams {
        npixels: config.npixels.max(1),
        nlevels: config.nlevels,
        contrast: config.contrast,
    };
    let mut sources = Vec::with_capacity(segmap.segments.len());
    let mut split = 0usize;
    for segment in &segmap.segments {
        let children = if config.deblend {
            deblend_segment(&smoothed, &segmap, segment, &params)
        } else {
            vec![segmap.pixels(segment)]
        };
        if children.len() > 1 {
            split += 1;
        }
        for pixels in children {
            let label = sources.len() as u32 + 1;
            sources.push(measure_source(&subtracted.data, label, &pixels));
        }
    }

    info!(
        segments = segmap.segments.len(),
        sources = sources.len(),
        deblended = split,
        nsigma = config.nsigma,
        "Detected sources"
    );
    Ok(DetectionCatalog {
        sources,
        config: config.clone(),
    })
}

/// Elongated sources, taken as host galaxy candidates. With
/// `cut_cosmic_rays`, candidates smaller than `min_area` pixels are dropped.
pub fn detect_host_galaxies(
    catalog: &DetectionCatalog,
    ellipticity_cut: f64,
    cut_cosmic_rays: bool,
    min_area: usize,
) -> Vec<DetectionRecord> {
    let hosts: Vec<DetectionRecord> = catalog
        .iter()
        .filter(|s| s.ellipticity > ellipticity_cut)
        .filter(|s| !cut_cosmic_rays || s.area >= min_area)
        .cloned()
        .collect();
    info!(
        candidates = catalog.len(),
        hosts = hosts.len(),
        ellipticity_cut,
        "Selected host galaxies"
    );
    hosts
}
