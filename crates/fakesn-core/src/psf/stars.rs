use std::collections::BTreeSet;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{BoundingBox, StarRecord};
use crate::consts::{
    DEFAULT_PSF_STAR_SN_THRESHOLD, MIN_RECOMMENDED_PSF_STARS, PSF_STAR_BACKGROUND_SIGMA,
    PSF_STAR_CUTOUT_SIZE,
};
use crate::error::{FakeSnError, Result};
use crate::image::Image;
use crate::stats::{sigma_clipped_stats, SigmaClipParams};

/// Selection of isolated, bright, unsaturated stars for ePSF building.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfStarConfig {
    /// Side of the overlap box and of each extracted cutout (pixels).
    pub cutout_size: usize,
    /// Keep stars with catalog S/N strictly above this.
    pub sn_threshold: f64,
    /// Saturation level; falls back to the `SATURATE` keyword.
    pub saturation: Option<f64>,
    /// Maximum linear level; falls back to the `MAXLIN` keyword.
    pub max_linear: Option<f64>,
    /// Clipping sigma for the global background removed before extraction.
    pub background_sigma: f64,
    /// Fewer clean stars than this marks the set as degraded.
    pub min_recommended_stars: usize,
}

impl Default for PsfStarConfig {
    fn default() -> Self {
        Self {
            cutout_size: PSF_STAR_CUTOUT_SIZE,
            sn_threshold: DEFAULT_PSF_STAR_SN_THRESHOLD,
            saturation: None,
            max_linear: None,
            background_sigma: PSF_STAR_BACKGROUND_SIGMA,
            min_recommended_stars: MIN_RECOMMENDED_PSF_STARS,
        }
    }
}

/// A background-subtracted cutout around one star.
#[derive(Clone, Debug)]
pub struct EpsfStar {
    pub star: StarRecord,
    pub cutout: Array2<f64>,
    /// Cutout extent in image pixels.
    pub bbox: BoundingBox,
}

impl EpsfStar {
    /// Star position relative to the cutout origin, (x, y).
    pub fn local_center(&self) -> (f64, f64) {
        (
            self.star.x - self.bbox.ixmin as f64,
            self.star.y - self.bbox.iymin as f64,
        )
    }

    pub fn peak(&self) -> f64 {
        self.cutout
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// How many stars survived each selection stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionCounts {
    pub candidates: usize,
    pub isolated: usize,
    pub above_sn: usize,
    pub extracted: usize,
    pub unsaturated: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CleanStarSet {
    pub stars: Vec<EpsfStar>,
    pub counts: SelectionCounts,
    /// Fewer stars than recommended for a stable ePSF.
    pub degraded: bool,
}

impl CleanStarSet {
    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }
}

/// Indices of every box that intersects at least one other box.
pub fn overlapping(boxes: &[BoundingBox]) -> BTreeSet<usize> {
    let mut excluded = BTreeSet::new();
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].intersects(&boxes[j]) {
                excluded.insert(i);
                excluded.insert(j);
            }
        }
    }
    excluded
}

/// Keep the items whose index is not in `excluded`.
fn without<T>(items: Vec<T>, excluded: &BTreeSet<usize>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| (!excluded.contains(&i)).then_some(item))
        .collect()
}

/// Select clean PSF stars from a reference catalog.
///
/// Stars are placed on `image` through its WCS. Any star whose box overlaps
/// another is dropped (both members of each pair), then faint stars, then
/// stars whose cutout leaves the frame or overlaps another cutout, then
/// saturated or non-linear stars. An empty result is returned, not an error.
pub fn extract_psf_stars(
    image: &Image,
    stars: &[StarRecord],
    config: &PsfStarConfig,
) -> Result<CleanStarSet> {
    if config.cutout_size == 0 {
        return Err(FakeSnError::InvalidInput("cutout_size must be positive".into()));
    }
    let size = config.cutout_size;
    let mut counts = SelectionCounts {
        candidates: stars.len(),
        ..Default::default()
    };

    let placed: Vec<StarRecord> = stars
        .iter()
        .cloned()
        .map(|mut s| {
            s.relocate(image, size);
            s
        })
        .collect();

    let boxes: Vec<BoundingBox> = placed.iter().map(|s| s.bbox).collect();
    let isolated = without(placed, &overlapping(&boxes));
    counts.isolated = isolated.len();

    let bright: Vec<StarRecord> = isolated
        .into_iter()
        .filter(|s| s.signal_to_noise > config.sn_threshold)
        .collect();
    counts.above_sn = bright.len();

    let background = sigma_clipped_stats(
        image.data.iter().copied(),
        &SigmaClipParams {
            sigma: config.background_sigma,
            ..Default::default()
        },
    );
    let data = &image.data - background.median;

    let (width, height) = (image.width(), image.height());
    let half = size as f64 / 2.0;
    let mut cutouts: Vec<EpsfStar> = Vec::with_capacity(bright.len());
    for star in bright {
        let ixmin = (star.x - half).round() as i64;
        let iymin = (star.y - half).round() as i64;
        let bbox = BoundingBox::new(ixmin, ixmin + size as i64, iymin, iymin + size as i64);
        if !bbox.within(width, height) {
            debug!(x = star.x, y = star.y, "PSF star cutout leaves the frame");
            continue;
        }
        let cutout = data
            .slice(s![
                bbox.iymin as usize..bbox.iymax as usize,
                bbox.ixmin as usize..bbox.ixmax as usize
            ])
            .to_owned();
        cutouts.push(EpsfStar { star, cutout, bbox });
    }

    let boxes: Vec<BoundingBox> = cutouts.iter().map(|c| c.bbox).collect();
    let extracted = without(cutouts, &overlapping(&boxes));
    counts.extracted = extracted.len();

    let saturation = config.saturation.or_else(|| image.header.get_f64("SATURATE"));
    let max_linear = config.max_linear.or_else(|| image.header.get_f64("MAXLIN"));
    let clean: Vec<EpsfStar> = extracted
        .into_iter()
        .filter(|s| {
            let peak = s.peak();
            if saturation.is_some_and(|level| peak > level) {
                debug!(x = s.star.x, y = s.star.y, peak, "dropping saturated PSF star");
                false
            } else if max_linear.is_some_and(|level| peak > level) {
                debug!(x = s.star.x, y = s.star.y, peak, "dropping non-linear PSF star");
                false
            } else {
                true
            }
        })
        .collect();
    counts.unsaturated = clean.len();

    info!(
        candidates = counts.candidates,
        isolated = counts.isolated,
        above_sn = counts.above_sn,
        extracted = counts.extracted,
        clean = counts.unsaturated,
        background = background.median,
        "PSF star selection"
    );

    let degraded = clean.len() < config.min_recommended_stars;
    if clean.is_empty() {
        warn!("No PSF stars survived selection");
    } else if degraded {
        warn!(
            stars = clean.len(),
            recommended = config.min_recommended_stars,
            "Few PSF stars, ePSF may be poorly constrained"
        );
    }

    Ok(CleanStarSet {
        stars: clean,
        counts,
        degraded,
    })
}
