use std::fs;
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::PsfModel;
use super::stars::CleanStarSet;
use crate::catalog::CacheConfig;
use crate::consts::{
    DEFAULT_EPSF_ACCURACY, DEFAULT_EPSF_MAX_ITERS, DEFAULT_EPSF_OVERSAMPLING,
    EPSF_MODEL_EXTENSION,
};
use crate::error::{FakeSnError, Result};
use crate::image::Image;
use crate::stats::{sigma_clipped_stats, SigmaClipParams};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsfConfig {
    pub oversampling: usize,
    pub max_iters: usize,
    /// Stop once every star centre moves less than this (pixels).
    pub accuracy: f64,
    /// Clipping applied to the samples stacked into each grid cell.
    pub clip: SigmaClipParams,
}

impl Default for EpsfConfig {
    fn default() -> Self {
        Self {
            oversampling: DEFAULT_EPSF_OVERSAMPLING,
            max_iters: DEFAULT_EPSF_MAX_ITERS,
            accuracy: DEFAULT_EPSF_ACCURACY,
            clip: SigmaClipParams {
                sigma: 3.0,
                max_iters: 10,
            },
        }
    }
}

/// A star as fitted against the final model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedStar {
    /// Fitted centre in image pixels.
    pub x: f64,
    pub y: f64,
    pub flux: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsfFit {
    pub model: PsfModel,
    pub fitted_stars: Vec<FittedStar>,
    pub iterations: usize,
    pub converged: bool,
}

/// Builds a PSF model from a set of clean star cutouts.
pub trait PsfFitter {
    fn fit(&self, stars: &CleanStarSet) -> Result<EpsfFit>;
}

/// Stacks normalised star cutouts onto an oversampled grid and alternates
/// between rebuilding the model and refitting star centres and fluxes.
pub struct IterativeEpsfBuilder {
    pub config: EpsfConfig,
}

impl IterativeEpsfBuilder {
    pub fn new(config: EpsfConfig) -> Self {
        Self { config }
    }
}

impl PsfFitter for IterativeEpsfBuilder {
    fn fit(&self, stars: &CleanStarSet) -> Result<EpsfFit> {
        if stars.is_empty() {
            return Err(FakeSnError::EmptyStarSet);
        }
        let os = self.config.oversampling.max(1);

        let rows = stars.stars.iter().map(|s| s.cutout.nrows()).max().unwrap_or(0);
        let cols = stars.stars.iter().map(|s| s.cutout.ncols()).max().unwrap_or(0);
        let grid_shape = (odd(rows * os), odd(cols * os));

        // Initial centres from the cutout centroids; catalog positions can
        // carry a common astrometric offset that would bias the model centre.
        let mut centers: Vec<(f64, f64)> = stars
            .stars
            .iter()
            .map(|s| centroid(s.cutout.view()).unwrap_or_else(|| s.local_center()))
            .collect();
        let mut fluxes: Vec<f64> = stars
            .stars
            .iter()
            .map(|s| s.cutout.iter().filter(|v| v.is_finite()).sum::<f64>())
            .collect();

        let mut model = None;
        let mut iterations = 0;
        let mut converged = false;

        for iter in 1..=self.config.max_iters.max(1) {
            iterations = iter;
            let grid = stack_residuals(stars, &centers, &fluxes, grid_shape, os, &self.config.clip);
            let current = PsfModel::new(grid, os)?;

            let mut max_shift: f64 = 0.0;
            for (i, star) in stars.stars.iter().enumerate() {
                let (cx, cy) = centers[i];
                let rendered = Array2::from_shape_fn(star.cutout.dim(), |(r, c)| {
                    current.evaluate(c as f64 - cx, r as f64 - cy)
                });

                let mut dm = 0.0;
                let mut mm = 0.0;
                for (d, m) in star.cutout.iter().zip(rendered.iter()) {
                    if d.is_finite() {
                        dm += d * m;
                        mm += m * m;
                    }
                }
                if mm > 0.0 && dm > 0.0 {
                    fluxes[i] = dm / mm;
                }

                if let (Some(data_c), Some(model_c)) =
                    (centroid(star.cutout.view()), centroid(rendered.view()))
                {
                    let shift = (data_c.0 - model_c.0, data_c.1 - model_c.1);
                    centers[i] = (cx + shift.0, cy + shift.1);
                    max_shift = max_shift.max(shift.0.abs()).max(shift.1.abs());
                }
            }

            debug!(iteration = iter, max_shift, "ePSF iteration");
            model = Some(current);
            if max_shift < self.config.accuracy {
                converged = true;
                break;
            }
        }

        let model = model.ok_or(FakeSnError::EmptyStarSet)?;
        if !converged {
            warn!(
                iterations,
                accuracy = self.config.accuracy,
                "ePSF did not converge, using last iteration"
            );
        }

        let fitted_stars = stars
            .stars
            .iter()
            .zip(centers.iter().zip(fluxes.iter()))
            .map(|(s, (&(cx, cy), &flux))| FittedStar {
                x: s.bbox.ixmin as f64 + cx,
                y: s.bbox.iymin as f64 + cy,
                flux,
            })
            .collect();

        info!(
            stars = stars.len(),
            iterations,
            converged,
            shape = ?model.data.dim(),
            oversampling = os,
            "Built ePSF"
        );

        Ok(EpsfFit {
            model,
            fitted_stars,
            iterations,
            converged,
        })
    }
}

/// Build an ePSF with the iterative builder.
pub fn build_epsf(stars: &CleanStarSet, config: &EpsfConfig) -> Result<EpsfFit> {
    IterativeEpsfBuilder::new(config.clone()).fit(stars)
}

/// Load `<root>_<epsf_suffix>.json` next to `image` when present and not
/// overwriting; otherwise select stars with `stars`, fit, and save.
pub fn build_epsf_cached<F>(
    image: &Image,
    fitter: &dyn PsfFitter,
    cache: &CacheConfig,
    stars: F,
) -> Result<EpsfFit>
where
    F: FnOnce() -> Result<CleanStarSet>,
{
    let path = if cache.enabled {
        Some(image.sidecar_path(&cache.epsf_suffix, EPSF_MODEL_EXTENSION)?)
    } else {
        None
    };

    if let Some(path) = path.as_deref() {
        if path.is_file() && !cache.overwrite {
            info!(path = %path.display(), "Loading cached ePSF");
            return load_epsf(path);
        }
    }

    let fit = fitter.fit(&stars()?)?;
    if let Some(path) = path.as_deref() {
        save_epsf(path, &fit)?;
        info!(path = %path.display(), "Saved ePSF");
    }
    Ok(fit)
}

pub fn save_epsf(path: &Path, fit: &EpsfFit) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(fit)?)?;
    Ok(())
}

pub fn load_epsf(path: &Path) -> Result<EpsfFit> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Sigma-clipped median of flux-normalised samples per grid cell. Cells no
/// star sampled are filled from their neighbours.
fn stack_residuals(
    stars: &CleanStarSet,
    centers: &[(f64, f64)],
    fluxes: &[f64],
    shape: (usize, usize),
    os: usize,
    clip: &SigmaClipParams,
) -> Array2<f64> {
    let (rows, cols) = shape;
    let gcx = (cols as f64 - 1.0) / 2.0;
    let gcy = (rows as f64 - 1.0) / 2.0;
    let osf = os as f64;

    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); rows * cols];
    for (i, star) in stars.stars.iter().enumerate() {
        let flux = fluxes[i];
        if !(flux.is_finite() && flux > 0.0) {
            continue;
        }
        let (cx, cy) = centers[i];
        for ((r, c), &v) in star.cutout.indexed_iter() {
            if !v.is_finite() {
                continue;
            }
            let u = (gcx + (c as f64 - cx) * osf).round();
            let w = (gcy + (r as f64 - cy) * osf).round();
            if u < 0.0 || w < 0.0 || u >= cols as f64 || w >= rows as f64 {
                continue;
            }
            buckets[w as usize * cols + u as usize].push(v / flux);
        }
    }

    let mut grid = Array2::from_shape_fn(shape, |(r, c)| {
        let bucket = &buckets[r * cols + c];
        if bucket.is_empty() {
            f64::NAN
        } else {
            sigma_clipped_stats(bucket.iter().copied(), clip).median
        }
    });
    fill_gaps(&mut grid);
    grid
}

/// Replace NaN cells with the mean of their finite 8-neighbours, repeating
/// until no fillable gap remains. Isolated leftovers become zero.
fn fill_gaps(grid: &mut Array2<f64>) {
    let (rows, cols) = grid.dim();
    loop {
        let mut filled = Vec::new();
        for ((r, c), v) in grid.indexed_iter() {
            if v.is_finite() {
                continue;
            }
            let mut sum = 0.0;
            let mut n = 0;
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let rr = r as i64 + dr;
                    let cc = c as i64 + dc;
                    if (dr, dc) == (0, 0) || rr < 0 || cc < 0 || rr >= rows as i64 || cc >= cols as i64 {
                        continue;
                    }
                    let nv = grid[[rr as usize, cc as usize]];
                    if nv.is_finite() {
                        sum += nv;
                        n += 1;
                    }
                }
            }
            if n > 0 {
                filled.push(((r, c), sum / n as f64));
            }
        }
        if filled.is_empty() {
            break;
        }
        for (idx, v) in filled {
            grid[idx] = v;
        }
    }
    grid.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
}

/// Centroid of the positive finite values, (x, y).
fn centroid(data: ArrayView2<f64>) -> Option<(f64, f64)> {
    let mut sum = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for ((r, c), &v) in data.indexed_iter() {
        if v.is_finite() && v > 0.0 {
            sum += v;
            sx += v * c as f64;
            sy += v * r as f64;
        }
    }
    (sum > 0.0).then(|| (sx / sum, sy / sum))
}
