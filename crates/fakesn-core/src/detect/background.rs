//! Spatially varying sky background from a mesh of sigma-clipped tiles.

use ndarray::Array2;
use rayon::prelude::*;

use crate::stats::{median_mut, sigma_clipped_stats, SigmaClipParams};

/// Per-pixel background level and noise.
#[derive(Clone, Debug)]
pub struct BackgroundMap {
    pub background: Array2<f64>,
    pub rms: Array2<f64>,
    /// Median of the tile backgrounds.
    pub background_median: f64,
    /// Median of the tile noise estimates.
    pub rms_median: f64,
}

#[derive(Clone, Copy, Default)]
struct TileStats {
    median: f64,
    std: f64,
}

/// Estimate the background on `box_size` square tiles.
///
/// Each tile gets a sigma-clipped median and standard deviation; the mesh
/// is median filtered over 3x3 tiles and bilinearly interpolated between
/// tile centres (clamped beyond the outermost centres).
pub fn estimate_background(
    data: &Array2<f64>,
    box_size: usize,
    clip: &SigmaClipParams,
) -> BackgroundMap {
    let (height, width) = data.dim();
    let box_size = box_size.max(1);
    let tiles_x = width.div_ceil(box_size).max(1);
    let tiles_y = height.div_ceil(box_size).max(1);

    let tiles: Vec<TileStats> = (0..tiles_x * tiles_y)
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(box_size * box_size),
            |values: &mut Vec<f64>, idx| {
                let ty = idx / tiles_x;
                let tx = idx % tiles_x;
                let (y0, y1) = (ty * box_size, ((ty + 1) * box_size).min(height));
                let (x0, x1) = (tx * box_size, ((tx + 1) * box_size).min(width));

                values.clear();
                for y in y0..y1 {
                    for x in x0..x1 {
                        values.push(data[[y, x]]);
                    }
                }
                let stats = sigma_clipped_stats(values.iter().copied(), clip);
                TileStats {
                    median: stats.median,
                    std: stats.std,
                }
            },
        )
        .collect();

    let tiles = median_filter_mesh(&tiles, tiles_x, tiles_y);

    let centers_x: Vec<f64> = (0..tiles_x)
        .map(|tx| tile_center(tx, box_size, width))
        .collect();
    let centers_y: Vec<f64> = (0..tiles_y)
        .map(|ty| tile_center(ty, box_size, height))
        .collect();

    let mut background = Array2::zeros((height, width));
    let mut rms = Array2::zeros((height, width));
    for y in 0..height {
        let (ty0, ty1, wy) = bracket(y as f64, &centers_y);
        for x in 0..width {
            let (tx0, tx1, wx) = bracket(x as f64, &centers_x);
            let at = |tx: usize, ty: usize| tiles[ty * tiles_x + tx];
            let (a, b, c, d) = (at(tx0, ty0), at(tx1, ty0), at(tx0, ty1), at(tx1, ty1));
            let lerp = |f: fn(&TileStats) -> f64| {
                let top = f(&a) * (1.0 - wx) + f(&b) * wx;
                let bottom = f(&c) * (1.0 - wx) + f(&d) * wx;
                top * (1.0 - wy) + bottom * wy
            };
            background[[y, x]] = lerp(|t| t.median);
            rms[[y, x]] = lerp(|t| t.std);
        }
    }

    let mut medians: Vec<f64> = tiles.iter().map(|t| t.median).collect();
    let mut stds: Vec<f64> = tiles.iter().map(|t| t.std).collect();
    BackgroundMap {
        background,
        rms,
        background_median: median_mut(&mut medians),
        rms_median: median_mut(&mut stds),
    }
}

fn tile_center(index: usize, box_size: usize, limit: usize) -> f64 {
    let start = index * box_size;
    let end = ((index + 1) * box_size).min(limit);
    (start + end) as f64 / 2.0 - 0.5
}

/// Lower and upper tile indices around `pos` and the weight of the upper one.
fn bracket(pos: f64, centers: &[f64]) -> (usize, usize, f64) {
    let last = centers.len() - 1;
    if centers.len() == 1 || pos <= centers[0] {
        return (0, 0, 0.0);
    }
    if pos >= centers[last] {
        return (last, last, 0.0);
    }
    let upper = centers.partition_point(|&c| c <= pos).min(last);
    let lower = upper - 1;
    let span = centers[upper] - centers[lower];
    (lower, upper, (pos - centers[lower]) / span)
}

fn median_filter_mesh(tiles: &[TileStats], tiles_x: usize, tiles_y: usize) -> Vec<TileStats> {
    if tiles_x < 3 && tiles_y < 3 {
        return tiles.to_vec();
    }
    let mut out = Vec::with_capacity(tiles.len());
    let mut medians = Vec::with_capacity(9);
    let mut stds = Vec::with_capacity(9);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            medians.clear();
            stds.clear();
            for ny in ty.saturating_sub(1)..=(ty + 1).min(tiles_y - 1) {
                for nx in tx.saturating_sub(1)..=(tx + 1).min(tiles_x - 1) {
                    let t = tiles[ny * tiles_x + nx];
                    medians.push(t.median);
                    stds.push(t.std);
                }
            }
            out.push(TileStats {
                median: median_mut(&mut medians),
                std: median_mut(&mut stds),
            });
        }
    }
    out
}
