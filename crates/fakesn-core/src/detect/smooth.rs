use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{GAUSSIAN_SIGMA_TO_FWHM, PARALLEL_PIXEL_THRESHOLD};

/// Smooth with a normalised circular Gaussian of the given FWHM (pixels),
/// as separable row and column passes. Edges are clamped.
pub fn gaussian_smooth(data: &Array2<f64>, fwhm: f64) -> Array2<f64> {
    if fwhm <= 0.0 {
        return data.clone();
    }
    let kernel = gaussian_kernel(fwhm / GAUSSIAN_SIGMA_TO_FWHM);
    let rows = convolve(data, &kernel, Direction::AlongRows);
    convolve(&rows, &kernel, Direction::AlongCols)
}

/// 1-D kernel truncated at 4 sigma, summing to one.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (sigma * 4.0).ceil().max(1.0) as usize;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

#[derive(Clone, Copy)]
enum Direction {
    AlongRows,
    AlongCols,
}

fn convolve(data: &Array2<f64>, kernel: &[f64], direction: Direction) -> Array2<f64> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;

    let sample = |row: usize, col: usize| -> f64 {
        let mut sum = 0.0;
        for (ki, &kv) in kernel.iter().enumerate() {
            let offset = ki as isize - radius;
            let v = match direction {
                Direction::AlongRows => {
                    data[[row, (col as isize + offset).clamp(0, w as isize - 1) as usize]]
                }
                Direction::AlongCols => {
                    data[[(row as isize + offset).clamp(0, h as isize - 1) as usize, col]]
                }
            };
            if v.is_finite() {
                sum += v * kv;
            }
        }
        sum
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<f64>> = (0..h)
            .into_par_iter()
            .map(|row| (0..w).map(|col| sample(row, col)).collect())
            .collect();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((h, w), flat).unwrap_or_else(|_| Array2::zeros((h, w)))
    } else {
        Array2::from_shape_fn((h, w), |(row, col)| sample(row, col))
    }
}
