use std::ops::Mul;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{FakeSnError, Result};

/// Empirical PSF sampled on an oversampled grid.
///
/// `data` sums to one over the oversampled grid and is centred on the grid
/// centre. Evaluating at detector-pixel spacing therefore sums to `flux`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PsfModel {
    pub data: Array2<f64>,
    /// Grid cells per detector pixel along each axis.
    pub oversampling: usize,
    /// Total flux represented by the model.
    pub flux: f64,
}

impl PsfModel {
    /// Wrap a kernel, normalising it to unit sum. The model flux starts at one.
    pub fn new(data: Array2<f64>, oversampling: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(FakeSnError::InvalidDimensions {
                width: data.ncols(),
                height: data.nrows(),
            });
        }
        if oversampling == 0 {
            return Err(FakeSnError::InvalidInput("oversampling must be at least 1".into()));
        }
        let sum: f64 = data.iter().filter(|v| v.is_finite()).sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(FakeSnError::InvalidInput(
                "PSF kernel has no positive flux".into(),
            ));
        }
        let data = data.mapv(|v| if v.is_finite() { v / sum } else { 0.0 });
        Ok(Self {
            data,
            oversampling,
            flux: 1.0,
        })
    }

    /// Circular Gaussian covering `size` detector pixels.
    pub fn gaussian(sigma: f64, size: usize, oversampling: usize) -> Result<Self> {
        if sigma.is_nan() || sigma <= 0.0 || size == 0 {
            return Err(FakeSnError::InvalidInput(format!(
                "Gaussian PSF needs sigma > 0 and size > 0, got sigma={sigma}, size={size}"
            )));
        }
        let os = oversampling.max(1);
        let mut n = size * os;
        if n % 2 == 0 {
            n += 1;
        }
        let c = (n - 1) as f64 / 2.0;
        let s = sigma * os as f64;
        let two_s2 = 2.0 * s * s;
        let data = Array2::from_shape_fn((n, n), |(r, col)| {
            let dx = col as f64 - c;
            let dy = r as f64 - c;
            (-(dx * dx + dy * dy) / two_s2).exp()
        });
        Self::new(data, os)
    }

    /// Grid centre in oversampled cells, (x, y).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.data.ncols() as f64 - 1.0) / 2.0,
            (self.data.nrows() as f64 - 1.0) / 2.0,
        )
    }

    /// Footprint in detector pixels, (rows, cols).
    pub fn pixel_shape(&self) -> (usize, usize) {
        let os = self.oversampling.max(1);
        (
            (self.data.nrows() / os).max(1),
            (self.data.ncols() / os).max(1),
        )
    }

    /// Model value for a detector pixel whose centre lies `(dx, dy)` pixels
    /// from the model centre. Zero outside the sampled grid.
    pub fn evaluate(&self, dx: f64, dy: f64) -> f64 {
        let os = self.oversampling as f64;
        let (cx, cy) = self.center();
        self.flux * os * os * bilinear(&self.data, cx + dx * os, cy + dy * os)
    }

    /// Copy of the model carrying `factor` times the flux.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            data: self.data.clone(),
            oversampling: self.oversampling,
            flux: self.flux * factor,
        }
    }

    /// Copy normalised to an absolute total flux.
    pub fn with_flux(&self, flux: f64) -> Self {
        Self {
            data: self.data.clone(),
            oversampling: self.oversampling,
            flux,
        }
    }

    /// The model rasterised at detector resolution over `pixel_shape()`,
    /// centred on the central pixel.
    pub fn stamp(&self) -> Array2<f64> {
        let (rows, cols) = self.pixel_shape();
        let pr = (rows as f64 - 1.0) / 2.0;
        let pc = (cols as f64 - 1.0) / 2.0;
        Array2::from_shape_fn((rows, cols), |(r, c)| self.evaluate(c as f64 - pc, r as f64 - pr))
    }

    /// Sum of the detector-resolution stamp.
    pub fn total_flux(&self) -> f64 {
        self.stamp().sum()
    }
}

impl Mul<f64> for PsfModel {
    type Output = PsfModel;

    fn mul(mut self, rhs: f64) -> PsfModel {
        self.flux *= rhs;
        self
    }
}

impl Mul<f64> for &PsfModel {
    type Output = PsfModel;

    fn mul(self, rhs: f64) -> PsfModel {
        self.scaled(rhs)
    }
}

/// Bilinear sample of `data` at fractional (column, row) position.
pub(crate) fn bilinear(data: &Array2<f64>, u: f64, v: f64) -> f64 {
    let (rows, cols) = data.dim();
    let max_u = (cols - 1) as f64;
    let max_v = (rows - 1) as f64;
    if u.is_nan() || v.is_nan() || u < 0.0 || v < 0.0 || u > max_u || v > max_v {
        return 0.0;
    }
    let x0 = u.floor() as usize;
    let y0 = v.floor() as usize;
    let x1 = (x0 + 1).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);
    let fx = u - x0 as f64;
    let fy = v - y0 as f64;

    let top = data[[y0, x0]] * (1.0 - fx) + data[[y0, x1]] * fx;
    let bottom = data[[y1, x0]] * (1.0 - fx) + data[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
