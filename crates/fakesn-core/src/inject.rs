//! Planting PSF-shaped point sources into images, and removing them.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::FAKE_MODEL_PLACEHOLDER;
use crate::error::{FakeSnError, Result};
use crate::image::Image;
use crate::io::ecsv::{self, EcsvRecord};
use crate::provenance::FakeRecord;
use crate::psf::PsfModel;

/// Region of the image each source is evaluated over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Footprint {
    /// The model's own detector-pixel footprint around the target.
    #[default]
    Stamp,
    /// A `rows x cols` window around the target.
    Subshape { rows: usize, cols: usize },
    /// Every pixel of the image.
    FullFrame,
}

impl Footprint {
    /// Reject windows that cannot hold a pixel.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Footprint::Subshape { rows, cols } if rows == 0 || cols == 0 => {
                Err(FakeSnError::InvalidInput(format!(
                    "subshape footprint must be at least 1x1, got {rows}x{cols}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Pixel rows and columns touched by a source at `(x, y)`, clipped to a
    /// `height x width` frame. Windows start at `round(y - rows/2)`.
    fn window(
        &self,
        psf: &PsfModel,
        x: f64,
        y: f64,
        height: usize,
        width: usize,
    ) -> (Range<usize>, Range<usize>) {
        let (nrows, ncols) = match *self {
            Footprint::Stamp => psf.pixel_shape(),
            Footprint::Subshape { rows, cols } => (rows, cols),
            Footprint::FullFrame => return (0..height, 0..width),
        };
        (clip_span(y, nrows, height), clip_span(x, ncols, width))
    }
}

fn clip_span(center: f64, len: usize, limit: usize) -> Range<usize> {
    let start = (center - len as f64 / 2.0).round() as i64;
    let end = start + len as i64;
    let lo = start.clamp(0, limit as i64) as usize;
    let hi = end.clamp(0, limit as i64) as usize;
    lo..hi
}

/// A source position with an absolute flux. Table columns are
/// `x_fit`, `y_fit`, `flux_fit`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantPosition {
    #[serde(rename = "x_fit")]
    pub x: f64,
    #[serde(rename = "y_fit")]
    pub y: f64,
    #[serde(rename = "flux_fit")]
    pub flux: f64,
}

impl EcsvRecord for PlantPosition {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("x_fit", "float64"),
        ("y_fit", "float64"),
        ("flux_fit", "float64"),
    ];
}

pub fn read_positions(path: &Path) -> Result<Vec<PlantPosition>> {
    Ok(ecsv::read_table::<PlantPosition>(path)?.rows)
}

pub fn write_positions(path: &Path, positions: &[PlantPosition]) -> Result<()> {
    ecsv::write_table(path, positions, &Default::default())
}

/// Plant one scaled copy of `psf` at each pixel position.
///
/// Returns a new image; `image` is untouched. `flux_scales` multiplies the
/// model per position and defaults to 1. Each fake is recorded in the
/// returned image's provenance with indices continuing after any fakes
/// already present, and with flux `psf.flux * scale`.
pub fn inject(
    image: &Image,
    psf: &PsfModel,
    positions: &[(f64, f64)],
    flux_scales: Option<&[f64]>,
    footprint: Footprint,
) -> Result<Image> {
    if let Some(scales) = flux_scales {
        if scales.len() != positions.len() {
            return Err(FakeSnError::InvalidInput(format!(
                "{} flux scales for {} positions",
                scales.len(),
                positions.len()
            )));
        }
    }
    let sources: Vec<Source> = positions
        .iter()
        .enumerate()
        .map(|(n, &(x, y))| {
            let scale = flux_scales.map_or(1.0, |s| s[n]);
            Source {
                x,
                y,
                scale,
                flux: psf.flux * scale,
            }
        })
        .collect();
    plant(image, psf, &sources, footprint)
}

/// Plant sources given absolute fluxes rather than scales. The recorded
/// flux of each fake is the requested `flux_fit`.
pub fn inject_posflux(
    image: &Image,
    psf: &PsfModel,
    posflux: &[PlantPosition],
    footprint: Footprint,
) -> Result<Image> {
    if psf.flux == 0.0 {
        return Err(FakeSnError::InvalidInput("PSF model has zero flux".into()));
    }
    let sources: Vec<Source> = posflux
        .iter()
        .map(|p| Source {
            x: p.x,
            y: p.y,
            scale: p.flux / psf.flux,
            flux: p.flux,
        })
        .collect();
    plant(image, psf, &sources, footprint)
}

struct Source {
    x: f64,
    y: f64,
    scale: f64,
    flux: f64,
}

fn plant(image: &Image, psf: &PsfModel, sources: &[Source], footprint: Footprint) -> Result<Image> {
    image.fakes.check_capacity(sources.len())?;
    footprint.validate()?;
    if let Some(bad) = sources.iter().find(|s| !s.scale.is_finite()) {
        return Err(FakeSnError::InvalidInput(format!("non-finite flux scale {}", bad.scale)));
    }
    validate_positions(sources.iter().map(|s| (s.x, s.y)))?;

    let mut planted = image.clone();
    let first = planted.fakes.next_index();
    for (n, source) in sources.iter().enumerate() {
        let model = psf * source.scale;
        add_model(&mut planted, &model, source.x, source.y, footprint, 1.0);

        let sky = planted.pixel_to_sky(source.x, source.y);
        planted.fakes.push(FakeRecord {
            index: first + n,
            x: source.x,
            y: source.y,
            ra: sky.ra,
            dec: sky.dec,
            scale: source.scale,
            flux: source.flux,
            model: FAKE_MODEL_PLACEHOLDER.to_string(),
            detected: None,
        })?;
        debug!(index = first + n, x = source.x, y = source.y, scale = source.scale, "planted fake");
    }
    planted.fakes.psf_flux = Some(psf.total_flux());

    info!(
        planted = sources.len(),
        total = planted.fakes.len(),
        footprint = ?footprint,
        "Injected fakes"
    );
    Ok(planted)
}

/// Subtract a PSF of the given flux at each position. Returns a new image;
/// provenance is left unchanged.
pub fn subtract_psf(
    image: &Image,
    psf: &PsfModel,
    posflux: &[PlantPosition],
    footprint: Footprint,
) -> Result<Image> {
    footprint.validate()?;
    validate_positions(posflux.iter().map(|p| (p.x, p.y)))?;
    if let Some(bad) = posflux.iter().find(|p| !p.flux.is_finite()) {
        return Err(FakeSnError::InvalidInput(format!("non-finite flux {}", bad.flux)));
    }

    let mut residual = image.clone();
    for p in posflux {
        let model = psf.with_flux(p.flux);
        add_model(&mut residual, &model, p.x, p.y, footprint, -1.0);
    }
    info!(subtracted = posflux.len(), footprint = ?footprint, "Subtracted PSFs");
    Ok(residual)
}

fn validate_positions<I>(positions: I) -> Result<()>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    for (x, y) in positions {
        if !x.is_finite() || !y.is_finite() {
            return Err(FakeSnError::InvalidInput(format!(
                "non-finite position ({x}, {y})"
            )));
        }
    }
    Ok(())
}

/// Add `sign * model` centred on `(x, y)` over the footprint window.
fn add_model(image: &mut Image, model: &PsfModel, x: f64, y: f64, footprint: Footprint, sign: f64) {
    let (rows, cols) = footprint.window(model, x, y, image.height(), image.width());
    for r in rows {
        for c in cols.clone() {
            image.data[[r, c]] += sign * model.evaluate(c as f64 - x, r as f64 - y);
        }
    }
}
