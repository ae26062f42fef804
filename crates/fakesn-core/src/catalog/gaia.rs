use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::star::{StarRecord, StarRow};
use super::CacheConfig;
use crate::consts::{MAGERR_COEFFICIENT, PSF_STAR_CUTOUT_SIZE};
use crate::error::{FakeSnError, Result};
use crate::image::{Image, SkyCoord};
use crate::io::ecsv;

/// One row of a Gaia archive result, restricted to the RP band columns
/// used for PSF star selection. Missing photometry is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaiaRow {
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub phot_rp_mean_mag: Option<f64>,
    #[serde(default)]
    pub phot_rp_mean_flux: Option<f64>,
    #[serde(default)]
    pub phot_rp_mean_flux_error: Option<f64>,
    #[serde(default)]
    pub phot_rp_mean_flux_over_error: Option<f64>,
}

/// Provider of reference stars inside a rectangular sky region.
pub trait StarCatalogSource {
    fn query(&self, center: &SkyCoord, width_deg: f64, height_deg: f64) -> Result<Vec<GaiaRow>>;
}

/// Gaia archive export (comma separated, header row) on local disk.
pub struct GaiaCsvSource {
    path: PathBuf,
}

impl GaiaCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StarCatalogSource for GaiaCsvSource {
    fn query(&self, center: &SkyCoord, width_deg: f64, height_deg: f64) -> Result<Vec<GaiaRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let headers = reader.headers()?.clone();
        for column in ["ra", "dec"] {
            if !headers.iter().any(|h| h == column) {
                return Err(FakeSnError::MissingColumn(column.to_string()));
            }
        }

        let cos_dec = center.dec.to_radians().cos().max(1e-12);
        let mut rows = Vec::new();
        let mut total = 0usize;
        for result in reader.deserialize::<GaiaRow>() {
            let row = result?;
            total += 1;
            let mut dra = row.ra - center.ra;
            if dra > 180.0 {
                dra -= 360.0;
            } else if dra < -180.0 {
                dra += 360.0;
            }
            if (dra * cos_dec).abs() <= width_deg / 2.0
                && (row.dec - center.dec).abs() <= height_deg / 2.0
            {
                rows.push(row);
            }
        }

        debug!(
            path = %self.path.display(),
            total,
            in_field = rows.len(),
            "queried Gaia export"
        );
        Ok(rows)
    }
}

/// Convert catalog rows to star records on `image`. Rows lacking RP
/// photometry are skipped. The magnitude error uses the first-order
/// approximation `1.086 * flux_err / flux`.
pub fn stars_from_gaia(image: &Image, rows: &[GaiaRow], box_size: usize) -> Vec<StarRecord> {
    rows.iter()
        .filter_map(|row| {
            let mag = row.phot_rp_mean_mag?;
            let flux = row.phot_rp_mean_flux?;
            let flux_err = row.phot_rp_mean_flux_error?;
            let sn = row.phot_rp_mean_flux_over_error?;
            if flux == 0.0 {
                return None;
            }
            Some(StarRecord::on_image(
                image,
                SkyCoord::new(row.ra, row.dec),
                mag,
                MAGERR_COEFFICIENT * flux_err / flux,
                sn,
                box_size,
            ))
        })
        .collect()
}

/// Reference stars covering `image`.
///
/// With caching enabled, `<root>_<suffix>.<ext>` is read when it exists and
/// `overwrite` is off; otherwise `source` is queried over the image
/// footprint centred on the WCS reference point and the result is saved.
pub fn fetch_star_catalog(
    image: &Image,
    source: &dyn StarCatalogSource,
    cache: &CacheConfig,
) -> Result<Vec<StarRecord>> {
    let cache_file = if cache.enabled {
        Some(image.sidecar_path(&cache.star_suffix, &cache.extension)?)
    } else {
        None
    };

    if let Some(path) = cache_file.as_deref() {
        if path.is_file() && !cache.overwrite {
            info!(path = %path.display(), "Star catalog exists, reading without querying");
            return read_star_catalog(image, path);
        }
    }

    let center = SkyCoord::new(image.wcs.crval.0, image.wcs.crval.1);
    let (width_deg, height_deg) = image.wcs.field_of_view(image.width(), image.height());
    let rows = source.query(&center, width_deg, height_deg)?;
    let stars = stars_from_gaia(image, &rows, PSF_STAR_CUTOUT_SIZE);
    info!(
        queried = rows.len(),
        usable = stars.len(),
        "Fetched reference stars"
    );

    if let Some(path) = cache_file.as_deref() {
        write_star_catalog(path, &stars)?;
    }
    Ok(stars)
}

pub fn write_star_catalog(path: &Path, stars: &[StarRecord]) -> Result<()> {
    let rows: Vec<StarRow> = stars.iter().map(StarRow::from).collect();
    ecsv::write_table(path, &rows, &Default::default())
}

/// Read a saved star catalog. Pixel positions are recomputed from the sky
/// positions against `image`.
pub fn read_star_catalog(image: &Image, path: &Path) -> Result<Vec<StarRecord>> {
    let table = ecsv::read_table::<StarRow>(path)?;
    Ok(table
        .rows
        .into_iter()
        .map(|r| {
            StarRecord::on_image(
                image,
                SkyCoord::new(r.ra, r.dec),
                r.mag,
                r.magerr,
                r.signal_to_noise,
                PSF_STAR_CUTOUT_SIZE,
            )
        })
        .collect())
}
