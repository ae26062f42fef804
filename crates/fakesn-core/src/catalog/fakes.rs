use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::CacheConfig;
use crate::error::{FakeSnError, Result};
use crate::image::Image;
use crate::io::ecsv;
use crate::provenance::FakeRecord;

/// Fake source catalog row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FakeCatalogRow {
    pub id: String,
    pub ra: f64,
    pub dec: f64,
    pub sca: f64,
    #[serde(rename = "F")]
    pub flux: f64,
    #[serde(rename = "mod")]
    pub model: String,
    pub x: f64,
    pub y: f64,
}

impl ecsv::EcsvRecord for FakeCatalogRow {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("id", "string"),
        ("ra", "float64"),
        ("dec", "float64"),
        ("sca", "float64"),
        ("F", "float64"),
        ("mod", "string"),
        ("x", "float64"),
        ("y", "float64"),
    ];
}

impl From<&FakeRecord> for FakeCatalogRow {
    fn from(r: &FakeRecord) -> Self {
        Self {
            id: r.id(),
            ra: r.ra,
            dec: r.dec,
            sca: r.scale,
            flux: r.flux,
            model: r.model.clone(),
            x: r.x,
            y: r.y,
        }
    }
}

/// Where a fake catalog ended up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FakeCatalogWrite {
    /// Per-image catalog, `None` when caching is off or an existing file
    /// was left in place.
    pub catalog: Option<PathBuf>,
    /// Shared catalog the rows were appended to.
    pub appended: Option<PathBuf>,
}

/// Write the fakes planted in `image` to `<root>_<fake_suffix>.<ext>` and,
/// when `append_to` is given, append them to that multi-image catalog
/// (created if missing).
pub fn write_fake_catalog(
    image: &Image,
    cache: &CacheConfig,
    append_to: Option<&Path>,
) -> Result<FakeCatalogWrite> {
    if !image.contains_fakes() {
        return Err(FakeSnError::NoFakes);
    }
    let rows: Vec<FakeCatalogRow> = image.fakes.iter().map(FakeCatalogRow::from).collect();
    let mut written = FakeCatalogWrite::default();

    if cache.enabled {
        let path = image.sidecar_path(&cache.fake_suffix, &cache.extension)?;
        if path.exists() && !cache.overwrite {
            warn!(path = %path.display(), "Fake catalog exists and overwrite is off, not saving");
        } else {
            ecsv::write_table(&path, &rows, &Default::default())?;
            info!(path = %path.display(), fakes = rows.len(), "Wrote fake catalog");
            written.catalog = Some(path);
        }
    }

    if let Some(path) = append_to {
        let mut combined = if path.exists() {
            read_fake_catalog(path)?
        } else {
            Vec::new()
        };
        let previous = combined.len();
        combined.extend(rows);
        ecsv::write_table(path, &combined, &Default::default())?;
        info!(
            path = %path.display(),
            previous,
            total = combined.len(),
            "Appended to fake catalog"
        );
        written.appended = Some(path.to_path_buf());
    }

    Ok(written)
}

pub fn read_fake_catalog(path: &Path) -> Result<Vec<FakeCatalogRow>> {
    Ok(ecsv::read_table::<FakeCatalogRow>(path)?.rows)
}
