pub mod fakes;
pub mod gaia;
pub mod star;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CATALOG_EXTENSION, DEFAULT_EPSF_SUFFIX, DEFAULT_FAKE_CATALOG_SUFFIX,
    DEFAULT_STAR_CATALOG_SUFFIX,
};

pub use fakes::{read_fake_catalog, write_fake_catalog, FakeCatalogRow, FakeCatalogWrite};
pub use gaia::{fetch_star_catalog, GaiaCsvSource, GaiaRow, StarCatalogSource};
pub use star::{BoundingBox, StarRecord};

/// Sidecar files written next to each image: `<root>_<suffix>.<extension>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Read and write sidecar files at all.
    pub enabled: bool,
    /// Rebuild and replace existing sidecar files.
    pub overwrite: bool,
    /// Table file extension.
    pub extension: String,
    pub star_suffix: String,
    pub fake_suffix: String,
    pub epsf_suffix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            overwrite: false,
            extension: DEFAULT_CATALOG_EXTENSION.into(),
            star_suffix: DEFAULT_STAR_CATALOG_SUFFIX.into(),
            fake_suffix: DEFAULT_FAKE_CATALOG_SUFFIX.into(),
            epsf_suffix: DEFAULT_EPSF_SUFFIX.into(),
        }
    }
}

impl CacheConfig {
    /// No sidecar files.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
