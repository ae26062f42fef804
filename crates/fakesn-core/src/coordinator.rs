//! Placing the same sky positions into a difference / search / template
//! triplet whose pixel grids need not agree.

use std::path::Path;

use tracing::{debug, info};

use crate::consts::DEFAULT_FAKE_FLUX;
use crate::detect::DetectionRecord;
use crate::error::{FakeSnError, Result};
use crate::image::{Image, SkyCoord};
use crate::inject::{inject_posflux, Footprint, PlantPosition};
use crate::psf::PsfModel;

/// Difference image with the search and template frames it was made from.
#[derive(Clone, Debug)]
pub struct Triplet {
    pub diff: Image,
    pub search: Image,
    pub template: Image,
}

impl Triplet {
    pub fn open(diff: &Path, search: &Path, template: &Path) -> Result<Self> {
        Ok(Self {
            diff: Image::open(diff)?,
            search: Image::open(search)?,
            template: Image::open(template)?,
        })
    }

    /// Apply `f` to each image in diff, search, template order.
    pub fn try_map<F>(&self, mut f: F) -> Result<Triplet>
    where
        F: FnMut(&Image) -> Result<Image>,
    {
        Ok(Triplet {
            diff: f(&self.diff)?,
            search: f(&self.search)?,
            template: f(&self.template)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        [&self.diff, &self.search, &self.template].into_iter()
    }
}

/// Per-image pixel positions of one set of sky placements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TripletPlacements {
    pub diff: Vec<PlantPosition>,
    pub search: Vec<PlantPosition>,
    pub template: Vec<PlantPosition>,
    /// Sky position of each placement.
    pub sky: Vec<SkyCoord>,
}

impl TripletPlacements {
    pub fn len(&self) -> usize {
        self.sky.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sky.is_empty()
    }
}

/// Offsets around a sky origin, measured in template pixels.
///
/// Placement `i` sits `radii_px[i]` template pixels from `origin` at
/// `orientation_deg + angles_deg[i]` counter-clockwise from +x. The offset
/// point is taken to the sky through the template WCS and then into each
/// image through that image's own WCS. Every placement gets
/// [`DEFAULT_FAKE_FLUX`] when `fluxes` is `None`.
pub fn propagate(
    triplet: &Triplet,
    origin: &SkyCoord,
    orientation_deg: f64,
    angles_deg: &[f64],
    radii_px: &[f64],
    fluxes: Option<&[f64]>,
) -> Result<TripletPlacements> {
    if angles_deg.len() != radii_px.len() {
        return Err(FakeSnError::InvalidInput(format!(
            "{} angles for {} radii",
            angles_deg.len(),
            radii_px.len()
        )));
    }
    if let Some(f) = fluxes {
        if f.len() != angles_deg.len() {
            return Err(FakeSnError::InvalidInput(format!(
                "{} fluxes for {} placements",
                f.len(),
                angles_deg.len()
            )));
        }
    }

    let (x0, y0) = triplet.template.sky_to_pixel(origin);
    let mut placements = TripletPlacements::default();
    for (i, (&phi, &d)) in angles_deg.iter().zip(radii_px).enumerate() {
        let theta = (orientation_deg + phi).to_radians();
        let sky = triplet
            .template
            .pixel_to_sky(x0 + d * theta.cos(), y0 + d * theta.sin());
        let flux = fluxes.map_or(DEFAULT_FAKE_FLUX, |f| f[i]);

        let at = |image: &Image| {
            let (x, y) = image.sky_to_pixel(&sky);
            PlantPosition { x, y, flux }
        };
        placements.diff.push(at(&triplet.diff));
        placements.search.push(at(&triplet.search));
        placements.template.push(at(&triplet.template));
        debug!(ra = sky.ra, dec = sky.dec, phi, d, flux, "placement");
        placements.sky.push(sky);
    }
    Ok(placements)
}

/// Lensed-image positions around a host galaxy measured on the template.
pub fn lensed_locations(
    triplet: &Triplet,
    host: &DetectionRecord,
    angles_deg: &[f64],
    radii_px: &[f64],
    fluxes: Option<&[f64]>,
) -> Result<TripletPlacements> {
    let origin = triplet.template.pixel_to_sky(host.xcentroid, host.ycentroid);
    let placements = propagate(triplet, &origin, host.orientation, angles_deg, radii_px, fluxes)?;
    info!(
        host = host.label,
        x = host.xcentroid,
        y = host.ycentroid,
        orientation = host.orientation,
        placements = placements.len(),
        "Computed lensed locations"
    );
    Ok(placements)
}

/// Plant the placements into copies of all three images.
pub fn inject_triplet(
    triplet: &Triplet,
    psf: &PsfModel,
    placements: &TripletPlacements,
    footprint: Footprint,
) -> Result<Triplet> {
    Ok(Triplet {
        diff: inject_posflux(&triplet.diff, psf, &placements.diff, footprint)?,
        search: inject_posflux(&triplet.search, psf, &placements.search, footprint)?,
        template: inject_posflux(&triplet.template, psf, &placements.template, footprint)?,
    })
}

/// Matching cutouts from the clean and planted triplets.
#[derive(Clone, Debug)]
pub struct TripletStamps {
    pub clean: Triplet,
    pub planted: Triplet,
}

pub fn postage_stamp_triplet(
    clean: &Triplet,
    planted: &Triplet,
    location: &SkyCoord,
    size: usize,
) -> Result<TripletStamps> {
    Ok(TripletStamps {
        clean: clean.try_map(|im| im.cutout(location, size))?,
        planted: planted.try_map(|im| im.cutout(location, size))?,
    })
}
