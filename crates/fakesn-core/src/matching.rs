//! Reconciling detected sources with planted fakes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detect::{DetectionCatalog, DetectionRecord};
use crate::error::{FakeSnError, Result};
use crate::image::{Image, ImageLike};
use crate::io::ecsv::{self, EcsvRecord};
use crate::provenance::{format_index, FakeSet};

/// Per-fake detection outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyRow {
    #[serde(rename = "fakeID")]
    pub fake_id: String,
    #[serde(rename = "pixX")]
    pub pix_x: f64,
    #[serde(rename = "pixY")]
    pub pix_y: f64,
    /// 1 when a detection fell inside the search box, else 0.
    pub detected: u8,
}

impl EcsvRecord for EfficiencyRow {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("fakeID", "string"),
        ("pixX", "float64"),
        ("pixY", "float64"),
        ("detected", "uint8"),
    ];
}

/// A detection credited to a fake.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FakeMatch {
    pub fake_index: usize,
    /// Position of the detection in the catalog.
    pub detection: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionEfficiency {
    /// Matched fakes over total fakes, in `[0, 1]`.
    pub efficiency: f64,
    /// One row per fake, in index order.
    pub rows: Vec<EfficiencyRow>,
    pub matches: Vec<FakeMatch>,
}

impl DetectionEfficiency {
    pub fn n_detected(&self) -> usize {
        self.matches.len()
    }

    pub fn n_fakes(&self) -> usize {
        self.rows.len()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        ecsv::write_table(path, &self.rows, &Default::default())
    }

    pub fn read_rows(path: &Path) -> Result<Vec<EfficiencyRow>> {
        Ok(ecsv::read_table::<EfficiencyRow>(path)?.rows)
    }
}

/// `(id, x, y)` of every fake recorded for an image or a bare header.
pub fn fake_locations<I: ImageLike + ?Sized>(image: &I) -> Result<Vec<(String, f64, f64)>> {
    Ok(image
        .fake_set()?
        .iter()
        .map(|r| (r.id(), r.x, r.y))
        .collect())
}

/// Credit detections to fakes with an axis-aligned box of half-width
/// `search_radius` (inclusive).
///
/// Detections are taken in catalog order. Each one claims the first fake,
/// in index order, that is still unmatched and lies inside its box; a fake
/// is matched at most once.
pub fn match_fakes(
    detections: &[DetectionRecord],
    fakes: &FakeSet,
    search_radius: f64,
) -> Result<DetectionEfficiency> {
    if fakes.is_empty() {
        return Err(FakeSnError::NoFakes);
    }
    if !search_radius.is_finite() || search_radius < 0.0 {
        return Err(FakeSnError::InvalidInput(format!(
            "search radius must be non-negative, got {search_radius}"
        )));
    }

    let mut matched = vec![false; fakes.len()];
    let mut matches = Vec::new();
    for (d, det) in detections.iter().enumerate() {
        let hit = fakes.iter().enumerate().find(|(k, fake)| {
            !matched[*k]
                && (det.xcentroid - fake.x).abs() <= search_radius
                && (det.ycentroid - fake.y).abs() <= search_radius
        });
        if let Some((k, fake)) = hit {
            matched[k] = true;
            matches.push(FakeMatch {
                fake_index: fake.index,
                detection: d,
            });
            debug!(fake = fake.index, detection = det.label, "matched fake");
        }
    }

    let rows: Vec<EfficiencyRow> = fakes
        .iter()
        .zip(&matched)
        .map(|(fake, &hit)| EfficiencyRow {
            fake_id: format_index(fake.index),
            pix_x: fake.x,
            pix_y: fake.y,
            detected: u8::from(hit),
        })
        .collect();
    let efficiency = matches.len() as f64 / fakes.len() as f64;

    Ok(DetectionEfficiency {
        efficiency,
        rows,
        matches,
    })
}

/// Match `detections` against the fakes planted in `image` and record each
/// fake's outcome in its provenance.
pub fn calculate_detection_efficiency(
    image: &mut Image,
    detections: &DetectionCatalog,
    search_radius: f64,
) -> Result<DetectionEfficiency> {
    let result = match_fakes(&detections.sources, &image.fakes, search_radius)?;
    let indices: Vec<usize> = image.fakes.iter().map(|r| r.index).collect();
    for (index, row) in indices.into_iter().zip(&result.rows) {
        image.fakes.set_detected(index, row.detected == 1);
    }
    info!(
        fakes = result.n_fakes(),
        detected = result.n_detected(),
        detections = detections.len(),
        efficiency = result.efficiency,
        "Computed detection efficiency"
    );
    Ok(result)
}

/// Planted fakes split by outcome, plus detections on the fake-free image.
#[derive(Clone, Debug, Default)]
pub struct Confusion {
    pub true_positives: Vec<EfficiencyRow>,
    pub false_negatives: Vec<EfficiencyRow>,
    pub false_positives: Vec<DetectionRecord>,
}

impl Confusion {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.true_positives.len(),
            self.false_negatives.len(),
            self.false_positives.len(),
        )
    }
}

/// Classify fakes as recovered or missed. Every detection on the clean
/// difference image counts as a false positive.
pub fn confusion(efficiency: &DetectionEfficiency, clean_detections: &DetectionCatalog) -> Confusion {
    let (true_positives, false_negatives) = efficiency
        .rows
        .iter()
        .cloned()
        .partition(|r| r.detected == 1);
    Confusion {
        true_positives,
        false_negatives,
        false_positives: clean_detections.sources.clone(),
    }
}
