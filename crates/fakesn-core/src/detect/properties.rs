use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::catalog::BoundingBox;
use crate::io::ecsv::EcsvRecord;

/// Morphology and photometry of one detected source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub label: u32,
    pub xcentroid: f64,
    pub ycentroid: f64,
    pub bbox_ixmin: i64,
    pub bbox_ixmax: i64,
    pub bbox_iymin: i64,
    pub bbox_iymax: i64,
    /// Pixel count.
    pub area: usize,
    /// 1-sigma extent along the major axis (pixels).
    pub semimajor_sigma: f64,
    pub semiminor_sigma: f64,
    /// Major-axis angle in degrees, counter-clockwise from +x.
    pub orientation: f64,
    /// `1 - semiminor / semimajor`.
    pub ellipticity: f64,
    /// Background-subtracted flux summed over the source pixels.
    pub flux: f64,
    pub peak: f64,
}

impl DetectionRecord {
    /// Exclusive-max bounding box.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.bbox_ixmin, self.bbox_ixmax, self.bbox_iymin, self.bbox_iymax)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.xcentroid, self.ycentroid)
    }
}

impl EcsvRecord for DetectionRecord {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("label", "uint32"),
        ("xcentroid", "float64"),
        ("ycentroid", "float64"),
        ("bbox_ixmin", "int64"),
        ("bbox_ixmax", "int64"),
        ("bbox_iymin", "int64"),
        ("bbox_iymax", "int64"),
        ("area", "int64"),
        ("semimajor_sigma", "float64"),
        ("semiminor_sigma", "float64"),
        ("orientation", "float64"),
        ("ellipticity", "float64"),
        ("flux", "float64"),
        ("peak", "float64"),
    ];
}

/// Measure a source from its pixels on background-subtracted `data`.
///
/// Centroid and second moments are weighted by the positive pixel values;
/// a source with no positive pixel falls back to uniform weights.
pub fn measure_source(data: &Array2<f64>, label: u32, pixels: &[(usize, usize)]) -> DetectionRecord {
    let value = |p: (usize, usize)| {
        let v = data[p];
        if v.is_finite() {
            v
        } else {
            0.0
        }
    };

    let positive: f64 = pixels.iter().map(|&p| value(p).max(0.0)).sum();
    let weight = |p: (usize, usize)| {
        if positive > 0.0 {
            value(p).max(0.0)
        } else {
            1.0
        }
    };
    let wsum: f64 = pixels.iter().map(|&p| weight(p)).sum::<f64>().max(f64::MIN_POSITIVE);

    let xc = pixels.iter().map(|&p| weight(p) * p.1 as f64).sum::<f64>() / wsum;
    let yc = pixels.iter().map(|&p| weight(p) * p.0 as f64).sum::<f64>() / wsum;

    let (mut xx, mut yy, mut xy) = (0.0, 0.0, 0.0);
    for &p in pixels {
        let w = weight(p);
        let dx = p.1 as f64 - xc;
        let dy = p.0 as f64 - yc;
        xx += w * dx * dx;
        yy += w * dy * dy;
        xy += w * dx * dy;
    }
    xx /= wsum;
    yy /= wsum;
    xy /= wsum;

    let mean = (xx + yy) / 2.0;
    let spread = (((xx - yy) / 2.0).powi(2) + xy * xy).sqrt();
    let semimajor = (mean + spread).max(0.0).sqrt();
    let semiminor = (mean - spread).max(0.0).sqrt();
    let orientation = 0.5 * (2.0 * xy).atan2(xx - yy).to_degrees();
    let ellipticity = if semimajor > 0.0 {
        1.0 - semiminor / semimajor
    } else {
        0.0
    };

    let flux = pixels.iter().map(|&p| value(p)).sum();
    let peak = pixels
        .iter()
        .map(|&p| value(p))
        .fold(f64::NEG_INFINITY, f64::max);

    let rmin = pixels.iter().map(|p| p.0).min().unwrap_or(0) as i64;
    let rmax = pixels.iter().map(|p| p.0).max().unwrap_or(0) as i64;
    let cmin = pixels.iter().map(|p| p.1).min().unwrap_or(0) as i64;
    let cmax = pixels.iter().map(|p| p.1).max().unwrap_or(0) as i64;

    DetectionRecord {
        label,
        xcentroid: xc,
        ycentroid: yc,
        bbox_ixmin: cmin,
        bbox_ixmax: cmax + 1,
        bbox_iymin: rmin,
        bbox_iymax: rmax + 1,
        area: pixels.len(),
        semimajor_sigma: semimajor,
        semiminor_sigma: semiminor,
        orientation,
        ellipticity,
        flux,
        peak,
    }
}
