use serde::{Deserialize, Serialize};

use crate::image::{Image, SkyCoord};
use crate::io::ecsv::EcsvRecord;

/// Integer pixel box with exclusive upper bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ixmin: i64,
    pub ixmax: i64,
    pub iymin: i64,
    pub iymax: i64,
}

impl BoundingBox {
    pub fn new(ixmin: i64, ixmax: i64, iymin: i64, iymax: i64) -> Self {
        Self {
            ixmin,
            ixmax,
            iymin,
            iymax,
        }
    }

    /// Box of side `size` around a pixel position, bounds truncated toward
    /// zero: `[trunc(x - size/2), trunc(x + size/2))`.
    pub fn around(x: f64, y: f64, size: usize) -> Self {
        let half = size as f64 / 2.0;
        Self {
            ixmin: (x - half).trunc() as i64,
            ixmax: (x + half).trunc() as i64,
            iymin: (y - half).trunc() as i64,
            iymax: (y + half).trunc() as i64,
        }
    }

    pub fn width(&self) -> i64 {
        (self.ixmax - self.ixmin).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.iymax - self.iymin).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Overlapping region, `None` when the overlap area is zero.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let b = BoundingBox {
            ixmin: self.ixmin.max(other.ixmin),
            ixmax: self.ixmax.min(other.ixmax),
            iymin: self.iymin.max(other.iymin),
            iymax: self.iymax.min(other.iymax),
        };
        (b.ixmax > b.ixmin && b.iymax > b.iymin).then_some(b)
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersection(other).is_some()
    }

    /// Whether the box lies entirely within a `width x height` frame.
    pub fn within(&self, width: usize, height: usize) -> bool {
        self.ixmin >= 0 && self.iymin >= 0 && self.ixmax <= width as i64 && self.iymax <= height as i64
    }
}

/// A reference star with its position on one image.
#[derive(Clone, Debug, PartialEq)]
pub struct StarRecord {
    pub sky: SkyCoord,
    pub x: f64,
    pub y: f64,
    pub mag: f64,
    pub magerr: f64,
    pub signal_to_noise: f64,
    pub bbox: BoundingBox,
}

impl StarRecord {
    /// Place a star on `image` through its WCS.
    pub fn on_image(
        image: &Image,
        sky: SkyCoord,
        mag: f64,
        magerr: f64,
        signal_to_noise: f64,
        box_size: usize,
    ) -> Self {
        let (x, y) = image.sky_to_pixel(&sky);
        Self {
            sky,
            x,
            y,
            mag,
            magerr,
            signal_to_noise,
            bbox: BoundingBox::around(x, y, box_size),
        }
    }

    /// Recompute the pixel position and box against `image`.
    pub fn relocate(&mut self, image: &Image, box_size: usize) {
        let (x, y) = image.sky_to_pixel(&self.sky);
        self.x = x;
        self.y = y;
        self.bbox = BoundingBox::around(x, y, box_size);
    }
}

/// Star catalog table row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StarRow {
    pub ra: f64,
    pub dec: f64,
    pub x: f64,
    pub y: f64,
    pub mag: f64,
    pub magerr: f64,
    pub signal_to_noise: f64,
}

impl EcsvRecord for StarRow {
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("ra", "float64"),
        ("dec", "float64"),
        ("x", "float64"),
        ("y", "float64"),
        ("mag", "float64"),
        ("magerr", "float64"),
        ("signal_to_noise", "float64"),
    ];
}

impl From<&StarRecord> for StarRow {
    fn from(s: &StarRecord) -> Self {
        Self {
            ra: s.sky.ra,
            dec: s.sky.dec,
            x: s.x,
            y: s.y,
            mag: s.mag,
            magerr: s.magerr,
            signal_to_noise: s.signal_to_noise,
        }
    }
}
