//! Gnomonic (TAN) world coordinate system read from FITS header keywords.
//!
//! Pixel coordinates throughout the crate are zero-based: the centre of the
//! first pixel is `(0.0, 0.0)`. FITS reference pixels (`CRPIX`) are one-based,
//! so the conversion adds one before applying the linear transform.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::header::Header;
use crate::error::{FakeSnError, Result};

/// A sky position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Great-circle separation in degrees (haversine).
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let (ra1, dec1) = (self.ra.to_radians(), self.dec.to_radians());
        let (ra2, dec2) = (other.ra.to_radians(), other.dec.to_radians());
        let sin_ddec = ((dec2 - dec1) / 2.0).sin();
        let sin_dra = ((ra2 - ra1) / 2.0).sin();
        let a = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
        (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Wcs {
    /// Reference pixel (CRPIX1, CRPIX2), one-based FITS convention.
    pub crpix: (f64, f64),
    /// Reference sky position (CRVAL1 = RA, CRVAL2 = Dec) in degrees.
    pub crval: (f64, f64),
    /// Linear transform from pixel offset to intermediate world coordinates
    /// (degrees): `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: [[f64; 2]; 2],
    /// Reference frame (`RADESYS`), ICRS when absent.
    pub frame: String,
}

impl Wcs {
    pub fn new(crpix: (f64, f64), crval: (f64, f64), cd: [[f64; 2]; 2]) -> Self {
        Self {
            crpix,
            crval,
            cd,
            frame: "ICRS".to_string(),
        }
    }

    /// North-up WCS with RA increasing to the left, `scale_arcsec` per pixel.
    pub fn from_scale(crpix: (f64, f64), crval: (f64, f64), scale_arcsec: f64) -> Self {
        let s = scale_arcsec / 3600.0;
        Self::new(crpix, crval, [[-s, 0.0], [0.0, s]])
    }

    /// True when the header describes SIP polynomial distortion.
    pub fn has_sip(header: &Header) -> bool {
        let sip_ctype = ["CTYPE1", "CTYPE2"]
            .iter()
            .filter_map(|k| header.get_str(k))
            .any(|c| c.ends_with("-SIP"));
        sip_ctype || header.contains("A_ORDER") || header.contains("B_ORDER")
    }

    /// Parse a TAN solution from header keywords.
    ///
    /// The linear part is taken from `CDi_j` when present, else from
    /// `PCi_j` scaled by `CDELTi`, else from `CDELTi` with an optional
    /// `CROTA2` rotation. SIP distortion terms are not applied; a warning
    /// is logged when the header carries them.
    pub fn from_header(header: &Header) -> Result<Self> {
        if let Some(ctype) = header.get_str("CTYPE1") {
            if !ctype.contains("TAN") {
                return Err(FakeSnError::InvalidFits(format!(
                    "unsupported projection '{ctype}', only TAN is handled"
                )));
            }
        }
        if Self::has_sip(header) {
            warn!(
                a_order = header.get_i64("A_ORDER"),
                b_order = header.get_i64("B_ORDER"),
                "SIP distortion present, using the linear TAN solution only"
            );
        }

        let crpix = (header.require_f64("CRPIX1")?, header.require_f64("CRPIX2")?);
        let crval = (header.require_f64("CRVAL1")?, header.require_f64("CRVAL2")?);

        let cd = if header.contains("CD1_1") || header.contains("CD2_2") {
            [
                [
                    header.get_f64("CD1_1").unwrap_or(0.0),
                    header.get_f64("CD1_2").unwrap_or(0.0),
                ],
                [
                    header.get_f64("CD2_1").unwrap_or(0.0),
                    header.get_f64("CD2_2").unwrap_or(0.0),
                ],
            ]
        } else {
            let cdelt1 = header.require_f64("CDELT1")?;
            let cdelt2 = header.require_f64("CDELT2")?;
            if header.contains("PC1_1") || header.contains("PC2_2") {
                let pc = [
                    [
                        header.get_f64("PC1_1").unwrap_or(1.0),
                        header.get_f64("PC1_2").unwrap_or(0.0),
                    ],
                    [
                        header.get_f64("PC2_1").unwrap_or(0.0),
                        header.get_f64("PC2_2").unwrap_or(1.0),
                    ],
                ];
                [
                    [cdelt1 * pc[0][0], cdelt1 * pc[0][1]],
                    [cdelt2 * pc[1][0], cdelt2 * pc[1][1]],
                ]
            } else {
                let (sin_r, cos_r) = header.get_f64("CROTA2").unwrap_or(0.0).to_radians().sin_cos();
                [
                    [cdelt1 * cos_r, -cdelt2 * sin_r],
                    [cdelt1 * sin_r, cdelt2 * cos_r],
                ]
            }
        };

        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det.abs() < 1e-20 {
            return Err(FakeSnError::InvalidFits("singular WCS matrix".into()));
        }

        let frame = header
            .get_str("RADESYS")
            .or_else(|| header.get_str("RADECSYS"))
            .unwrap_or("ICRS")
            .trim()
            .to_string();

        Ok(Self {
            crpix,
            crval,
            cd,
            frame,
        })
    }

    /// Write the solution back as `CTYPE`/`CRPIX`/`CRVAL`/`CD` keywords,
    /// dropping any `PC`/`CDELT`/`CROTA` form it replaces.
    pub fn write_header(&self, header: &mut Header) {
        header.retain(|c| {
            !(c.key.starts_with("PC1_")
                || c.key.starts_with("PC2_")
                || c.key.starts_with("CDELT")
                || c.key.starts_with("CROTA"))
        });
        header.set("CTYPE1", "RA---TAN");
        header.set("CTYPE2", "DEC--TAN");
        header.set("CRPIX1", self.crpix.0);
        header.set("CRPIX2", self.crpix.1);
        header.set("CRVAL1", self.crval.0);
        header.set("CRVAL2", self.crval.1);
        header.set("CD1_1", self.cd[0][0]);
        header.set("CD1_2", self.cd[0][1]);
        header.set("CD2_1", self.cd[1][0]);
        header.set("CD2_2", self.cd[1][1]);
        header.set("RADESYS", self.frame.as_str());
    }

    /// Zero-based pixel position to sky position.
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> SkyCoord {
        let dx = x + 1.0 - self.crpix.0;
        let dy = y + 1.0 - self.crpix.1;

        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval.0.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2((xi * xi + denom * denom).sqrt());

        SkyCoord {
            ra: ra.to_degrees().rem_euclid(360.0),
            dec: dec.to_degrees(),
        }
    }

    /// Sky position to zero-based pixel position.
    pub fn sky_to_pixel(&self, sky: &SkyCoord) -> (f64, f64) {
        let ra = sky.ra.to_radians();
        let ra0 = self.crval.0.to_radians();
        let (sin_dec, cos_dec) = sky.dec.to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (ra - ra0).sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;

        (self.crpix.0 + dx - 1.0, self.crpix.1 + dy - 1.0)
    }

    /// Mean pixel scale in degrees per pixel.
    pub fn pixel_scale_deg(&self) -> f64 {
        let scale_x = (self.cd[0][0].powi(2) + self.cd[1][0].powi(2)).sqrt();
        let scale_y = (self.cd[0][1].powi(2) + self.cd[1][1].powi(2)).sqrt();
        (scale_x + scale_y) / 2.0
    }

    /// Field of view (width, height) in degrees for an image of the given size.
    pub fn field_of_view(&self, width: usize, height: usize) -> (f64, f64) {
        let scale = self.pixel_scale_deg();
        (scale * width as f64, scale * height as f64)
    }
}
