//! Bookkeeping for planted fakes and its flattened header form.
//!
//! Each fake is written as a group of keywords `FK<iii><field>` where `<iii>`
//! is the zero-padded index. Summary keywords `FAKESN`, `N_FAKE` and `F_EPSF`
//! describe the set as a whole.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::{FAKE_INDEX_WIDTH, MAX_N_PLANTS};
use crate::error::{FakeSnError, Result};
use crate::image::{Header, HeaderValue};

pub const KEY_CONTAINS_FAKES: &str = "FAKESN";
pub const KEY_N_FAKE: &str = "N_FAKE";
pub const KEY_PSF_FLUX: &str = "F_EPSF";

/// One planted fake on one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FakeRecord {
    pub index: usize,
    /// Zero-based pixel position on the image it was planted in.
    pub x: f64,
    pub y: f64,
    /// Sky position (degrees) computed from the image WCS at planting time.
    pub ra: f64,
    pub dec: f64,
    /// Multiplier applied to the PSF model.
    pub scale: f64,
    /// Total flux added to the image.
    pub flux: f64,
    /// Source model identifier.
    pub model: String,
    /// Whether detection recovered this fake; `None` until matched.
    pub detected: Option<bool>,
}

impl FakeRecord {
    /// Zero-padded identifier used in keywords and catalogs, e.g. `"007"`.
    pub fn id(&self) -> String {
        format_index(self.index)
    }
}

pub fn format_index(index: usize) -> String {
    format!("{index:0width$}", width = FAKE_INDEX_WIDTH)
}

/// `FK<iii><field>`
pub fn fake_key(index: usize, field: &str) -> String {
    format!("FK{}{}", format_index(index), field)
}

/// Ordered set of fakes planted in an image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FakeSet {
    pub records: Vec<FakeRecord>,
    /// Total flux of the unscaled PSF model used for the most recent batch.
    pub psf_flux: Option<f64>,
}

impl FakeSet {
    pub fn contains_fakes(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FakeRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FakeRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    /// Index the next planted fake will receive.
    pub fn next_index(&self) -> usize {
        self.records.iter().map(|r| r.index + 1).max().unwrap_or(0)
    }

    /// Fail unless `additional` more fakes fit under the index cap.
    pub fn check_capacity(&self, additional: usize) -> Result<()> {
        let requested = self.next_index() + additional;
        if requested > MAX_N_PLANTS {
            return Err(FakeSnError::TooManyFakes {
                requested,
                max: MAX_N_PLANTS,
            });
        }
        Ok(())
    }

    pub fn push(&mut self, record: FakeRecord) -> Result<()> {
        if record.index >= MAX_N_PLANTS {
            return Err(FakeSnError::TooManyFakes {
                requested: record.index + 1,
                max: MAX_N_PLANTS,
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn set_detected(&mut self, index: usize, detected: bool) {
        if let Some(r) = self.records.iter_mut().find(|r| r.index == index) {
            r.detected = Some(detected);
        }
    }

    /// Flatten into header keywords, replacing any existing provenance.
    pub fn encode_into(&self, header: &mut Header) {
        Self::strip(header);
        if self.records.is_empty() {
            return;
        }
        header.set(KEY_CONTAINS_FAKES, true);
        header.set(KEY_N_FAKE, self.records.len());
        if let Some(f) = self.psf_flux {
            header.set(KEY_PSF_FLUX, f);
        }
        for r in &self.records {
            header.set(&fake_key(r.index, "X"), r.x);
            header.set(&fake_key(r.index, "Y"), r.y);
            header.set(&fake_key(r.index, "RA"), r.ra);
            header.set(&fake_key(r.index, "DEC"), r.dec);
            header.set(&fake_key(r.index, "SCA"), r.scale);
            header.set(&fake_key(r.index, "F"), r.flux);
            header.set(&fake_key(r.index, "MOD"), r.model.as_str());
            if let Some(det) = r.detected {
                header.set(&fake_key(r.index, "DET"), det);
            }
        }
    }

    /// Rebuild the set from header keywords. A header without provenance
    /// yields an empty set.
    pub fn decode(header: &Header) -> Result<FakeSet> {
        let indices: BTreeSet<usize> = header.keys().filter_map(parse_fake_index).collect();

        let mut records = Vec::with_capacity(indices.len());
        for index in indices {
            let num = |field: &str| -> Result<f64> {
                let key = fake_key(index, field);
                match header.get(&key) {
                    Some(v) => v.as_f64().ok_or_else(|| {
                        FakeSnError::InvalidFits(format!("keyword {key} is not numeric: {v}"))
                    }),
                    None => Err(FakeSnError::MissingHeaderKey(key)),
                }
            };
            let opt_num = |field: &str| header.get_f64(&fake_key(index, field));

            let x = num("X")?;
            let y = num("Y")?;
            let scale = opt_num("SCA").unwrap_or(1.0);
            records.push(FakeRecord {
                index,
                x,
                y,
                ra: opt_num("RA").unwrap_or(f64::NAN),
                dec: opt_num("DEC").unwrap_or(f64::NAN),
                scale,
                flux: opt_num("F").unwrap_or(f64::NAN),
                model: header
                    .get(&fake_key(index, "MOD"))
                    .map(HeaderValue::to_string)
                    .unwrap_or_default(),
                detected: header.get_bool(&fake_key(index, "DET")),
            });
        }

        if let Some(n) = header.get_i64(KEY_N_FAKE) {
            if n as usize != records.len() {
                warn!(
                    declared = n,
                    found = records.len(),
                    "N_FAKE disagrees with the number of fake keyword groups"
                );
            }
        }

        Ok(FakeSet {
            records,
            psf_flux: header.get_f64(KEY_PSF_FLUX),
        })
    }

    /// Remove every provenance keyword from a header.
    pub fn strip(header: &mut Header) {
        header.retain(|c| {
            parse_fake_index(&c.key).is_none()
                && c.key != KEY_CONTAINS_FAKES
                && c.key != KEY_N_FAKE
                && c.key != KEY_PSF_FLUX
        });
    }
}

/// Index of an `FK<iii>...` keyword, if it is one.
fn parse_fake_index(key: &str) -> Option<usize> {
    let digits = key.strip_prefix("FK")?.get(..FAKE_INDEX_WIDTH)?;
    if key.len() <= 2 + FAKE_INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
