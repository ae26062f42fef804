pub mod header;
pub mod wcs;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2};

use crate::error::{FakeSnError, Result};
use crate::io::paths::cache_path;
use crate::provenance::FakeSet;

pub use header::{Card, Commentary, Header, HeaderValue};
pub use wcs::{SkyCoord, Wcs};

/// A single science image: pixels, header, astrometry and the list of fakes
/// planted into it.
///
/// Pixel data is `f64`, shape = (height, width), indexed `[[y, x]]`.
/// Provenance keywords are not kept in `header`; they live in `fakes` and are
/// only flattened back into keywords when the image is written.
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Array2<f64>,
    pub header: Header,
    pub wcs: Wcs,
    pub fakes: FakeSet,
    /// File the image was read from, used to derive catalog cache paths.
    pub path: Option<PathBuf>,
}

impl Image {
    /// Build an image from pixels and a FITS header. The WCS is parsed from
    /// the header and any planted-fake keywords are lifted into `fakes`.
    pub fn new(data: Array2<f64>, mut header: Header) -> Result<Self> {
        if data.is_empty() {
            return Err(FakeSnError::InvalidDimensions {
                width: data.ncols(),
                height: data.nrows(),
            });
        }
        let wcs = Wcs::from_header(&header)?;
        let fakes = FakeSet::decode(&header)?;
        FakeSet::strip(&mut header);
        Ok(Self {
            data,
            header,
            wcs,
            fakes,
            path: None,
        })
    }

    /// Build an image from pixels and an explicit WCS. The WCS keywords are
    /// written into the returned header.
    pub fn with_wcs(data: Array2<f64>, wcs: Wcs) -> Self {
        let mut header = Header::new();
        wcs.write_header(&mut header);
        Self {
            data,
            header,
            wcs,
            fakes: FakeSet::default(),
            path: None,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        crate::io::fits::read_image(path)
    }

    /// Write the image, provenance keywords included, as a BITPIX -64 FITS file.
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::fits::write_image(self, path)
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn pixel_to_sky(&self, x: f64, y: f64) -> SkyCoord {
        self.wcs.pixel_to_sky(x, y)
    }

    pub fn sky_to_pixel(&self, sky: &SkyCoord) -> (f64, f64) {
        self.wcs.sky_to_pixel(sky)
    }

    /// Sky position of the image centre.
    pub fn center(&self) -> SkyCoord {
        self.pixel_to_sky(
            (self.width() as f64 - 1.0) / 2.0,
            (self.height() as f64 - 1.0) / 2.0,
        )
    }

    pub fn contains_fakes(&self) -> bool {
        self.fakes.contains_fakes()
    }

    /// Header as written to disk: the stored keywords plus the encoded
    /// provenance of every planted fake.
    pub fn to_fits_header(&self) -> Header {
        let mut header = self.header.clone();
        self.fakes.encode_into(&mut header);
        header
    }

    /// Subtract a per-pixel background model in place.
    pub fn subtract_background(&mut self, background: &Array2<f64>) -> Result<()> {
        if background.dim() != self.data.dim() {
            return Err(FakeSnError::InvalidDimensions {
                width: background.ncols(),
                height: background.nrows(),
            });
        }
        self.data -= background;
        Ok(())
    }

    /// Square cutout of side `size` around a sky position.
    ///
    /// The pixel containing the position lands on cutout pixel
    /// `(size / 2, size / 2)`. Pixels falling outside the frame are filled
    /// with NaN. The cutout keeps a WCS shifted to its own origin; provenance
    /// is not carried over.
    pub fn cutout(&self, center: &SkyCoord, size: usize) -> Result<Image> {
        if size == 0 {
            return Err(FakeSnError::InvalidInput("cutout size must be positive".into()));
        }
        let (x, y) = self.sky_to_pixel(center);
        let half = (size / 2) as isize;
        let x0 = x.round() as isize - half;
        let y0 = y.round() as isize - half;

        let mut data = Array2::from_elem((size, size), f64::NAN);
        let (h, w) = (self.height() as isize, self.width() as isize);
        let src_x = x0.max(0)..(x0 + size as isize).min(w);
        let src_y = y0.max(0)..(y0 + size as isize).min(h);
        if !src_x.is_empty() && !src_y.is_empty() {
            let dst_x = (src_x.start - x0) as usize..(src_x.end - x0) as usize;
            let dst_y = (src_y.start - y0) as usize..(src_y.end - y0) as usize;
            data.slice_mut(s![dst_y, dst_x]).assign(&self.data.slice(s![
                src_y.start as usize..src_y.end as usize,
                src_x.start as usize..src_x.end as usize
            ]));
        }

        let mut wcs = self.wcs.clone();
        wcs.crpix = (wcs.crpix.0 - x0 as f64, wcs.crpix.1 - y0 as f64);
        let mut header = self.header.clone();
        wcs.write_header(&mut header);

        Ok(Image {
            data,
            header,
            wcs,
            fakes: FakeSet::default(),
            path: None,
        })
    }

    /// `<root>_<suffix>.<extension>` next to the source file.
    pub fn sidecar_path(&self, suffix: &str, extension: &str) -> Result<PathBuf> {
        let path = self.path.as_deref().ok_or_else(|| {
            FakeSnError::MissingPrerequisite("image has no source path for cache files".into())
        })?;
        Ok(cache_path(path, suffix, extension))
    }
}

/// Anything that can answer questions about planted fakes: a full image, or
/// just a header read from disk.
pub trait ImageLike {
    /// Header as it would be written to disk, provenance included.
    fn fits_header(&self) -> Cow<'_, Header>;

    /// Pixel data, when available.
    fn pixels(&self) -> Option<&Array2<f64>>;

    /// Planted fakes recorded for this image.
    fn fake_set(&self) -> Result<FakeSet> {
        FakeSet::decode(&self.fits_header())
    }
}

impl ImageLike for Image {
    fn fits_header(&self) -> Cow<'_, Header> {
        Cow::Owned(self.to_fits_header())
    }

    fn pixels(&self) -> Option<&Array2<f64>> {
        Some(&self.data)
    }

    fn fake_set(&self) -> Result<FakeSet> {
        Ok(self.fakes.clone())
    }
}

/// A bare header standing in for an image.
#[derive(Clone, Debug, Default)]
pub struct HeaderOnly(pub Header);

impl ImageLike for HeaderOnly {
    fn fits_header(&self) -> Cow<'_, Header> {
        Cow::Borrowed(&self.0)
    }

    fn pixels(&self) -> Option<&Array2<f64>> {
        None
    }
}
