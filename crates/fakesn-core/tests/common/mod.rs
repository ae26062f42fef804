#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use fakesn_core::image::{Image, Wcs};
use fakesn_core::psf::PsfModel;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Pixel scale of every synthetic image, arcsec/pixel.
pub const PIXEL_SCALE: f64 = 0.5;

/// Sky position of the reference pixel of every synthetic image.
pub const FIELD_CENTER: (f64, f64) = (150.0, 2.0);

/// North-up WCS with the field centre on the middle pixel of a
/// `width x height` frame.
pub fn make_wcs(width: usize, height: usize) -> Wcs {
    Wcs::from_scale(
        ((width as f64 + 1.0) / 2.0, (height as f64 + 1.0) / 2.0),
        FIELD_CENTER,
        PIXEL_SCALE,
    )
}

/// Flat sky plus seeded Gaussian noise.
pub fn sky_frame(width: usize, height: usize, sky: f64, sigma: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(sky, sigma).unwrap();
    Array2::from_shape_fn((height, width), |_| normal.sample(&mut rng))
}

/// Add an elliptical Gaussian of total `flux` centred on `(x, y)`.
pub fn add_gaussian(
    data: &mut Array2<f64>,
    x: f64,
    y: f64,
    flux: f64,
    sigma_x: f64,
    sigma_y: f64,
) {
    let norm = flux / (2.0 * std::f64::consts::PI * sigma_x * sigma_y);
    let reach = (5.0 * sigma_x.max(sigma_y)).ceil() as isize;
    let (h, w) = data.dim();
    for r in (y.round() as isize - reach)..=(y.round() as isize + reach) {
        for c in (x.round() as isize - reach)..=(x.round() as isize + reach) {
            if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
                continue;
            }
            let dx = (c as f64 - x) / sigma_x;
            let dy = (r as f64 - y) / sigma_y;
            data[[r as usize, c as usize]] += norm * (-0.5 * (dx * dx + dy * dy)).exp();
        }
    }
}

pub fn add_star(data: &mut Array2<f64>, x: f64, y: f64, flux: f64, sigma: f64) {
    add_gaussian(data, x, y, flux, sigma, sigma);
}

/// Noisy image with the standard synthetic WCS.
pub fn make_image(width: usize, height: usize, seed: u64) -> Image {
    Image::with_wcs(sky_frame(width, height, 100.0, 1.0, seed), make_wcs(width, height))
}

/// Noise-free zero image with the standard synthetic WCS.
pub fn blank_image(width: usize, height: usize) -> Image {
    Image::with_wcs(Array2::zeros((height, width)), make_wcs(width, height))
}

/// Unit-flux Gaussian PSF, 25x25 detector pixels.
pub fn unit_psf() -> PsfModel {
    PsfModel::gaussian(2.0, 25, 1).unwrap()
}

/// Gaia-style CSV with one row per `(x, y, flux, sn)` star on `image`.
pub fn write_gaia_csv(path: &Path, image: &Image, stars: &[(f64, f64, f64, f64)]) {
    let mut text = String::from(
        "ra,dec,phot_rp_mean_mag,phot_rp_mean_flux,phot_rp_mean_flux_error,phot_rp_mean_flux_over_error\n",
    );
    for &(x, y, flux, sn) in stars {
        let sky = image.pixel_to_sky(x, y);
        let mag = 25.0 - 2.5 * flux.log10();
        writeln!(
            text,
            "{:.10},{:.10},{mag:.4},{flux},{},{sn}",
            sky.ra,
            sky.dec,
            flux / sn
        )
        .unwrap();
    }
    std::fs::write(path, text).unwrap();
}
