mod common;

use approx::assert_relative_eq;
use fakesn_core::catalog::{CacheConfig, StarRecord};
use fakesn_core::error::FakeSnError;
use fakesn_core::image::Image;
use fakesn_core::psf::{
    build_epsf, build_epsf_cached, extract_psf_stars, load_epsf, save_epsf, CleanStarSet,
    EpsfConfig, EpsfFit, IterativeEpsfBuilder, PsfModel, PsfStarConfig,
};
use ndarray::Array2;
use tempfile::TempDir;

use common::{add_star, make_image};

const STAR_SIGMA: f64 = 1.5;
const STAR_FLUX: f64 = 20000.0;

/// 3x3 grid of isolated stars at varied sub-pixel phases.
fn star_field() -> (Image, Vec<StarRecord>) {
    let mut image = make_image(240, 240, 21);
    let mut stars = Vec::new();
    let phases = [0.1, 0.35, 0.6, 0.85];
    let mut k = 0;
    for gy in 0..3 {
        for gx in 0..3 {
            let x = 45.0 + 70.0 * gx as f64 + phases[k % 4];
            let y = 45.0 + 70.0 * gy as f64 + phases[(k + 1) % 4];
            k += 1;
            add_star(&mut image.data, x, y, STAR_FLUX, STAR_SIGMA);
            stars.push(StarRecord::on_image(&image, image.pixel_to_sky(x, y), 14.0, 0.005, 800.0, 25));
        }
    }
    (image, stars)
}

fn assert_same_fit(a: &EpsfFit, b: &EpsfFit) {
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.converged, b.converged);
    assert_eq!(a.model.data.dim(), b.model.data.dim());
    for (x, y) in a.model.data.iter().zip(b.model.data.iter()) {
        assert_relative_eq!(x, y, max_relative = 1e-12);
    }
    assert_eq!(a.fitted_stars.len(), b.fitted_stars.len());
}

fn clean_stars() -> CleanStarSet {
    let (image, stars) = star_field();
    extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[test]
fn test_gaussian_model_is_normalised() {
    let psf = PsfModel::gaussian(1.5, 21, 4).unwrap();
    assert_eq!(psf.pixel_shape(), (21, 21));
    assert_relative_eq!(psf.data.sum(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(psf.total_flux(), 1.0, max_relative = 1e-3);
    assert_relative_eq!((&psf * 300.0).total_flux(), 300.0, max_relative = 1e-3);
    assert_relative_eq!(psf.with_flux(42.0).flux, 42.0);
}

#[test]
fn test_model_rejects_bad_kernels() {
    assert!(PsfModel::new(Array2::zeros((5, 5)), 1).is_err());
    assert!(PsfModel::new(Array2::ones((5, 5)), 0).is_err());
    assert!(PsfModel::gaussian(0.0, 10, 1).is_err());
}

#[test]
fn test_model_zero_outside_grid() {
    let psf = PsfModel::gaussian(1.0, 9, 1).unwrap();
    assert_eq!(psf.evaluate(20.0, 0.0), 0.0);
    assert!(psf.evaluate(0.0, 0.0) > psf.evaluate(1.0, 0.0));
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

#[test]
fn test_build_recovers_star_shape() {
    let stars = clean_stars();
    assert_eq!(stars.len(), 9);

    let fit = build_epsf(&stars, &EpsfConfig::default()).unwrap();
    assert_eq!(fit.model.oversampling, 2);
    assert_eq!(fit.model.data.dim(), (51, 51));
    assert_relative_eq!(fit.model.total_flux(), 1.0, max_relative = 0.05);
    assert!(fit.iterations >= 1);

    // A Gaussian drops to exp(-1/2) of its peak at one sigma.
    let ratio = fit.model.evaluate(STAR_SIGMA, 0.0) / fit.model.evaluate(0.0, 0.0);
    assert!(ratio > 0.45 && ratio < 0.75, "profile ratio {ratio}");

    assert_eq!(fit.fitted_stars.len(), 9);
    for (fitted, star) in fit.fitted_stars.iter().zip(&stars.stars) {
        assert!((fitted.x - star.star.x).abs() < 0.5);
        assert!((fitted.y - star.star.y).abs() < 0.5);
        assert_relative_eq!(fitted.flux, STAR_FLUX, max_relative = 0.15);
    }
}

#[test]
fn test_build_single_iteration() {
    let config = EpsfConfig {
        max_iters: 1,
        ..Default::default()
    };
    let fit = build_epsf(&clean_stars(), &config).unwrap();
    assert_eq!(fit.iterations, 1);
}

#[test]
fn test_build_empty_star_set() {
    let err = build_epsf(&CleanStarSet::default(), &EpsfConfig::default()).unwrap_err();
    assert!(matches!(err, FakeSnError::EmptyStarSet));
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

#[test]
fn test_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    let fit = build_epsf(&clean_stars(), &EpsfConfig::default()).unwrap();
    save_epsf(&path, &fit).unwrap();
    assert_same_fit(&load_epsf(&path).unwrap(), &fit);
}

#[test]
fn test_cached_build_reuses_saved_model() {
    let dir = TempDir::new().unwrap();
    let (mut image, stars) = star_field();
    image.path = Some(dir.path().join("search.fits"));
    let fitter = IterativeEpsfBuilder::new(EpsfConfig::default());
    let cache = CacheConfig::default();

    let first = build_epsf_cached(&image, &fitter, &cache, || {
        extract_psf_stars(&image, &stars, &PsfStarConfig::default())
    })
    .unwrap();
    assert!(dir.path().join("search_epsf.json").is_file());

    // A cache hit never asks for stars.
    let second = build_epsf_cached(&image, &fitter, &cache, || Err(FakeSnError::EmptyStarSet))
        .unwrap();
    assert_same_fit(&second, &first);

    let overwrite = CacheConfig {
        overwrite: true,
        ..Default::default()
    };
    let rebuilt = build_epsf_cached(&image, &fitter, &overwrite, || Err(FakeSnError::EmptyStarSet));
    assert!(matches!(rebuilt, Err(FakeSnError::EmptyStarSet)));
}

#[test]
fn test_cache_needs_source_path() {
    let (image, _) = star_field();
    let fitter = IterativeEpsfBuilder::new(EpsfConfig::default());
    let err = build_epsf_cached(&image, &fitter, &CacheConfig::default(), || {
        Ok(CleanStarSet::default())
    })
    .unwrap_err();
    assert!(matches!(err, FakeSnError::MissingPrerequisite(_)));

    let ok = build_epsf_cached(&image, &fitter, &CacheConfig::disabled(), clean_stars_ok);
    assert!(ok.is_ok());
}

fn clean_stars_ok() -> fakesn_core::error::Result<CleanStarSet> {
    Ok(clean_stars())
}
