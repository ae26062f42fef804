mod common;

use approx::assert_relative_eq;
use fakesn_core::detect::{
    detect_host_galaxies, detect_sources, estimate_background, gaussian_smooth, label_regions,
    measure_source, DetectionCatalog, DetectionConfig, DetectionRecord,
};
use fakesn_core::error::FakeSnError;
use fakesn_core::stats::SigmaClipParams;
use ndarray::Array2;
use tempfile::TempDir;

use common::{add_gaussian, add_star, make_image, sky_frame};

fn record(label: u32, ellipticity: f64, area: usize) -> DetectionRecord {
    DetectionRecord {
        label,
        xcentroid: 10.0 * label as f64,
        ycentroid: 5.0,
        bbox_ixmin: 0,
        bbox_ixmax: 1,
        bbox_iymin: 0,
        bbox_iymax: 1,
        area,
        semimajor_sigma: 2.0,
        semiminor_sigma: 2.0 * (1.0 - ellipticity),
        orientation: 0.0,
        ellipticity,
        flux: 100.0,
        peak: 10.0,
    }
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

#[test]
fn test_label_regions_drops_small() {
    let mut mask = Array2::from_elem((10, 12), false);
    for r in 1..4 {
        for c in 1..4 {
            mask[[r, c]] = true;
        }
    }
    // Diagonal neighbours join under 8-connectivity.
    mask[[4, 4]] = true;
    mask[[8, 10]] = true;

    let segmap = label_regions(&mask, 2);
    assert_eq!(segmap.segments.len(), 1);
    let seg = &segmap.segments[0];
    assert_eq!(seg.label, 1);
    assert_eq!(seg.area, 10);
    assert_eq!(seg.bbox, (1, 4, 1, 4));
    assert_eq!(segmap.labels[[8, 10]], 0);
    assert_eq!(segmap.pixels(seg).len(), 10);
}

#[test]
fn test_label_regions_raster_order() {
    let mut mask = Array2::from_elem((6, 6), false);
    mask[[4, 0]] = true;
    mask[[0, 5]] = true;
    let segmap = label_regions(&mask, 1);
    assert_eq!(segmap.labels[[0, 5]], 1);
    assert_eq!(segmap.labels[[4, 0]], 2);
}

#[test]
fn test_smoothing_preserves_flux() {
    let mut data = Array2::zeros((41, 41));
    data[[20, 20]] = 10.0;
    let smoothed = gaussian_smooth(&data, 3.0);
    assert_relative_eq!(smoothed.sum(), 10.0, max_relative = 1e-9);
    assert!(smoothed[[20, 20]] < 10.0);
    assert_relative_eq!(smoothed[[20, 19]], smoothed[[20, 21]], epsilon = 1e-12);
}

#[test]
fn test_background_flat_sky() {
    let data = sky_frame(200, 200, 100.0, 1.0, 31);
    let bkg = estimate_background(&data, 50, &SigmaClipParams::default());
    assert_relative_eq!(bkg.background_median, 100.0, epsilon = 0.1);
    assert_relative_eq!(bkg.rms_median, 1.0, epsilon = 0.1);
    assert_eq!(bkg.background.dim(), (200, 200));
}

#[test]
fn test_background_follows_gradient() {
    let mut data = sky_frame(200, 200, 0.0, 0.5, 32);
    for ((_, c), v) in data.indexed_iter_mut() {
        *v += 100.0 + 0.1 * c as f64;
    }
    let bkg = estimate_background(&data, 50, &SigmaClipParams::default());
    // Interior pixels between tile centres interpolate the ramp.
    assert!((bkg.background[[100, 100]] - 110.0).abs() < 1.0);
    assert!(bkg.background[[100, 150]] > bkg.background[[100, 50]]);
}

#[test]
fn test_subtract_background_in_place() {
    let mut image = make_image(200, 200, 30);
    let bkg = estimate_background(&image.data, 50, &SigmaClipParams::default());
    let expected = &image.data - &bkg.background;

    image.subtract_background(&bkg.background).unwrap();
    assert_eq!(image.data, expected);
    let mean = image.data.mean().unwrap();
    assert!(mean.abs() < 0.1, "mean after subtraction {mean}");
}

#[test]
fn test_subtract_background_shape_mismatch() {
    let mut image = make_image(40, 30, 30);
    let before = image.data.clone();
    let err = image.subtract_background(&Array2::zeros((10, 10))).unwrap_err();
    assert!(matches!(err, FakeSnError::InvalidDimensions { width: 10, height: 10 }));
    assert_eq!(image.data, before);
}

#[test]
fn test_background_ignores_bright_source() {
    let mut data = sky_frame(100, 100, 50.0, 1.0, 33);
    add_star(&mut data, 50.0, 50.0, 1e5, 2.0);
    let bkg = estimate_background(&data, 100, &SigmaClipParams::default());
    assert_relative_eq!(bkg.background_median, 50.0, epsilon = 0.2);
}

#[test]
fn test_measure_round_and_elongated() {
    let mut data = Array2::zeros((40, 40));
    add_gaussian(&mut data, 20.0, 20.0, 1000.0, 3.0, 1.0);
    let pixels: Vec<(usize, usize)> = data
        .indexed_iter()
        .filter(|(_, &v)| v > 0.01)
        .map(|(p, _)| p)
        .collect();
    let rec = measure_source(&data, 7, &pixels);
    assert_eq!(rec.label, 7);
    assert_relative_eq!(rec.xcentroid, 20.0, epsilon = 1e-9);
    assert_relative_eq!(rec.ycentroid, 20.0, epsilon = 1e-9);
    assert!(rec.semimajor_sigma > 2.5 && rec.semimajor_sigma < 3.1);
    assert!(rec.semiminor_sigma > 0.8 && rec.semiminor_sigma < 1.1);
    assert!(rec.orientation.abs() < 1e-6);
    assert!(rec.ellipticity > 0.6);
    assert_eq!(rec.bbox().height(), rec.bbox_iymax - rec.bbox_iymin);
    assert_eq!(rec.position(), (rec.xcentroid, rec.ycentroid));
}

#[test]
fn test_measure_vertical_orientation() {
    let mut data = Array2::zeros((40, 40));
    add_gaussian(&mut data, 20.0, 20.0, 1000.0, 1.0, 3.0);
    let pixels: Vec<(usize, usize)> = data
        .indexed_iter()
        .filter(|(_, &v)| v > 0.01)
        .map(|(p, _)| p)
        .collect();
    let rec = measure_source(&data, 1, &pixels);
    assert_relative_eq!(rec.orientation.abs(), 90.0, epsilon = 1e-6);
}

#[test]
fn test_measure_all_negative_uses_uniform_weights() {
    let data = Array2::from_elem((5, 5), -1.0);
    let rec = measure_source(&data, 1, &[(1, 1), (1, 3), (3, 1), (3, 3)]);
    assert_relative_eq!(rec.xcentroid, 2.0);
    assert_relative_eq!(rec.ycentroid, 2.0);
    assert_relative_eq!(rec.flux, -4.0);
}

// ---------------------------------------------------------------------------
// Source detection
// ---------------------------------------------------------------------------

#[test]
fn test_detect_single_source() {
    let mut image = make_image(200, 200, 34);
    add_star(&mut image.data, 80.3, 120.6, 2000.0, 2.0);
    let catalog = detect_sources(&image, &DetectionConfig::default()).unwrap();

    assert_eq!(catalog.len(), 1);
    let src = &catalog.sources[0];
    assert_eq!(src.label, 1);
    assert!((src.xcentroid - 80.3).abs() < 0.2);
    assert!((src.ycentroid - 120.6).abs() < 0.2);
    assert!(src.flux > 1500.0 && src.flux < 2100.0, "flux {}", src.flux);
    assert!(src.ellipticity < 0.2);
}

#[test]
fn test_detect_nothing_on_blank_sky() {
    let image = make_image(200, 200, 35);
    let catalog = detect_sources(&image, &DetectionConfig::default()).unwrap();
    assert!(catalog.is_empty());
}

#[test]
fn test_threshold_controls_detection() {
    let mut image = make_image(200, 200, 36);
    add_star(&mut image.data, 100.0, 100.0, 150.0, 2.0);
    let loose = detect_sources(&image, &DetectionConfig::default()).unwrap();
    let strict = DetectionConfig {
        nsigma: 20.0,
        ..Default::default()
    };
    let tight = detect_sources(&image, &strict).unwrap();
    assert_eq!(loose.len(), 1);
    assert!(tight.is_empty());
}

#[test]
fn test_deblend_splits_blended_pair() {
    let mut image = make_image(200, 200, 37);
    add_star(&mut image.data, 90.0, 100.0, 3000.0, 2.0);
    add_star(&mut image.data, 99.0, 100.0, 3000.0, 2.0);

    let merged = detect_sources(&image, &DetectionConfig::default()).unwrap();
    assert_eq!(merged.len(), 1);

    let config = DetectionConfig {
        deblend: true,
        ..Default::default()
    };
    let split = detect_sources(&image, &config).unwrap();
    assert_eq!(split.len(), 2);
    let mut xs: Vec<f64> = split.iter().map(|s| s.xcentroid).collect();
    xs.sort_by(f64::total_cmp);
    assert!((xs[0] - 90.0).abs() < 1.0, "left {}", xs[0]);
    assert!((xs[1] - 99.0).abs() < 1.0, "right {}", xs[1]);
    let labels: Vec<u32> = split.iter().map(|s| s.label).collect();
    assert_eq!(labels, vec![1, 2]);
}

#[test]
fn test_deblend_keeps_single_source() {
    let mut image = make_image(200, 200, 38);
    add_star(&mut image.data, 100.0, 100.0, 3000.0, 2.0);
    let config = DetectionConfig {
        deblend: true,
        ..Default::default()
    };
    assert_eq!(detect_sources(&image, &config).unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Host galaxies
// ---------------------------------------------------------------------------

#[test]
fn test_host_cut_selects_elongated() {
    let mut image = make_image(200, 200, 39);
    add_gaussian(&mut image.data, 60.0, 60.0, 30000.0, 6.0, 2.0);
    add_star(&mut image.data, 150.0, 150.0, 3000.0, 2.0);
    let catalog = detect_sources(&image, &DetectionConfig::default()).unwrap();
    assert_eq!(catalog.len(), 2);

    let hosts = detect_host_galaxies(&catalog, 0.35, true, 8);
    assert_eq!(hosts.len(), 1);
    let host = &hosts[0];
    assert!((host.xcentroid - 60.0).abs() < 0.5);
    assert!(host.orientation.abs() < 5.0, "orientation {}", host.orientation);
}

#[test]
fn test_host_cut_cosmic_rays() {
    let catalog = DetectionCatalog {
        sources: vec![record(1, 0.8, 3), record(2, 0.5, 40), record(3, 0.1, 100)],
        config: DetectionConfig::default(),
    };
    let with_cut = detect_host_galaxies(&catalog, 0.35, true, 8);
    assert_eq!(with_cut.iter().map(|h| h.label).collect::<Vec<_>>(), vec![2]);
    let without = detect_host_galaxies(&catalog, 0.35, false, 8);
    assert_eq!(without.iter().map(|h| h.label).collect::<Vec<_>>(), vec![1, 2]);
}

// ---------------------------------------------------------------------------
// Catalog files
// ---------------------------------------------------------------------------

#[test]
fn test_catalog_round_trip_with_parameters() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("diff_detections.ecsv");
    let config = DetectionConfig {
        nsigma: 3.5,
        deblend: true,
        ..Default::default()
    };
    let catalog = DetectionCatalog {
        sources: vec![record(1, 0.2, 30), record(2, 0.6, 55)],
        config: config.clone(),
    };
    catalog.write(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("# %ECSV 1.0"));
    assert!(text.contains("detect_params"));

    let back = DetectionCatalog::read(&path).unwrap();
    assert_eq!(back.config, config);
    assert_eq!(back.sources, catalog.sources);
}

#[test]
fn test_plain_catalog_uses_default_parameters() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(
        &path,
        "label xcentroid ycentroid bbox_ixmin bbox_ixmax bbox_iymin bbox_iymax area \
         semimajor_sigma semiminor_sigma orientation ellipticity flux peak\n\
         1 10.5 20.5 8 13 18 23 25 2.0 1.5 30.0 0.25 500.0 40.0\n",
    )
    .unwrap();
    let back = DetectionCatalog::read(&path).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back.config, DetectionConfig::default());
    assert_relative_eq!(back.sources[0].xcentroid, 10.5);
}
