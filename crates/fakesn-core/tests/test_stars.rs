mod common;

use fakesn_core::catalog::{BoundingBox, StarRecord};
use fakesn_core::image::Image;
use fakesn_core::psf::stars::overlapping;
use fakesn_core::psf::{extract_psf_stars, PsfStarConfig};

use common::{add_star, make_image};

/// Five catalog stars; the second and third sit 10 px apart so their
/// 25 px boxes overlap.
const FIELD: [(f64, f64, f64); 5] = [
    (40.3, 40.2, 5000.0),
    (100.4, 60.3, 5000.0),
    (110.2, 65.1, 5000.0),
    (160.2, 40.4, 5000.0),
    (100.4, 150.3, 20000.0),
];

fn field_image() -> Image {
    let mut image = make_image(200, 200, 11);
    for &(x, y, flux) in &FIELD {
        add_star(&mut image.data, x, y, flux, 2.0);
    }
    image
}

fn catalog(image: &Image, stars: &[(f64, f64, f64)], sn: f64) -> Vec<StarRecord> {
    stars
        .iter()
        .map(|&(x, y, _)| StarRecord::on_image(image, image.pixel_to_sky(x, y), 15.0, 0.01, sn, 25))
        .collect()
}

// ---------------------------------------------------------------------------
// Overlap detection
// ---------------------------------------------------------------------------

#[test]
fn test_overlapping_marks_both_members() {
    let boxes = [
        BoundingBox::new(0, 10, 0, 10),
        BoundingBox::new(5, 15, 5, 15),
        BoundingBox::new(20, 30, 20, 30),
    ];
    let excluded = overlapping(&boxes);
    assert_eq!(excluded.into_iter().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_touching_boxes_do_not_overlap() {
    let boxes = [BoundingBox::new(0, 10, 0, 10), BoundingBox::new(10, 20, 0, 10)];
    assert!(overlapping(&boxes).is_empty());
}

#[test]
fn test_box_around_truncates() {
    let b = BoundingBox::around(40.7, 20.2, 25);
    assert_eq!(b, BoundingBox::new(28, 53, 7, 32));
    assert!(b.within(60, 40));
    assert!(!BoundingBox::around(3.0, 20.0, 25).within(60, 40));
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[test]
fn test_overlapping_pair_removed() {
    let image = field_image();
    let stars = catalog(&image, &FIELD, 500.0);
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();

    assert_eq!(clean.counts.candidates, 5);
    assert_eq!(clean.counts.isolated, 3);
    assert_eq!(clean.len(), 3);
    let xs: Vec<i64> = clean.stars.iter().map(|s| s.star.x.round() as i64).collect();
    assert_eq!(xs, vec![40, 160, 100]);
    assert!(clean.degraded);
}

#[test]
fn test_cutouts_are_background_subtracted() {
    let image = field_image();
    let stars = catalog(&image, &FIELD[..1], 500.0);
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();
    let star = &clean.stars[0];
    assert_eq!(star.cutout.dim(), (25, 25));
    assert_eq!(star.bbox, BoundingBox::new(28, 53, 28, 53));
    // Corner pixels are sky only.
    assert!(star.cutout[[0, 0]].abs() < 5.0);
    let total: f64 = star.cutout.sum();
    assert!((total - 5000.0).abs() < 250.0, "cutout flux {total}");
    let (cx, cy) = star.local_center();
    assert!((cx - 12.3).abs() < 1e-6 && (cy - 12.2).abs() < 1e-6);
}

#[test]
fn test_faint_stars_removed() {
    let image = field_image();
    let mut stars = catalog(&image, &FIELD, 500.0);
    stars[0].signal_to_noise = 100.0;
    stars[3].signal_to_noise = 50.0;
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();
    assert_eq!(clean.counts.above_sn, 1);
    assert_eq!(clean.len(), 1);
}

#[test]
fn test_saturated_stars_removed() {
    let image = field_image();
    let stars = catalog(&image, &FIELD, 500.0);
    let config = PsfStarConfig {
        saturation: Some(500.0),
        ..Default::default()
    };
    let clean = extract_psf_stars(&image, &stars, &config).unwrap();
    assert_eq!(clean.counts.extracted, 3);
    assert_eq!(clean.counts.unsaturated, 2);
    assert!(clean.stars.iter().all(|s| s.peak() <= 500.0));
}

#[test]
fn test_saturation_from_header() {
    let mut image = field_image();
    image.header.set("SATURATE", 500.0);
    let stars = catalog(&image, &FIELD, 500.0);
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();
    assert_eq!(clean.len(), 2);
}

#[test]
fn test_edge_stars_removed() {
    let mut image = make_image(200, 200, 12);
    add_star(&mut image.data, 6.0, 100.0, 5000.0, 2.0);
    add_star(&mut image.data, 100.3, 100.3, 5000.0, 2.0);
    let stars = catalog(&image, &[(6.0, 100.0, 0.0), (100.3, 100.3, 0.0)], 500.0);
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();
    assert_eq!(clean.counts.above_sn, 2);
    assert_eq!(clean.counts.extracted, 1);
}

#[test]
fn test_no_survivors_is_not_an_error() {
    let image = field_image();
    let stars = catalog(&image, &FIELD, 10.0);
    let clean = extract_psf_stars(&image, &stars, &PsfStarConfig::default()).unwrap();
    assert!(clean.is_empty());
    assert!(clean.degraded);
}

#[test]
fn test_enough_stars_not_degraded() {
    let image = field_image();
    let stars = catalog(&image, &FIELD, 500.0);
    let config = PsfStarConfig {
        min_recommended_stars: 3,
        ..Default::default()
    };
    let clean = extract_psf_stars(&image, &stars, &config).unwrap();
    assert!(!clean.degraded);
}
