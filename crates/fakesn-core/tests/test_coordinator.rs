mod common;

use approx::assert_relative_eq;
use fakesn_core::consts::DEFAULT_FAKE_FLUX;
use fakesn_core::coordinator::{
    inject_triplet, lensed_locations, postage_stamp_triplet, propagate, Triplet,
};
use fakesn_core::detect::DetectionRecord;
use fakesn_core::error::FakeSnError;
use fakesn_core::image::{Image, SkyCoord, Wcs};
use fakesn_core::inject::Footprint;
use tempfile::TempDir;

use common::{blank_image, make_wcs, sky_frame, unit_psf, FIELD_CENTER, PIXEL_SCALE};

/// Template on the standard grid, search shifted by (+5, -3) pixels, and a
/// difference image rotated by 90 degrees.
fn triplet() -> Triplet {
    let template = blank_image(200, 200);

    let mut search_wcs = make_wcs(200, 200);
    search_wcs.crpix = (search_wcs.crpix.0 + 5.0, search_wcs.crpix.1 - 3.0);
    let search = Image::with_wcs(sky_frame(200, 200, 0.0, 0.0, 1), search_wcs);

    let s = PIXEL_SCALE / 3600.0;
    let diff_wcs = Wcs::new((100.5, 100.5), FIELD_CENTER, [[0.0, -s], [-s, 0.0]]);
    let diff = Image::with_wcs(sky_frame(200, 200, 0.0, 0.0, 2), diff_wcs);

    Triplet {
        diff,
        search,
        template,
    }
}

fn host_at(x: f64, y: f64, orientation: f64) -> DetectionRecord {
    DetectionRecord {
        label: 1,
        xcentroid: x,
        ycentroid: y,
        bbox_ixmin: 0,
        bbox_ixmax: 1,
        bbox_iymin: 0,
        bbox_iymax: 1,
        area: 120,
        semimajor_sigma: 6.0,
        semiminor_sigma: 2.0,
        orientation,
        ellipticity: 0.67,
        flux: 3e4,
        peak: 300.0,
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[test]
fn test_offsets_in_template_pixels() {
    let t = triplet();
    let host = host_at(80.0, 90.0, 0.0);
    let p = lensed_locations(&t, &host, &[0.0, 90.0, 180.0, 270.0], &[10.0; 4], None).unwrap();

    assert_eq!(p.len(), 4);
    let expected = [(90.0, 90.0), (80.0, 100.0), (70.0, 90.0), (80.0, 80.0)];
    for (got, want) in p.template.iter().zip(expected) {
        assert_relative_eq!(got.x, want.0, epsilon = 1e-6);
        assert_relative_eq!(got.y, want.1, epsilon = 1e-6);
        assert_relative_eq!(got.flux, DEFAULT_FAKE_FLUX);
    }
}

#[test]
fn test_orientation_rotates_placements() {
    let t = triplet();
    let host = host_at(100.0, 100.0, 90.0);
    let p = lensed_locations(&t, &host, &[0.0], &[20.0], None).unwrap();
    assert_relative_eq!(p.template[0].x, 100.0, epsilon = 1e-6);
    assert_relative_eq!(p.template[0].y, 120.0, epsilon = 1e-6);
}

#[test]
fn test_same_sky_position_in_every_image() {
    let t = triplet();
    let host = host_at(60.0, 140.0, 30.0);
    let p = lensed_locations(&t, &host, &[0.0, 45.0, 200.0], &[5.0, 12.0, 25.0], None).unwrap();

    for i in 0..p.len() {
        let sky = p.sky[i];
        for (image, pos) in [
            (&t.diff, p.diff[i]),
            (&t.search, p.search[i]),
            (&t.template, p.template[i]),
        ] {
            let back = image.pixel_to_sky(pos.x, pos.y);
            assert!(back.separation(&sky) * 3600.0 < 1e-6);
        }
        // The search grid is the template grid shifted by (+5, -3).
        assert_relative_eq!(p.search[i].x - p.template[i].x, 5.0, epsilon = 1e-6);
        assert_relative_eq!(p.search[i].y - p.template[i].y, -3.0, epsilon = 1e-6);
    }
}

#[test]
fn test_rotated_image_gets_rotated_offset() {
    let t = triplet();
    let origin = t.template.pixel_to_sky(100.0, 100.0);
    let p = propagate(&t, &origin, 0.0, &[0.0], &[10.0], None).unwrap();
    // +10 template x is 5 arcsec west; on the diff grid that is +10 in y.
    let (dx, dy) = t.diff.sky_to_pixel(&origin);
    assert_relative_eq!(p.diff[0].x - dx, 0.0, epsilon = 1e-6);
    assert_relative_eq!(p.diff[0].y - dy, 10.0, epsilon = 1e-6);
}

#[test]
fn test_explicit_fluxes() {
    let t = triplet();
    let origin = SkyCoord::new(FIELD_CENTER.0, FIELD_CENTER.1);
    let p = propagate(&t, &origin, 0.0, &[0.0, 90.0], &[8.0, 8.0], Some(&[100.0, 200.0])).unwrap();
    assert_relative_eq!(p.diff[1].flux, 200.0);
    assert_relative_eq!(p.search[0].flux, 100.0);
}

#[test]
fn test_length_mismatch_rejected() {
    let t = triplet();
    let origin = SkyCoord::new(FIELD_CENTER.0, FIELD_CENTER.1);
    assert!(matches!(
        propagate(&t, &origin, 0.0, &[0.0, 90.0], &[8.0], None),
        Err(FakeSnError::InvalidInput(_))
    ));
    assert!(matches!(
        propagate(&t, &origin, 0.0, &[0.0], &[8.0], Some(&[1.0, 2.0])),
        Err(FakeSnError::InvalidInput(_))
    ));
}

// ---------------------------------------------------------------------------
// Injection and stamps
// ---------------------------------------------------------------------------

#[test]
fn test_inject_triplet_plants_everywhere() {
    let t = triplet();
    let host = host_at(100.0, 100.0, 0.0);
    let p = lensed_locations(&t, &host, &[0.0, 180.0], &[30.0, 30.0], Some(&[500.0, 500.0]))
        .unwrap();
    let planted = inject_triplet(&t, &unit_psf(), &p, Footprint::Stamp).unwrap();

    for (image, positions) in [
        (&planted.diff, &p.diff),
        (&planted.search, &p.search),
        (&planted.template, &p.template),
    ] {
        assert_eq!(image.fakes.len(), 2);
        assert_relative_eq!(image.data.sum(), 1000.0, max_relative = 1e-3);
        let first = image.fakes.get(0).unwrap();
        assert_relative_eq!(first.x, positions[0].x);
        assert_relative_eq!(first.flux, 500.0, max_relative = 1e-3);
        assert_relative_eq!(first.ra, p.sky[0].ra, epsilon = 1e-10);
    }
    assert!(t.iter().all(|im| !im.contains_fakes()));
}

#[test]
fn test_triplet_open_reads_all_three() {
    let dir = TempDir::new().unwrap();
    let t = triplet();
    let paths: Vec<_> = ["d.fits", "s.fits", "t.fits"]
        .iter()
        .map(|n| dir.path().join(n))
        .collect();
    for (image, path) in t.iter().zip(&paths) {
        image.save(path).unwrap();
    }
    let back = Triplet::open(&paths[0], &paths[1], &paths[2]).unwrap();
    assert_eq!(back.diff.wcs, t.diff.wcs);
    assert_eq!(back.search.path.as_deref(), Some(paths[1].as_path()));
}

#[test]
fn test_postage_stamps_are_centred() {
    let t = triplet();
    let host = host_at(100.0, 100.0, 0.0);
    let p = lensed_locations(&t, &host, &[0.0], &[20.0], Some(&[1000.0])).unwrap();
    let planted = inject_triplet(&t, &unit_psf(), &p, Footprint::Stamp).unwrap();

    let stamps = postage_stamp_triplet(&t, &planted, &p.sky[0], 21).unwrap();
    for stamp in stamps.planted.iter() {
        assert_eq!(stamp.data.dim(), (21, 21));
        let (x, y) = stamp.sky_to_pixel(&p.sky[0]);
        assert!((x - 10.0).abs() <= 0.5 && (y - 10.0).abs() <= 0.5);
        let peak = stamp
            .data
            .indexed_iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap();
        assert_eq!(peak, (10, 10));
    }
    for stamp in stamps.clean.iter() {
        assert!(stamp.data.iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_postage_stamp_off_frame_is_nan_padded() {
    let t = triplet();
    let corner = t.template.pixel_to_sky(0.0, 0.0);
    let stamps = postage_stamp_triplet(&t, &t, &corner, 11).unwrap();
    let stamp = &stamps.clean.template;
    assert!(stamp.data[[0, 0]].is_nan());
    assert_eq!(stamp.data[[10, 10]], 0.0);
}
