mod common;

use approx::assert_relative_eq;
use fakesn_core::error::FakeSnError;
use fakesn_core::image::{Header, SkyCoord, Wcs};

use common::{make_wcs, FIELD_CENTER, PIXEL_SCALE};

fn base_header() -> Header {
    let mut h = Header::new();
    h.set("CTYPE1", "RA---TAN");
    h.set("CTYPE2", "DEC--TAN");
    h.set("CRPIX1", 51.0);
    h.set("CRPIX2", 51.0);
    h.set("CRVAL1", 150.0);
    h.set("CRVAL2", 2.0);
    h
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[test]
fn test_reference_pixel_maps_to_crval() {
    let wcs = make_wcs(101, 101);
    // CRPIX 51 (one-based) is pixel 50 zero-based.
    let sky = wcs.pixel_to_sky(50.0, 50.0);
    assert_relative_eq!(sky.ra, FIELD_CENTER.0, epsilon = 1e-12);
    assert_relative_eq!(sky.dec, FIELD_CENTER.1, epsilon = 1e-12);
}

#[test]
fn test_pixel_sky_round_trip() {
    let wcs = make_wcs(200, 150);
    for &(x, y) in &[(0.0, 0.0), (199.0, 149.0), (37.25, 120.5), (-10.0, 300.0)] {
        let sky = wcs.pixel_to_sky(x, y);
        let (bx, by) = wcs.sky_to_pixel(&sky);
        assert_relative_eq!(bx, x, epsilon = 1e-8);
        assert_relative_eq!(by, y, epsilon = 1e-8);
    }
}

#[test]
fn test_north_up_orientation() {
    let wcs = make_wcs(101, 101);
    let origin = wcs.pixel_to_sky(50.0, 50.0);
    let up = wcs.pixel_to_sky(50.0, 60.0);
    let right = wcs.pixel_to_sky(60.0, 50.0);
    assert!(up.dec > origin.dec);
    assert!(right.ra < origin.ra);
    let sep_arcsec = origin.separation(&up) * 3600.0;
    assert_relative_eq!(sep_arcsec, 10.0 * PIXEL_SCALE, max_relative = 1e-6);
}

#[test]
fn test_pixel_scale() {
    let wcs = make_wcs(100, 100);
    assert_relative_eq!(wcs.pixel_scale_deg() * 3600.0, PIXEL_SCALE, epsilon = 1e-12);
    let (w, h) = wcs.field_of_view(100, 50);
    assert_relative_eq!(w * 3600.0, 50.0, epsilon = 1e-9);
    assert_relative_eq!(h * 3600.0, 25.0, epsilon = 1e-9);
}

#[test]
fn test_ra_wraps_at_zero() {
    let wcs = Wcs::from_scale((1.0, 1.0), (0.0, 0.0), 1.0);
    let sky = wcs.pixel_to_sky(10.0, 0.0);
    assert!(sky.ra > 359.0 && sky.ra < 360.0);
    let (x, _) = wcs.sky_to_pixel(&SkyCoord::new(sky.ra, sky.dec));
    assert_relative_eq!(x, 10.0, epsilon = 1e-8);
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

#[test]
fn test_from_header_cd() {
    let mut h = base_header();
    h.set("CD1_1", -1e-4);
    h.set("CD2_2", 1e-4);
    let wcs = Wcs::from_header(&h).unwrap();
    assert_eq!(wcs.cd, [[-1e-4, 0.0], [0.0, 1e-4]]);
    assert_eq!(wcs.frame, "ICRS");
}

#[test]
fn test_from_header_pc_cdelt() {
    let mut h = base_header();
    h.set("CDELT1", -2e-4);
    h.set("CDELT2", 2e-4);
    h.set("PC1_1", 0.0);
    h.set("PC1_2", 1.0);
    h.set("PC2_1", 1.0);
    h.set("PC2_2", 0.0);
    let wcs = Wcs::from_header(&h).unwrap();
    assert_relative_eq!(wcs.cd[0][1], -2e-4);
    assert_relative_eq!(wcs.cd[1][0], 2e-4);
    assert_relative_eq!(wcs.cd[0][0], 0.0);
}

#[test]
fn test_from_header_cdelt_rotation() {
    let mut h = base_header();
    h.set("CDELT1", -1e-4);
    h.set("CDELT2", 1e-4);
    h.set("CROTA2", 90.0);
    h.set("RADESYS", "FK5");
    let wcs = Wcs::from_header(&h).unwrap();
    assert_relative_eq!(wcs.cd[0][1], -1e-4, epsilon = 1e-15);
    assert_relative_eq!(wcs.cd[1][0], -1e-4, epsilon = 1e-15);
    assert_eq!(wcs.frame, "FK5");
}

#[test]
fn test_write_header_round_trip() {
    let wcs = make_wcs(64, 32);
    let mut h = Header::new();
    h.set("CDELT1", 1.0);
    wcs.write_header(&mut h);
    assert!(!h.contains("CDELT1"));
    assert_eq!(Wcs::from_header(&h).unwrap(), wcs);
}

#[test]
fn test_non_tan_rejected() {
    let mut h = base_header();
    h.set("CTYPE1", "RA---SIN");
    h.set("CD1_1", -1e-4);
    h.set("CD2_2", 1e-4);
    assert!(matches!(Wcs::from_header(&h), Err(FakeSnError::InvalidFits(_))));
}

#[test]
fn test_missing_crval_rejected() {
    let mut h = base_header();
    h.remove("CRVAL2");
    h.set("CD1_1", -1e-4);
    h.set("CD2_2", 1e-4);
    assert!(matches!(
        Wcs::from_header(&h),
        Err(FakeSnError::MissingHeaderKey(k)) if k == "CRVAL2"
    ));
}

#[test]
fn test_singular_matrix_rejected() {
    let mut h = base_header();
    h.set("CD1_1", 1e-4);
    h.set("CD1_2", 1e-4);
    h.set("CD2_1", 1e-4);
    h.set("CD2_2", 1e-4);
    assert!(Wcs::from_header(&h).is_err());
}

#[test]
fn test_tan_sip_uses_linear_solution() {
    let mut tan = base_header();
    tan.set("CD1_1", -1e-4);
    tan.set("CD2_2", 1e-4);
    assert!(!Wcs::has_sip(&tan));

    let mut sip = tan.clone();
    sip.set("CTYPE1", "RA---TAN-SIP");
    sip.set("CTYPE2", "DEC--TAN-SIP");
    sip.set("A_ORDER", 2_i64);
    sip.set("B_ORDER", 2_i64);
    sip.set("A_2_0", 1e-6);
    assert!(Wcs::has_sip(&sip));

    let linear = Wcs::from_header(&tan).unwrap();
    let distorted = Wcs::from_header(&sip).unwrap();
    assert_eq!(distorted, linear);
}

#[test]
fn test_sip_order_alone_detected() {
    let mut h = base_header();
    h.set("A_ORDER", 3_i64);
    assert!(Wcs::has_sip(&h));
}
