mod common;

use approx::assert_relative_eq;
use fakesn_core::error::FakeSnError;
use fakesn_core::image::{Header, HeaderOnly, ImageLike};
use fakesn_core::matching::fake_locations;
use fakesn_core::provenance::{
    fake_key, format_index, FakeRecord, FakeSet, KEY_CONTAINS_FAKES, KEY_N_FAKE, KEY_PSF_FLUX,
};

fn record(index: usize, x: f64, y: f64) -> FakeRecord {
    FakeRecord {
        index,
        x,
        y,
        ra: 150.0 + x * 1e-4,
        dec: 2.0 + y * 1e-4,
        scale: 2.5,
        flux: 2.5e3,
        model: "NA".into(),
        detected: None,
    }
}

fn set_of(n: usize) -> FakeSet {
    let mut set = FakeSet::default();
    for i in 0..n {
        set.push(record(i, 10.0 * i as f64, 5.0 + i as f64)).unwrap();
    }
    set.psf_flux = Some(0.98);
    set
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

#[test]
fn test_index_formatting() {
    assert_eq!(format_index(0), "000");
    assert_eq!(format_index(42), "042");
    assert_eq!(format_index(998), "998");
    assert_eq!(fake_key(7, "SCA"), "FK007SCA");
    assert!(fake_key(998, "DEC").len() <= 8);
}

#[test]
fn test_encode_writes_summary_keys() {
    let mut header = Header::new();
    set_of(3).encode_into(&mut header);
    assert_eq!(header.get_bool(KEY_CONTAINS_FAKES), Some(true));
    assert_eq!(header.get_i64(KEY_N_FAKE), Some(3));
    assert_relative_eq!(header.get_f64(KEY_PSF_FLUX).unwrap(), 0.98);
    assert_relative_eq!(header.get_f64("FK002X").unwrap(), 20.0);
    assert_eq!(header.get_str("FK001MOD"), Some("NA"));
    assert!(!header.contains("FK000DET"));
}

#[test]
fn test_empty_set_writes_nothing() {
    let mut header = Header::new();
    header.set("OBJECT", "m31");
    FakeSet::default().encode_into(&mut header);
    assert_eq!(header.len(), 1);
    assert!(!header.contains(KEY_CONTAINS_FAKES));
}

#[test]
fn test_encode_decode_round_trip() {
    let mut set = set_of(4);
    set.set_detected(1, true);
    set.set_detected(3, false);

    let mut header = Header::new();
    header.set("EXPTIME", 60.0);
    set.encode_into(&mut header);

    let back = FakeSet::decode(&header).unwrap();
    assert_eq!(back, set);
    assert_eq!(back.get(1).unwrap().detected, Some(true));
    assert_eq!(back.get(0).unwrap().detected, None);
}

#[test]
fn test_reencode_replaces_previous_keys() {
    let mut header = Header::new();
    set_of(5).encode_into(&mut header);
    set_of(2).encode_into(&mut header);
    assert_eq!(header.get_i64(KEY_N_FAKE), Some(2));
    assert!(!header.contains("FK004X"));
    assert_eq!(FakeSet::decode(&header).unwrap().len(), 2);
}

#[test]
fn test_strip_keeps_other_keywords() {
    let mut header = Header::new();
    header.set("FKAPPA", 1.0);
    header.set("OBJECT", "field");
    set_of(2).encode_into(&mut header);
    FakeSet::strip(&mut header);
    assert_eq!(header.len(), 2);
    assert!(header.contains("FKAPPA"));
}

#[test]
fn test_decode_without_provenance_is_empty() {
    let mut header = Header::new();
    header.set("OBJECT", "field");
    let set = FakeSet::decode(&header).unwrap();
    assert!(set.is_empty());
    assert_eq!(set.psf_flux, None);
}

#[test]
fn test_decode_missing_position_fails() {
    let mut header = Header::new();
    set_of(2).encode_into(&mut header);
    header.remove("FK001Y");
    assert!(matches!(
        FakeSet::decode(&header),
        Err(FakeSnError::MissingHeaderKey(k)) if k == "FK001Y"
    ));
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

#[test]
fn test_next_index_follows_highest() {
    let mut set = FakeSet::default();
    assert_eq!(set.next_index(), 0);
    set.push(record(4, 0.0, 0.0)).unwrap();
    assert_eq!(set.next_index(), 5);
}

#[test]
fn test_capacity_limit() {
    let set = FakeSet::default();
    assert!(set.check_capacity(999).is_ok());
    assert!(matches!(
        set.check_capacity(1000),
        Err(FakeSnError::TooManyFakes { requested: 1000, max: 999 })
    ));

    let mut set = FakeSet::default();
    assert!(set.push(record(998, 0.0, 0.0)).is_ok());
    assert!(set.check_capacity(1).is_err());
    assert!(set.push(record(999, 0.0, 0.0)).is_err());
}

// ---------------------------------------------------------------------------
// Header-only access
// ---------------------------------------------------------------------------

#[test]
fn test_fake_locations_from_header() {
    let mut header = Header::new();
    set_of(3).encode_into(&mut header);
    let view = HeaderOnly(header);
    assert!(view.pixels().is_none());

    let locations = fake_locations(&view).unwrap();
    assert_eq!(locations.len(), 3);
    assert_eq!(locations[2].0, "002");
    assert_relative_eq!(locations[2].1, 20.0);
    assert_relative_eq!(locations[2].2, 7.0);
}
