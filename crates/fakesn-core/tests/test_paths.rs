use std::path::{Path, PathBuf};

use fakesn_core::io::paths::{cache_path, output_path};

#[test]
fn test_cache_path_single_extension() {
    let p = cache_path(Path::new("/data/run1/diff.fits"), "GaiaCat", "ecsv");
    assert_eq!(p, PathBuf::from("/data/run1/diff_GaiaCat.ecsv"));
}

#[test]
fn test_cache_path_strips_two_extensions() {
    let p = cache_path(Path::new("/data/search.fits.fz"), "fakecat", "ecsv");
    assert_eq!(p, PathBuf::from("/data/search_fakecat.ecsv"));
}

#[test]
fn test_cache_path_leading_dot_extension() {
    let p = cache_path(Path::new("img.fits"), "epsf", ".json");
    assert_eq!(p, PathBuf::from("img_epsf.json"));
}

#[test]
fn test_output_path_moves_to_directory() {
    let p = output_path(
        Path::new("/data/run1/template.fits"),
        Path::new("/tmp/out"),
        "planted",
        "fits",
    );
    assert_eq!(p, PathBuf::from("/tmp/out/template_planted.fits"));
}
