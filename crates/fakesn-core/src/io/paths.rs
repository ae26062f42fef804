use std::path::{Path, PathBuf};

/// Sidecar path `<root>_<suffix>.<extension>` in the same directory as
/// `source`, where `<root>` is the file name with up to two extensions
/// removed (`img.fits.fz` -> `img`).
pub fn cache_path(source: &Path, suffix: &str, extension: &str) -> PathBuf {
    let root = source.with_extension("").with_extension("");
    let stem = root
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension.trim_start_matches('.');
    source.with_file_name(format!("{stem}_{suffix}.{extension}"))
}

/// Like [`cache_path`], but placed in `dir` instead of next to `source`.
pub fn output_path(source: &Path, dir: &Path, suffix: &str, extension: &str) -> PathBuf {
    let sidecar = cache_path(source, suffix, extension);
    match sidecar.file_name() {
        Some(name) => dir.join(name),
        None => dir.join(format!("{suffix}.{}", extension.trim_start_matches('.'))),
    }
}
