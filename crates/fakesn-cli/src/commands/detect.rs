use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::consts::{DEFAULT_HOST_ELLIPTICITY_CUT, DEFAULT_HOST_MIN_AREA, DETECTION_SUFFIX};
use fakesn_core::detect::{detect_host_galaxies, detect_sources, DetectionConfig};
use fakesn_core::image::Image;
use fakesn_core::io::paths::cache_path;

#[derive(Args)]
pub struct DetectArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Threshold in background standard deviations
    #[arg(long, default_value = "2")]
    pub nsigma: f64,

    /// Smoothing kernel FWHM in pixels
    #[arg(long, default_value = "2")]
    pub kfwhm: f64,

    /// Minimum connected pixels per source
    #[arg(long, default_value = "5")]
    pub npixels: usize,

    /// Split blended sources
    #[arg(long)]
    pub deblend: bool,

    /// Deblending flux contrast
    #[arg(long, default_value = "0.001")]
    pub contrast: f64,

    /// Background mesh box size in pixels
    #[arg(long, default_value = "100")]
    pub box_size: usize,

    /// Only keep host galaxy candidates
    #[arg(long)]
    pub hosts: bool,

    /// Output catalog (defaults to <root>_detections.ecsv next to the image)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &DetectArgs) -> Result<()> {
    let image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let config = DetectionConfig {
        nsigma: args.nsigma,
        kernel_fwhm: args.kfwhm,
        npixels: args.npixels,
        deblend: args.deblend,
        contrast: args.contrast,
        box_size: args.box_size,
        ..Default::default()
    };

    let mut catalog = detect_sources(&image, &config)?;
    println!("Sources:     {}", catalog.len());
    if args.hosts {
        catalog.sources = detect_host_galaxies(
            &catalog,
            DEFAULT_HOST_ELLIPTICITY_CUT,
            true,
            DEFAULT_HOST_MIN_AREA,
        );
        println!("Hosts:       {}", catalog.len());
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| cache_path(&args.file, DETECTION_SUFFIX, "ecsv"));
    catalog
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Catalog:     {}", output.display());

    Ok(())
}
