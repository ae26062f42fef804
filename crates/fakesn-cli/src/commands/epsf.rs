use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::catalog::{fetch_star_catalog, GaiaCsvSource};
use fakesn_core::image::Image;
use fakesn_core::psf::{
    build_epsf_cached, extract_psf_stars, save_epsf, EpsfConfig, IterativeEpsfBuilder,
    PsfStarConfig,
};

use super::stars::cache_config;

#[derive(Args)]
pub struct EpsfArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Gaia archive CSV export covering the field
    #[arg(long)]
    pub gaia: PathBuf,

    /// Oversampling factor of the model grid
    #[arg(long, default_value = "2")]
    pub oversampling: usize,

    /// Maximum builder iterations
    #[arg(long, default_value = "10")]
    pub max_iters: usize,

    /// Minimum catalog signal-to-noise for PSF stars
    #[arg(long, default_value = "100")]
    pub sn: f64,

    /// Rebuild and replace cached catalog and model
    #[arg(long)]
    pub overwrite: bool,

    /// Do not read or write cache files
    #[arg(long)]
    pub no_cache: bool,

    /// Also write the model to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &EpsfArgs) -> Result<()> {
    let mut image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    image.path = Some(args.file.clone());

    let cache = cache_config(args.no_cache, args.overwrite);
    let source = GaiaCsvSource::new(&args.gaia);
    let stars = fetch_star_catalog(&image, &source, &cache)?;

    let star_config = PsfStarConfig {
        sn_threshold: args.sn,
        ..Default::default()
    };
    let fitter = IterativeEpsfBuilder::new(EpsfConfig {
        oversampling: args.oversampling,
        max_iters: args.max_iters,
        ..Default::default()
    });
    let fit = build_epsf_cached(&image, &fitter, &cache, || {
        extract_psf_stars(&image, &stars, &star_config)
    })?;

    let (rows, cols) = fit.model.pixel_shape();
    println!("ePSF:        {}x{} px (oversampling {})", cols, rows, fit.model.oversampling);
    println!("Stars used:  {}", fit.fitted_stars.len());
    println!("Iterations:  {}", fit.iterations);
    println!("Converged:   {}", if fit.converged { "yes" } else { "no" });
    println!("Model flux:  {:.4}", fit.model.total_flux());

    if let Some(ref path) = args.output {
        save_epsf(path, &fit).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("\nModel saved to {}", path.display());
    }

    Ok(())
}
