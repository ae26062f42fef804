use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::catalog::{fetch_star_catalog, CacheConfig, GaiaCsvSource};
use fakesn_core::image::Image;
use fakesn_core::psf::{extract_psf_stars, PsfStarConfig};

#[derive(Args)]
pub struct StarsArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Gaia archive CSV export covering the field
    #[arg(long)]
    pub gaia: PathBuf,

    /// Minimum catalog signal-to-noise for PSF stars
    #[arg(long, default_value = "100")]
    pub sn: f64,

    /// Cutout and overlap box size in pixels
    #[arg(long, default_value = "25")]
    pub cutout: usize,

    /// Saturation level (defaults to the SATURATE keyword)
    #[arg(long)]
    pub saturation: Option<f64>,

    /// Re-query and replace an existing star catalog
    #[arg(long)]
    pub overwrite: bool,

    /// Do not read or write the star catalog cache
    #[arg(long)]
    pub no_cache: bool,
}

pub fn run(args: &StarsArgs) -> Result<()> {
    let mut image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    image.path = Some(args.file.clone());

    let cache = cache_config(args.no_cache, args.overwrite);
    let source = GaiaCsvSource::new(&args.gaia);
    let stars = fetch_star_catalog(&image, &source, &cache)?;

    let config = PsfStarConfig {
        cutout_size: args.cutout,
        sn_threshold: args.sn,
        saturation: args.saturation,
        ..Default::default()
    };
    let clean = extract_psf_stars(&image, &stars, &config)?;
    let c = clean.counts;

    println!("Reference stars:   {}", stars.len());
    println!("  isolated:        {}", c.isolated);
    println!("  S/N > {:<10} {}", args.sn, c.above_sn);
    println!("  on frame:        {}", c.extracted);
    println!("  unsaturated:     {}", c.unsaturated);
    if clean.degraded {
        println!("Warning: only {} PSF stars, the ePSF may be poor", clean.len());
    }
    for s in &clean.stars {
        println!(
            "  x={:9.3} y={:9.3}  mag={:6.3}  S/N={:8.1}",
            s.star.x, s.star.y, s.star.mag, s.star.signal_to_noise
        );
    }

    Ok(())
}

pub(crate) fn cache_config(no_cache: bool, overwrite: bool) -> CacheConfig {
    if no_cache {
        CacheConfig::disabled()
    } else {
        CacheConfig {
            overwrite,
            ..Default::default()
        }
    }
}
