use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::image::Image;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// List every planted fake
    #[arg(long)]
    pub fakes: bool,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let center = image.center();
    let (fov_w, fov_h) = image.wcs.field_of_view(image.width(), image.height());

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {}x{}", image.width(), image.height());
    println!("Centre:      RA {:.6}  Dec {:.6}", center.ra, center.dec);
    println!("Frame:       {}", image.wcs.frame);
    println!("Pixel scale: {:.3}\"", image.wcs.pixel_scale_deg() * 3600.0);
    println!("Field:       {:.2}' x {:.2}'", fov_w * 60.0, fov_h * 60.0);
    println!("Keywords:    {}", image.header.len());
    println!("Fakes:       {}", image.fakes.len());
    if let Some(f) = image.fakes.psf_flux {
        println!("ePSF flux:   {f:.4}");
    }

    if args.fakes {
        for r in image.fakes.iter() {
            let det = match r.detected {
                Some(true) => "detected",
                Some(false) => "missed",
                None => "-",
            };
            println!(
                "  FK{}  x={:9.3} y={:9.3}  flux={:12.2}  {}",
                r.id(),
                r.x,
                r.y,
                r.flux,
                det
            );
        }
    }

    Ok(())
}
