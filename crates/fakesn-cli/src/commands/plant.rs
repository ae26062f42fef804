use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use fakesn_core::catalog::{write_fake_catalog, CacheConfig};
use fakesn_core::image::Image;
use fakesn_core::inject::{inject, inject_posflux, read_positions, subtract_psf, Footprint};
use fakesn_core::psf::load_epsf;

#[derive(Clone, ValueEnum)]
pub enum FootprintArg {
    Stamp,
    Subshape,
    FullFrame,
}

#[derive(Args)]
pub struct PlantArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// ePSF model (JSON, as written by `fakesn epsf`)
    #[arg(long)]
    pub epsf: PathBuf,

    /// Table of positions and fluxes (columns x_fit, y_fit, flux_fit)
    #[arg(long, conflicts_with = "at")]
    pub positions: Option<PathBuf>,

    /// Pixel position "x,y"; may be repeated
    #[arg(long)]
    pub at: Vec<String>,

    /// Model scale factor applied to every --at position
    #[arg(long, default_value = "1.0")]
    pub scale: f64,

    /// Region each source is evaluated over
    #[arg(long, value_enum, default_value = "stamp")]
    pub footprint: FootprintArg,

    /// Window "rows,cols" for the subshape footprint
    #[arg(long, default_value = "25,25")]
    pub subshape: String,

    /// Subtract the PSFs instead of planting fakes
    #[arg(long)]
    pub subtract: bool,

    /// Also append the fakes to this shared catalog
    #[arg(long)]
    pub append_catalog: Option<PathBuf>,

    /// Output file path
    #[arg(short, long, default_value = "planted.fits")]
    pub output: PathBuf,
}

pub fn run(args: &PlantArgs) -> Result<()> {
    let image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let psf = load_epsf(&args.epsf)
        .with_context(|| format!("Failed to read ePSF {}", args.epsf.display()))?
        .model;
    let footprint = parse_footprint(&args.footprint, &args.subshape)?;

    let mut result = match (&args.positions, args.subtract) {
        (Some(path), subtract) => {
            let posflux = read_positions(path)
                .with_context(|| format!("Failed to read positions {}", path.display()))?;
            if subtract {
                subtract_psf(&image, &psf, &posflux, footprint)?
            } else {
                inject_posflux(&image, &psf, &posflux, footprint)?
            }
        }
        (None, false) => {
            let positions = args
                .at
                .iter()
                .map(String::as_str)
                .map(parse_pair)
                .collect::<Result<Vec<_>>>()?;
            if positions.is_empty() {
                bail!("Give --positions or at least one --at x,y");
            }
            let scales = vec![args.scale; positions.len()];
            inject(&image, &psf, &positions, Some(&scales), footprint)?
        }
        (None, true) => bail!("--subtract needs a --positions table"),
    };

    result
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    result.path = Some(args.output.clone());

    if args.subtract {
        println!("Subtracted PSFs, saved to {}", args.output.display());
        return Ok(());
    }

    let written = write_fake_catalog(
        &result,
        &CacheConfig {
            overwrite: true,
            ..Default::default()
        },
        args.append_catalog.as_deref(),
    )?;
    println!("Planted:     {} (total {})", result.fakes.len() - image.fakes.len(), result.fakes.len());
    println!("Output:      {}", args.output.display());
    if let Some(path) = written.catalog {
        println!("Catalog:     {}", path.display());
    }
    if let Some(path) = written.appended {
        println!("Appended:    {}", path.display());
    }

    Ok(())
}

fn parse_footprint(arg: &FootprintArg, subshape: &str) -> Result<Footprint> {
    Ok(match arg {
        FootprintArg::Stamp => Footprint::Stamp,
        FootprintArg::FullFrame => Footprint::FullFrame,
        FootprintArg::Subshape => {
            let (rows, cols) = parse_dims(subshape)?;
            let footprint = Footprint::Subshape { rows, cols };
            footprint.validate()?;
            footprint
        }
    })
}

fn parse_dims(s: &str) -> Result<(usize, usize)> {
    let (rows, cols) = s
        .split_once(',')
        .with_context(|| format!("Expected \"rows,cols\", got \"{s}\""))?;
    let rows = rows.trim().parse::<usize>().with_context(|| format!("Bad row count in \"{s}\""))?;
    let cols = cols.trim().parse::<usize>().with_context(|| format!("Bad column count in \"{s}\""))?;
    Ok((rows, cols))
}

fn parse_pair(s: &str) -> Result<(f64, f64)> {
    let (a, b) = s
        .split_once(',')
        .with_context(|| format!("Expected \"a,b\", got \"{s}\""))?;
    let a = a.trim().parse::<f64>().with_context(|| format!("Bad number in \"{s}\""))?;
    let b = b.trim().parse::<f64>().with_context(|| format!("Bad number in \"{s}\""))?;
    Ok((a, b))
}
