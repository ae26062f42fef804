use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use fakesn_core::coordinator::{postage_stamp_triplet, Triplet};
use fakesn_core::image::SkyCoord;
use fakesn_core::io::paths::output_path;

#[derive(Args)]
pub struct StampsArgs {
    /// Clean difference, search and template images
    #[arg(long, num_args = 3, value_names = ["DIFF", "SEARCH", "TEMPLATE"])]
    pub clean: Vec<PathBuf>,

    /// Planted difference, search and template images
    #[arg(long, num_args = 3, value_names = ["DIFF", "SEARCH", "TEMPLATE"])]
    pub planted: Vec<PathBuf>,

    /// Centre on this fake of the planted difference image
    #[arg(long, conflicts_with_all = ["ra", "dec"])]
    pub fake: Option<usize>,

    /// Right ascension of the stamp centre (degrees)
    #[arg(long, requires = "dec")]
    pub ra: Option<f64>,

    /// Declination of the stamp centre (degrees)
    #[arg(long, requires = "ra")]
    pub dec: Option<f64>,

    /// Stamp width and height in pixels
    #[arg(long, default_value = "50")]
    pub size: usize,

    /// Output directory
    #[arg(short, long, default_value = "stamps")]
    pub output: PathBuf,
}

pub fn run(args: &StampsArgs) -> Result<()> {
    let clean = open_triplet(&args.clean).context("Failed to read clean triplet")?;
    let planted = open_triplet(&args.planted).context("Failed to read planted triplet")?;

    let (location, tag) = match (args.fake, args.ra, args.dec) {
        (Some(index), _, _) => {
            let fake = planted
                .diff
                .fakes
                .get(index)
                .with_context(|| format!("No fake {index} in the planted difference image"))?;
            (SkyCoord::new(fake.ra, fake.dec), format!("fake{}", fake.id()))
        }
        (None, Some(ra), Some(dec)) => (SkyCoord::new(ra, dec), "stamp".to_string()),
        _ => bail!("Give --fake or both --ra and --dec"),
    };

    let stamps = postage_stamp_triplet(&clean, &planted, &location, args.size)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let pairs = [
        (&stamps.clean.diff, &args.clean[0], "clean"),
        (&stamps.clean.search, &args.clean[1], "clean"),
        (&stamps.clean.template, &args.clean[2], "clean"),
        (&stamps.planted.diff, &args.planted[0], "planted"),
        (&stamps.planted.search, &args.planted[1], "planted"),
        (&stamps.planted.template, &args.planted[2], "planted"),
    ];
    for (stamp, source, kind) in pairs {
        let path = output_path(source, &args.output, &format!("{tag}_{kind}"), "fits");
        stamp
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote:       {}", path.display());
    }

    Ok(())
}

fn open_triplet(paths: &[PathBuf]) -> Result<Triplet> {
    let [diff, search, template] = paths else {
        bail!("Expected three images, got {}", paths.len());
    };
    Ok(Triplet::open(diff, search, template)?)
}
