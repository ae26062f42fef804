use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakesn_core::consts::EFFICIENCY_SUFFIX;
use fakesn_core::detect::{detect_sources, DetectionCatalog, DetectionConfig};
use fakesn_core::image::Image;
use fakesn_core::io::paths::cache_path;
use fakesn_core::matching::{calculate_detection_efficiency, confusion};

use crate::summary::print_efficiency;

#[derive(Args)]
pub struct EfficiencyArgs {
    /// FITS file with planted fakes
    pub file: PathBuf,

    /// Detection catalog; detection runs with default settings if omitted
    #[arg(long)]
    pub detections: Option<PathBuf>,

    /// Clean difference image used to count false positives
    #[arg(long)]
    pub clean: Option<PathBuf>,

    /// Half-width of the matching box in pixels
    #[arg(long, default_value = "2")]
    pub radius: f64,

    /// Write the image back with detection flags to this path
    #[arg(long)]
    pub flag_output: Option<PathBuf>,

    /// Efficiency table (defaults to <root>_efficiency.ecsv next to the image)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &EfficiencyArgs) -> Result<()> {
    let mut image = Image::open(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let detections = match args.detections {
        Some(ref path) => DetectionCatalog::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => detect_sources(&image, &DetectionConfig::default())?,
    };

    let result = calculate_detection_efficiency(&mut image, &detections, args.radius)?;

    let clean = match args.clean {
        Some(ref path) => {
            let clean = Image::open(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(confusion(&result, &detect_sources(&clean, &detections.config)?))
        }
        None => None,
    };
    print_efficiency(&result, clean.as_ref());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| cache_path(&args.file, EFFICIENCY_SUFFIX, "ecsv"));
    result
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Table:       {}", output.display());

    if let Some(ref path) = args.flag_output {
        image
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Flagged:     {}", path.display());
    }

    Ok(())
}
