use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{fetch_star_catalog, write_fake_catalog, StarCatalogSource};
use crate::consts::{EFFICIENCY_SUFFIX, PLANTED_SUFFIX};
use crate::coordinator::{inject_triplet, lensed_locations, Triplet};
use crate::detect::{detect_host_galaxies, detect_sources};
use crate::error::{FakeSnError, Result};
use crate::io::paths::output_path;
use crate::matching::{calculate_detection_efficiency, confusion};
use crate::psf::{build_epsf_cached, extract_psf_stars, IterativeEpsfBuilder};

use super::config::ExperimentConfig;
use super::types::{ExperimentReport, ExperimentStage, NoOpReporter, ProgressReporter};

/// Run a full injection-recovery experiment on one triplet.
///
/// The ePSF is built on the search image and host galaxies are found on
/// the template. Fakes go around the first host into all three images;
/// efficiency is measured on the planted difference image and false
/// positives on the clean one.
pub fn run_experiment_reported(
    config: &ExperimentConfig,
    catalog: &dyn StarCatalogSource,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ExperimentReport> {
    reporter.begin_stage(ExperimentStage::Reading, Some(3));
    let triplet = Triplet::open(&config.diff, &config.search, &config.template)?;
    info!(
        diff = %config.diff.display(),
        search = %config.search.display(),
        template = %config.template.display(),
        "Loaded triplet"
    );
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::StarCatalog, None);
    let stars = fetch_star_catalog(&triplet.search, catalog, &config.cache)?;
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::Epsf, None);
    let fitter = IterativeEpsfBuilder::new(config.epsf.clone());
    let mut selection = None;
    let fit = build_epsf_cached(&triplet.search, &fitter, &config.cache, || {
        let clean = extract_psf_stars(&triplet.search, &stars, &config.psf_stars)?;
        selection = Some((clean.len(), clean.degraded));
        Ok(clean)
    })?;
    reporter.finish_stage();
    let epsf_cached = selection.is_none();
    if epsf_cached {
        info!("ePSF loaded from cache");
    }
    if !fit.converged {
        warn!(iterations = fit.iterations, "ePSF did not converge");
    }

    reporter.begin_stage(ExperimentStage::HostGalaxies, None);
    let template_sources = detect_sources(&triplet.template, &config.detection)?;
    let lensing = &config.lensing;
    let hosts = detect_host_galaxies(
        &template_sources,
        lensing.ellipticity_cut,
        lensing.cut_cosmic_rays,
        lensing.min_host_area,
    );
    reporter.finish_stage();
    let host = hosts.first().ok_or_else(|| {
        FakeSnError::MissingPrerequisite("no host galaxy found on the template".into())
    })?;

    reporter.begin_stage(ExperimentStage::Injection, None);
    let fluxes = (!lensing.fluxes.is_empty()).then_some(lensing.fluxes.as_slice());
    let placements = lensed_locations(&triplet, host, &lensing.angles_deg, &lensing.radii_px, fluxes)?;
    let mut planted = inject_triplet(&triplet, &fit.model, &placements, config.injection.footprint)?;
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::Detection, None);
    let detections = detect_sources(&planted.diff, &config.detection)?;
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::Matching, None);
    let efficiency = calculate_detection_efficiency(
        &mut planted.diff,
        &detections,
        config.matching.search_radius,
    )?;
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::FalsePositives, None);
    let clean_detections = detect_sources(&triplet.diff, &config.detection)?;
    let confusion = confusion(&efficiency, &clean_detections);
    reporter.finish_stage();

    reporter.begin_stage(ExperimentStage::Writing, Some(3));
    fs::create_dir_all(&config.output)?;
    let mut planted_images = Vec::with_capacity(3);
    for (image, source) in [
        (&mut planted.diff, &config.diff),
        (&mut planted.search, &config.search),
        (&mut planted.template, &config.template),
    ] {
        let path = output_path(source, &config.output, PLANTED_SUFFIX, "fits");
        image.save(&path)?;
        image.path = Some(path.clone());
        planted_images.push(path);
        reporter.advance(planted_images.len());
    }
    let fake_catalog = write_fake_catalog(
        &planted.diff,
        &config.cache,
        config.append_catalog.as_deref(),
    )?;
    let efficiency_table = output_path(
        &config.diff,
        &config.output,
        EFFICIENCY_SUFFIX,
        &config.cache.extension,
    );
    efficiency.write(&efficiency_table)?;
    reporter.finish_stage();

    let (tp, fn_, fp) = confusion.counts();
    info!(
        efficiency = efficiency.efficiency,
        true_positives = tp,
        false_negatives = fn_,
        false_positives = fp,
        "Experiment complete"
    );

    Ok(ExperimentReport {
        psf_stars: selection.map(|(n, _)| n),
        psf_degraded: selection.map(|(_, degraded)| degraded),
        epsf_cached,
        epsf_converged: fit.converged,
        epsf_iterations: fit.iterations,
        hosts: hosts.len(),
        planted: placements.len(),
        detections: detections.len(),
        efficiency,
        confusion,
        planted_images,
        fake_catalog,
        efficiency_table,
    })
}

/// Run an experiment without progress reporting.
pub fn run_experiment(
    config: &ExperimentConfig,
    catalog: &dyn StarCatalogSource,
) -> Result<ExperimentReport> {
    run_experiment_reported(config, catalog, Arc::new(NoOpReporter))
}
