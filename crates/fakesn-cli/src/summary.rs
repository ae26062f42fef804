use console::Style;
use fakesn_core::inject::Footprint;
use fakesn_core::matching::{Confusion, DetectionEfficiency};
use fakesn_core::pipeline::{ExperimentConfig, ExperimentReport};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    warn: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            warn: Style::new().yellow(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_experiment_summary(config: &ExperimentConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Fake SN Experiment"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();

    for (label, path) in [
        ("Diff", &config.diff),
        ("Search", &config.search),
        ("Template", &config.template),
        ("Output", &config.output),
    ] {
        println!(
            "  {:<14}{}",
            s.label.apply_to(label),
            s.path.apply_to(path.display())
        );
    }
    if !config.cache.enabled {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Cache"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();

    println!("  {}", s.header.apply_to("ePSF"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Min S/N"),
        s.value.apply_to(config.psf_stars.sn_threshold)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Oversample"),
        s.value.apply_to(config.epsf.oversampling)
    );
    println!();

    println!("  {}", s.header.apply_to("Injection"));
    let footprint = match config.injection.footprint {
        Footprint::Stamp => "stamp".to_string(),
        Footprint::Subshape { rows, cols } => format!("{rows}x{cols}"),
        Footprint::FullFrame => "full frame".to_string(),
    };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Footprint"),
        s.value.apply_to(footprint)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Placements"),
        s.value.apply_to(config.lensing.angles_deg.len())
    );
    println!();

    println!("  {}", s.header.apply_to("Detection"));
    let d = &config.detection;
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(format!("{} sigma", d.nsigma))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Kernel"),
        s.value.apply_to(format!("{} px FWHM", d.kernel_fwhm))
    );
    if d.deblend {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Deblend"),
            s.value.apply_to(format!("contrast {}", d.contrast))
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Deblend"),
            s.disabled.apply_to("disabled")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Match box"),
        s.value.apply_to(format!("\u{00b1}{} px", config.matching.search_radius))
    );
    println!();
}

pub fn print_report(report: &ExperimentReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Results"));
    match report.psf_stars {
        Some(n) => {
            let stars = s.value.apply_to(n);
            if report.psf_degraded == Some(true) {
                println!("    {:<12}{} {}", s.label.apply_to("PSF stars"), stars, s.warn.apply_to("(few)"));
            } else {
                println!("    {:<12}{}", s.label.apply_to("PSF stars"), stars);
            }
        }
        None => println!("    {:<12}{}", s.label.apply_to("PSF stars"), s.disabled.apply_to("model from cache")),
    }
    let converged = if report.epsf_converged {
        s.good.apply_to("converged")
    } else {
        s.warn.apply_to("not converged")
    };
    println!(
        "    {:<12}{} after {} iterations",
        s.label.apply_to("ePSF"),
        converged,
        report.epsf_iterations
    );
    println!("    {:<12}{}", s.label.apply_to("Hosts"), s.value.apply_to(report.hosts));
    println!("    {:<12}{}", s.label.apply_to("Planted"), s.value.apply_to(report.planted));
    println!("    {:<12}{}", s.label.apply_to("Detections"), s.value.apply_to(report.detections));
    println!();

    print_efficiency(&report.efficiency, Some(&report.confusion));

    println!("  {}", s.header.apply_to("Files"));
    for path in &report.planted_images {
        println!("    {}", s.path.apply_to(path.display()));
    }
    if let Some(ref path) = report.fake_catalog.catalog {
        println!("    {}", s.path.apply_to(path.display()));
    }
    if let Some(ref path) = report.fake_catalog.appended {
        println!("    {}", s.path.apply_to(path.display()));
    }
    println!("    {}", s.path.apply_to(report.efficiency_table.display()));
    println!();
}

pub fn print_efficiency(result: &DetectionEfficiency, confusion: Option<&Confusion>) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Efficiency"));
    println!(
        "    {:<12}{} ({}/{})",
        s.label.apply_to("Recovered"),
        s.value.apply_to(format!("{:.1}%", result.efficiency * 100.0)),
        result.n_detected(),
        result.n_fakes()
    );
    if let Some(c) = confusion {
        let (tp, fn_, fp) = c.counts();
        println!("    {:<12}{}", s.label.apply_to("True pos."), s.good.apply_to(tp));
        println!("    {:<12}{}", s.label.apply_to("False neg."), s.warn.apply_to(fn_));
        println!("    {:<12}{}", s.label.apply_to("False pos."), s.warn.apply_to(fp));
    }
    for row in &result.rows {
        let mark = if row.detected == 1 {
            s.good.apply_to("detected")
        } else {
            s.warn.apply_to("missed")
        };
        println!(
            "    FK{}  ({:8.2}, {:8.2})  {}",
            row.fake_id, row.pix_x, row.pix_y, mark
        );
    }
    println!();
}
