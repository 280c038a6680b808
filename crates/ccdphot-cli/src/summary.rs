use std::path::Path;

use ccdphot_core::aperture::PhotometryResult;
use ccdphot_core::combine::CombineConfig;
use ccdphot_core::io::ImageCollection;
use ccdphot_core::pipeline::{ReductionSummary, RunConfig};
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
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
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

pub fn print_collection_summary(dir: &Path, collection: &ImageCollection, list: bool) {
    let s = Styles::new();
    print_title(&s, "Image Collection");
    println!("  {:<14}{}", s.label.apply_to("Directory"), s.path.apply_to(dir.display()));
    println!("  {:<14}{}", s.label.apply_to("Files"), s.value.apply_to(collection.entries.len()));
    println!();

    for (frame_type, count) in collection.summary() {
        println!("    {:<12}{}", s.label.apply_to(frame_type), s.value.apply_to(count));
    }
    let unclassified = collection.unclassified().count();
    if unclassified > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("unknown"),
            s.disabled.apply_to(unclassified)
        );
    }

    if list {
        println!();
        for entry in &collection.entries {
            let kind = entry
                .frame_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".into());
            let exposure = entry
                .metadata
                .exposure_time
                .map(|t| format!("{t} s"))
                .unwrap_or_default();
            println!(
                "    {:<8}{:>10}  {:<6}{}",
                s.method.apply_to(kind),
                exposure,
                entry.metadata.filter.as_deref().unwrap_or(""),
                s.path.apply_to(entry.path.display())
            );
        }
    }
    println!();
}

pub fn print_run_summary(config: &RunConfig) {
    let s = Styles::new();
    print_title(&s, "ccdphot Reduction");

    let input = &config.input;
    if let Some(ref dir) = input.directory {
        println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(dir.display()));
    }
    for (label, files) in [
        ("Bias", &input.bias),
        ("Darks", &input.darks),
        ("Flats", &input.flats),
        ("Science", &input.science),
    ] {
        if !files.is_empty() {
            println!("  {:<14}{}", s.label.apply_to(label), s.value.apply_to(files.len()));
        }
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.directory.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Calibration"));
    print_combine(&s, "Bias", &config.calibration.bias);
    print_combine(&s, "Dark", &config.calibration.dark);
    print_combine(&s, "Flat", &config.calibration.flat);
    println!(
        "    {:<12}{}",
        s.label.apply_to("Scale dark"),
        s.value.apply_to(if config.calibration.calibration.scale_dark { "yes" } else { "no" })
    );
    println!();

    match config.photometry {
        Some(ref phot) => {
            println!("  {}", s.header.apply_to("Photometry"));
            println!(
                "    {:<12}{}",
                s.label.apply_to("Threshold"),
                s.value.apply_to(format!("{} sigma", phot.detection.threshold))
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("FWHM"),
                s.value.apply_to(format!("{} px", phot.detection.fwhm))
            );
            println!("    {:<12}{}", s.label.apply_to("Centroid"), s.method.apply_to(phot.refine.method));
            println!("    {:<12}{}", s.label.apply_to("Aperture"), s.method.apply_to(&phot.aperture.method));
            for (key, value) in &phot.aperture.params {
                println!("    {:<12}{}", s.label.apply_to(key), s.value.apply_to(value));
            }
        }
        None => {
            println!("  {:<14}{}", s.header.apply_to("Photometry"), s.disabled.apply_to("disabled"));
        }
    }
    println!();
}

fn print_combine(s: &Styles, label: &str, config: &CombineConfig) {
    let clip = if config.sigma_clip {
        format!("{}, clip {}/{}", config.method, config.clip.low, config.clip.high)
    } else {
        config.method.to_string()
    };
    println!("    {:<12}{}", s.label.apply_to(label), s.method.apply_to(clip));
}

pub fn print_photometry_table(table: &PhotometryResult) {
    let s = Styles::new();
    let names = table.column_names();
    let columns: Vec<Vec<f64>> = names.iter().map(|n| table.column(n).unwrap_or_default()).collect();

    println!();
    let header: Vec<String> = names.iter().map(|n| format!("{n:>14}")).collect();
    println!("{}", s.header.apply_to(header.join("")));
    for row in 0..table.len() {
        let line: Vec<String> = names
            .iter()
            .zip(&columns)
            .map(|(name, col)| {
                let v = col.get(row).copied().unwrap_or(f64::NAN);
                if *name == "id" {
                    format!("{:>14}", v as usize)
                } else {
                    format!("{v:>14.3}")
                }
            })
            .collect();
        println!("{}", line.join(""));
    }
    println!();
    println!("  {} sources", s.value.apply_to(table.len()));
}

pub fn print_reduction_summary(summary: &ReductionSummary) {
    let s = Styles::new();
    print_title(&s, "Products");
    for (label, paths) in [
        ("Master", &summary.masters),
        ("Calibrated", &summary.calibrated),
        ("Table", &summary.tables),
    ] {
        for path in paths {
            println!("  {:<14}{}", s.label.apply_to(label), s.path.apply_to(path.display()));
        }
    }
    for path in &summary.no_sources {
        println!(
            "  {:<14}{}",
            s.disabled.apply_to("No sources"),
            s.path.apply_to(path.display())
        );
    }
    println!();
}
