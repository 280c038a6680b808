mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ccdphot", about = "CCD calibration and aperture photometry")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS header metadata
    Info(commands::info::InfoArgs),
    /// Classify the FITS files of a directory by frame type
    Scan(commands::scan::ScanArgs),
    /// Combine raw frames into a master frame
    Combine(commands::combine::CombineArgs),
    /// Build masters and calibrate science frames
    Calibrate(commands::calibrate::CalibrateArgs),
    /// Detect sources, refine centroids and measure aperture sums
    Photometry(commands::photometry::PhotometryArgs),
    /// Run a full reduction from a TOML config
    Run(commands::run::RunArgs),
    /// Print or save the default run config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Scan(args) => commands::scan::run(args),
        Commands::Combine(args) => commands::combine::run(args),
        Commands::Calibrate(args) => commands::calibrate::run(args),
        Commands::Photometry(args) => commands::photometry::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_photometry_params() {
        let cli = Cli::try_parse_from([
            "ccdphot",
            "photometry",
            "image.fits",
            "--method",
            "circular_annulus",
            "--param",
            "r_in=6",
            "--param",
            "r_out=10",
            "-o",
            "table.csv",
        ])
        .unwrap();
        let Commands::Photometry(args) = cli.command else {
            panic!("expected photometry subcommand");
        };
        assert_eq!(args.method, "circular_annulus");
        assert_eq!(args.params, vec![("r_in".to_string(), 6.0), ("r_out".to_string(), 10.0)]);
    }

    #[test]
    fn test_parse_rejects_malformed_param() {
        let parsed = Cli::try_parse_from(["ccdphot", "photometry", "image.fits", "--param", "r"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_combine_type() {
        let cli = Cli::try_parse_from([
            "ccdphot", "combine", "a.fits", "b.fits", "--type", "dark", "--method", "average", "-o", "dark.fits",
        ])
        .unwrap();
        let Commands::Combine(args) = cli.command else {
            panic!("expected combine subcommand");
        };
        assert_eq!(args.files.len(), 2);
        assert!(!args.no_sigma_clip);
    }

    #[test]
    fn test_parse_config_flags() {
        let cli = Cli::try_parse_from(["ccdphot", "config", "--no-photometry", "--directory", "night1"]).unwrap();
        let Commands::Config(args) = cli.command else {
            panic!("expected config subcommand");
        };
        assert!(args.no_photometry);
        assert_eq!(args.directory, std::path::PathBuf::from("night1"));
        assert!(args.output.is_none());
    }

    #[test]
    fn test_photometry_checks_aperture_before_reading() {
        let cli = Cli::try_parse_from(["ccdphot", "photometry", "does-not-exist.fits", "--method", "triangular"]).unwrap();
        let Commands::Photometry(args) = cli.command else {
            panic!("expected photometry subcommand");
        };
        let err = commands::photometry::run(&args).unwrap_err();
        assert!(err.to_string().contains("triangular"), "{err:#}");
        assert!(!format!("{err:#}").contains("Failed to read"), "{err:#}");
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["ccdphot", "scan", "raw", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
