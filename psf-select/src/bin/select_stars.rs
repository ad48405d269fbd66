//! Select PSF stars from a source catalog and exposure
//!
//! Reads a JSON array of sources (id, x, y, ixx, ixy, iyy, psf_flux, flags) and a
//! grayscale image, runs the second-moment star selector and prints a JSON
//! summary of the PSF candidates. The catalog with STAR flags set can be
//! written back out with `--flagged-catalog`.

use clap::Parser;
use log::{info, warn};
use psf_select::image_proc::load_image;
use psf_select::{RadialPolyDistortion, SecondMomentStarSelector, SelectorConfig, Source};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "select_stars",
    about = "Select PSF stars by clustering source second moments",
    long_about = None
)]
struct Args {
    /// JSON source catalog
    #[arg(long)]
    catalog: PathBuf,

    /// Exposure the catalog was measured on (PNG, TIFF, ...)
    #[arg(long)]
    image: PathBuf,

    /// JSON selector configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the clump acceptance radius
    #[arg(long)]
    clump_n_sigma: Option<f64>,

    /// Override the minimum PSF flux
    #[arg(long)]
    flux_lim: Option<f64>,

    /// Disable the minimum PSF flux cut
    #[arg(long, conflicts_with = "flux_lim")]
    no_flux_lim: bool,

    /// Override the maximum PSF flux (0 disables the cut)
    #[arg(long)]
    flux_max: Option<f64>,

    /// Override the PSF kernel size
    #[arg(long)]
    kernel_size: Option<usize>,

    /// Override the candidate border width
    #[arg(long)]
    border_width: Option<usize>,

    /// Radial distortion coefficients c0,c1,c2,... about the detector center
    #[arg(long, value_delimiter = ',')]
    distortion: Option<Vec<f64>>,

    /// Write the candidate summary here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the catalog, with STAR flags set, to this file
    #[arg(long)]
    flagged_catalog: Option<PathBuf>,
}

#[derive(Serialize)]
struct CandidateSummary {
    source_id: u64,
    x: f64,
    y: f64,
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    peak: f64,
}

fn build_config(args: &Args) -> Result<SelectorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SelectorConfig::load_from_file(path)?,
        None => SelectorConfig::default(),
    };

    if let Some(n_sigma) = args.clump_n_sigma {
        config.clump_n_sigma = n_sigma;
    }
    if args.no_flux_lim {
        config.flux_lim = None;
    } else if let Some(lim) = args.flux_lim {
        config.flux_lim = Some(lim);
    }
    if let Some(max) = args.flux_max {
        config.flux_max = max;
    }
    if let Some(size) = args.kernel_size {
        config.kernel_size = size;
    }
    if let Some(border) = args.border_width {
        config.border_width = border;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    let catalog = std::fs::read_to_string(&args.catalog)?;
    let mut sources: Vec<Source> = serde_json::from_str(&catalog)?;
    let image = load_image(&args.image)?;
    let (height, width) = image.dim();
    info!(
        "Loaded {} sources and a {}x{} image",
        sources.len(),
        width,
        height
    );

    let mut selector = SecondMomentStarSelector::new(config);
    if let Some(coefficients) = args.distortion {
        let model = RadialPolyDistortion::centered_on_detector(coefficients, width, height)?;
        info!(
            "Correcting for radial distortion, max shear {:.4}",
            model.max_shear(width, height)
        );
        selector = selector.with_corrector(Box::new(model));
    }

    let candidates = selector.select_stars(image.view(), &mut sources)?;
    if candidates.is_empty() {
        warn!("No PSF candidates selected");
    }

    let summary: Vec<CandidateSummary> = candidates
        .iter()
        .map(|c| CandidateSummary {
            source_id: c.source_id,
            x: c.x,
            y: c.y,
            x0: c.x0,
            y0: c.y0,
            width: c.width(),
            height: c.height(),
            peak: c.peak(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    if let Some(path) = &args.flagged_catalog {
        std::fs::write(path, serde_json::to_string_pretty(&sources)?)?;
        info!("Wrote flagged catalog to {}", path.display());
    }

    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
