//! Recon Application
//!
//! Runs iterative refinement over a calibrated scene:
//! - exposure normalization with an optional diagnostic table
//! - refinement passes with camera pairing and density filtering
//! - OBJ export of the refined cloud

mod dry_run;
mod error;
mod export;
mod raster;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use recon_data::{SceneStore, load_scene};
use recon_refine::{
    Collaborators, DelaunaySurface, ExposureNormalizer, PairPolicy, PassBudget, RefineConfig, Refinement,
    SurfaceBuilder, write_exposure_table,
};
use tracing::info;

use crate::dry_run::DryRun;
use crate::error::AppError;
use crate::export::save_obj;
use crate::raster::SoftwareRenderer;

/// Recon - iterative point-cloud refinement
#[derive(Parser, Debug)]
#[command(name = "recon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene description (JSON)
    scene: PathBuf,

    /// Refinement settings (JSON); defaults apply to anything left out
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of refinement passes
    #[arg(short, long, default_value_t = 1)]
    passes: usize,

    /// Override the camera selection seed
    #[arg(long)]
    seed: Option<u64>,

    /// Triangulate every selected pair instead of the first one per pass
    #[arg(long)]
    all_pairs: bool,

    /// Skip exposure normalization
    #[arg(long)]
    no_exposure: bool,

    /// Where to write the per-frame exposure table
    #[arg(long, default_value = "exposure.tab")]
    exposure_table: PathBuf,

    /// Output mesh
    #[arg(short, long, default_value = "triangulated.obj")]
    output: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<(), AppError> {
    let mut config = match &args.config {
        Some(path) => RefineConfig::from_path(path)?,
        None => RefineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.selector.seed = seed;
    }
    if args.all_pairs {
        config.refinement.pair_policy = PairPolicy::All;
    }

    info!("Loading scene from {:?}", args.scene);
    let mut scene = load_scene(&args.scene)?;

    if args.no_exposure {
        info!("Exposure normalization skipped");
    } else {
        let normalizer = ExposureNormalizer::new(config.exposure);
        let (estimate, samples) = normalizer.normalize_scene(&mut scene)?;
        let stddev = estimate.residual_stddev(&samples);
        write_exposure_table(BufWriter::new(File::create(&args.exposure_table)?), &estimate, &stddev)?;
        info!("Exposure table written to {:?}", args.exposure_table);
    }

    let clip = scene.clip();
    let mut renderer = SoftwareRenderer::new(clip.width, clip.height);
    let mut surface = DelaunaySurface;
    let mut flow = DryRun;
    let mut triangulator = DryRun;
    let mut collab = Collaborators {
        surface: &mut surface,
        renderer: &mut renderer,
        flow: &mut flow,
        triangulator: &mut triangulator,
    };

    let mut refinement = Refinement::from_scene(&config, &scene);
    info!("Starting refinement from {} points", refinement.points().len());
    let reports = refinement.run(&scene, &mut collab, &mut PassBudget::new(args.passes))?;
    info!("Finished {} passes", reports.len());

    let points = refinement.into_points();
    let faces = DelaunaySurface.build(&points)?.faces;
    save_obj(&args.output, &points.dehomogenized(), &faces)?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(args) {
        eprintln!("recon error: {}", e);
        std::process::exit(1);
    }
}
