use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};

use cell_universe::export::PngExporter;
use cell_universe::loader::{self, ImageStackLoader};
use cell_universe::population;
use cell_universe::{FrameReport, Lineage, SearchContext};
use cell_universe_common::{BaseConfig, FrameSnapshot, OutputConfig};

/// Fit growing cell populations to a time-lapse of microscopy volumes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Frame path pattern; `{}` is replaced by the frame number
    #[arg(short, long)]
    input: String,

    /// First frame number substituted into the input pattern
    #[arg(long, default_value_t = 0)]
    first_frame: usize,

    /// Last frame number (inclusive). Without it, frames are read until one is missing
    #[arg(long)]
    last_frame: Option<usize>,

    /// Initial cells CSV (`file,name,x,y,z,radius`)
    #[arg(long)]
    initial: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Frames before this index keep their supplied cells and are not searched
    #[arg(long)]
    continue_from: Option<usize>,

    /// Overrides `simulation.seed`
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    logger(Env::default()).init();
    run(Args::parse())
}

/// `info` unless the environment's filter variable says otherwise.
fn logger(env: Env) -> Builder {
    Builder::from_env(env.default_filter_or("info"))
}

fn run(args: Args) -> Result<()> {
    info!("Starting cell universe...");

    let mut config = BaseConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    debug!("Configuration: {:#?}", config);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let paths = loader::frame_paths(&args.input, args.first_frame, args.last_frame)?;
    info!("Loading {} frames...", paths.len());
    let frames = loader::load_frames(&ImageStackLoader::from_config(&config.simulation), &paths)?;

    let initial = match &args.initial {
        Some(path) => population::read_initial_cells(path, &config)?,
        None => HashMap::new(),
    };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory '{}'", args.output.display()))?;
    let output_config = config.output.clone();
    let context = Arc::new(SearchContext::new(config));
    let mut lineage = Lineage::new(context, frames, initial, args.continue_from)?;
    let exporter = PngExporter::new(&args.output);

    let progress_bar = ProgressBar::new(lineage.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let mut snapshots: Vec<FrameSnapshot> = Vec::with_capacity(lineage.len());
    for index in 0..lineage.len() {
        let report = if lineage.is_settled(index) {
            info!("Frame {} kept from a previous run", index);
            FrameReport::unchanged(index, lineage.frame(index)?)
        } else {
            lineage.optimize(index)?
        };
        lineage.advance(index)?;

        if output_config.save_images {
            lineage.save(index, &exporter)?;
        }
        if output_config.save_cells {
            population::write_cells_csv(args.output.join("cells.csv"), &lineage.frames()[..=index])?;
        }
        snapshots.push(report.into_snapshot(population::frame_records(lineage.frame(index)?)));
        progress_bar.inc(1);
    }
    progress_bar.finish_with_message(format!("Completed {} frames", lineage.len()));

    let total_duration = start_time.elapsed();
    info!(
        "Lineage finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    write_snapshots(&args.output, &output_config, &snapshots)
}

/// Writes the per-frame summaries in the configured format. Unknown formats
/// fall back to JSON.
fn write_snapshots(dir: &Path, output: &OutputConfig, snapshots: &[FrameSnapshot]) -> Result<()> {
    let requested = output.format.as_deref().unwrap_or("json");
    let format = match requested {
        "json" | "bincode" | "messagepack" => requested,
        other => {
            error!("Unknown output format: {}. Using JSON instead.", other);
            "json"
        }
    };
    let extension = match format {
        "bincode" => "bin",
        "messagepack" => "msgpack",
        _ => "json",
    };
    let path = dir.join(format!("{}_snapshots.{}", output.base_filename, extension));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        "bincode" => bincode::serialize_into(&mut writer, snapshots)
            .context("Failed to serialize snapshots to bincode")?,
        "messagepack" => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Failed to serialize snapshots to MessagePack")?,
        _ => serde_json::to_writer(&mut writer, snapshots)
            .context("Failed to serialize snapshots to JSON")?,
    }
    writer.flush()?;
    info!("Frame summaries saved to {} ({} format)", path.display(), format);
    Ok(())
}
