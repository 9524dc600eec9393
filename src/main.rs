use anyhow::Context;
use clap::{Parser, Subcommand};
use green_view::core_modules::utils::image_helper::image_helper;
use green_view::logging::setup_logging;
use green_view::panorama::DirectoryTileSource;
use green_view::{GreenViewPipeline, PanoramaLedger, ParallelPipeline, PipelineConfig};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "green_view")]
#[command(version, about = "Green view index estimation for street-level panorama tiles", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults are used when omitted
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base log level, overridden by RUST_LOG
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify individual tiles and print their green percent
    Tile {
        /// Tile image(s)
        #[arg(value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,
    },

    /// Measure every panorama in a directory of <pano>_<heading>.<ext> tiles
    Batch {
        /// Directory holding the directional tiles
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Write report lines to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Number of parallel workers
        #[arg(short = 'j', long, value_name = "N")]
        workers: Option<usize>,

        /// Keep an existing output file, skip the panoramas it already
        /// reports and append the rest
        #[arg(long, requires = "out")]
        resume: bool,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_tiles(config: PipelineConfig, images: &[PathBuf]) -> anyhow::Result<()> {
    let pipeline = GreenViewPipeline::new(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for path in images {
        let tile = image_helper::load(path)?;
        let report = pipeline
            .classify_tile(&tile)
            .with_context(|| format!("classifying {}", path.display()))?;
        writeln!(
            out,
            "{}: green {:.4}% (threshold {:.4})",
            path.display(),
            report.green_percent,
            report.threshold.clamped
        )?;
    }
    Ok(())
}

/// Ledger of panoramas already reported in `out`, when resuming into it.
fn resume_ledger(out: Option<&Path>, resume: bool) -> anyhow::Result<PanoramaLedger> {
    match out {
        Some(path) if resume && path.is_file() => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let ledger = PanoramaLedger::from_report_lines(BufReader::new(file))
                .with_context(|| format!("reading {}", path.display()))?;
            info!(already_reported = ledger.len(), out = %path.display(), "resuming batch");
            Ok(ledger)
        }
        _ => Ok(PanoramaLedger::new()),
    }
}

async fn run_batch(
    mut config: PipelineConfig,
    dir: &Path,
    out: Option<&Path>,
    workers: Option<usize>,
    resume: bool,
) -> anyhow::Result<()> {
    if workers.is_some() {
        config.worker_count = workers;
    }

    let source = DirectoryTileSource::new(dir, config.tile_extension.clone());
    let pano_ids = source
        .panorama_ids()
        .with_context(|| format!("scanning {}", dir.display()))?;
    info!(panoramas = pano_ids.len(), dir = %dir.display(), "found panoramas");

    let mut ledger = resume_ledger(out, resume)?;
    let pipeline = ParallelPipeline::new(config, Arc::new(source))?;
    let reports = pipeline.process_batch(pano_ids, &mut ledger).await;
    pipeline.shutdown().await;

    let mut writer: Box<dyn Write> = match out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(resume)
                .truncate(!resume)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout().lock()),
    };
    for report in &reports {
        writeln!(writer, "{report}")?;
    }
    writer.flush()?;

    let failed = reports.iter().filter(|r| !r.green_view.is_measured()).count();
    info!(measured = reports.len() - failed, failed, "batch complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level)?;

    match cli.command {
        Commands::Tile { images } => {
            let config = load_config(cli.config.as_deref())?;
            run_tiles(config, &images)
        }
        Commands::Batch {
            dir,
            out,
            workers,
            resume,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_batch(config, &dir, out.as_deref(), workers, resume).await
        }
        Commands::InitConfig { path } => {
            PipelineConfig::default().to_json_file(&path)?;
            info!(path = %path.display(), "wrote default configuration");
            Ok(())
        }
    }
}
