use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use facetrack_core::detection::infrastructure::replay_face_detector::ReplayFaceDetector;
use facetrack_core::persistence::infrastructure::sqlite_face_repository::SqliteFaceRepository;
use facetrack_core::pipeline::export_best_faces_use_case::ExportBestFacesUseCase;
use facetrack_core::pipeline::frame_processor::FrameProcessor;
use facetrack_core::pipeline::run_logger::LogRunLogger;
use facetrack_core::pipeline::track_faces_use_case::{
    FrameCallback, RunSummary, TrackFacesUseCase,
};
use facetrack_core::shared::clock::SystemClock;
use facetrack_core::shared::constants::DEFAULT_DATABASE_PATH;
use facetrack_core::tracking::domain::identity_registry::IdentityRegistry;
use facetrack_core::tracking::domain::tracker_config::{MatchPolicy, TrackerConfig};
use facetrack_core::video::domain::video_reader::VideoReader;
use facetrack_core::video::infrastructure::image_file_writer::ImageFileWriter;
use facetrack_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

/// Track faces across a frame sequence and keep the best crop of each.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Directory of frame images (played in file name order) or a single image.
    input: PathBuf,

    /// JSON file with the detector output for each frame.
    #[arg(long)]
    detections: PathBuf,

    /// SQLite database for faces and detections.
    #[arg(long, default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,

    /// Tracker config file (JSON). Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum IoU (exclusive) to continue a tracked face (0.0-1.0).
    #[arg(long)]
    iou_threshold: Option<f64>,

    /// Let each tracked face claim at most one detection per frame.
    #[arg(long)]
    exclusive_matching: bool,

    /// Forget a tracked face after this many frames without a match.
    #[arg(long)]
    max_missed: Option<usize>,

    /// Drop all stored faces and detections before tracking.
    #[arg(long)]
    reset: bool,

    /// Write the best crop of every face to this directory after tracking.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Write one JSON line per processed frame to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current frame");
        flag.store(true, Ordering::Relaxed);
    })?;

    let summary = track(&cli, cancelled)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Tracks `cli.input` until the stream ends, a frame fails to load or
/// `cancelled` is raised, then exports crops if asked to.
fn track(
    cli: &Cli,
    cancelled: Arc<AtomicBool>,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let config = build_config(cli)?;

    let mut repository = SqliteFaceRepository::open(&cli.database)?;
    if cli.reset {
        repository.reset()?;
    }

    let detector = ReplayFaceDetector::from_file(&cli.detections)?;
    let mut reader: Box<dyn VideoReader> = Box::new(ImageSequenceReader::new());
    let metadata = reader.open(&cli.input)?;
    log::info!(
        "Tracking {} frames ({}x{}) from {}",
        metadata.total_frames,
        metadata.width,
        metadata.height,
        cli.input.display()
    );

    let report_failed = Arc::new(AtomicBool::new(false));
    let on_frame = match &cli.report {
        Some(path) => Some(report_sink(path, report_failed.clone())?),
        None => None,
    };

    let mut registry = IdentityRegistry::from_config(&config);
    let mut use_case = TrackFacesUseCase::new(
        reader,
        Box::new(detector),
        FrameProcessor::new(&config),
        Box::new(SystemClock),
        Box::new(LogRunLogger::default()),
        on_frame,
        Some(cancelled),
    );
    let summary = use_case.execute(&metadata, &mut registry, &mut repository)?;
    if report_failed.load(Ordering::Relaxed) {
        return Err("Failed to write frame report, tracking stopped".into());
    }

    if let Some(dir) = &cli.export_dir {
        let exporter = ExportBestFacesUseCase::new(Box::new(ImageFileWriter::new()), None);
        let written = exporter.execute(&repository, dir)?;
        log::info!("Saved {} best face crops to {}", written.len(), dir.display());
    }

    Ok(summary)
}

fn build_config(cli: &Cli) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(threshold) = cli.iou_threshold {
        config.iou_threshold = threshold;
    }
    if cli.exclusive_matching {
        config.match_policy = MatchPolicy::Exclusive;
    }
    if cli.max_missed.is_some() {
        config.max_missed_frames = cli.max_missed;
    }
    config.validate()?;
    Ok(config)
}

/// Streams frame reports to `path` as JSON lines. A write failure stops
/// the run and raises `failed`.
fn report_sink(
    path: &Path,
    failed: Arc<AtomicBool>,
) -> Result<FrameCallback, Box<dyn std::error::Error>> {
    let mut out = LineWriter::new(File::create(path)?);
    Ok(Box::new(move |report| {
        let written = serde_json::to_string(report)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(out, "{line}"));
        match written {
            Ok(()) => true,
            Err(e) => {
                log::error!("Writing frame report failed: {e}");
                failed.store(true, Ordering::Relaxed);
                false
            }
        }
    }))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if !cli.detections.is_file() {
        return Err(format!("Detections file not found: {}", cli.detections.display()).into());
    }
    if let Some(threshold) = cli.iou_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "IoU threshold must be between 0.0 and 1.0, got {threshold}"
            )
            .into());
        }
    }
    if let Some(dir) = &cli.export_dir {
        if dir.is_file() {
            return Err(format!("Export path is a file: {}", dir.display()).into());
        }
    }
    Ok(())
}
