//! pinhole-gauge CLI: calibrate a camera from chessboard photos and measure
//! real object sizes with the pinhole model.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pinhole_gauge::calib::CalibrationStore;
use pinhole_gauge::chessboard::DetectorKind;
use pinhole_gauge::core::{measure_extent, IntrinsicParameters, PixelSpan, RealExtent};
use pinhole_gauge::{
    load_gray, run_calibration, run_console, validate_extent, Dispatcher, MeasurementSession,
    PipelineConfig,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pinhole-gauge")]
#[command(about = "Camera calibration from chessboard photos and pinhole-model measurement")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON logs (tracing builds only).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate camera intrinsics from a directory of chessboard photos.
    Calibrate(CalibrateArgs),

    /// Interactive two-point measurement session on stdin.
    Measure(MeasureArgs),

    /// Real width and height of a pixel box at a known distance.
    Size(SizeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    Classical,
    Normalized,
}

impl DetectorArg {
    fn to_core(self) -> DetectorKind {
        match self {
            Self::Classical => DetectorKind::Classical,
            Self::Normalized => DetectorKind::Normalized,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Directory with calibration photos.
    #[arg(long)]
    images: Option<PathBuf>,

    /// JSON pipeline config. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interior corners per row.
    #[arg(long)]
    grid_width: Option<usize>,

    /// Interior corners per column.
    #[arg(long)]
    grid_height: Option<usize>,

    /// Square edge length in world units (e.g. mm).
    #[arg(long)]
    square_size: Option<f64>,

    #[arg(long, value_enum)]
    detector: Option<DetectorArg>,

    /// Minimum number of views with a detected board.
    #[arg(long)]
    min_views: Option<usize>,

    /// Directory for calibration records.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Record name (default: calib-<unix seconds>).
    #[arg(long)]
    run_id: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Calibration record (or bare intrinsics) JSON.
    #[arg(long, conflicts_with = "store")]
    intrinsics: Option<PathBuf>,

    /// Use the newest record in this calibration directory.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Image the points are selected on. Prompted for when omitted.
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct SizeArgs {
    /// Box width in pixels.
    #[arg(long)]
    width_px: f64,

    /// Box height in pixels.
    #[arg(long)]
    height_px: f64,

    /// Distance from camera to object.
    #[arg(long)]
    distance: f64,

    /// Calibration record (or bare intrinsics) JSON supplying fx and fy.
    #[arg(long, conflicts_with_all = ["fx", "fy"])]
    intrinsics: Option<PathBuf>,

    #[arg(long, required_unless_present = "intrinsics", requires = "fy")]
    fx: Option<f64>,

    #[arg(long, required_unless_present = "intrinsics", requires = "fx")]
    fy: Option<f64>,

    /// Known real width, to report the percent error.
    #[arg(long, requires = "actual_height")]
    actual_width: Option<f64>,

    /// Known real height, to report the percent error.
    #[arg(long, requires = "actual_width")]
    actual_height: Option<f64>,
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        pinhole_gauge::core::init_tracing(cli.log_json);
    }
    #[cfg(not(feature = "tracing"))]
    {
        use pinhole_gauge::core::{init_with_level, level_for_verbosity};
        let _ = init_with_level(level_for_verbosity(cli.verbose));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Calibrate(args) => run_calibrate(args),
        Commands::Measure(args) => run_measure(args),
        Commands::Size(args) => run_size(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

// ── calibrate ──────────────────────────────────────────────────────────

fn pipeline_config(args: &CalibrateArgs) -> CliResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.images {
        config.image_dir = dir.clone();
    }
    if let Some(dir) = &args.out {
        config.output_dir = dir.clone();
    }
    let target = &mut config.calibration.target;
    if let Some(w) = args.grid_width {
        target.grid_width = w;
    }
    if let Some(h) = args.grid_height {
        target.grid_height = h;
    }
    if let Some(s) = args.square_size {
        target.square_size = s;
    }
    if let Some(d) = args.detector {
        config.detector = d.to_core();
    }
    if let Some(n) = args.min_views {
        config.calibration.min_views = n;
    }
    Ok(config)
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let config = pipeline_config(args)?;
    let report = run_calibration(&config, args.run_id.clone())?;
    println!("{report}");
    Ok(())
}

// ── measure ────────────────────────────────────────────────────────────

/// A calibration record, or a bare `IntrinsicParameters` object.
fn load_intrinsics(path: &Path) -> CliResult<IntrinsicParameters> {
    match CalibrationStore::load_path(path) {
        Ok(record) => Ok(record.intrinsics),
        Err(record_err) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|_| record_err.into())
        }
    }
}

fn run_measure(args: &MeasureArgs) -> CliResult<()> {
    let intrinsics = match (&args.intrinsics, &args.store) {
        (Some(path), _) => Some(load_intrinsics(path)?),
        (None, Some(dir)) => {
            let record = CalibrationStore::new(dir)
                .latest()?
                .ok_or_else(|| format!("no calibration records in {}", dir.display()))?;
            log::info!("using calibration {}", record.run_id);
            Some(record.intrinsics)
        }
        (None, None) => None,
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let image_path = match &args.image {
        Some(path) => path.clone(),
        None => {
            print!("Image path: ");
            io::stdout().flush()?;
            let mut line = String::new();
            input.read_line(&mut line)?;
            PathBuf::from(line.trim())
        }
    };

    let img = load_gray(&image_path)?;
    println!(
        "Loaded {} ({}x{})",
        image_path.display(),
        img.width(),
        img.height()
    );

    let mut session = MeasurementSession::new().with_bounds(img.width(), img.height());
    if let Some(k) = intrinsics {
        println!("Intrinsics: fx={:.2} fy={:.2}", k.fx, k.fy);
        session = session.with_intrinsics(k);
    }
    let mut dispatcher = Dispatcher::new(session);
    run_console(&mut dispatcher, input, io::stdout().lock())?;
    Ok(())
}

// ── size ───────────────────────────────────────────────────────────────

fn run_size(args: &SizeArgs) -> CliResult<()> {
    let (fx, fy) = match (&args.intrinsics, args.fx, args.fy) {
        (Some(path), _, _) => {
            let k = load_intrinsics(path)?;
            (k.fx, k.fy)
        }
        (None, Some(fx), Some(fy)) => (fx, fy),
        _ => return Err("either --intrinsics or both --fx and --fy are required".into()),
    };

    let span = PixelSpan {
        dx: args.width_px,
        dy: args.height_px,
    };
    let extent = measure_extent(&span, args.distance, fx, fy)?;
    println!("Real width : {:.2}", extent.width);
    println!("Real height: {:.2}", extent.height);

    if let (Some(width), Some(height)) = (args.actual_width, args.actual_height) {
        let check = validate_extent(&extent, &RealExtent { width, height })?;
        println!("{check}");
    }
    Ok(())
}
