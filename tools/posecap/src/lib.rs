pub mod analysis;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod errors;
pub mod export;
pub mod fsm;
pub mod log_retention;
pub mod logging;
pub mod platform;
pub mod pose_source;
pub mod replay;
pub mod runtime;
pub mod sample;
pub mod selection;
pub mod session;
pub mod types;

use analysis::{summarize, to_frames_json, TargetSummary, CHANNELS};
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use config::{absolutize_path, load_config, CliOverrides};
use driver::{stop_channel, TickDriver, DEFAULT_FRAME_MS};
use errors::PosecapError;
use export::{parse_json, to_csv_with_layout, to_json, write_export, CsvLayout};
use logging::structured_fallback_line;
use replay::trace::TracePlatform;
use runtime::{FakeClock, ProductionRuntime};
use selection::Selection;
use session::SessionController;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use types::{ExportFormat, SourceKind};

#[derive(Debug, Clone, Parser)]
#[command(name = "posecap")]
#[command(about = "Record, convert and inspect hand and controller pose captures")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one capture session against a recorded pose trace.
    Record(RecordArgs),
    /// Re-export a JSON recording, optionally filtered and downsampled.
    Convert(ConvertArgs),
    /// Per-target sample counts and channel ranges.
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct RecordArgs {
    #[arg(long)]
    pub trace: PathBuf,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub format: Option<CliFormat>,
    #[arg(long)]
    pub duration: Option<f64>,
    #[arg(long = "interval-ms", conflicts_with = "per_frame")]
    pub interval_ms: Option<u64>,
    #[arg(long, default_value_t = false)]
    pub per_frame: bool,
    #[arg(long = "target")]
    pub targets: Vec<String>,
    #[arg(long, value_enum)]
    pub source: Option<CliSource>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ConvertArgs {
    pub input: PathBuf,
    #[arg(long, value_enum)]
    pub format: ConvertFormat,
    #[arg(long, default_value_t = 1)]
    pub stride: usize,
    #[arg(long = "target")]
    pub targets: Vec<String>,
    #[arg(long, default_value_t = false)]
    pub legacy: bool,
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct InspectArgs {
    pub input: PathBuf,
    #[arg(long)]
    pub target: Option<String>,
    /// Print samples grouped by timestamp instead of the summary.
    #[arg(long, default_value_t = false)]
    pub frames: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFormat {
    Csv,
    Json,
    Both,
}

impl From<CliFormat> for ExportFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Csv => ExportFormat::Csv,
            CliFormat::Json => ExportFormat::Json,
            CliFormat::Both => ExportFormat::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConvertFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliSource {
    Hand,
    Controller,
}

impl From<CliSource> for SourceKind {
    fn from(value: CliSource) -> Self {
        match value {
            CliSource::Hand => SourceKind::Hand,
            CliSource::Controller => SourceKind::Controller,
        }
    }
}

pub fn run() -> Result<i32, PosecapError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| PosecapError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PosecapError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(PosecapError::Cli(error.to_string())),
        },
    };

    match cli.command {
        Command::Record(args) => run_record(&args, cwd, runtime),
        Command::Convert(args) => run_convert(&args, cwd, runtime),
        Command::Inspect(args) => run_inspect(&args, cwd, runtime),
    }
}

fn run_record(
    args: &RecordArgs,
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PosecapError> {
    let overrides = CliOverrides {
        config_path: args.config.as_ref().map(|path| absolutize_path(cwd, path)),
        out_dir: args.out.clone(),
        format: args.format.map(Into::into),
        duration_seconds: args.duration,
        interval_ms: args.interval_ms,
        per_frame: args.per_frame,
        targets: args.targets.clone(),
        source: args.source.map(Into::into),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;
    let capture = cfg.capture_config();

    let trace_text = runtime
        .file_system
        .read_to_string(&absolutize_path(cwd, &args.trace))?;
    let trace = TracePlatform::from_json(&trace_text)?;
    let logger = cfg.logger(cwd);
    if let Some(logger) = &logger {
        logger.emit(
            "info",
            "replay.loaded",
            serde_json::json!({
                "path": args.trace.display().to_string(),
                "targets": trace.targets(),
                "first": trace.first_timestamp(),
                "last": trace.last_timestamp(),
            }),
        );
    }

    // Replays run on a virtual clock anchored at the first trace sample.
    let clock = FakeClock::at_millis(trace.first_timestamp());
    let mut controller = SessionController::new(Arc::new(trace), Arc::new(clock.clone()));
    if let Some(logger) = logger {
        controller = controller.with_logger(logger);
    }

    let executor = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| PosecapError::Io(e.to_string()))?;
    executor.block_on(controller.start(capture.clone()))?;

    let driver = TickDriver::for_config(Arc::new(clock), &capture, DEFAULT_FRAME_MS);
    let (_stop, signal) = stop_channel();
    let recording = driver.run(&mut controller, &signal)?;

    let summary = format!(
        "samples={} reason={} started_at={} ended_at={}",
        recording.len(),
        recording.reason.as_str(),
        recording
            .started_at
            .map_or_else(|| "-".to_string(), |t| t.to_string()),
        recording
            .ended_at
            .map_or_else(|| "-".to_string(), |t| t.to_string()),
    );
    if runtime.terminal.stdin_is_tty() {
        runtime
            .terminal
            .write_line(&format!("recording finished: {summary}"))?;
    } else {
        runtime.terminal.write_line(
            structured_fallback_line("record", controller.state().as_str(), &summary).trim_end(),
        )?;
    }

    let samples = cfg.selection().apply(recording.snapshot())?;
    let dir = absolutize_path(cwd, &cfg.export.directory);
    let receipts = write_export(
        runtime.file_system.as_ref(),
        &dir,
        &cfg.export.file_stem,
        cfg.export_options(),
        &samples,
    )?;
    for receipt in receipts {
        runtime.terminal.write_line(&format!(
            "exported path={} samples={} bytes={} sha256={}",
            receipt.path.display(),
            receipt.samples,
            receipt.bytes,
            receipt.sha256
        ))?;
    }
    Ok(0)
}

fn run_convert(
    args: &ConvertArgs,
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PosecapError> {
    let text = runtime
        .file_system
        .read_to_string(&absolutize_path(cwd, &args.input))?;
    let samples = parse_json(&text)?;
    let selection = Selection {
        targets: target_filter(&args.targets),
        stride: args.stride,
    };
    let selected = selection.apply(&samples)?;

    let output = match args.format {
        ConvertFormat::Csv => {
            let layout = if args.legacy {
                CsvLayout::Legacy
            } else {
                CsvLayout::Tagged
            };
            to_csv_with_layout(&selected, layout)?
        }
        ConvertFormat::Json => {
            if args.legacy {
                return Err(PosecapError::Cli(
                    "--legacy only applies to csv output".to_string(),
                ));
            }
            to_json(&selected)
        }
    };

    match &args.out {
        Some(path) => {
            let path = absolutize_path(cwd, path);
            if let Some(parent) = path.parent() {
                runtime.file_system.create_dir_all(parent)?;
            }
            runtime.file_system.write_string(&path, &output)?;
            runtime.terminal.write_line(&format!(
                "converted path={} samples={}",
                path.display(),
                selected.len()
            ))?;
        }
        None => runtime.terminal.write_line(output.trim_end_matches('\n'))?,
    }
    Ok(0)
}

fn run_inspect(
    args: &InspectArgs,
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PosecapError> {
    let text = runtime
        .file_system
        .read_to_string(&absolutize_path(cwd, &args.input))?;
    let mut samples = parse_json(&text)?;
    if let Some(target) = &args.target {
        samples.retain(|sample| &sample.target_id == target);
        if samples.is_empty() {
            return Err(PosecapError::Cli(format!(
                "no samples for target `{target}`"
            )));
        }
    }

    if args.frames {
        runtime.terminal.write_line(&to_frames_json(&samples)?)?;
        return Ok(0);
    }

    let summaries = summarize(&samples);
    if summaries.is_empty() {
        runtime.terminal.write_line("empty recording")?;
    }
    for summary in &summaries {
        runtime.terminal.write_line(&format_summary(summary))?;
    }
    Ok(0)
}

fn format_summary(summary: &TargetSummary) -> String {
    let mut line = format!(
        "target={} samples={} first={} last={}",
        summary.target_id, summary.samples, summary.first_timestamp, summary.last_timestamp
    );
    for channel in CHANNELS {
        if let Some(range) = summary.ranges.get(channel) {
            line.push_str(&format!(" {channel}=[{},{}]", range.min, range.max));
        }
    }
    line
}

fn target_filter(targets: &[String]) -> Option<BTreeSet<String>> {
    if targets.is_empty() {
        None
    } else {
        Some(targets.iter().cloned().collect())
    }
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}
