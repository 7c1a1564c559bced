use crate::errors::PosecapError;
use crate::export::{CsvLayout, ExportOptions};
use crate::logging::{JsonlLogger, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::selection::Selection;
use crate::session::{Cadence, CaptureConfig};
use crate::types::{ExportFormat, ReferenceSpaceKind, SessionMode, SourceKind, StartPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub format: Option<ExportFormat>,
    pub duration_seconds: Option<f64>,
    pub interval_ms: Option<u64>,
    pub per_frame: bool,
    pub targets: Vec<String>,
    pub source: Option<SourceKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub capture: CaptureSection,
    pub session: SessionSection,
    pub export: ExportSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    pub source: SourceKind,
    pub targets: Vec<String>,
    pub max_duration_seconds: f64,
    pub sampling_interval_ms: u64,
    pub per_frame: bool,
    pub start_policy: StartPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSection {
    pub mode: SessionMode,
    pub reference_space: ReferenceSpaceKind,
    pub optional_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSection {
    pub directory: PathBuf,
    pub file_stem: String,
    pub format: ExportFormat,
    pub legacy_csv: bool,
    pub stride: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSection {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSection {
                source: SourceKind::Hand,
                targets: vec!["wrist".to_string()],
                max_duration_seconds: 50.0,
                sampling_interval_ms: 500,
                per_frame: false,
                start_policy: StartPolicy::Immediate,
            },
            session: SessionSection {
                mode: SessionMode::ImmersiveAr,
                reference_space: ReferenceSpaceKind::Local,
                optional_features: Vec::new(),
            },
            export: ExportSection {
                directory: PathBuf::from("."),
                file_stem: "hand_tracking_data".to_string(),
                format: ExportFormat::Both,
                legacy_csv: false,
                stride: 1,
            },
            logging: LoggingSection {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

impl AppConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        let cadence = if self.capture.per_frame {
            Cadence::PerFrame
        } else {
            Cadence::IntervalMs(self.capture.sampling_interval_ms)
        };
        CaptureConfig {
            source: self.capture.source,
            targets: self.capture.targets.iter().cloned().collect(),
            max_duration_seconds: self.capture.max_duration_seconds,
            cadence,
            start_policy: self.capture.start_policy,
            mode: self.session.mode,
            reference_space: self.session.reference_space,
            optional_features: self.session.optional_features.clone(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            format: self.export.format,
            csv_layout: if self.export.legacy_csv {
                CsvLayout::Legacy
            } else {
                CsvLayout::Tagged
            },
        }
    }

    pub fn selection(&self) -> Selection {
        Selection {
            targets: None,
            stride: self.export.stride,
        }
    }

    /// Relative log paths resolve against `base`.
    pub fn logger(&self, base: &Path) -> Option<JsonlLogger> {
        self.logging.path.as_ref().map(|path| JsonlLogger {
            path: absolutize_path(base, path),
            max_payload_bytes: self.logging.max_payload_bytes,
            budget_bytes: self.logging.budget_bytes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    capture: Option<PartialCaptureSection>,
    session: Option<PartialSessionSection>,
    export: Option<PartialExportSection>,
    logging: Option<PartialLoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCaptureSection {
    source: Option<SourceKind>,
    targets: Option<Vec<String>>,
    max_duration_seconds: Option<f64>,
    sampling_interval_ms: Option<u64>,
    per_frame: Option<bool>,
    start_policy: Option<StartPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialSessionSection {
    mode: Option<SessionMode>,
    reference_space: Option<ReferenceSpaceKind>,
    optional_features: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialExportSection {
    directory: Option<PathBuf>,
    file_stem: Option<String>,
    format: Option<ExportFormat>,
    legacy_csv: Option<bool>,
    stride: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingSection {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<AppConfig, PosecapError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Merges a TOML document over the defaults without validating it.
pub fn parse_config(text: &str) -> Result<AppConfig, PosecapError> {
    let partial: PartialAppConfig =
        toml::from_str(text).map_err(|e| PosecapError::ConfigParse(e.to_string()))?;
    let mut cfg = AppConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(capture) = partial.capture {
        if let Some(value) = capture.source {
            cfg.capture.source = value;
            // controller captures default to the right hand, not a joint
            if value == SourceKind::Controller && capture.targets.is_none() {
                cfg.capture.targets = vec!["right".to_string()];
            }
        }
        if let Some(value) = capture.targets {
            cfg.capture.targets = value;
        }
        if let Some(value) = capture.max_duration_seconds {
            cfg.capture.max_duration_seconds = value;
        }
        if let Some(value) = capture.sampling_interval_ms {
            cfg.capture.sampling_interval_ms = value;
        }
        if let Some(value) = capture.per_frame {
            cfg.capture.per_frame = value;
        }
        if let Some(value) = capture.start_policy {
            cfg.capture.start_policy = value;
        }
    }

    if let Some(session) = partial.session {
        if let Some(value) = session.mode {
            cfg.session.mode = value;
        }
        if let Some(value) = session.reference_space {
            cfg.session.reference_space = value;
        }
        if let Some(value) = session.optional_features {
            cfg.session.optional_features = value;
        }
    }

    if let Some(export) = partial.export {
        if let Some(value) = export.directory {
            cfg.export.directory = value;
        }
        if let Some(value) = export.file_stem {
            cfg.export.file_stem = value;
        }
        if let Some(value) = export.format {
            cfg.export.format = value;
        }
        if let Some(value) = export.legacy_csv {
            cfg.export.legacy_csv = value;
        }
        if let Some(value) = export.stride {
            cfg.export.stride = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(source) = overrides.source {
        if source != cfg.capture.source && overrides.targets.is_empty() {
            cfg.capture.targets = match source {
                SourceKind::Hand => vec!["wrist".to_string()],
                SourceKind::Controller => vec!["right".to_string()],
            };
        }
        cfg.capture.source = source;
    }
    if !overrides.targets.is_empty() {
        cfg.capture.targets = overrides.targets.clone();
    }
    if let Some(seconds) = overrides.duration_seconds {
        cfg.capture.max_duration_seconds = seconds;
    }
    if let Some(interval) = overrides.interval_ms {
        cfg.capture.sampling_interval_ms = interval;
        cfg.capture.per_frame = false;
    }
    if overrides.per_frame {
        cfg.capture.per_frame = true;
    }
    if let Some(dir) = &overrides.out_dir {
        cfg.export.directory = dir.clone();
    }
    if let Some(format) = overrides.format {
        cfg.export.format = format;
    }
}

pub fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

pub fn validate_config(cfg: &AppConfig) -> Result<(), PosecapError> {
    cfg.capture_config()
        .validate()
        .map_err(|e| PosecapError::InvalidConfig(e.to_string()))?;

    if cfg.export.stride == 0 {
        return Err(PosecapError::InvalidConfig(
            "export.stride must be greater than zero".to_string(),
        ));
    }

    let stem = cfg.export.file_stem.trim();
    if stem.is_empty() || stem.contains(['/', '\\']) {
        return Err(PosecapError::InvalidConfig(format!(
            "export.file_stem must be a plain file name, got `{}`",
            cfg.export.file_stem
        )));
    }

    if cfg.export.legacy_csv && cfg.capture.targets.len() > 1 && cfg.export.format.includes_csv() {
        return Err(PosecapError::InvalidConfig(
            "export.legacy_csv holds a single target; select one target or disable it"
                .to_string(),
        ));
    }

    Ok(())
}
