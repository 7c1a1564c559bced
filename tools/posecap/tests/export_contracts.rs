use posecap::config::{load_config, CliOverrides};
use posecap::errors::PosecapError;
use posecap::export::{
    parse_json, to_csv, to_json, write_export, CsvLayout, ExportOptions,
};
use posecap::runtime::{
    FakeFileSystem, FakeTerminal, FileSystem, ProductionFileSystem, ProductionRuntime,
};
use posecap::selection::{downsample, Selection};
use posecap::types::ExportFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const WRIST_TRACE: &str = include_str!("fixtures/traces/wrist-steady.json");
const CONTROLLER_TRACE: &str = include_str!("fixtures/traces/controllers.json");

fn fake_runtime(fs: FakeFileSystem, terminal: FakeTerminal) -> ProductionRuntime {
    ProductionRuntime {
        file_system: Arc::new(fs),
        terminal: Arc::new(terminal),
    }
}

fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
    list.iter().map(Into::into).collect()
}

#[test]
fn json_round_trip_preserves_samples_field_for_field() {
    let samples = parse_json(WRIST_TRACE).expect("fixture");
    assert_eq!(samples.len(), 62);
    let again = parse_json(&to_json(&samples)).expect("round trip");
    assert_eq!(again, samples);
    assert!(again[1].orientation.is_none());
    assert_eq!(again[0].orientation.and_then(|o| o.w), Some(1.0));
}

#[test]
fn csv_rows_follow_buffer_order() {
    let samples = parse_json(CONTROLLER_TRACE).expect("fixture");
    let csv = to_csv(&samples);
    let rows = csv.lines().skip(1).collect::<Vec<_>>();
    assert_eq!(rows.len(), samples.len());
    for (row, sample) in rows.iter().zip(&samples) {
        assert!(row.starts_with(&format!("{},{},", sample.timestamp, sample.target_id)));
    }
    assert!(rows[0].ends_with(",0,0.7071,0,0.7071"));
}

#[test]
fn downsample_keeps_multiples_of_stride() {
    let samples = parse_json(WRIST_TRACE).expect("fixture");
    let kept = downsample(&samples, 7).expect("stride");
    assert_eq!(kept.len(), 9);
    for (idx, sample) in kept.iter().enumerate() {
        assert_eq!(sample, &samples[idx * 7]);
    }
}

#[test]
fn write_export_lands_on_disk() {
    let temp = tempfile::tempdir().expect("tempdir");
    let samples = Selection {
        targets: Some(["wrist".to_string()].into_iter().collect()),
        stride: 1,
    }
    .apply(&parse_json(WRIST_TRACE).expect("fixture"))
    .expect("selection");

    let receipts = write_export(
        &ProductionFileSystem,
        &temp.path().join("out"),
        "wrist_only",
        ExportOptions {
            format: ExportFormat::Both,
            csv_layout: CsvLayout::Legacy,
        },
        &samples,
    )
    .expect("export");

    assert_eq!(receipts.len(), 2);
    let csv = std::fs::read_to_string(temp.path().join("out/wrist_only.csv")).expect("csv");
    assert!(csv.starts_with("timestamp,x,y,z\n1000,0.1,1.2,-0.3\n"));
    assert_eq!(receipts[0].bytes, csv.len());
    let json = ProductionFileSystem
        .read_to_string(&temp.path().join("out/wrist_only.json"))
        .expect("json");
    assert_eq!(parse_json(&json).expect("parse").len(), 31);
}

#[test]
fn record_through_fake_runtime_writes_both_files() {
    let fs = FakeFileSystem::with_file("/work/trace.json", WRIST_TRACE);
    let terminal = FakeTerminal::new(true);
    let runtime = fake_runtime(fs.clone(), terminal.clone());

    let code = posecap::run_with_runtime(
        &args(&[
            "posecap",
            "record",
            "--trace",
            "trace.json",
            "--duration",
            "1",
            "--interval-ms",
            "250",
            "--out",
            "captures",
        ]),
        Path::new("/work"),
        &runtime,
    )
    .expect("record");
    assert_eq!(code, 0);

    let lines = terminal.written_lines();
    assert_eq!(
        lines[0],
        "recording finished: samples=4 reason=duration_elapsed started_at=1000 ended_at=2000"
    );
    assert!(lines[1].starts_with("exported path=/work/captures/hand_tracking_data.csv samples=4"));
    assert!(fs.created_dirs().contains(&PathBuf::from("/work/captures")));

    let csv = fs
        .file("/work/captures/hand_tracking_data.csv")
        .expect("csv written");
    assert_eq!(csv.lines().count(), 5);
    assert!(fs.file("/work/captures/hand_tracking_data.json").is_some());
}

#[test]
fn record_reports_fallback_lines_without_a_tty() {
    let fs = FakeFileSystem::with_file("/work/trace.json", WRIST_TRACE);
    let terminal = FakeTerminal::new(false);
    let runtime = fake_runtime(fs, terminal.clone());

    posecap::run_with_runtime(
        &args(&["posecap", "record", "--trace", "trace.json", "--duration", "0.5"]),
        Path::new("/work"),
        &runtime,
    )
    .expect("record");
    assert_eq!(
        terminal.written_lines()[0],
        "scope=record state=idle message=samples=1 reason=duration_elapsed started_at=1000 ended_at=1500"
    );
}

#[test]
fn failing_file_system_surfaces_as_io_error() {
    let fs = FakeFileSystem::with_file("/work/trace.json", WRIST_TRACE);
    let runtime = fake_runtime(fs.clone(), FakeTerminal::new(true));
    fs.set_fail_next(PosecapError::Io("disk full".to_string()));

    let err = posecap::run_with_runtime(
        &args(&["posecap", "inspect", "trace.json"]),
        Path::new("/work"),
        &runtime,
    )
    .expect_err("read fails");
    assert!(matches!(err, PosecapError::Io(_)));
}

#[test]
fn convert_and_inspect_through_fake_runtime() {
    let fs = FakeFileSystem::with_file("/work/controllers.json", CONTROLLER_TRACE);
    let terminal = FakeTerminal::new(true);
    let runtime = fake_runtime(fs.clone(), terminal.clone());

    posecap::run_with_runtime(
        &args(&[
            "posecap",
            "convert",
            "controllers.json",
            "--format",
            "json",
            "--target",
            "right",
            "--stride",
            "5",
            "--out",
            "right.json",
        ]),
        Path::new("/work"),
        &runtime,
    )
    .expect("convert");
    let right = parse_json(&fs.file("/work/right.json").expect("written")).expect("json");
    let stamps = right.iter().map(|s| s.timestamp).collect::<Vec<_>>();
    assert_eq!(stamps, vec![0, 250, 500, 750, 1000]);

    posecap::run_with_runtime(
        &args(&["posecap", "inspect", "right.json", "--frames"]),
        Path::new("/work"),
        &runtime,
    )
    .expect("inspect");
    let frames: serde_json::Value =
        serde_json::from_str(terminal.written_lines().last().expect("frames")).expect("json");
    assert_eq!(frames.as_array().map(Vec::len), Some(5));
    assert_eq!(frames[1]["timestamp"], 250);
    assert_eq!(frames[1]["right"]["orientation"]["w"], 0.7071);
}

#[test]
fn config_file_is_read_through_the_file_system_seam() {
    let fs = FakeFileSystem::with_file(
        "/cfg/posecap.toml",
        include_str!("fixtures/configs/short-wrist.toml"),
    );
    let cfg = load_config(
        &CliOverrides {
            config_path: Some(PathBuf::from("/cfg/posecap.toml")),
            ..CliOverrides::default()
        },
        &fs,
    )
    .expect("config");
    assert_eq!(cfg.export.file_stem, "short_wrist");
    assert_eq!(cfg.capture_config().duration_ms(), 2_000);
}

#[test]
fn invalid_cli_arguments_are_cli_errors() {
    let runtime = fake_runtime(FakeFileSystem::default(), FakeTerminal::new(true));
    let err = posecap::run_with_runtime(
        &args(&["posecap", "convert", "in.json", "--format", "yaml"]),
        Path::new("/work"),
        &runtime,
    )
    .expect_err("bad format");
    assert!(matches!(err, PosecapError::Cli(_)));
}
