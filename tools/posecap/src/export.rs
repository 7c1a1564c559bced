//! CSV and JSON serialization of finished recordings.
//!
//! Serialization is read-only over the samples and cannot fail for a
//! well-formed buffer; an empty buffer gives a header-only CSV or `[]`.

use crate::errors::PosecapError;
use crate::runtime::FileSystem;
use crate::sample::Sample;
use crate::types::ExportFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "timestamp,targetId,x,y,z";
pub const LEGACY_CSV_HEADER: &str = "timestamp,x,y,z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvLayout {
    #[default]
    Tagged,
    /// Single-target `timestamp,x,y,z` rows.
    Legacy,
}

pub fn to_csv(samples: &[Sample]) -> String {
    let with_orientation = samples.iter().any(|s| s.orientation.is_some());
    let with_w = samples
        .iter()
        .any(|s| s.orientation.is_some_and(|o| o.w.is_some()));

    let mut out = String::from(CSV_HEADER);
    if with_orientation {
        out.push_str(",qx,qy,qz");
    }
    if with_w {
        out.push_str(",qw");
    }
    out.push('\n');

    for sample in samples {
        let _ = write!(
            out,
            "{},{},{},{},{}",
            sample.timestamp,
            csv_field(&sample.target_id),
            sample.position.x,
            sample.position.y,
            sample.position.z
        );
        if with_orientation {
            match sample.orientation {
                Some(o) => {
                    let _ = write!(out, ",{},{},{}", o.x, o.y, o.z);
                }
                None => out.push_str(",,,"),
            }
        }
        if with_w {
            out.push(',');
            if let Some(w) = sample.orientation.and_then(|o| o.w) {
                let _ = write!(out, "{w}");
            }
        }
        out.push('\n');
    }
    out
}

pub fn to_csv_with_layout(samples: &[Sample], layout: CsvLayout) -> Result<String, PosecapError> {
    match layout {
        CsvLayout::Tagged => Ok(to_csv(samples)),
        CsvLayout::Legacy => {
            let mut targets = samples.iter().map(|s| s.target_id.as_str());
            if let Some(first) = targets.next() {
                if let Some(other) = targets.find(|target| *target != first) {
                    return Err(PosecapError::Export(format!(
                        "legacy csv holds a single target, found `{first}` and `{other}`"
                    )));
                }
            }
            let mut out = format!("{LEGACY_CSV_HEADER}\n");
            for sample in samples {
                let _ = writeln!(
                    out,
                    "{},{},{},{}",
                    sample.timestamp, sample.position.x, sample.position.y, sample.position.z
                );
            }
            Ok(out)
        }
    }
}

pub fn to_json(samples: &[Sample]) -> String {
    serde_json::to_string_pretty(samples).unwrap_or_else(|_| "[]".to_string())
}

pub fn parse_json(text: &str) -> Result<Vec<Sample>, PosecapError> {
    let samples: Vec<Sample> =
        serde_json::from_str(text).map_err(|e| PosecapError::Parse(e.to_string()))?;
    if let Some(pair) = samples
        .windows(2)
        .find(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        return Err(PosecapError::Parse(format!(
            "samples out of order: {} after {}",
            pair[1].timestamp, pair[0].timestamp
        )));
    }
    Ok(samples)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    pub samples: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub csv_layout: CsvLayout,
}

/// Writes `<stem>.csv` and/or `<stem>.json` under `dir`.
pub fn write_export(
    fs: &dyn FileSystem,
    dir: &Path,
    stem: &str,
    options: ExportOptions,
    samples: &[Sample],
) -> Result<Vec<ExportReceipt>, PosecapError> {
    fs.create_dir_all(dir)?;
    let mut receipts = Vec::new();
    if options.format.includes_csv() {
        let text = to_csv_with_layout(samples, options.csv_layout)?;
        receipts.push(write_one(fs, dir.join(format!("{stem}.csv")), &text, samples.len())?);
    }
    if options.format.includes_json() {
        let text = to_json(samples);
        receipts.push(write_one(fs, dir.join(format!("{stem}.json")), &text, samples.len())?);
    }
    Ok(receipts)
}

fn write_one(
    fs: &dyn FileSystem,
    path: PathBuf,
    text: &str,
    samples: usize,
) -> Result<ExportReceipt, PosecapError> {
    fs.write_string(&path, text)?;
    Ok(ExportReceipt {
        bytes: text.len(),
        sha256: sha256_hex(text),
        samples,
        path,
    })
}

pub fn sha256_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;
    use crate::sample::{Orientation, Position};

    fn sample(timestamp: u64, target: &str, orientation: Option<Orientation>) -> Sample {
        Sample {
            timestamp,
            target_id: target.to_string(),
            position: Position {
                x: 0.123456789012345,
                y: -1.5,
                z: 2.0,
            },
            orientation,
        }
    }

    #[test]
    fn csv_keeps_full_precision_and_buffer_order() {
        let csv = to_csv(&[sample(10, "wrist", None), sample(20, "wrist", None)]);
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "timestamp,targetId,x,y,z");
        assert_eq!(lines[1], "10,wrist,0.123456789012345,-1.5,2");
        assert!(lines[2].starts_with("20,"));
    }

    #[test]
    fn orientation_columns_appear_only_when_present() {
        let with_quat = Orientation {
            x: 0.0,
            y: 0.7071,
            z: 0.0,
            w: Some(0.7071),
        };
        let csv = to_csv(&[sample(1, "wrist", None), sample(2, "wrist", Some(with_quat))]);
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "timestamp,targetId,x,y,z,qx,qy,qz,qw");
        assert!(lines[1].ends_with(",,,,"));
        assert!(lines[2].ends_with(",0,0.7071,0,0.7071"));
    }

    #[test]
    fn target_ids_with_commas_are_quoted() {
        let csv = to_csv(&[sample(1, "hand,\"left\"", None)]);
        assert!(csv.contains("1,\"hand,\"\"left\"\"\",0.123456789012345"));
    }

    #[test]
    fn empty_buffer_exports_header_and_empty_array() {
        assert_eq!(to_csv(&[]), "timestamp,targetId,x,y,z\n");
        assert_eq!(to_json(&[]), "[]");
        assert!(parse_json("[]").expect("parse").is_empty());
    }

    #[test]
    fn legacy_layout_rejects_mixed_targets() {
        let single = to_csv_with_layout(&[sample(5, "left", None)], CsvLayout::Legacy)
            .expect("single target");
        assert_eq!(single, "timestamp,x,y,z\n5,0.123456789012345,-1.5,2\n");

        let err = to_csv_with_layout(
            &[sample(5, "left", None), sample(5, "right", None)],
            CsvLayout::Legacy,
        )
        .expect_err("mixed targets");
        assert!(matches!(err, PosecapError::Export(_)));
    }

    #[test]
    fn json_uses_exact_field_names() {
        let json = to_json(&[sample(
            7,
            "wrist",
            Some(Orientation {
                x: 0.1,
                y: 0.2,
                z: 0.3,
                w: None,
            }),
        )]);
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        let first = &value[0];
        assert_eq!(first["timestamp"], 7);
        assert_eq!(first["targetId"], "wrist");
        assert_eq!(first["position"]["y"], -1.5);
        assert_eq!(first["orientation"]["z"], 0.3);
        assert!(first["orientation"].get("w").is_none());
    }

    #[test]
    fn parse_rejects_out_of_order_samples() {
        let text = to_json(&[sample(20, "wrist", None), sample(10, "wrist", None)]);
        assert!(matches!(parse_json(&text), Err(PosecapError::Parse(_))));
    }

    #[test]
    fn write_export_reports_digest_per_file() {
        let fs = FakeFileSystem::default();
        let receipts = write_export(
            &fs,
            Path::new("/out"),
            "hand_tracking_data",
            ExportOptions {
                format: ExportFormat::Both,
                csv_layout: CsvLayout::Tagged,
            },
            &[sample(1, "wrist", None)],
        )
        .expect("export");

        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].path, PathBuf::from("/out/hand_tracking_data.csv"));
        assert_eq!(receipts[1].path, PathBuf::from("/out/hand_tracking_data.json"));
        let csv = fs.file("/out/hand_tracking_data.csv").expect("csv written");
        assert_eq!(receipts[0].bytes, csv.len());
        assert_eq!(receipts[0].sha256, sha256_hex(&csv));
        assert_eq!(receipts[0].sha256.len(), 64);
    }
}
