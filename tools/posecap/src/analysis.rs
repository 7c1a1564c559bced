//! Per-target channel views over a recording.

use crate::errors::PosecapError;
use crate::sample::Sample;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const FRAME_TIMESTAMP_KEY: &str = "timestamp";

pub const CHANNELS: [&str; 7] = ["x", "y", "z", "qx", "qy", "qz", "qw"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSeries {
    pub target_id: String,
    pub timestamps: Vec<u64>,
    /// One column per entry of [`CHANNELS`]; `None` where the sample had no
    /// orientation (or no `w`).
    pub columns: [Vec<Option<f64>>; 7],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub target_id: String,
    pub samples: usize,
    pub first_timestamp: u64,
    pub last_timestamp: u64,
    pub ranges: BTreeMap<&'static str, ChannelRange>,
}

pub fn series_for(samples: &[Sample], target_id: &str) -> ChannelSeries {
    let mut series = ChannelSeries {
        target_id: target_id.to_string(),
        timestamps: Vec::new(),
        columns: Default::default(),
    };
    for sample in samples.iter().filter(|s| s.target_id == target_id) {
        series.timestamps.push(sample.timestamp);
        for (column, value) in series.columns.iter_mut().zip(channel_values(sample)) {
            column.push(value);
        }
    }
    series
}

pub fn summarize(samples: &[Sample]) -> Vec<TargetSummary> {
    let mut targets: Vec<&str> = Vec::new();
    for sample in samples {
        if !targets.contains(&sample.target_id.as_str()) {
            targets.push(&sample.target_id);
        }
    }
    targets.sort_unstable();

    targets
        .into_iter()
        .map(|target| {
            let series = series_for(samples, target);
            let ranges = CHANNELS
                .iter()
                .zip(series.columns.iter())
                .filter_map(|(name, column)| range_of(column).map(|range| (*name, range)))
                .collect();
            TargetSummary {
                target_id: target.to_string(),
                samples: series.timestamps.len(),
                first_timestamp: series.timestamps.first().copied().unwrap_or_default(),
                last_timestamp: series.timestamps.last().copied().unwrap_or_default(),
                ranges,
            }
        })
        .collect()
}

/// Groups samples sharing a timestamp into one step object keyed by target:
/// `[{"timestamp": t, "wrist": {"position": {..}, "orientation": {..}}}]`.
/// A target literally named `timestamp` would collide with the step key and
/// is rejected.
pub fn to_frames_json(samples: &[Sample]) -> Result<String, PosecapError> {
    if samples.iter().any(|sample| sample.target_id == FRAME_TIMESTAMP_KEY) {
        return Err(PosecapError::Export(format!(
            "target `{FRAME_TIMESTAMP_KEY}` clashes with the frame timestamp key"
        )));
    }
    let mut frames: Vec<Map<String, Value>> = Vec::new();
    let mut current: Option<u64> = None;
    for sample in samples {
        if current != Some(sample.timestamp) {
            let mut frame = Map::new();
            frame.insert(
                FRAME_TIMESTAMP_KEY.to_string(),
                Value::from(sample.timestamp),
            );
            frames.push(frame);
            current = Some(sample.timestamp);
        }
        let mut pose = Map::new();
        pose.insert(
            "position".to_string(),
            serde_json::to_value(sample.position).unwrap_or(Value::Null),
        );
        if let Some(orientation) = sample.orientation {
            pose.insert(
                "orientation".to_string(),
                serde_json::to_value(orientation).unwrap_or(Value::Null),
            );
        }
        if let Some(frame) = frames.last_mut() {
            frame.insert(sample.target_id.clone(), Value::Object(pose));
        }
    }
    serde_json::to_string_pretty(&frames).map_err(|e| PosecapError::Export(e.to_string()))
}

fn channel_values(sample: &Sample) -> [Option<f64>; 7] {
    let o = sample.orientation;
    [
        Some(sample.position.x),
        Some(sample.position.y),
        Some(sample.position.z),
        o.map(|o| o.x),
        o.map(|o| o.y),
        o.map(|o| o.z),
        o.and_then(|o| o.w),
    ]
}

fn range_of(column: &[Option<f64>]) -> Option<ChannelRange> {
    column.iter().flatten().fold(None, |acc, &value| {
        Some(match acc {
            None => ChannelRange {
                min: value,
                max: value,
            },
            Some(range) => ChannelRange {
                min: range.min.min(value),
                max: range.max.max(value),
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Orientation, Position};

    fn sample(timestamp: u64, target: &str, x: f64, orientation: Option<Orientation>) -> Sample {
        Sample {
            timestamp,
            target_id: target.to_string(),
            position: Position { x, y: 1.0, z: -1.0 },
            orientation,
        }
    }

    fn quat(w: Option<f64>) -> Orientation {
        Orientation {
            x: 0.0,
            y: 0.5,
            z: 0.0,
            w,
        }
    }

    #[test]
    fn series_extracts_columns_for_one_target() {
        let samples = vec![
            sample(0, "wrist", 0.1, Some(quat(Some(1.0)))),
            sample(0, "thumb-tip", 9.0, None),
            sample(16, "wrist", 0.2, None),
        ];
        let series = series_for(&samples, "wrist");
        assert_eq!(series.timestamps, vec![0, 16]);
        assert_eq!(series.columns[0], vec![Some(0.1), Some(0.2)]);
        assert_eq!(series.columns[4], vec![Some(0.5), None]);
        assert_eq!(series.columns[6], vec![Some(1.0), None]);
    }

    #[test]
    fn summary_reports_ranges_and_skips_absent_channels() {
        let samples = vec![
            sample(0, "wrist", 0.1, None),
            sample(16, "wrist", -0.4, None),
            sample(16, "index-finger-tip", 2.0, Some(quat(None))),
        ];
        let summary = summarize(&samples);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].target_id, "index-finger-tip");

        let wrist = &summary[1];
        assert_eq!(wrist.samples, 2);
        assert_eq!(wrist.last_timestamp, 16);
        assert_eq!(wrist.ranges["x"], ChannelRange { min: -0.4, max: 0.1 });
        assert!(!wrist.ranges.contains_key("qx"));
        assert!(!summary[0].ranges.contains_key("qw"));
    }

    #[test]
    fn frames_group_targets_by_timestamp() {
        let samples = vec![
            sample(0, "wrist", 0.1, Some(quat(None))),
            sample(0, "thumb-tip", 0.2, None),
            sample(16, "wrist", 0.3, None),
        ];
        let frames: Value = serde_json::from_str(&to_frames_json(&samples).expect("frames")).expect("json");
        assert_eq!(frames.as_array().map(Vec::len), Some(2));
        assert_eq!(frames[0]["wrist"]["position"]["x"], 0.1);
        assert_eq!(frames[0]["wrist"]["orientation"]["y"], 0.5);
        assert_eq!(frames[0]["thumb-tip"]["position"]["x"], 0.2);
        assert_eq!(frames[1]["timestamp"], 16);
    }

    #[test]
    fn frames_reject_a_target_named_timestamp() {
        let samples = vec![
            sample(0, "wrist", 0.1, None),
            sample(0, "timestamp", 0.2, None),
        ];
        let err = to_frames_json(&samples).expect_err("key clash");
        assert!(matches!(err, PosecapError::Export(_)));
    }
}
