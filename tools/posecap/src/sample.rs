use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Rotation as reported by the platform. Some sources only report the
/// vector part, so `w` is optional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Position,
    pub orientation: Option<Orientation>,
}

impl Pose {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Position { x, y, z },
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// NaN or infinite components mean the platform has no usable fix.
    pub fn is_finite(&self) -> bool {
        let Position { x, y, z } = self.position;
        let position = [x, y, z].iter().all(|v| v.is_finite());
        let orientation = self.orientation.map_or(true, |o| {
            [o.x, o.y, o.z].iter().all(|v| v.is_finite()) && o.w.map_or(true, f64::is_finite)
        });
        position && orientation
    }
}

/// One entry produced by a pose source for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseReading {
    pub target_id: String,
    pub pose: Pose,
}

/// A single timestamped observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: u64,
    pub target_id: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl Sample {
    pub fn from_reading(timestamp: u64, reading: PoseReading) -> Self {
        Self {
            timestamp,
            target_id: reading.target_id,
            position: reading.pose.position,
            orientation: reading.pose.orientation,
        }
    }
}
