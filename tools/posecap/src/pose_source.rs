use crate::errors::SessionError;
use crate::platform::{PlatformError, ReferenceSpace, XrPlatform};
use crate::sample::{Pose, PoseReading};
use crate::types::Handedness;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointPoseSource {
    pub joints: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerPoseSource {
    pub handedness: Handedness,
}

/// Tracking capability chosen once at start; never re-detected per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoseSource {
    Joints(JointPoseSource),
    Controller(ControllerPoseSource),
}

impl PoseSource {
    /// Poses available at `now`, in target order. Untracked targets and
    /// non-finite poses are simply missing; only a lost platform session is
    /// an error.
    pub fn sample<P: XrPlatform>(
        &self,
        platform: &P,
        space: &ReferenceSpace,
        now: u64,
    ) -> Result<Vec<PoseReading>, SessionError> {
        match self {
            Self::Joints(source) => {
                let mut readings = Vec::with_capacity(source.joints.len());
                for joint in &source.joints {
                    if let Some(pose) = platform
                        .joint_pose(space, joint, now)
                        .map_err(source_unavailable)?
                        .filter(Pose::is_finite)
                    {
                        readings.push(PoseReading {
                            target_id: joint.clone(),
                            pose,
                        });
                    }
                }
                Ok(readings)
            }
            Self::Controller(source) => Ok(platform
                .controller_pose(space, source.handedness, now)
                .map_err(source_unavailable)?
                .filter(Pose::is_finite)
                .map(|pose| PoseReading {
                    target_id: source.handedness.as_str().to_string(),
                    pose,
                })
                .into_iter()
                .collect()),
        }
    }

    pub fn target_ids(&self) -> Vec<String> {
        match self {
            Self::Joints(source) => source.joints.iter().cloned().collect(),
            Self::Controller(source) => vec![source.handedness.as_str().to_string()],
        }
    }
}

fn source_unavailable(error: PlatformError) -> SessionError {
    SessionError::SourceUnavailable(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ScriptedPlatform, SessionHandle};
    use crate::sample::Orientation;
    use crate::types::ReferenceSpaceKind;

    fn space() -> ReferenceSpace {
        ReferenceSpace {
            session: SessionHandle(1),
            kind: ReferenceSpaceKind::Local,
        }
    }

    fn joints(names: &[&str]) -> PoseSource {
        PoseSource::Joints(JointPoseSource {
            joints: names.iter().map(|name| name.to_string()).collect(),
        })
    }

    #[test]
    fn joint_source_skips_untracked_joints_in_sorted_order() {
        let platform = ScriptedPlatform::new();
        platform.set_joint_pose("wrist", Pose::at(0.0, 1.0, 0.0));
        platform.set_joint_pose("index-finger-tip", Pose::at(0.1, 1.1, 0.0));
        let source = joints(&["wrist", "thumb-tip", "index-finger-tip"]);

        let readings = source.sample(&platform, &space(), 16).expect("sample");
        let ids = readings
            .iter()
            .map(|r| r.target_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["index-finger-tip", "wrist"]);
    }

    #[test]
    fn missing_tracking_is_an_empty_result() {
        let platform = ScriptedPlatform::new();
        let source = PoseSource::Controller(ControllerPoseSource {
            handedness: Handedness::Right,
        });
        let readings = source.sample(&platform, &space(), 16).expect("sample");
        assert!(readings.is_empty());
    }

    #[test]
    fn controller_source_labels_readings_with_handedness() {
        let platform = ScriptedPlatform::new();
        platform.set_controller_pose(Handedness::Left, Pose::at(0.2, 0.9, -0.3));
        let source = PoseSource::Controller(ControllerPoseSource {
            handedness: Handedness::Left,
        });
        let readings = source.sample(&platform, &space(), 16).expect("sample");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].target_id, "left");
        assert_eq!(source.target_ids(), vec!["left".to_string()]);
    }

    #[test]
    fn non_finite_poses_count_as_untracked() {
        let platform = ScriptedPlatform::new();
        platform.set_joint_pose("wrist", Pose::at(f64::NAN, f64::INFINITY, 0.5));
        platform.set_joint_pose("thumb-tip", Pose::at(0.1, 1.0, 0.0));
        platform.set_controller_pose(
            Handedness::Right,
            Pose::at(0.0, 1.0, 0.0).with_orientation(Orientation {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: Some(f64::NEG_INFINITY),
            }),
        );

        let readings = joints(&["wrist", "thumb-tip"])
            .sample(&platform, &space(), 16)
            .expect("sample");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].target_id, "thumb-tip");

        let controller = PoseSource::Controller(ControllerPoseSource {
            handedness: Handedness::Right,
        });
        assert!(controller
            .sample(&platform, &space(), 16)
            .expect("sample")
            .is_empty());
    }

    #[test]
    fn disconnection_surfaces_as_source_unavailable() {
        let platform = ScriptedPlatform::new();
        platform.set_joint_pose("wrist", Pose::at(0.0, 1.0, 0.0));
        platform.disconnect();
        let err = joints(&["wrist"])
            .sample(&platform, &space(), 16)
            .expect_err("disconnected");
        assert_eq!(err.category(), "source");
    }
}
