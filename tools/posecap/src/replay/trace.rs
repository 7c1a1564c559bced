use crate::errors::PosecapError;
use crate::export::parse_json;
use crate::platform::{
    PlatformError, ReferenceSpace, SessionHandle, SessionRequest, XrPlatform,
};
use crate::sample::{Pose, Sample};
use crate::types::{Handedness, ReferenceSpaceKind, SessionMode};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_GAP_MS: u64 = 1_000;
pub const DEFAULT_LINGER_MS: u64 = 0;

#[derive(Debug)]
pub struct TracePlatform {
    tracks: BTreeMap<String, Vec<(u64, Pose)>>,
    first: u64,
    last: u64,
    max_gap_ms: u64,
    linger_ms: u64,
    next_handle: Cell<u64>,
    ended: RefCell<Vec<SessionHandle>>,
}

impl TracePlatform {
    pub fn from_samples(samples: &[Sample]) -> Result<Self, PosecapError> {
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Err(PosecapError::Parse("trace has no samples".to_string()));
        };
        let mut tracks: BTreeMap<String, Vec<(u64, Pose)>> = BTreeMap::new();
        for sample in samples {
            tracks.entry(sample.target_id.clone()).or_default().push((
                sample.timestamp,
                Pose {
                    position: sample.position,
                    orientation: sample.orientation,
                },
            ));
        }
        Ok(Self {
            tracks,
            first: first.timestamp,
            last: last.timestamp,
            max_gap_ms: DEFAULT_MAX_GAP_MS,
            linger_ms: DEFAULT_LINGER_MS,
            next_handle: Cell::new(0),
            ended: RefCell::new(Vec::new()),
        })
    }

    pub fn from_json(text: &str) -> Result<Self, PosecapError> {
        Self::from_samples(&parse_json(text)?)
    }

    /// A target whose latest trace sample is older than this is reported as
    /// untracked.
    pub fn with_max_gap_ms(mut self, max_gap_ms: u64) -> Self {
        self.max_gap_ms = max_gap_ms;
        self
    }

    /// How long after the final trace sample the session stays alive.
    pub fn with_linger_ms(mut self, linger_ms: u64) -> Self {
        self.linger_ms = linger_ms;
        self
    }

    pub fn first_timestamp(&self) -> u64 {
        self.first
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last
    }

    pub fn targets(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    pub fn ended_sessions(&self) -> Vec<SessionHandle> {
        self.ended.borrow().clone()
    }

    fn pose_at(&self, target: &str, now: u64) -> Result<Option<Pose>, PlatformError> {
        if now > self.last.saturating_add(self.linger_ms) {
            return Err(PlatformError::SessionEnded);
        }
        let Some(track) = self.tracks.get(target) else {
            return Ok(None);
        };
        let idx = track.partition_point(|(timestamp, _)| *timestamp <= now);
        if idx == 0 {
            return Ok(None);
        }
        let (timestamp, pose) = track[idx - 1];
        if now - timestamp > self.max_gap_ms {
            return Ok(None);
        }
        Ok(Some(pose))
    }
}

impl XrPlatform for TracePlatform {
    async fn is_session_supported(&self, _mode: SessionMode) -> bool {
        true
    }

    async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionHandle, PlatformError> {
        let wants_hands = request
            .required_features
            .iter()
            .any(|feature| feature == crate::platform::HAND_TRACKING_FEATURE);
        let has_joints = self
            .tracks
            .keys()
            .any(|target| Handedness::parse(target).is_none());
        if wants_hands && !has_joints {
            return Err(PlatformError::Unsupported(
                crate::platform::HAND_TRACKING_FEATURE.to_string(),
            ));
        }
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        Ok(SessionHandle(handle))
    }

    async fn request_reference_space(
        &self,
        session: SessionHandle,
        kind: ReferenceSpaceKind,
    ) -> Result<ReferenceSpace, PlatformError> {
        Ok(ReferenceSpace { session, kind })
    }

    fn joint_pose(
        &self,
        _space: &ReferenceSpace,
        joint: &str,
        now: u64,
    ) -> Result<Option<Pose>, PlatformError> {
        self.pose_at(joint, now)
    }

    fn controller_pose(
        &self,
        _space: &ReferenceSpace,
        handedness: Handedness,
        now: u64,
    ) -> Result<Option<Pose>, PlatformError> {
        self.pose_at(handedness.as_str(), now)
    }

    fn end_session(&self, session: SessionHandle) {
        self.ended.borrow_mut().push(session);
    }
}
