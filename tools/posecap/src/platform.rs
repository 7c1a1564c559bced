//! Contract for the XR platform that hosts a capture session.
//!
//! Negotiation (capability query, session request, reference space) is
//! asynchronous. Pose queries are synchronous and answer for the frame at
//! `now`.

use crate::sample::Pose;
use crate::types::{Handedness, ReferenceSpaceKind, SessionMode};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const HAND_TRACKING_FEATURE: &str = "hand-tracking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub mode: SessionMode,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSpace {
    pub session: SessionHandle,
    pub kind: ReferenceSpaceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("session ended")]
    SessionEnded,
}

pub trait XrPlatform {
    fn is_session_supported(&self, mode: SessionMode) -> impl Future<Output = bool>;

    fn request_session(
        &self,
        request: &SessionRequest,
    ) -> impl Future<Output = Result<SessionHandle, PlatformError>>;

    fn request_reference_space(
        &self,
        session: SessionHandle,
        kind: ReferenceSpaceKind,
    ) -> impl Future<Output = Result<ReferenceSpace, PlatformError>>;

    /// `Ok(None)` means the joint is not tracked this frame.
    fn joint_pose(
        &self,
        space: &ReferenceSpace,
        joint: &str,
        now: u64,
    ) -> Result<Option<Pose>, PlatformError>;

    fn controller_pose(
        &self,
        space: &ReferenceSpace,
        handedness: Handedness,
        now: u64,
    ) -> Result<Option<Pose>, PlatformError>;

    /// Releases a granted session. Must tolerate sessions that already ended.
    fn end_session(&self, session: SessionHandle);
}

#[derive(Debug, Default)]
struct ScriptState {
    unsupported_modes: BTreeSet<&'static str>,
    unsupported_features: BTreeSet<String>,
    reject_request: Option<String>,
    reject_reference_space: Option<String>,
    joints: HashMap<String, Pose>,
    controllers: HashMap<Handedness, Pose>,
    disconnected: bool,
    next_handle: u64,
    requests: Vec<SessionRequest>,
    ended: Vec<SessionHandle>,
}

/// In-memory platform whose answers are set by the caller between ticks.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPlatform {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode_supported(&self, mode: SessionMode, supported: bool) {
        let mut state = self.state.lock().expect("platform lock");
        if supported {
            state.unsupported_modes.remove(mode.as_str());
        } else {
            state.unsupported_modes.insert(mode.as_str());
        }
    }

    pub fn deny_feature(&self, feature: &str) {
        self.state
            .lock()
            .expect("platform lock")
            .unsupported_features
            .insert(feature.to_string());
    }

    pub fn reject_requests(&self, reason: &str) {
        self.state.lock().expect("platform lock").reject_request = Some(reason.to_string());
    }

    pub fn reject_reference_space(&self, reason: &str) {
        self.state.lock().expect("platform lock").reject_reference_space =
            Some(reason.to_string());
    }

    pub fn set_joint_pose(&self, joint: &str, pose: Pose) {
        self.state
            .lock()
            .expect("platform lock")
            .joints
            .insert(joint.to_string(), pose);
    }

    pub fn clear_joint_pose(&self, joint: &str) {
        self.state.lock().expect("platform lock").joints.remove(joint);
    }

    pub fn set_controller_pose(&self, handedness: Handedness, pose: Pose) {
        self.state
            .lock()
            .expect("platform lock")
            .controllers
            .insert(handedness, pose);
    }

    pub fn disconnect(&self) {
        self.state.lock().expect("platform lock").disconnected = true;
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.state.lock().expect("platform lock").requests.clone()
    }

    pub fn ended_sessions(&self) -> Vec<SessionHandle> {
        self.state.lock().expect("platform lock").ended.clone()
    }

    fn check_connected(&self) -> Result<(), PlatformError> {
        if self.state.lock().expect("platform lock").disconnected {
            return Err(PlatformError::SessionEnded);
        }
        Ok(())
    }
}

impl XrPlatform for ScriptedPlatform {
    async fn is_session_supported(&self, mode: SessionMode) -> bool {
        !self
            .state
            .lock()
            .expect("platform lock")
            .unsupported_modes
            .contains(mode.as_str())
    }

    async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionHandle, PlatformError> {
        let mut state = self.state.lock().expect("platform lock");
        state.requests.push(request.clone());
        if let Some(feature) = request
            .required_features
            .iter()
            .find(|feature| state.unsupported_features.contains(*feature))
        {
            return Err(PlatformError::Unsupported(feature.clone()));
        }
        if let Some(reason) = &state.reject_request {
            return Err(PlatformError::Rejected(reason.clone()));
        }
        state.next_handle += 1;
        state.disconnected = false;
        Ok(SessionHandle(state.next_handle))
    }

    async fn request_reference_space(
        &self,
        session: SessionHandle,
        kind: ReferenceSpaceKind,
    ) -> Result<ReferenceSpace, PlatformError> {
        let state = self.state.lock().expect("platform lock");
        if let Some(reason) = &state.reject_reference_space {
            return Err(PlatformError::Rejected(reason.clone()));
        }
        Ok(ReferenceSpace { session, kind })
    }

    fn joint_pose(
        &self,
        _space: &ReferenceSpace,
        joint: &str,
        _now: u64,
    ) -> Result<Option<Pose>, PlatformError> {
        self.check_connected()?;
        Ok(self
            .state
            .lock()
            .expect("platform lock")
            .joints
            .get(joint)
            .copied())
    }

    fn controller_pose(
        &self,
        _space: &ReferenceSpace,
        handedness: Handedness,
        _now: u64,
    ) -> Result<Option<Pose>, PlatformError> {
        self.check_connected()?;
        Ok(self
            .state
            .lock()
            .expect("platform lock")
            .controllers
            .get(&handedness)
            .copied())
    }

    fn end_session(&self, session: SessionHandle) {
        self.state.lock().expect("platform lock").ended.push(session);
    }
}
