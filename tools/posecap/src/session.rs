//! Capture session lifecycle.
//!
//! `SessionController` is the only mutator of session and buffer state. The
//! external driver calls [`SessionController::on_tick`]; the controller has
//! no scheduling of its own. Negotiation is the one asynchronous step and is
//! split into `begin_start` / [`negotiate`] / `finish_start` so a `stop()`
//! issued while negotiation is in flight wins over a late grant.

use crate::buffer::RecordingBuffer;
use crate::errors::SessionError;
use crate::fsm::validate_transition;
use crate::logging::JsonlLogger;
use crate::platform::{
    PlatformError, ReferenceSpace, SessionHandle, SessionRequest, XrPlatform,
    HAND_TRACKING_FEATURE,
};
use crate::pose_source::{ControllerPoseSource, JointPoseSource, PoseSource};
use crate::runtime::{unix_millis, Clock};
use crate::sample::{PoseReading, Sample};
use crate::types::{
    EndReason, Handedness, ReferenceSpaceKind, SessionMode, SessionState, SourceKind,
    StartPolicy,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    IntervalMs(u64),
    PerFrame,
}

/// Immutable per-session configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureConfig {
    pub source: SourceKind,
    pub targets: BTreeSet<String>,
    pub max_duration_seconds: f64,
    pub cadence: Cadence,
    pub start_policy: StartPolicy,
    pub mode: SessionMode,
    pub reference_space: ReferenceSpaceKind,
    pub optional_features: Vec<String>,
}

impl CaptureConfig {
    pub fn hand_joints(joints: &[&str], max_duration_seconds: f64, cadence: Cadence) -> Self {
        Self {
            source: SourceKind::Hand,
            targets: joints.iter().map(|joint| joint.to_string()).collect(),
            max_duration_seconds,
            cadence,
            start_policy: StartPolicy::Immediate,
            mode: SessionMode::ImmersiveAr,
            reference_space: ReferenceSpaceKind::Local,
            optional_features: Vec::new(),
        }
    }

    pub fn controller(handedness: Handedness, max_duration_seconds: f64, cadence: Cadence) -> Self {
        Self {
            source: SourceKind::Controller,
            targets: BTreeSet::from([handedness.as_str().to_string()]),
            ..Self::hand_joints(&[], max_duration_seconds, cadence)
        }
    }

    pub fn with_start_policy(mut self, policy: StartPolicy) -> Self {
        self.start_policy = policy;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        (self.max_duration_seconds * 1000.0).round() as u64
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.targets.is_empty() {
            return Err(SessionError::InvalidConfig(
                "at least one target is required".to_string(),
            ));
        }
        if self.targets.iter().any(|target| target.trim().is_empty()) {
            return Err(SessionError::InvalidConfig(
                "target names must not be blank".to_string(),
            ));
        }
        if !self.max_duration_seconds.is_finite() || self.max_duration_seconds <= 0.0 {
            return Err(SessionError::InvalidConfig(format!(
                "max_duration_seconds must be positive, got {}",
                self.max_duration_seconds
            )));
        }
        if self.cadence == Cadence::IntervalMs(0) {
            return Err(SessionError::InvalidConfig(
                "sampling_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.source == SourceKind::Controller {
            self.controller_handedness()?;
        }
        Ok(())
    }

    /// Validates and builds the tracking capability for this session.
    pub fn pose_source(&self) -> Result<PoseSource, SessionError> {
        self.validate()?;
        Ok(match self.source {
            SourceKind::Hand => PoseSource::Joints(JointPoseSource {
                joints: self.targets.clone(),
            }),
            SourceKind::Controller => PoseSource::Controller(ControllerPoseSource {
                handedness: self.controller_handedness()?,
            }),
        })
    }

    pub fn session_request(&self) -> SessionRequest {
        let mut required_features = vec![self.reference_space.as_str().to_string()];
        if self.source == SourceKind::Hand {
            required_features.push(HAND_TRACKING_FEATURE.to_string());
        }
        let optional_features = self
            .optional_features
            .iter()
            .filter(|feature| !required_features.contains(feature))
            .cloned()
            .collect();
        SessionRequest {
            mode: self.mode,
            required_features,
            optional_features,
        }
    }

    fn controller_handedness(&self) -> Result<Handedness, SessionError> {
        let mut targets = self.targets.iter();
        match (targets.next(), targets.next()) {
            (Some(target), None) => Handedness::parse(target).ok_or_else(|| {
                SessionError::InvalidConfig(format!(
                    "controller target must be `left` or `right`, got `{target}`"
                ))
            }),
            _ => Err(SessionError::InvalidConfig(
                "controller capture tracks exactly one hand".to_string(),
            )),
        }
    }
}

/// Platform resources acquired by a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub session: SessionHandle,
    pub space: ReferenceSpace,
}

/// Capability check, session request, then reference space. Borrows only the
/// platform so the controller stays free for `stop()` while this runs.
pub async fn negotiate<P: XrPlatform>(
    platform: &P,
    config: &CaptureConfig,
) -> Result<Grant, SessionError> {
    if !platform.is_session_supported(config.mode).await {
        return Err(SessionError::Capability(format!(
            "{} sessions are not supported",
            config.mode.as_str()
        )));
    }

    let session = platform
        .request_session(&config.session_request())
        .await
        .map_err(|error| match error {
            PlatformError::Unsupported(feature) => {
                SessionError::Capability(format!("feature `{feature}` is not supported"))
            }
            other => SessionError::SessionRequest(other.to_string()),
        })?;

    match platform
        .request_reference_space(session, config.reference_space)
        .await
    {
        Ok(space) => Ok(Grant { session, space }),
        Err(error) => {
            platform.end_session(session);
            Err(SessionError::SessionRequest(format!(
                "reference space `{}`: {error}",
                config.reference_space.as_str()
            )))
        }
    }
}

/// Proof that `begin_start` moved the controller to `Requesting`.
#[derive(Debug)]
pub struct StartTicket {
    generation: u64,
    config: CaptureConfig,
    source: PoseSource,
}

impl StartTicket {
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// The terminal hand-off of a session: its buffer plus how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRecording {
    pub config: CaptureConfig,
    pub reason: EndReason,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    buffer: RecordingBuffer,
}

impl CompletedRecording {
    pub fn snapshot(&self) -> &[Sample] {
        self.buffer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_buffer(self) -> RecordingBuffer {
        self.buffer
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// No live session, or a tick older than the previous one.
    Ignored,
    /// Session is active but no pose has been seen yet.
    Waiting,
    Sampled(usize),
    Finished(CompletedRecording),
}

#[derive(Debug, Clone, Copy)]
struct RecordingWindow {
    origin: u64,
    deadline: u64,
    interval: Option<u64>,
    next_due: Option<u64>,
}

impl RecordingWindow {
    fn open(origin: u64, config: &CaptureConfig) -> Self {
        let interval = match config.cadence {
            Cadence::IntervalMs(ms) => Some(ms),
            Cadence::PerFrame => None,
        };
        Self {
            origin,
            deadline: origin.saturating_add(config.duration_ms()),
            interval,
            next_due: interval.map(|ms| origin.saturating_add(ms)),
        }
    }

    fn is_due(&self, now: u64) -> bool {
        self.next_due.map_or(true, |due| now >= due)
    }

    fn advance(&mut self, now: u64) {
        if let (Some(due), Some(interval)) = (self.next_due, self.interval) {
            if due <= now {
                // Jump to the first multiple of `interval` past `now`.
                let steps = (now - due) / interval + 1;
                self.next_due = Some(due.saturating_add(steps.saturating_mul(interval)));
            }
        }
    }

    fn expired(&self, now: u64) -> bool {
        now >= self.deadline
    }
}

enum TickStep {
    Stale(u64),
    Waiting,
    Progress {
        started: bool,
        appended: usize,
        expired: bool,
    },
    SourceLost(SessionError),
}

#[derive(Debug)]
struct LiveSession {
    config: CaptureConfig,
    source: PoseSource,
    space: ReferenceSpace,
    buffer: RecordingBuffer,
    window: Option<RecordingWindow>,
    last_tick: Option<u64>,
}

impl LiveSession {
    fn advance<P: XrPlatform>(&mut self, platform: &P, now: u64) -> TickStep {
        if let Some(last) = self.last_tick {
            if now < last {
                return TickStep::Stale(last);
            }
        }
        self.last_tick = Some(now);

        let (started, appended) = if self.window.is_none() {
            let readings = match self.source.sample(platform, &self.space, now) {
                Ok(readings) => readings,
                Err(error) => return TickStep::SourceLost(error),
            };
            if readings.is_empty() {
                return TickStep::Waiting;
            }
            self.window = Some(RecordingWindow::open(now, &self.config));
            (true, self.append(now, readings))
        } else if self.window.as_ref().is_some_and(|window| window.is_due(now)) {
            let readings = match self.source.sample(platform, &self.space, now) {
                Ok(readings) => readings,
                Err(error) => return TickStep::SourceLost(error),
            };
            if let Some(window) = self.window.as_mut() {
                window.advance(now);
            }
            (false, self.append(now, readings))
        } else {
            (false, 0)
        };

        let expired = self
            .window
            .as_ref()
            .is_some_and(|window| window.expired(now));
        TickStep::Progress {
            started,
            appended,
            expired,
        }
    }

    fn append(&mut self, now: u64, readings: Vec<PoseReading>) -> usize {
        let count = readings.len();
        for reading in readings {
            self.buffer.append(Sample::from_reading(now, reading));
        }
        count
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Requesting,
    Live(LiveSession),
    Ending,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Requesting => SessionState::Requesting,
            Self::Live(live) if live.window.is_some() => SessionState::Recording,
            Self::Live(_) => SessionState::Active,
            Self::Ending => SessionState::Ending,
        }
    }
}

pub struct SessionController<P: XrPlatform> {
    platform: Arc<P>,
    clock: Arc<dyn Clock>,
    logger: Option<JsonlLogger>,
    state_tx: watch::Sender<SessionState>,
    generation: u64,
    phase: Phase,
}

impl<P: XrPlatform> SessionController<P> {
    pub fn new(platform: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            platform,
            clock,
            logger: None,
            state_tx,
            generation: 0,
            phase: Phase::Idle,
        }
    }

    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Samples collected so far by the live session, for progress display.
    pub fn buffered_len(&self) -> usize {
        match &self.phase {
            Phase::Live(live) => live.buffer.len(),
            _ => 0,
        }
    }

    pub async fn start(&mut self, config: CaptureConfig) -> Result<(), SessionError> {
        let ticket = self.begin_start(config)?;
        let platform = Arc::clone(&self.platform);
        let outcome = negotiate(platform.as_ref(), ticket.config()).await;
        self.finish_start(ticket, outcome)
    }

    pub fn begin_start(&mut self, config: CaptureConfig) -> Result<StartTicket, SessionError> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::AlreadyActive(state.as_str().to_string()));
        }
        let source = match config.pose_source() {
            Ok(source) => source,
            Err(error) => {
                self.log_start_failure(&error);
                return Err(error);
            }
        };

        self.generation += 1;
        self.enter(Phase::Requesting);
        self.log(
            "info",
            "session.requesting",
            json!({
                "generation": self.generation,
                "targets": source.target_ids(),
                "config": serde_json::to_value(&config).unwrap_or(Value::Null),
            }),
        );
        Ok(StartTicket {
            generation: self.generation,
            config,
            source,
        })
    }

    /// Applies a negotiation outcome. Outcomes for a ticket that was
    /// cancelled by `stop()` are discarded and any granted session released.
    pub fn finish_start(
        &mut self,
        ticket: StartTicket,
        outcome: Result<Grant, SessionError>,
    ) -> Result<(), SessionError> {
        let current =
            ticket.generation == self.generation && matches!(self.phase, Phase::Requesting);
        if !current {
            if let Ok(grant) = &outcome {
                self.platform.end_session(grant.session);
            }
            self.log(
                "warn",
                "session.start_discarded",
                json!({ "generation": ticket.generation }),
            );
            return Err(SessionError::Cancelled);
        }

        let grant = match outcome {
            Ok(grant) => grant,
            Err(error) => {
                self.enter(Phase::Idle);
                self.log_start_failure(&error);
                return Err(error);
            }
        };

        let StartTicket { config, source, .. } = ticket;
        let immediate = config.start_policy == StartPolicy::Immediate;
        self.enter(Phase::Live(LiveSession {
            config,
            source,
            space: grant.space,
            buffer: RecordingBuffer::new(),
            window: None,
            last_tick: None,
        }));

        if immediate {
            let origin = unix_millis(self.clock.now());
            if let Phase::Live(live) = &mut self.phase {
                live.window = Some(RecordingWindow::open(origin, &live.config));
            }
            self.announce(SessionState::Active, SessionState::Recording);
        }
        Ok(())
    }

    /// Ends the session. Returns the recording when one existed; a stop in
    /// `Requesting` cancels negotiation and yields nothing.
    pub fn stop(&mut self) -> Option<CompletedRecording> {
        match &self.phase {
            Phase::Requesting => {
                self.enter(Phase::Idle);
                self.log(
                    "info",
                    "session.start_cancelled",
                    json!({ "generation": self.generation }),
                );
                None
            }
            Phase::Live(_) => self.finish(EndReason::StopRequested),
            Phase::Idle | Phase::Ending => None,
        }
    }

    /// The platform reported that the underlying session ended.
    pub fn on_session_ended(&mut self) -> Option<CompletedRecording> {
        match &self.phase {
            Phase::Live(_) => self.finish(EndReason::SessionEnded),
            _ => None,
        }
    }

    pub fn on_tick(&mut self, now: u64) -> TickOutcome {
        let platform = Arc::clone(&self.platform);
        let Phase::Live(live) = &mut self.phase else {
            return TickOutcome::Ignored;
        };

        match live.advance(platform.as_ref(), now) {
            TickStep::Stale(last) => {
                self.log(
                    "debug",
                    "session.tick_skipped",
                    json!({ "now": now, "last": last }),
                );
                TickOutcome::Ignored
            }
            TickStep::Waiting => TickOutcome::Waiting,
            TickStep::SourceLost(error) => {
                self.log(
                    "warn",
                    "session.source_lost",
                    json!({ "now": now, "error": error.to_string() }),
                );
                self.finish(EndReason::SourceUnavailable)
                    .map_or(TickOutcome::Ignored, TickOutcome::Finished)
            }
            TickStep::Progress {
                started,
                appended,
                expired,
            } => {
                if started {
                    self.announce(SessionState::Active, SessionState::Recording);
                }
                if expired {
                    return self
                        .finish(EndReason::DurationElapsed)
                        .map_or(TickOutcome::Ignored, TickOutcome::Finished);
                }
                TickOutcome::Sampled(appended)
            }
        }
    }

    fn finish(&mut self, reason: EndReason) -> Option<CompletedRecording> {
        if !matches!(self.phase, Phase::Live(_)) {
            return None;
        }
        let from = self.state();
        let Phase::Live(live) = std::mem::replace(&mut self.phase, Phase::Ending) else {
            return None;
        };
        self.announce(from, SessionState::Ending);

        if reason != EndReason::SessionEnded {
            self.platform.end_session(live.space.session);
        }
        let recording = CompletedRecording {
            reason,
            started_at: live.window.map(|window| window.origin),
            ended_at: live.last_tick,
            config: live.config,
            buffer: live.buffer,
        };

        self.enter(Phase::Idle);
        self.log(
            "info",
            "session.finished",
            json!({
                "reason": reason.as_str(),
                "samples": recording.len(),
                "started_at": recording.started_at,
                "ended_at": recording.ended_at,
            }),
        );
        Some(recording)
    }

    fn enter(&mut self, phase: Phase) {
        let from = self.state();
        let to = phase.state();
        self.phase = phase;
        self.announce(from, to);
    }

    fn announce(&mut self, from: SessionState, to: SessionState) {
        if let Err(message) = validate_transition(from, to) {
            self.log("error", "session.illegal_transition", json!({ "message": message }));
        }
        self.state_tx.send_replace(to);
        self.log(
            "info",
            "session.transition",
            json!({ "from": from.as_str(), "to": to.as_str() }),
        );
    }

    fn log_start_failure(&self, error: &SessionError) {
        self.log(
            "warn",
            "session.start_failed",
            json!({ "category": error.category(), "error": error.to_string() }),
        );
    }

    fn log(&self, level: &str, event_type: &str, payload: Value) {
        if let Some(logger) = &self.logger {
            logger.emit(level, event_type, payload);
        }
    }
}
