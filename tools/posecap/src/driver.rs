use crate::errors::PosecapError;
use crate::platform::XrPlatform;
use crate::runtime::{from_unix_millis, unix_millis, Clock};
use crate::session::{Cadence, CaptureConfig, CompletedRecording, SessionController, TickOutcome};
use crate::types::SessionState;
use std::sync::Arc;
use tokio::sync::watch;

/// Frame period used when sampling per frame (roughly 60 Hz).
pub const DEFAULT_FRAME_MS: u64 = 16;

/// Held by the presentation layer to request a stop between ticks.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Calls `on_tick` once per period until the session finishes.
///
/// A stop request is applied after the tick it arrived with, so a tick that
/// reaches the duration bound ends the session as `DurationElapsed` even when
/// a stop was pending.
pub struct TickDriver {
    clock: Arc<dyn Clock>,
    period_ms: u64,
    wait_limit_ms: u64,
}

impl TickDriver {
    pub fn new(clock: Arc<dyn Clock>, period_ms: u64, wait_limit_ms: u64) -> Self {
        Self {
            clock,
            period_ms: period_ms.max(1),
            wait_limit_ms,
        }
    }

    /// Timer-driven for interval cadence, frame-driven otherwise. A session
    /// still waiting for its first pose after one full duration is stopped.
    pub fn for_config(clock: Arc<dyn Clock>, config: &CaptureConfig, frame_ms: u64) -> Self {
        let period_ms = match config.cadence {
            Cadence::IntervalMs(ms) => ms,
            Cadence::PerFrame => frame_ms,
        };
        Self::new(clock, period_ms, config.duration_ms())
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn run<P: XrPlatform>(
        &self,
        controller: &mut SessionController<P>,
        stop: &StopSignal,
    ) -> Result<CompletedRecording, PosecapError> {
        if !matches!(
            controller.state(),
            SessionState::Active | SessionState::Recording
        ) {
            return Err(PosecapError::Driver(format!(
                "no live session to drive (state={})",
                controller.state().as_str()
            )));
        }

        let started = unix_millis(self.clock.now());
        let mut next = started.saturating_add(self.period_ms);
        loop {
            self.clock.sleep_until(from_unix_millis(next))?;
            let now = unix_millis(self.clock.now());

            if let TickOutcome::Finished(recording) = controller.on_tick(now) {
                return Ok(recording);
            }

            let waited_too_long = controller.state() == SessionState::Active
                && now.saturating_sub(started) >= self.wait_limit_ms;
            if stop.is_requested() || waited_too_long {
                if let Some(recording) = controller.stop() {
                    return Ok(recording);
                }
            }

            next = next.saturating_add(self.period_ms).max(now.saturating_add(1));
        }
    }
}
