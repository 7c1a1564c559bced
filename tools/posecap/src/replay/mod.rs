//! Replay of exported recordings as a live pose feed.
//!
//! A JSON export doubles as a trace: [`trace::TracePlatform`] answers the
//! platform's pose queries from it, so a full capture session (negotiation,
//! ticks, duration bound, export) runs deterministically without a headset.
//! Pair it with a `FakeClock` started at the trace's first timestamp.

pub mod trace;
