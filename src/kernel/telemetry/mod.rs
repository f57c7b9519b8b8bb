//! Session telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer. Pacing and scheduling decisions
//! never read it back.
//!
//! # PRIVACY INVARIANT
//! Events carry ids, durations, counts and rates only. Never audio samples or
//! transcript text.

pub mod event;
pub mod metrics;
pub mod recorder;
