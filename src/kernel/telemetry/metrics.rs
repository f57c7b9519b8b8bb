use std::collections::VecDeque;

use serde::Serialize;

use super::event::TelemetryEvent;
use crate::kernel::pacing::PaceState;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub phrase_stats: PhraseStats,
    pub playback_stats: PlaybackStats,
    pub pacing_stats: PacingStats,
    pub session_stats: SessionStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhraseStats {
    pub committed: u64,
    pub forced_splits: u64,
    pub transmitted: u64,
    pub total_audio_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackStats {
    pub queued: u64,
    pub started: u64,
    pub dropped: u64,
    pub measured: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PacingStats {
    pub hints_sent: u64,
    pub accelerations: u64,
    pub rate_increases: u64,
    pub rate_decreases: u64,
    pub peak_rate: f64,
    pub latency_resets: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub mode_switches: u64,
    pub automatic_switches: u64,
    pub teardowns: u64,
    pub fatal_teardowns: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    snap.pacing_stats.peak_rate = 1.0;

    let mut latency_total: u64 = 0;

    for event in events {
        match event {
            TelemetryEvent::PhraseCommitted { duration_ms, continuous, .. } => {
                snap.phrase_stats.committed += 1;
                snap.phrase_stats.total_audio_ms += duration_ms;
                if *continuous {
                    snap.phrase_stats.forced_splits += 1;
                }
            }
            TelemetryEvent::ChunkTransmitted { .. } => snap.phrase_stats.transmitted += 1,
            TelemetryEvent::HintSent => snap.pacing_stats.hints_sent += 1,
            TelemetryEvent::FragmentQueued { .. } => snap.playback_stats.queued += 1,
            TelemetryEvent::FragmentStarted { latency_ms, .. } => {
                snap.playback_stats.started += 1;
                if let Some(ms) = latency_ms {
                    snap.playback_stats.measured += 1;
                    latency_total += ms;
                    snap.playback_stats.max_latency_ms = snap.playback_stats.max_latency_ms.max(*ms);
                }
            }
            TelemetryEvent::FragmentDropped => snap.playback_stats.dropped += 1,
            TelemetryEvent::PaceTransition { to, .. } => {
                if *to == PaceState::Accelerating {
                    snap.pacing_stats.accelerations += 1;
                }
            }
            TelemetryEvent::RateAdjusted { from, to } => {
                if to > from {
                    snap.pacing_stats.rate_increases += 1;
                } else {
                    snap.pacing_stats.rate_decreases += 1;
                }
                if *to > snap.pacing_stats.peak_rate {
                    snap.pacing_stats.peak_rate = *to;
                }
            }
            TelemetryEvent::LatencyReset => snap.pacing_stats.latency_resets += 1,
            TelemetryEvent::ModeSwitched { automatic, .. } => {
                snap.session_stats.mode_switches += 1;
                if *automatic {
                    snap.session_stats.automatic_switches += 1;
                }
            }
            TelemetryEvent::Teardown { fatal } => {
                snap.session_stats.teardowns += 1;
                if *fatal {
                    snap.session_stats.fatal_teardowns += 1;
                }
            }
        }
    }

    if snap.playback_stats.measured > 0 {
        snap.playback_stats.avg_latency_ms = latency_total as f64 / snap.playback_stats.measured as f64;
    }

    snap
}
