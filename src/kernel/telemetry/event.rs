use serde::{Deserialize, Serialize};

use crate::kernel::event::{GroupId, Mode};
use crate::kernel::pacing::PaceState;

// Allowed: IDs, Durations, Counts, Rates, Enums
// Forbidden: Audio Frames, Transcript Text

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    PhraseCommitted {
        group_id: GroupId,
        duration_ms: u64,
        continuous: bool,
    },

    ChunkTransmitted {
        group_id: GroupId,
        queued_after: u64,
    },

    HintSent,

    FragmentQueued {
        group_id: GroupId,
        duration_ms: u64,
    },

    FragmentStarted {
        group_id: GroupId,
        latency_ms: Option<u64>,
        rate: f64,
    },

    FragmentDropped,

    PaceTransition {
        from: PaceState,
        to: PaceState,
    },

    RateAdjusted {
        from: f64,
        to: f64,
    },

    LatencyReset,

    ModeSwitched {
        from: Mode,
        to: Mode,
        automatic: bool,
    },

    Teardown {
        fatal: bool,
    },
}
