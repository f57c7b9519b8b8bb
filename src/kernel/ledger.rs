use std::collections::BTreeMap;

use tokio::time::Instant;

use super::event::GroupId;

/// Phrase counter plus the wall-clock start of every recorded group.
///
/// Start times are registered for the *next* group id when recording begins,
/// before the phrase is committed, so latency can be measured from the first
/// voiced frame rather than from the commit.
#[derive(Debug, Default)]
pub struct CorrelationLedger {
    committed: GroupId,
    started_at: BTreeMap<GroupId, Instant>,
}

impl CorrelationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recently committed group (0 before the first commit).
    pub fn current(&self) -> GroupId {
        self.committed
    }

    /// Id the next commit will receive.
    pub fn upcoming(&self) -> GroupId {
        self.committed.next()
    }

    /// Stamp the start time of the group that is about to be recorded.
    pub fn mark_started(&mut self, now: Instant) -> GroupId {
        let id = self.upcoming();
        self.started_at.insert(id, now);
        id
    }

    /// Advance the counter and return the id of the newly committed group.
    pub fn commit(&mut self) -> GroupId {
        self.committed = self.committed.next();
        self.committed
    }

    pub fn started_at(&self, id: GroupId) -> Option<Instant> {
        self.started_at.get(&id).copied()
    }

    /// Forget every group strictly older than `id`. Later fragments can only
    /// carry `id` or newer, so these entries will never be read again.
    pub fn evict_before(&mut self, id: GroupId) {
        self.started_at = self.started_at.split_off(&id);
    }

    pub fn len(&self) -> usize {
        self.started_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.started_at.is_empty()
    }

    pub fn reset(&mut self) {
        self.committed = GroupId::default();
        self.started_at.clear();
    }
}
