use overlay_proto::{AckOutcome, AckRecord, OverlayId};

/// Holds the most recent acknowledgment only. Older records are overwritten;
/// acknowledgment is last-value-wins, not a delivery log.
#[derive(Debug, Default)]
pub struct AckTracker {
    last: Option<AckRecord>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, overlay_id: OverlayId, outcome: AckOutcome) -> &AckRecord {
        self.last.insert(AckRecord {
            overlay_id,
            outcome,
        })
    }

    pub fn current(&self) -> Option<&AckRecord> {
        self.last.as_ref()
    }
}
