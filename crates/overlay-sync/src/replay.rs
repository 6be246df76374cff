//! Reconnect replay.
//!
//! The agent cannot tell that the visitor missed messages during a drop, so
//! after a reconnect the visitor rebuilds its overlay from its own cache and
//! repeats its last acknowledgment instead of asking for a resend.

use overlay_proto::{AckRecord, OverlayKind};
use tracing::debug;

use crate::ack::AckTracker;
use crate::reconcile::reconcile;
use crate::store::OverlayStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub replayed: Vec<OverlayKind>,
    /// Acknowledgment to send again, if one was ever recorded.
    pub acknowledgment: Option<AckRecord>,
}

impl ReplayReport {
    pub fn is_empty(&self) -> bool {
        self.replayed.is_empty() && self.acknowledgment.is_none()
    }
}

/// Replays the cache after reconnects. A first join has nothing cached, so
/// only reconnects go through here.
#[derive(Debug, Default)]
pub struct ReconnectReplayer {
    reconnects: u64,
}

impl ReconnectReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-applies every cached slot through the reconciliation path and
    /// reports the acknowledgment to repeat. Replay leaves the tracker alone
    /// and raises no per-slot acknowledgments or timeline notices.
    pub fn on_reconnected(&mut self, store: &mut OverlayStore, acks: &AckTracker) -> ReplayReport {
        self.reconnects += 1;

        let mut report = ReplayReport {
            replayed: Vec::new(),
            acknowledgment: acks.current().cloned(),
        };
        let cached = store.cache().envelopes();
        for envelope in cached {
            let transition = reconcile(store.state(), &envelope);
            if !transition.applied {
                continue;
            }
            store.apply_transition(transition.state, transition.cache);
            report.replayed.push(envelope.kind());
        }

        debug!(
            target = "overlay.replay",
            reconnects = self.reconnects,
            replayed = report.replayed.len(),
            ack = ?report.acknowledgment.as_ref().map(|ack| ack.overlay_id.as_str()),
            "replayed cached overlay state"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_proto::{
        AckOutcome, DetailUpdate, Directions, Envelope, Location, MenuUpdate, OverlayUpdate,
        PropertyRecord,
    };

    fn commit(store: &mut OverlayStore, acks: &mut AckTracker, envelope: Envelope) {
        let transition = reconcile(store.state(), &envelope);
        if let Some(ack) = transition.acknowledgment() {
            acks.observe(ack.overlay_id.clone(), ack.outcome);
        }
        store.apply_transition(transition.state, transition.cache);
    }

    #[test]
    fn nothing_to_replay_on_fresh_session() {
        let mut store = OverlayStore::new();
        let acks = AckTracker::new();
        let mut replayer = ReconnectReplayer::new();
        let report = replayer.on_reconnected(&mut store, &acks);
        assert!(report.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn restores_directions_cleared_live_but_kept_in_cache() {
        let mut store = OverlayStore::new();
        let mut acks = AckTracker::new();
        commit(
            &mut store,
            &mut acks,
            Envelope::new(OverlayUpdate::Menu(MenuUpdate::of(vec![PropertyRecord::new(
                "a",
                "Oceanview",
            )])))
            .with_overlay_id("o1"),
        );
        commit(
            &mut store,
            &mut acks,
            Envelope::new(OverlayUpdate::DirectionsShow(Directions::of(vec![
                Location::labeled("Office"),
            ])))
            .with_overlay_id("d1"),
        );

        // Live state lost while the cache survives, as after a remount.
        store.apply_transition(Default::default(), None);

        let mut replayer = ReconnectReplayer::new();
        let report = replayer.on_reconnected(&mut store, &acks);
        assert_eq!(
            report.replayed,
            [OverlayKind::Menu, OverlayKind::DirectionsShow]
        );
        assert_eq!(store.state().menu_items.len(), 1);
        assert!(store.state().directions.is_some());
        assert_eq!(
            report.acknowledgment,
            Some(AckRecord::new("d1", AckOutcome::Rendered))
        );
        assert_eq!(acks.current(), report.acknowledgment.as_ref());
    }

    #[test]
    fn replay_restores_selection_from_cached_detail() {
        let mut store = OverlayStore::new();
        let mut acks = AckTracker::new();
        commit(
            &mut store,
            &mut acks,
            Envelope::new(OverlayUpdate::Detail(DetailUpdate {
                record: Some(PropertyRecord::new("a", "Oceanview")),
                faqs: None,
            }))
            .with_overlay_id("o2"),
        );
        store.apply_transition(Default::default(), None);

        ReconnectReplayer::new().on_reconnected(&mut store, &acks);
        assert_eq!(store.state().selected_id.as_deref(), Some("a"));
        assert_eq!(store.state().highlighted(), Some("a"));
    }
}
