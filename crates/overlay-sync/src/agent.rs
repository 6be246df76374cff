//! Agent side of the overlay protocol: publishes overlays in both wire
//! dialects, keeps track of which ones the visitor has acknowledged, and
//! listens for visitor intents.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use overlay_proto::{
    AckRecord, DetailUpdate, Directions, Envelope, LeadActivity, LeadCreated, MenuUpdate,
    OverlayId, OverlayKind, OverlayUpdate, PropertyRecord, VisitorIntent, INTENT_TOPICS,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use transport_bus::{Bus, PublishOptions};
use uuid::Uuid;

use crate::codec::{decode_intent, encode_envelope, Dialect};
use crate::config::PublisherConfig;
use crate::OverlayResult;

const INTENT_CAPACITY: usize = 32;

/// Mints a fresh overlay id such as `ovr-1a2b3c4d`.
pub fn mint_overlay_id(kind: OverlayKind) -> OverlayId {
    let prefix = match kind {
        OverlayKind::Menu | OverlayKind::Detail => "ovr",
        OverlayKind::DirectionsShow | OverlayKind::DirectionsClear => "dir",
        OverlayKind::LeadCreated | OverlayKind::LeadActivity => "lead",
    };
    let token = Uuid::new_v4().simple().to_string();
    OverlayId::new(format!("{prefix}-{}", &token[..8]))
}

pub struct OverlayPublisher<B: Bus> {
    bus: Arc<B>,
    dialects: Vec<Dialect>,
    pending: BTreeSet<OverlayId>,
    resent: HashSet<OverlayId>,
    last_menu: Option<Envelope>,
    last_detail: Option<Envelope>,
    last_overlay_id: Option<OverlayId>,
}

impl<B: Bus> OverlayPublisher<B> {
    pub fn new(bus: Arc<B>, config: &PublisherConfig) -> Self {
        Self {
            bus,
            dialects: config.dialects(),
            pending: BTreeSet::new(),
            resent: HashSet::new(),
            last_menu: None,
            last_detail: None,
            last_overlay_id: None,
        }
    }

    /// Publisher configured from `OVERLAY_LEGACY_DIALECT` and
    /// `OVERLAY_TYPED_DIALECT`.
    pub fn from_env(bus: Arc<B>) -> Self {
        Self::new(bus, &PublisherConfig::from_env())
    }

    /// Publishes `update` in every configured dialect under one overlay id,
    /// minting one when none is given. Nothing is tracked if no dialect went
    /// out. When only some dialects went out the overlay is still tracked,
    /// since the visitor may render and ack it, and the error is returned.
    pub fn publish(
        &mut self,
        update: OverlayUpdate,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        let kind = update.kind();
        let overlay_id = overlay_id.unwrap_or_else(|| mint_overlay_id(kind));
        let envelope = Envelope {
            overlay_id: Some(overlay_id.clone()),
            update,
        };
        let mut delivered = 0;
        if let Err(err) = self.send(&envelope, &mut delivered) {
            if delivered == 0 {
                warn!(
                    target = "overlay.agent",
                    kind = %kind,
                    overlay_id = %overlay_id,
                    error = %err,
                    "skipping overlay"
                );
                return Err(err);
            }
            warn!(
                target = "overlay.agent",
                kind = %kind,
                overlay_id = %overlay_id,
                delivered,
                error = %err,
                "overlay went out in some dialects only"
            );
            self.track(kind, overlay_id, envelope);
            return Err(err);
        }

        self.track(kind, overlay_id.clone(), envelope);
        debug!(
            target = "overlay.agent",
            kind = %kind,
            overlay_id = %overlay_id,
            "published overlay"
        );
        Ok(overlay_id)
    }

    fn track(&mut self, kind: OverlayKind, overlay_id: OverlayId, envelope: Envelope) {
        self.pending.insert(overlay_id.clone());
        self.resent.remove(&overlay_id);
        match kind {
            OverlayKind::Menu => self.last_menu = Some(envelope),
            OverlayKind::Detail => self.last_detail = Some(envelope),
            _ => {}
        }
        self.last_overlay_id = Some(overlay_id);
    }

    pub fn show_menu(
        &mut self,
        menu: MenuUpdate,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        self.publish(OverlayUpdate::Menu(menu), overlay_id)
    }

    pub fn show_detail(
        &mut self,
        record: PropertyRecord,
        faqs: Option<Value>,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        self.publish(
            OverlayUpdate::Detail(DetailUpdate {
                record: Some(record),
                faqs,
            }),
            overlay_id,
        )
    }

    pub fn show_directions(
        &mut self,
        directions: Directions,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        self.publish(OverlayUpdate::DirectionsShow(directions), overlay_id)
    }

    pub fn clear_directions(&mut self, overlay_id: Option<OverlayId>) -> OverlayResult<OverlayId> {
        self.publish(OverlayUpdate::DirectionsClear, overlay_id)
    }

    pub fn lead_created(
        &mut self,
        lead: LeadCreated,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        self.publish(OverlayUpdate::LeadCreated(lead), overlay_id)
    }

    pub fn lead_activity(
        &mut self,
        activity: LeadActivity,
        overlay_id: Option<OverlayId>,
    ) -> OverlayResult<OverlayId> {
        self.publish(OverlayUpdate::LeadActivity(activity), overlay_id)
    }

    /// Marks an overlay as acknowledged. Returns false for ids that were not
    /// pending (already acknowledged, or never published here).
    pub fn register_ack(&mut self, ack: &AckRecord) -> bool {
        self.resent.remove(&ack.overlay_id);
        self.pending.remove(&ack.overlay_id)
    }

    pub fn is_pending(&self, overlay_id: &OverlayId) -> bool {
        self.pending.contains(overlay_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &OverlayId> {
        self.pending.iter()
    }

    pub fn last_overlay_id(&self) -> Option<&OverlayId> {
        self.last_overlay_id.as_ref()
    }

    /// Re-publishes the latest menu and detail overlays that are still
    /// unacknowledged. Each overlay id is resent at most once.
    pub fn resend_pending(&mut self) -> Vec<OverlayId> {
        let candidates: Vec<Envelope> = [&self.last_menu, &self.last_detail]
            .into_iter()
            .flatten()
            .filter(|envelope| {
                envelope.overlay_id.as_ref().is_some_and(|id| {
                    self.pending.contains(id) && !self.resent.contains(id)
                })
            })
            .cloned()
            .collect();

        let mut resent = Vec::with_capacity(candidates.len());
        for envelope in candidates {
            let Some(overlay_id) = envelope.overlay_id.clone() else {
                continue;
            };
            let mut delivered = 0;
            match self.send(&envelope, &mut delivered) {
                Ok(()) => {
                    debug!(target = "overlay.agent", overlay_id = %overlay_id, "resent unacknowledged overlay");
                    self.resent.insert(overlay_id.clone());
                    resent.push(overlay_id);
                }
                Err(err) => warn!(
                    target = "overlay.agent",
                    overlay_id = %overlay_id,
                    delivered,
                    error = %err,
                    "failed to resend overlay"
                ),
            }
        }
        resent
    }

    /// Sends `envelope` in each dialect in turn, stopping at the first
    /// failure. `delivered` counts the dialects that went out.
    fn send(&self, envelope: &Envelope, delivered: &mut usize) -> OverlayResult<()> {
        for dialect in &self.dialects {
            let (topic, payload) = encode_envelope(envelope, *dialect)?;
            self.bus.publish(topic, payload, PublishOptions::RELIABLE)?;
            *delivered += 1;
        }
        Ok(())
    }
}

pub struct IntentListener {
    pub intents: mpsc::Receiver<VisitorIntent>,
    pub task: JoinHandle<()>,
}

/// Listens on the visitor intent topics. Acknowledgments settle pending
/// overlays on `publisher`; every other intent is forwarded on `intents` for
/// the agent's own handling.
pub fn spawn_intent_listener<B: Bus + 'static>(
    bus: Arc<B>,
    publisher: Arc<Mutex<OverlayPublisher<B>>>,
) -> IntentListener {
    let mut rx = bus.subscribe_all();
    let (tx, intents) = mpsc::channel(INTENT_CAPACITY);
    let task = tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target = "overlay.agent", skipped, "intent stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !INTENT_TOPICS.contains(&msg.topic.as_str()) {
                continue;
            }
            let intent = match decode_intent(&msg.payload, &msg.topic) {
                Ok(intent) => intent,
                Err(err) => {
                    warn!(
                        target = "overlay.agent",
                        topic = %msg.topic,
                        error = %err,
                        "failed to decode visitor intent"
                    );
                    continue;
                }
            };
            match intent {
                VisitorIntent::AcknowledgeOverlay(ack) => {
                    let settled = publisher.lock().register_ack(&ack);
                    debug!(
                        target = "overlay.agent",
                        overlay_id = %ack.overlay_id,
                        outcome = ?ack.outcome,
                        settled,
                        "received overlay ack"
                    );
                }
                // Never blocks; acks keep settling while intents back up.
                other => match tx.try_send(other) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        warn!(
                            target = "overlay.agent",
                            topic = %msg.topic,
                            intent = ?dropped,
                            "intent queue full; dropping visitor intent"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(target = "overlay.agent", "intent receiver dropped");
                    }
                },
            }
        }
    });
    IntentListener { intents, task }
}
