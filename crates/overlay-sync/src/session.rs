use std::sync::Arc;
use std::time::Instant;

use overlay_proto::{
    AckRecord, ContactDetails, Envelope, FollowUpRequest, OverlayKind, SelectProperty,
    VisitorIntent,
};
use tracing::{debug, warn};
use transport_bus::Bus;

use crate::ack::AckTracker;
use crate::codec;
use crate::config::SessionConfig;
use crate::intent::{IntentEmitter, IntentFeedback};
use crate::reconcile::{reconcile, TimelineNotice};
use crate::replay::{ReconnectReplayer, ReplayReport};
use crate::store::{CacheSnapshot, OverlayState, OverlayStore};
use crate::worker::VisitorCommand;

/// Outcome of applying one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub kind: OverlayKind,
    pub version: u64,
    pub acknowledged: Option<AckRecord>,
    pub notices: Vec<TimelineNotice>,
}

/// One visitor's room membership: overlay state, replay cache, last
/// acknowledgment, and the outbound intent path.
///
/// All methods take `&mut self`; callers drive the session from a single event
/// loop (see [`crate::worker::spawn_session_worker`]).
pub struct OverlaySession<B: Bus> {
    store: OverlayStore,
    acks: AckTracker,
    replayer: ReconnectReplayer,
    emitter: IntentEmitter<B>,
    feedback: IntentFeedback,
    config: SessionConfig,
    lead_status_expires: Option<Instant>,
}

impl<B: Bus> OverlaySession<B> {
    pub fn new(bus: Arc<B>, config: SessionConfig) -> Self {
        Self {
            store: OverlayStore::new(),
            acks: AckTracker::new(),
            replayer: ReconnectReplayer::new(),
            emitter: IntentEmitter::new(bus),
            feedback: IntentFeedback::new(config.cta_busy_window, config.banner_ttl),
            config,
            lead_status_expires: None,
        }
    }

    pub fn state(&self) -> &OverlayState {
        self.store.state()
    }

    pub fn snapshot(&self) -> OverlayState {
        self.store.snapshot()
    }

    pub fn cache(&self) -> &CacheSnapshot {
        self.store.cache()
    }

    pub fn acknowledgment(&self) -> Option<&AckRecord> {
        self.acks.current()
    }

    pub fn feedback(&self) -> &IntentFeedback {
        &self.feedback
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Inbound datagram hook. Undecodable messages are logged and dropped.
    pub fn on_message(&mut self, bytes: &[u8], channel: &str) -> Option<Applied> {
        match codec::decode(bytes, channel) {
            Ok(envelope) => Some(self.apply(&envelope)),
            Err(err) => {
                warn!(
                    target = "overlay.session",
                    channel,
                    error = %err,
                    "dropping undecodable overlay message"
                );
                None
            }
        }
    }

    pub fn apply(&mut self, envelope: &Envelope) -> Applied {
        let kind = envelope.kind();
        let transition = reconcile(self.store.state(), envelope);
        if !transition.applied {
            debug!(
                target = "overlay.session",
                kind = %kind,
                overlay_id = ?envelope.overlay_id,
                "overlay carried nothing to show; slot left unchanged"
            );
            return Applied {
                kind,
                version: self.store.version(),
                acknowledged: None,
                notices: Vec::new(),
            };
        }

        let acknowledged = transition.acknowledgment().cloned();
        let notices: Vec<TimelineNotice> = transition.notices().cloned().collect();
        let version = self.store.apply_transition(transition.state, transition.cache);
        if matches!(kind, OverlayKind::LeadCreated | OverlayKind::LeadActivity) {
            self.lead_status_expires = Some(Instant::now() + self.config.lead_status_ttl);
        }

        if let Some(ack) = &acknowledged {
            self.acks.observe(ack.overlay_id.clone(), ack.outcome);
            self.emitter
                .send(&VisitorIntent::AcknowledgeOverlay(ack.clone()));
        }
        debug!(
            target = "overlay.session",
            kind = %kind,
            version,
            overlay_id = ?envelope.overlay_id,
            "applied overlay"
        );

        Applied {
            kind,
            version,
            acknowledged,
            notices,
        }
    }

    /// First join. Nothing is cached yet, so nothing is replayed.
    pub fn on_connected(&mut self) {
        debug!(target = "overlay.session", "transport connected");
    }

    pub fn on_disconnected(&mut self) {
        debug!(target = "overlay.session", "transport disconnected");
    }

    /// Rebuilds the overlay from the replay cache and repeats the last
    /// acknowledgment.
    pub fn on_reconnected(&mut self) -> ReplayReport {
        let report = self.replayer.on_reconnected(&mut self.store, &self.acks);
        if let Some(ack) = &report.acknowledgment {
            self.emitter
                .send(&VisitorIntent::AcknowledgeOverlay(ack.clone()));
        }
        report
    }

    /// Highlights nothing locally; the agent answers with a detail overlay.
    pub fn select_property(&mut self, property_id: impl Into<String>, now: Instant) {
        let overlay_id = self
            .store
            .cache()
            .menu
            .as_ref()
            .map(|menu| menu.overlay_id.clone());
        self.send(
            VisitorIntent::SelectProperty(SelectProperty {
                property_id: property_id.into(),
                overlay_id,
            }),
            now,
        );
    }

    pub fn request_tour(&mut self, request: FollowUpRequest, now: Instant) {
        let request = self.with_detail_context(request);
        self.send(VisitorIntent::RequestTour(request), now);
    }

    pub fn request_brochure(&mut self, request: FollowUpRequest, now: Instant) {
        let request = self.with_detail_context(request);
        self.send(VisitorIntent::RequestBrochure(request), now);
    }

    pub fn share_contact(&mut self, contact: ContactDetails, now: Instant) {
        if !contact.is_complete() {
            debug!(
                target = "overlay.session",
                "sharing incomplete contact; agent will log a note instead of a lead"
            );
        }
        self.send(VisitorIntent::ShareContact(contact), now);
    }

    /// Expires UI feedback and the lead confirmation. Returns true when the
    /// overlay state itself changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.feedback.expire(now);
        match self.lead_status_expires {
            Some(deadline) if now >= deadline => {
                self.lead_status_expires = None;
                self.store.dismiss_lead_status()
            }
            _ => false,
        }
    }

    pub fn dismiss_lead_status(&mut self) -> bool {
        self.lead_status_expires = None;
        self.store.dismiss_lead_status()
    }

    /// Runs one visitor interaction. Returns true when it changed overlay
    /// state; intents themselves leave the overlay alone until the agent
    /// answers.
    pub fn handle_command(&mut self, command: VisitorCommand, now: Instant) -> bool {
        match command {
            VisitorCommand::SelectProperty(property_id) => self.select_property(property_id, now),
            VisitorCommand::RequestTour(request) => self.request_tour(request, now),
            VisitorCommand::RequestBrochure(request) => self.request_brochure(request, now),
            VisitorCommand::ShareContact(contact) => self.share_contact(contact, now),
            VisitorCommand::DismissLeadStatus => return self.dismiss_lead_status(),
        }
        false
    }

    fn send(&mut self, intent: VisitorIntent, now: Instant) {
        self.emitter.send(&intent);
        self.feedback.mark(&intent, now);
    }

    /// Fills in the property and overlay the visitor is looking at when the
    /// caller left them out.
    fn with_detail_context(&self, mut request: FollowUpRequest) -> FollowUpRequest {
        if request.property_id.is_none() {
            request.property_id = self
                .store
                .state()
                .detail
                .as_ref()
                .and_then(|detail| detail.record.id.clone());
        }
        if request.overlay_id.is_none() {
            request.overlay_id = self
                .store
                .cache()
                .detail
                .as_ref()
                .map(|detail| detail.overlay_id.clone());
        }
        request
    }
}
