use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use overlay_proto::VisitorIntent;
use tracing::{debug, warn};
use transport_bus::{Bus, PublishOptions};

use crate::codec::encode_intent;

/// Publishes visitor intents, one topic per intent type. Sends are
/// fire-and-forget: a failed publish is logged and dropped, never retried.
pub struct IntentEmitter<B: Bus> {
    bus: Arc<B>,
}

impl<B: Bus> IntentEmitter<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    pub fn send(&self, intent: &VisitorIntent) {
        let (topic, payload) = match encode_intent(intent) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(target = "overlay.intent", error = %err, "failed to encode visitor intent");
                return;
            }
        };
        match self.bus.publish(topic, payload, PublishOptions::RELIABLE) {
            Ok(()) => debug!(target = "overlay.intent", topic, "published visitor intent"),
            Err(err) => warn!(
                target = "overlay.intent",
                topic,
                error = %err,
                "dropping visitor intent"
            ),
        }
    }
}

impl<B: Bus> Clone for IntentEmitter<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBanner {
    pub text: String,
    pub expires_at: Instant,
}

/// Optimistic UI feedback for visitor actions: a per-topic busy flag for the
/// call-to-action that fired, and a status banner. Both simply expire after a
/// fixed window, whether or not the intent was delivered.
#[derive(Debug)]
pub struct IntentFeedback {
    busy_window: Duration,
    banner_ttl: Duration,
    busy_until: HashMap<&'static str, Instant>,
    banner: Option<StatusBanner>,
}

impl IntentFeedback {
    pub fn new(busy_window: Duration, banner_ttl: Duration) -> Self {
        Self {
            busy_window,
            banner_ttl,
            busy_until: HashMap::new(),
            banner: None,
        }
    }

    /// Records that `intent` was just sent. Acknowledgments are not visitor
    /// actions and leave no trace here.
    pub fn mark(&mut self, intent: &VisitorIntent, now: Instant) {
        if matches!(intent, VisitorIntent::AcknowledgeOverlay(_)) {
            return;
        }
        self.busy_until.insert(intent.topic(), now + self.busy_window);
        if let Some(text) = banner_text(intent) {
            self.banner = Some(StatusBanner {
                text: text.to_string(),
                expires_at: now + self.banner_ttl,
            });
        }
    }

    pub fn is_busy(&self, topic: &str, now: Instant) -> bool {
        self.busy_until
            .get(topic)
            .is_some_and(|deadline| now < *deadline)
    }

    pub fn banner(&self, now: Instant) -> Option<&StatusBanner> {
        self.banner.as_ref().filter(|banner| now < banner.expires_at)
    }

    /// Drops expired flags and banners. Returns true if anything expired.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.busy_until.len();
        self.busy_until.retain(|_, deadline| now < *deadline);
        let mut expired = before != self.busy_until.len();
        if self.banner.as_ref().is_some_and(|banner| now >= banner.expires_at) {
            self.banner = None;
            expired = true;
        }
        expired
    }
}

fn banner_text(intent: &VisitorIntent) -> Option<&'static str> {
    match intent {
        VisitorIntent::RequestTour(_) => Some("Tour request sent"),
        VisitorIntent::RequestBrochure(_) => Some("Brochure request sent"),
        VisitorIntent::ShareContact(_) => Some("Contact details shared"),
        VisitorIntent::SelectProperty(_) | VisitorIntent::AcknowledgeOverlay(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_proto::{
        AckOutcome, AckRecord, FollowUpRequest, TOPIC_OVERLAY_ACK, TOPIC_REQUEST_TOUR,
    };
    use transport_bus::{LocalBus, TransportEvent};

    #[tokio::test]
    async fn publishes_on_the_intent_topic() {
        let bus = Arc::new(LocalBus::new());
        let mut rx = bus.subscribe(TOPIC_OVERLAY_ACK);
        let emitter = IntentEmitter::new(bus.clone());

        emitter.send(&VisitorIntent::AcknowledgeOverlay(AckRecord::new(
            "o1",
            AckOutcome::Rendered,
        )));

        let msg = rx.recv().await.expect("ack message");
        assert!(msg.reliable);
        let value: serde_json::Value = serde_json::from_slice(&msg.payload).expect("json");
        assert_eq!(value["type"], TOPIC_OVERLAY_ACK);
        assert_eq!(value["payload"]["overlayId"], "o1");
    }

    #[test]
    fn send_on_unready_transport_is_swallowed() {
        let bus = Arc::new(LocalBus::new());
        bus.signal(TransportEvent::Disconnected);
        let mut rx = bus.subscribe(TOPIC_REQUEST_TOUR);
        let emitter = IntentEmitter::new(bus);

        emitter.send(&VisitorIntent::RequestTour(FollowUpRequest::default()));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn busy_flag_and_banner_expire() {
        let mut feedback =
            IntentFeedback::new(Duration::from_millis(2_500), Duration::from_millis(4_000));
        let now = Instant::now();
        feedback.mark(
            &VisitorIntent::RequestTour(FollowUpRequest::default()),
            now,
        );

        assert!(feedback.is_busy(TOPIC_REQUEST_TOUR, now));
        assert_eq!(
            feedback.banner(now).map(|b| b.text.as_str()),
            Some("Tour request sent")
        );

        let later = now + Duration::from_millis(3_000);
        assert!(!feedback.is_busy(TOPIC_REQUEST_TOUR, later));
        assert!(feedback.banner(later).is_some());

        let much_later = now + Duration::from_millis(5_000);
        assert!(feedback.expire(much_later));
        assert!(feedback.banner(much_later).is_none());
        assert!(!feedback.expire(much_later));
    }

    #[test]
    fn acknowledgments_leave_no_feedback() {
        let mut feedback = IntentFeedback::new(Duration::from_secs(1), Duration::from_secs(1));
        let now = Instant::now();
        feedback.mark(
            &VisitorIntent::AcknowledgeOverlay(AckRecord::new("o1", AckOutcome::Rendered)),
            now,
        );
        assert!(!feedback.is_busy(TOPIC_OVERLAY_ACK, now));
        assert!(feedback.banner(now).is_none());
    }
}
