//! Scripted replay of one visitor session.
//!
//! A script is JSON lines, one step per line. Blank lines and lines starting
//! with `#` are skipped.
//!
//! ```text
//! {"channel": "ui.overlay", "message": {"type": "ui.overlay", "payload": {...}}}
//! {"event": "reconnected"}
//! {"visitor": {"action": "selectProperty", "propertyId": "a"}}
//! ```

use std::sync::Arc;
use std::time::Instant;

use overlay_proto::{AckRecord, ContactDetails, FollowUpRequest, INTENT_TOPICS};
use overlay_sync::{OverlaySession, OverlayState, SessionConfig, TimelineNotice, VisitorCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use transport_bus::{Bus, BusMessage, LocalBus};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Message { channel: String, message: Value },
    Lifecycle { event: LifecycleEvent },
    Visitor { visitor: VisitorAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Connected,
    Reconnected,
    Disconnected,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum VisitorAction {
    #[serde(rename_all = "camelCase")]
    SelectProperty {
        property_id: String,
    },
    RequestTour(FollowUpRequest),
    RequestBrochure(FollowUpRequest),
    ShareContact(ContactDetails),
    DismissLeadStatus,
}

impl From<VisitorAction> for VisitorCommand {
    fn from(action: VisitorAction) -> Self {
        match action {
            VisitorAction::SelectProperty { property_id } => Self::SelectProperty(property_id),
            VisitorAction::RequestTour(request) => Self::RequestTour(request),
            VisitorAction::RequestBrochure(request) => Self::RequestBrochure(request),
            VisitorAction::ShareContact(contact) => Self::ShareContact(contact),
            VisitorAction::DismissLeadStatus => Self::DismissLeadStatus,
        }
    }
}

#[derive(Debug, Error)]
#[error("script line {line}: {source}")]
pub struct ScriptError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    text.lines()
        .enumerate()
        .filter(|(_, raw)| {
            let trimmed = raw.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, raw)| {
            serde_json::from_str(raw).map_err(|source| ScriptError {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub message: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub state: OverlayState,
    pub acknowledgment: Option<AckRecord>,
    pub notices: Vec<TimelineNotice>,
    pub outbound: Vec<OutboundMessage>,
    /// Inbound messages that did not decode as overlays.
    pub dropped: usize,
}

/// Feeds `steps` through a fresh visitor session on an in-process bus and
/// reports the final overlay state plus everything the visitor sent back.
pub fn run_script(steps: &[ScriptStep], config: SessionConfig) -> HarnessReport {
    let bus = Arc::new(LocalBus::new());
    let mut outbound_rx = bus.subscribe_all();
    let mut session = OverlaySession::new(bus.clone(), config);
    let mut report = HarnessReport {
        state: OverlayState::default(),
        acknowledgment: None,
        notices: Vec::new(),
        outbound: Vec::new(),
        dropped: 0,
    };

    for (index, step) in steps.iter().enumerate() {
        debug!(target = "overlay.harness", step = index, "running script step");
        match step {
            ScriptStep::Message { channel, message } => {
                let bytes = serde_json::to_vec(message).unwrap_or_default();
                match session.on_message(&bytes, channel) {
                    Some(applied) => report.notices.extend(applied.notices),
                    None => report.dropped += 1,
                }
            }
            ScriptStep::Lifecycle { event } => match event {
                LifecycleEvent::Connected => session.on_connected(),
                LifecycleEvent::Disconnected => session.on_disconnected(),
                LifecycleEvent::Reconnected => {
                    let replay = session.on_reconnected();
                    info!(
                        target = "overlay.harness",
                        replayed = replay.replayed.len(),
                        "replayed cached overlays"
                    );
                }
            },
            ScriptStep::Visitor { visitor } => {
                session.handle_command(visitor.clone().into(), Instant::now());
            }
        }
        report.outbound.extend(drain(&mut outbound_rx).into_iter().filter_map(|msg| {
            if !INTENT_TOPICS.contains(&msg.topic.as_str()) {
                return None;
            }
            let message = serde_json::from_slice(&msg.payload).ok()?;
            Some(OutboundMessage {
                topic: msg.topic,
                message,
            })
        }));
    }

    report.state = session.snapshot();
    report.acknowledgment = session.acknowledgment().cloned();
    report
}

fn drain(rx: &mut broadcast::Receiver<BusMessage>) -> Vec<BusMessage> {
    let mut drained = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(msg) => drained.push(msg),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(target = "overlay.harness", skipped, "outbound capture lagged");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    drained
}
