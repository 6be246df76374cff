//! Pure state transition for inbound overlay envelopes.
//!
//! `reconcile` never touches the store: it returns the next state, the cache
//! write to commit alongside it, and the side effects the caller must perform
//! (acknowledgment, timeline notice). Envelopes are applied strictly in
//! arrival order with last-write-wins per slot; there is no content dedup.

use overlay_proto::{
    AckOutcome, AckRecord, Envelope, LeadActivity, LeadCreated, OverlayId, OverlayKind,
    OverlayUpdate,
};
use serde::Serialize;

use crate::store::{CacheWrite, Cached, DetailView, LeadStatus, OverlayState};

/// Human-readable line for the visitor's activity timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineNotice {
    pub kind: OverlayKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_id: Option<OverlayId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Acknowledge(AckRecord),
    Notice(TimelineNotice),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: OverlayState,
    pub cache: Option<CacheWrite>,
    pub effects: Vec<SideEffect>,
    /// False when the envelope could not populate its slot and was skipped.
    pub applied: bool,
}

impl Transition {
    pub fn acknowledgment(&self) -> Option<&AckRecord> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::Acknowledge(ack) => Some(ack),
            SideEffect::Notice(_) => None,
        })
    }

    pub fn notices(&self) -> impl Iterator<Item = &TimelineNotice> {
        self.effects.iter().filter_map(|effect| match effect {
            SideEffect::Notice(notice) => Some(notice),
            SideEffect::Acknowledge(_) => None,
        })
    }

    fn skipped(current: &OverlayState) -> Self {
        Self {
            state: current.clone(),
            cache: None,
            effects: Vec::new(),
            applied: false,
        }
    }
}

pub fn reconcile(current: &OverlayState, envelope: &Envelope) -> Transition {
    let mut next = current.clone();
    let overlay_id = envelope.overlay_id.clone();
    let mut notice = None;

    let (cache, outcome) = match &envelope.update {
        OverlayUpdate::Menu(menu) => {
            let Some(items) = &menu.items else {
                return Transition::skipped(current);
            };
            next.menu_items = items.clone();
            if !items.is_empty() {
                notice = Some(menu_notice(items.len(), menu.query.as_deref()));
            }
            let cache = overlay_id.clone().map(|overlay_id| {
                CacheWrite::Menu(Cached {
                    overlay_id,
                    payload: menu.clone(),
                })
            });
            (cache, AckOutcome::Rendered)
        }
        OverlayUpdate::Detail(detail) => {
            let Some(record) = &detail.record else {
                return Transition::skipped(current);
            };
            if let Some(id) = &record.id {
                next.selected_id = Some(id.clone());
            }
            next.detail = Some(DetailView {
                record: record.clone(),
                faqs: detail.faqs.clone(),
            });
            let cache = overlay_id.clone().map(|overlay_id| {
                CacheWrite::Detail(Cached {
                    overlay_id,
                    payload: detail.clone(),
                })
            });
            (cache, AckOutcome::Rendered)
        }
        OverlayUpdate::DirectionsShow(directions) => {
            if directions.locations.is_none() {
                return Transition::skipped(current);
            }
            next.directions = Some(directions.clone());
            let cache = overlay_id.clone().map(|overlay_id| {
                CacheWrite::Directions(Cached {
                    overlay_id,
                    payload: directions.clone(),
                })
            });
            (cache, AckOutcome::Rendered)
        }
        OverlayUpdate::DirectionsClear => {
            next.directions = None;
            (Some(CacheWrite::ClearDirections), AckOutcome::Cleared)
        }
        OverlayUpdate::LeadCreated(lead) => {
            notice = Some(lead_created_notice(lead));
            next.lead_status = Some(LeadStatus::Created(lead.clone()));
            (None, AckOutcome::Rendered)
        }
        OverlayUpdate::LeadActivity(activity) => {
            notice = Some(lead_activity_notice(activity));
            next.lead_status = Some(LeadStatus::Activity(activity.clone()));
            (None, AckOutcome::Rendered)
        }
    };

    let mut effects = Vec::with_capacity(2);
    if let Some(overlay_id) = &overlay_id {
        effects.push(SideEffect::Acknowledge(AckRecord {
            overlay_id: overlay_id.clone(),
            outcome,
        }));
    }
    if let Some(text) = notice {
        effects.push(SideEffect::Notice(TimelineNotice {
            kind: envelope.kind(),
            overlay_id,
            text,
        }));
    }

    Transition {
        state: next,
        cache,
        effects,
        applied: true,
    }
}

fn menu_notice(count: usize, query: Option<&str>) -> String {
    let noun = if count == 1 { "property" } else { "properties" };
    match query.map(str::trim).filter(|query| !query.is_empty()) {
        Some(query) => format!("Showing {count} {noun} for \"{query}\""),
        None => format!("Showing {count} {noun}"),
    }
}

fn lead_created_notice(lead: &LeadCreated) -> String {
    match lead.full_name.as_deref() {
        Some(name) => format!("Lead captured for {name}"),
        None => "Lead captured".to_string(),
    }
}

fn lead_activity_notice(activity: &LeadActivity) -> String {
    match (activity.activity_type.as_deref(), activity.message.as_deref()) {
        (Some(kind), Some(message)) => format!("Logged {kind}: {message}"),
        (None, Some(message)) => format!("Logged note: {message}"),
        (Some(kind), None) => format!("Logged {kind}"),
        (None, None) => "Activity logged".to_string(),
    }
}
