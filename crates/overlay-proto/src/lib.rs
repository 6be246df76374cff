//! Shared protocol definitions for agent ↔ visitor overlay traffic.
//! Keeping this in a dedicated crate allows regeneration of bindings
//! for the browser client without pulling in the runtime.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Generic broadcast topic used by the legacy dialect.
pub const TOPIC_UI_OVERLAY: &str = "ui.overlay";
pub const TOPIC_CLIENT_PROPERTIES: &str = "client.properties";
pub const TOPIC_CLIENT_LEADS: &str = "client.leads";
pub const TOPIC_CLIENT_DIRECTIONS: &str = "client.directions";

pub const TOPIC_SELECT_PROPERTY: &str = "visitor.selectProperty";
pub const TOPIC_REQUEST_TOUR: &str = "visitor.requestTour";
pub const TOPIC_REQUEST_BROCHURE: &str = "visitor.requestBrochure";
pub const TOPIC_SHARE_CONTACT: &str = "visitor.shareContact";
pub const TOPIC_OVERLAY_ACK: &str = "agent.overlayAck";

/// Topics the visitor listens on.
pub const INBOUND_TOPICS: &[&str] = &[
    TOPIC_UI_OVERLAY,
    TOPIC_CLIENT_PROPERTIES,
    TOPIC_CLIENT_LEADS,
    TOPIC_CLIENT_DIRECTIONS,
];

/// Topics the agent listens on.
pub const INTENT_TOPICS: &[&str] = &[
    TOPIC_SELECT_PROPERTY,
    TOPIC_REQUEST_TOUR,
    TOPIC_REQUEST_BROCHURE,
    TOPIC_SHARE_CONTACT,
    TOPIC_OVERLAY_ACK,
];

/// Sender-minted correlation token for one logical overlay update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OverlayId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OverlayId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    #[serde(rename = "properties.menu")]
    Menu,
    #[serde(rename = "properties.detail")]
    Detail,
    #[serde(rename = "directions.show")]
    DirectionsShow,
    #[serde(rename = "directions.clear")]
    DirectionsClear,
    #[serde(rename = "leads.created")]
    LeadCreated,
    #[serde(rename = "leads.activity")]
    LeadActivity,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 6] = [
        OverlayKind::Menu,
        OverlayKind::Detail,
        OverlayKind::DirectionsShow,
        OverlayKind::DirectionsClear,
        OverlayKind::LeadCreated,
        OverlayKind::LeadActivity,
    ];

    /// Name used in the legacy dialect's `kind` field.
    pub fn as_str(self) -> &'static str {
        match self {
            OverlayKind::Menu => "properties.menu",
            OverlayKind::Detail => "properties.detail",
            OverlayKind::DirectionsShow => "directions.show",
            OverlayKind::DirectionsClear => "directions.clear",
            OverlayKind::LeadCreated => "leads.created",
            OverlayKind::LeadActivity => "leads.activity",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == kind)
    }

    /// Topic carrying this kind in the typed dialect.
    pub fn typed_topic(self) -> &'static str {
        match self {
            OverlayKind::Menu | OverlayKind::Detail => TOPIC_CLIENT_PROPERTIES,
            OverlayKind::DirectionsShow | OverlayKind::DirectionsClear => TOPIC_CLIENT_DIRECTIONS,
            OverlayKind::LeadCreated | OverlayKind::LeadActivity => TOPIC_CLIENT_LEADS,
        }
    }

    /// Value of `payload.action` for this kind in the typed dialect.
    pub fn typed_action(self) -> &'static str {
        match self {
            OverlayKind::Menu => "menu",
            OverlayKind::Detail => "detail",
            OverlayKind::DirectionsShow => "show",
            OverlayKind::DirectionsClear => "clear",
            OverlayKind::LeadCreated => "created",
            OverlayKind::LeadActivity => "activity",
        }
    }

    /// Resolves a typed-dialect `(topic, action)` pair. An action that does not
    /// belong to the topic yields `None`.
    pub fn from_typed(topic: &str, action: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.typed_topic() == topic && candidate.typed_action() == action)
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property card or detail record. Only `id` and `title` are interpreted;
/// every other field is carried through untouched for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(
        default,
        deserialize_with = "loose_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertyRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: Some(title.into()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            extra: Map::new(),
        }
    }
}

/// Menu payload. `items` is `None` when the sender left the list out, which
/// is not the same as an empty result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<PropertyRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

impl MenuUpdate {
    pub fn of(items: Vec<PropertyRecord>) -> Self {
        Self {
            items: Some(items),
            ..Default::default()
        }
    }
}

/// Detail payload. The record is optional on the wire; a detail update
/// without one leaves the detail slot untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PropertyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faqs: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Directions {
    pub fn of(locations: Vec<Location>) -> Self {
        Self {
            locations: Some(locations),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCreated {
    #[serde(
        default,
        deserialize_with = "loose_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadActivity {
    #[serde(
        default,
        deserialize_with = "loose_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayUpdate {
    Menu(MenuUpdate),
    Detail(DetailUpdate),
    DirectionsShow(Directions),
    DirectionsClear,
    LeadCreated(LeadCreated),
    LeadActivity(LeadActivity),
}

impl OverlayUpdate {
    pub fn kind(&self) -> OverlayKind {
        match self {
            OverlayUpdate::Menu(_) => OverlayKind::Menu,
            OverlayUpdate::Detail(_) => OverlayKind::Detail,
            OverlayUpdate::DirectionsShow(_) => OverlayKind::DirectionsShow,
            OverlayUpdate::DirectionsClear => OverlayKind::DirectionsClear,
            OverlayUpdate::LeadCreated(_) => OverlayKind::LeadCreated,
            OverlayUpdate::LeadActivity(_) => OverlayKind::LeadActivity,
        }
    }
}

/// One decoded overlay message, independent of the dialect it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub overlay_id: Option<OverlayId>,
    pub update: OverlayUpdate,
}

impl Envelope {
    pub fn new(update: OverlayUpdate) -> Self {
        Self {
            overlay_id: None,
            update,
        }
    }

    pub fn with_overlay_id(mut self, overlay_id: impl Into<OverlayId>) -> Self {
        self.overlay_id = Some(overlay_id.into());
        self
    }

    pub fn kind(&self) -> OverlayKind {
        self.update.kind()
    }

    /// Envelopes without an overlay id are transient notices: applied, but
    /// neither acknowledged nor cached.
    pub fn is_transient(&self) -> bool {
        self.overlay_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Rendered,
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRecord {
    pub overlay_id: OverlayId,
    pub outcome: AckOutcome,
}

impl AckRecord {
    pub fn new(overlay_id: impl Into<OverlayId>, outcome: AckOutcome) -> Self {
        Self {
            overlay_id: overlay_id.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectProperty {
    pub property_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_id: Option<OverlayId>,
}

/// Payload shared by tour and brochure requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_id: Option<OverlayId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_id: Option<OverlayId>,
}

impl ContactDetails {
    /// A name plus at least one way to reach the visitor.
    pub fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.full_name) && (present(&self.email) || present(&self.phone))
    }
}

/// Outbound message from the visitor side. Serialized as
/// `{"type": ..., "payload": {...}}`, and published on the topic equal to `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum VisitorIntent {
    #[serde(rename = "visitor.selectProperty")]
    SelectProperty(SelectProperty),
    #[serde(rename = "visitor.requestTour")]
    RequestTour(FollowUpRequest),
    #[serde(rename = "visitor.requestBrochure")]
    RequestBrochure(FollowUpRequest),
    #[serde(rename = "visitor.shareContact")]
    ShareContact(ContactDetails),
    #[serde(rename = "agent.overlayAck")]
    AcknowledgeOverlay(AckRecord),
}

impl VisitorIntent {
    pub fn topic(&self) -> &'static str {
        match self {
            VisitorIntent::SelectProperty(_) => TOPIC_SELECT_PROPERTY,
            VisitorIntent::RequestTour(_) => TOPIC_REQUEST_TOUR,
            VisitorIntent::RequestBrochure(_) => TOPIC_REQUEST_BROCHURE,
            VisitorIntent::ShareContact(_) => TOPIC_SHARE_CONTACT,
            VisitorIntent::AcknowledgeOverlay(_) => TOPIC_OVERLAY_ACK,
        }
    }
}

/// Accepts identifiers sent either as strings or as bare numbers.
fn loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
