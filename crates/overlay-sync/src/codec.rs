//! Wire codec for overlay envelopes and visitor intents.
//!
//! Inbound overlays arrive in one of two dialects:
//! - legacy: `{"type":"ui.overlay","payload":{"kind":"properties.menu",...}}`
//! - typed: `{"type":"client.properties","payload":{"action":"menu",...}}`
//!
//! Both decode to the same [`Envelope`]; nothing past this module can tell
//! which one was used.

use bytes::Bytes;
use overlay_proto::{
    DetailUpdate, Envelope, OverlayId, OverlayKind, OverlayUpdate, PropertyRecord, VisitorIntent,
    INTENT_TOPICS, TOPIC_CLIENT_DIRECTIONS, TOPIC_CLIENT_LEADS, TOPIC_CLIENT_PROPERTIES,
    TOPIC_UI_OVERLAY,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const TYPED_TOPICS: &[&str] = &[
    TOPIC_CLIENT_PROPERTIES,
    TOPIC_CLIENT_LEADS,
    TOPIC_CLIENT_DIRECTIONS,
];

/// Keys a detail record may arrive under, in lookup order.
const DETAIL_RECORD_KEYS: &[&str] = &["property", "item", "record"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Legacy,
    Typed,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid json: {0}")]
    Json(serde_json::Error),
    #[error("envelope is not a json object")]
    NotAnObject,
    #[error("envelope has no usable type discriminant")]
    MissingType,
    #[error("unrecognized envelope type {0:?}")]
    UnknownType(String),
    #[error("envelope type {declared} arrived on channel {channel}")]
    ChannelMismatch { declared: String, channel: String },
    #[error("envelope payload is missing or not an object")]
    MissingPayload,
    #[error("unknown overlay kind {0:?}")]
    UnknownKind(String),
    #[error("action {action:?} is not valid on {topic}")]
    UnknownAction { topic: String, action: String },
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: OverlayKind,
        source: serde_json::Error,
    },
    #[error("invalid visitor intent: {0}")]
    InvalidIntent(serde_json::Error),
}

#[derive(Debug, Error)]
#[error("failed to serialize {what}: {source}")]
pub struct EncodeError {
    what: &'static str,
    source: serde_json::Error,
}

/// Decodes one inbound overlay datagram received on `channel`.
pub fn decode(bytes: &[u8], channel: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Json)?;
    let Value::Object(mut root) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let declared = match root.get("type") {
        Some(Value::String(declared)) => Some(declared.clone()),
        Some(_) => return Err(DecodeError::MissingType),
        None => None,
    };
    if let Some(declared) = declared.as_deref() {
        if TYPED_TOPICS.contains(&channel) && declared != channel {
            return Err(DecodeError::ChannelMismatch {
                declared: declared.to_string(),
                channel: channel.to_string(),
            });
        }
    }
    let discriminant = declared.as_deref().unwrap_or(channel);
    if discriminant != TOPIC_UI_OVERLAY && !TYPED_TOPICS.contains(&discriminant) {
        return Err(DecodeError::UnknownType(discriminant.to_string()));
    }

    let mut payload = match root.remove("payload") {
        Some(Value::Object(payload)) => payload,
        _ => return Err(DecodeError::MissingPayload),
    };

    let kind = if discriminant == TOPIC_UI_OVERLAY {
        let kind = take_string(&mut payload, "kind").ok_or(DecodeError::MissingType)?;
        OverlayKind::from_kind(&kind).ok_or(DecodeError::UnknownKind(kind))?
    } else {
        let action = take_string(&mut payload, "action").ok_or(DecodeError::MissingType)?;
        OverlayKind::from_typed(discriminant, &action).ok_or_else(|| {
            DecodeError::UnknownAction {
                topic: discriminant.to_string(),
                action,
            }
        })?
    };

    let overlay_id = take_string(&mut payload, "overlayId").map(OverlayId::from);
    let update = decode_update(kind, payload)?;
    Ok(Envelope { overlay_id, update })
}

fn decode_update(kind: OverlayKind, mut payload: Map<String, Value>) -> Result<OverlayUpdate, DecodeError> {
    let update = match kind {
        OverlayKind::Menu => OverlayUpdate::Menu(from_payload(kind, payload)?),
        OverlayKind::Detail => {
            let record = DETAIL_RECORD_KEYS
                .iter()
                .find_map(|key| match payload.remove(*key) {
                    Some(value @ Value::Object(_)) => Some(value),
                    _ => None,
                })
                .map(|value| serde_json::from_value::<PropertyRecord>(value))
                .transpose()
                .map_err(|source| DecodeError::InvalidPayload { kind, source })?;
            let faqs = payload.remove("faqs").filter(|faqs| !faqs.is_null());
            OverlayUpdate::Detail(DetailUpdate { record, faqs })
        }
        OverlayKind::DirectionsShow => OverlayUpdate::DirectionsShow(from_payload(kind, payload)?),
        OverlayKind::DirectionsClear => OverlayUpdate::DirectionsClear,
        OverlayKind::LeadCreated => OverlayUpdate::LeadCreated(from_payload(kind, payload)?),
        OverlayKind::LeadActivity => OverlayUpdate::LeadActivity(from_payload(kind, payload)?),
    };
    Ok(update)
}

fn from_payload<T: DeserializeOwned>(
    kind: OverlayKind,
    payload: Map<String, Value>,
) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|source| DecodeError::InvalidPayload { kind, source })
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(value)) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// Encodes an overlay envelope in the given dialect, returning the topic it
/// belongs on alongside the bytes.
pub fn encode_envelope(
    envelope: &Envelope,
    dialect: Dialect,
) -> Result<(&'static str, Bytes), EncodeError> {
    let kind = envelope.kind();
    let mut payload = match &envelope.update {
        OverlayUpdate::Menu(menu) => to_map("menu payload", menu)?,
        OverlayUpdate::Detail(detail) => {
            let mut map = Map::new();
            if let Some(record) = &detail.record {
                let key = match dialect {
                    Dialect::Legacy => "property",
                    Dialect::Typed => "item",
                };
                map.insert(key.to_string(), to_value("detail record", record)?);
            }
            if let Some(faqs) = &detail.faqs {
                map.insert("faqs".to_string(), faqs.clone());
            }
            map
        }
        OverlayUpdate::DirectionsShow(directions) => to_map("directions payload", directions)?,
        OverlayUpdate::DirectionsClear => Map::new(),
        OverlayUpdate::LeadCreated(lead) => to_map("lead payload", lead)?,
        OverlayUpdate::LeadActivity(activity) => to_map("activity payload", activity)?,
    };

    let topic = match dialect {
        Dialect::Legacy => {
            payload.insert("kind".to_string(), Value::from(kind.as_str()));
            TOPIC_UI_OVERLAY
        }
        Dialect::Typed => {
            payload.insert("action".to_string(), Value::from(kind.typed_action()));
            kind.typed_topic()
        }
    };
    if let Some(overlay_id) = &envelope.overlay_id {
        payload.insert("overlayId".to_string(), Value::from(overlay_id.as_str()));
    }

    let mut root = Map::new();
    root.insert("type".to_string(), Value::from(topic));
    root.insert("payload".to_string(), Value::Object(payload));
    let bytes = serde_json::to_vec(&root).map_err(|source| EncodeError {
        what: "overlay envelope",
        source,
    })?;
    Ok((topic, Bytes::from(bytes)))
}

/// Encodes a visitor intent; the returned topic is the intent's `type`.
pub fn encode_intent(intent: &VisitorIntent) -> Result<(&'static str, Bytes), EncodeError> {
    let bytes = serde_json::to_vec(intent).map_err(|source| EncodeError {
        what: "visitor intent",
        source,
    })?;
    Ok((intent.topic(), Bytes::from(bytes)))
}

/// Decodes a visitor intent received on `channel`. A message without `type`
/// takes its type from the channel.
pub fn decode_intent(bytes: &[u8], channel: &str) -> Result<VisitorIntent, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Json)?;
    let Value::Object(mut root) = value else {
        return Err(DecodeError::NotAnObject);
    };
    match root.get("type") {
        Some(Value::String(declared)) => {
            if INTENT_TOPICS.contains(&channel) && declared != channel {
                return Err(DecodeError::ChannelMismatch {
                    declared: declared.clone(),
                    channel: channel.to_string(),
                });
            }
        }
        Some(_) => return Err(DecodeError::MissingType),
        None if INTENT_TOPICS.contains(&channel) => {
            root.insert("type".to_string(), Value::from(channel));
        }
        None => return Err(DecodeError::MissingType),
    }
    serde_json::from_value(Value::Object(root)).map_err(DecodeError::InvalidIntent)
}

fn to_value<T: Serialize>(what: &'static str, value: &T) -> Result<Value, EncodeError> {
    serde_json::to_value(value).map_err(|source| EncodeError { what, source })
}

fn to_map<T: Serialize>(what: &'static str, value: &T) -> Result<Map<String, Value>, EncodeError> {
    match to_value(what, value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
