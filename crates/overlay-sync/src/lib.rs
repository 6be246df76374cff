//! Overlay sync: keeps a visitor's property overlay in step with the voice
//! agent over a lossy room transport.
//!
//! Responsibilities:
//! - decoding agent overlays in either wire dialect into one envelope shape
//! - reconciling envelopes into overlay state and the per-slot replay cache
//! - acknowledging rendered or cleared overlays back to the agent
//! - replaying cached overlays after a transport reconnect
//! - emitting visitor intents (selection, tour/brochure requests, contact)
//! - the agent-side publisher that mints overlay ids and tracks acks

pub mod ack;
pub mod agent;
pub mod codec;
pub mod config;
pub mod intent;
pub mod reconcile;
pub mod replay;
pub mod session;
pub mod store;
pub mod worker;

pub use ack::AckTracker;
pub use agent::{mint_overlay_id, spawn_intent_listener, IntentListener, OverlayPublisher};
pub use codec::{decode, decode_intent, encode_envelope, encode_intent, DecodeError, Dialect, EncodeError};
pub use config::{PublisherConfig, SessionConfig};
pub use intent::{IntentEmitter, IntentFeedback, StatusBanner};
pub use reconcile::{reconcile, SideEffect, TimelineNotice, Transition};
pub use replay::{ReconnectReplayer, ReplayReport};
pub use session::{Applied, OverlaySession};
pub use store::{CacheSnapshot, Cached, DetailView, LeadStatus, OverlayState, OverlayStore};
pub use worker::{spawn_session_worker, SessionHandle, VisitorCommand};

use thiserror::Error;
use transport_bus::BusError;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("transport error: {0}")]
    Bus(#[from] BusError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type OverlayResult<T> = Result<T, OverlayError>;
