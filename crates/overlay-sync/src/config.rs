use std::time::Duration;

use crate::codec::Dialect;

const DEFAULT_CTA_BUSY_MS: u64 = 2_500;
const DEFAULT_BANNER_TTL_MS: u64 = 4_000;
const DEFAULT_LEAD_STATUS_TTL_MS: u64 = 6_000;
const DEFAULT_TICK_MS: u64 = 250;

/// Visitor-side timing knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a call-to-action stays "busy" after its intent is sent.
    pub cta_busy_window: Duration,
    /// Lifetime of the status banner raised by a visitor action.
    pub banner_ttl: Duration,
    /// Lifetime of the lead confirmation raised by lead overlays.
    pub lead_status_ttl: Duration,
    /// How often the session worker checks for expired UI feedback.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cta_busy_window: Duration::from_millis(DEFAULT_CTA_BUSY_MS),
            banner_ttl: Duration::from_millis(DEFAULT_BANNER_TTL_MS),
            lead_status_ttl: Duration::from_millis(DEFAULT_LEAD_STATUS_TTL_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                lookup(key)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(default),
            )
        };
        Self {
            cta_busy_window: millis("OVERLAY_CTA_BUSY_MS", DEFAULT_CTA_BUSY_MS),
            banner_ttl: millis("OVERLAY_BANNER_TTL_MS", DEFAULT_BANNER_TTL_MS),
            lead_status_ttl: millis("OVERLAY_LEAD_STATUS_TTL_MS", DEFAULT_LEAD_STATUS_TTL_MS),
            tick_interval: millis("OVERLAY_TICK_MS", DEFAULT_TICK_MS).max(Duration::from_millis(1)),
        }
    }
}

/// Agent-side publishing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub legacy_dialect: bool,
    pub typed_dialect: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            legacy_dialect: true,
            typed_dialect: true,
        }
    }
}

impl PublisherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `OVERLAY_LEGACY_DIALECT` and `OVERLAY_TYPED_DIALECT`. Only an
    /// explicit off value ("0", "false", "no", "off") disables a dialect.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| match lookup(key).as_deref().map(str::trim) {
            Some(value)
                if ["0", "false", "no", "off"]
                    .iter()
                    .any(|off| value.eq_ignore_ascii_case(off)) =>
            {
                false
            }
            _ => true,
        };
        Self {
            legacy_dialect: flag("OVERLAY_LEGACY_DIALECT"),
            typed_dialect: flag("OVERLAY_TYPED_DIALECT"),
        }
    }

    /// Dialects to publish in. Falls back to the typed dialect when both are
    /// switched off, since an overlay must go out in some shape.
    pub fn dialects(&self) -> Vec<Dialect> {
        let mut dialects = Vec::with_capacity(2);
        if self.legacy_dialect {
            dialects.push(Dialect::Legacy);
        }
        if self.typed_dialect {
            dialects.push(Dialect::Typed);
        }
        if dialects.is_empty() {
            dialects.push(Dialect::Typed);
        }
        dialects
    }
}
