//! In-memory overlay state plus the replay cache.
//!
//! The store is a commit target only: the reconciliation engine computes the
//! next state and the store swaps it in, together with any cache write, under
//! one version bump.

use overlay_proto::{
    DetailUpdate, Directions, Envelope, LeadActivity, LeadCreated, MenuUpdate, OverlayId,
    OverlayUpdate, PropertyRecord,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub record: PropertyRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faqs: Option<Value>,
}

/// Short-lived lead confirmation shown after the agent captures a lead or
/// logs an activity against one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeadStatus {
    Created(LeadCreated),
    Activity(LeadActivity),
}

/// What the overlay currently shows. `selected_id` may dangle; use
/// [`OverlayState::highlighted`] when rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayState {
    pub menu_items: Vec<PropertyRecord>,
    pub detail: Option<DetailView>,
    pub directions: Option<Directions>,
    pub lead_status: Option<LeadStatus>,
    pub selected_id: Option<String>,
    pub version: u64,
}

impl OverlayState {
    /// The selected id if it still names a menu item or the open detail record.
    pub fn highlighted(&self) -> Option<&str> {
        let selected = self.selected_id.as_deref()?;
        let in_menu = self
            .menu_items
            .iter()
            .any(|item| item.id.as_deref() == Some(selected));
        let in_detail = self
            .detail
            .as_ref()
            .is_some_and(|detail| detail.record.id.as_deref() == Some(selected));
        (in_menu || in_detail).then_some(selected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub overlay_id: OverlayId,
    pub payload: T,
}

/// Last applied menu, detail and directions payloads, kept apart from the live
/// state so they survive a clear followed by a reconnect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub menu: Option<Cached<MenuUpdate>>,
    pub detail: Option<Cached<DetailUpdate>>,
    pub directions: Option<Cached<Directions>>,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.menu.is_none() && self.detail.is_none() && self.directions.is_none()
    }

    /// Cached slots rebuilt as envelopes, in menu, detail, directions order.
    pub fn envelopes(&self) -> Vec<Envelope> {
        let mut envelopes = Vec::with_capacity(3);
        if let Some(menu) = &self.menu {
            envelopes.push(Envelope {
                overlay_id: Some(menu.overlay_id.clone()),
                update: OverlayUpdate::Menu(menu.payload.clone()),
            });
        }
        if let Some(detail) = &self.detail {
            envelopes.push(Envelope {
                overlay_id: Some(detail.overlay_id.clone()),
                update: OverlayUpdate::Detail(detail.payload.clone()),
            });
        }
        if let Some(directions) = &self.directions {
            envelopes.push(Envelope {
                overlay_id: Some(directions.overlay_id.clone()),
                update: OverlayUpdate::DirectionsShow(directions.payload.clone()),
            });
        }
        envelopes
    }

    fn write(&mut self, write: CacheWrite) {
        match write {
            CacheWrite::Menu(menu) => self.menu = Some(menu),
            CacheWrite::Detail(detail) => self.detail = Some(detail),
            CacheWrite::Directions(directions) => self.directions = Some(directions),
            CacheWrite::ClearDirections => self.directions = None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheWrite {
    Menu(Cached<MenuUpdate>),
    Detail(Cached<DetailUpdate>),
    Directions(Cached<Directions>),
    ClearDirections,
}

#[derive(Debug, Default)]
pub struct OverlayStore {
    state: OverlayState,
    cache: CacheSnapshot,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn snapshot(&self) -> OverlayState {
        self.state.clone()
    }

    pub fn cache(&self) -> &CacheSnapshot {
        &self.cache
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Commits the next live state and the matching cache write together.
    /// Returns the new version.
    pub fn apply_transition(&mut self, mut next: OverlayState, cache: Option<CacheWrite>) -> u64 {
        next.version = self.state.version + 1;
        self.state = next;
        if let Some(write) = cache {
            self.cache.write(write);
        }
        self.state.version
    }

    /// Drops the lead confirmation. Returns false when none was showing.
    pub fn dismiss_lead_status(&mut self) -> bool {
        if self.state.lead_status.is_none() {
            return false;
        }
        self.state.lead_status = None;
        self.state.version += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_menu(id: &str, items: Vec<PropertyRecord>) -> CacheWrite {
        CacheWrite::Menu(Cached {
            overlay_id: OverlayId::from(id),
            payload: MenuUpdate::of(items),
        })
    }

    #[test]
    fn commit_bumps_version_and_writes_cache() {
        let mut store = OverlayStore::new();
        let next = OverlayState {
            menu_items: vec![PropertyRecord::new("a", "Oceanview")],
            ..Default::default()
        };
        let version = store.apply_transition(
            next,
            Some(cached_menu("o1", vec![PropertyRecord::new("a", "Oceanview")])),
        );
        assert_eq!(version, 1);
        assert_eq!(store.state().menu_items.len(), 1);
        assert_eq!(
            store.cache().menu.as_ref().map(|m| m.overlay_id.as_str()),
            Some("o1")
        );
    }

    #[test]
    fn clear_directions_only_touches_directions_slot() {
        let mut store = OverlayStore::new();
        store.apply_transition(OverlayState::default(), Some(cached_menu("o1", Vec::new())));
        store.apply_transition(
            OverlayState::default(),
            Some(CacheWrite::Directions(Cached {
                overlay_id: OverlayId::from("d1"),
                payload: Directions::default(),
            })),
        );
        store.apply_transition(OverlayState::default(), Some(CacheWrite::ClearDirections));
        assert!(store.cache().directions.is_none());
        assert!(store.cache().menu.is_some());
    }

    #[test]
    fn highlighted_ignores_dangling_selection() {
        let mut state = OverlayState {
            menu_items: vec![PropertyRecord::new("a", "Oceanview")],
            selected_id: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(state.highlighted(), Some("a"));

        state.menu_items = vec![PropertyRecord::new("b", "Skyline")];
        assert_eq!(state.highlighted(), None);

        state.detail = Some(DetailView {
            record: PropertyRecord::new("a", "Oceanview"),
            faqs: None,
        });
        assert_eq!(state.highlighted(), Some("a"));
    }

    #[test]
    fn cache_envelopes_follow_slot_order() {
        let mut store = OverlayStore::new();
        store.apply_transition(
            OverlayState::default(),
            Some(CacheWrite::Detail(Cached {
                overlay_id: OverlayId::from("o2"),
                payload: DetailUpdate {
                    record: Some(PropertyRecord::new("a", "Oceanview")),
                    faqs: None,
                },
            })),
        );
        store.apply_transition(OverlayState::default(), Some(cached_menu("o1", Vec::new())));
        let ids: Vec<_> = store
            .cache()
            .envelopes()
            .into_iter()
            .filter_map(|envelope| envelope.overlay_id)
            .collect();
        assert_eq!(ids, [OverlayId::from("o1"), OverlayId::from("o2")]);
    }

    #[test]
    fn dismissing_lead_status_is_a_no_op_when_absent() {
        let mut store = OverlayStore::new();
        assert!(!store.dismiss_lead_status());
        assert_eq!(store.version(), 0);
    }
}
