use std::collections::HashMap;

use grabd_input::GrabbableStateQuery;
use grabd_types::{DeviceId, GrabbableState, ObservedEvent};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Entry;

/// Process-wide registry of per-device grabbable state.
///
/// Shared behind an `Arc` by the receiver, which writes authoritative
/// updates, and by device grabbers, which read it before grabbing.
#[derive(Debug, Default)]
pub struct GrabbableStateQueuesManager {
    entries: Mutex<HashMap<DeviceId, Entry>>,
}

impl GrabbableStateQueuesManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        debug!("grabbable state registry cleared");
    }

    /// Feed one observed transition into the device's entry.
    ///
    /// Returns the new state when its judgment (state or reason) changed.
    pub fn update(
        &self,
        device_id: DeviceId,
        timestamp: u64,
        event: &ObservedEvent,
    ) -> Option<GrabbableState> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(device_id)
            .or_insert_with(|| Entry::new(device_id));
        let before = entry.grabbable_state();
        entry.update(device_id, timestamp, event);
        let after = entry.grabbable_state();
        if before.same_judgment(&after) {
            None
        } else {
            trace!(%device_id, from = %before, to = %after, "grabbable state changed");
            Some(after)
        }
    }

    /// Record an authoritative state reported from outside.
    pub fn update_grabbable_state(&self, grabbable_state: GrabbableState) {
        let device_id = grabbable_state.device_id();
        self.entries
            .lock()
            .entry(device_id)
            .or_insert_with(|| Entry::new(device_id))
            .set_grabbable_state(grabbable_state);
        debug!(%device_id, state = %grabbable_state, "grabbable state updated");
    }

    pub fn grabbable_state(&self, device_id: DeviceId) -> Option<GrabbableState> {
        self.entries
            .lock()
            .get(&device_id)
            .map(Entry::grabbable_state)
    }

    /// Unknown devices are never grabbable.
    pub fn is_grabbable(&self, device_id: DeviceId) -> bool {
        self.grabbable_state(device_id)
            .is_some_and(|state| state.is_grabbable())
    }

    pub fn remove(&self, device_id: DeviceId) -> Option<GrabbableState> {
        self.entries
            .lock()
            .remove(&device_id)
            .map(|entry| entry.grabbable_state())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl GrabbableStateQuery for GrabbableStateQueuesManager {
    fn grabbable_state(&self, device_id: DeviceId) -> Option<GrabbableState> {
        GrabbableStateQueuesManager::grabbable_state(self, device_id)
    }

    fn known_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.entries.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grabd_types::{KeyCode, State, UngrabbableTemporarilyReason};

    #[test]
    fn unknown_device_is_not_grabbable() {
        let manager = GrabbableStateQueuesManager::new();
        assert_eq!(manager.grabbable_state(DeviceId(1)), None);
        assert!(!manager.is_grabbable(DeviceId(1)));
        assert!(manager.is_empty());
    }

    #[test]
    fn override_creates_entry_lazily() {
        let manager = GrabbableStateQueuesManager::new();
        let state = GrabbableState::grabbable(DeviceId(4), 100);
        manager.update_grabbable_state(state);
        assert_eq!(manager.grabbable_state(DeviceId(4)), Some(state));
        assert!(manager.is_grabbable(DeviceId(4)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn update_reports_only_judgment_changes() {
        let manager = GrabbableStateQueuesManager::new();
        let device = DeviceId(2);

        let changed = manager
            .update(device, 1, &ObservedEvent::key_down(KeyCode::CAPS_LOCK))
            .unwrap();
        assert_eq!(changed.state(), State::UngrabbableTemporarily);
        assert_eq!(changed.reason(), UngrabbableTemporarilyReason::ModifierKeyPressed);

        // Second modifier keeps the same judgment.
        assert!(manager
            .update(device, 2, &ObservedEvent::key_down(KeyCode::LEFT_SHIFT))
            .is_none());
        assert_eq!(manager.grabbable_state(device).unwrap().timestamp(), 2);

        assert!(manager
            .update(device, 3, &ObservedEvent::key_up(KeyCode::CAPS_LOCK))
            .is_none());
        let released = manager
            .update(device, 4, &ObservedEvent::key_up(KeyCode::LEFT_SHIFT))
            .unwrap();
        assert_eq!(released, GrabbableState::grabbable(device, 4));
    }

    #[test]
    fn first_release_on_unseen_device_reports_grabbable() {
        let manager = GrabbableStateQueuesManager::new();
        let state = manager
            .update(DeviceId(9), 5, &ObservedEvent::key_up(KeyCode::A))
            .unwrap();
        assert!(state.is_grabbable());
    }

    #[test]
    fn remove_and_clear_forget_devices() {
        let manager = GrabbableStateQueuesManager::new();
        manager.update_grabbable_state(GrabbableState::grabbable(DeviceId(1), 1));
        manager.update_grabbable_state(GrabbableState::grabbable(DeviceId(2), 1));

        assert!(manager.remove(DeviceId(1)).is_some());
        assert!(manager.remove(DeviceId(1)).is_none());
        assert_eq!(GrabbableStateQuery::known_devices(&manager), vec![DeviceId(2)]);

        manager.clear();
        assert!(manager.is_empty());
    }
}
