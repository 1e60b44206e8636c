use std::collections::HashSet;

use grabd_types::{
    DeviceId, EventCode, EventType, GrabbableState, ModifierFlag, ObservedEvent, PointingButton,
    UngrabbableTemporarilyReason,
};

use super::KeyboardRepeatDetector;

/// Input state of one device and the grabbable state derived from it.
#[derive(Debug)]
pub struct Entry {
    keyboard_repeat_detector: KeyboardRepeatDetector,
    pressed_modifier_flags: HashSet<ModifierFlag>,
    pressed_pointing_buttons: HashSet<PointingButton>,
    grabbable_state: GrabbableState,
}

impl Entry {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            keyboard_repeat_detector: KeyboardRepeatDetector::new(),
            pressed_modifier_flags: HashSet::new(),
            pressed_pointing_buttons: HashSet::new(),
            grabbable_state: GrabbableState::none(device_id),
        }
    }

    pub fn grabbable_state(&self) -> GrabbableState {
        self.grabbable_state
    }

    /// Overwrite the derived state with an authoritative one. The tracked
    /// key and button sets are left untouched.
    pub fn set_grabbable_state(&mut self, grabbable_state: GrabbableState) {
        self.grabbable_state = grabbable_state;
    }

    /// Apply one observed transition and re-derive the grabbable state.
    pub fn update(&mut self, device_id: DeviceId, timestamp: u64, event: &ObservedEvent) {
        let event_type = event.event_type;
        match event.code {
            EventCode::Key(key) => {
                self.keyboard_repeat_detector
                    .set(key.usage_page(), key.usage(), event_type);
                if let Some(flag) = key.modifier_flag() {
                    match event_type {
                        EventType::KeyDown => {
                            self.pressed_modifier_flags.insert(flag);
                        }
                        EventType::KeyUp => {
                            self.pressed_modifier_flags.remove(&flag);
                        }
                    }
                }
            }
            EventCode::ConsumerKey(key) => {
                self.keyboard_repeat_detector
                    .set(key.usage_page(), key.usage(), event_type);
            }
            EventCode::PointingButton(button) => match event_type {
                EventType::KeyDown => {
                    self.pressed_pointing_buttons.insert(button);
                }
                EventType::KeyUp => {
                    self.pressed_pointing_buttons.remove(&button);
                }
            },
        }

        self.update_grabbable_state(device_id, timestamp);
    }

    fn update_grabbable_state(&mut self, device_id: DeviceId, timestamp: u64) {
        let reason = if self.keyboard_repeat_detector.is_repeating() {
            UngrabbableTemporarilyReason::KeyRepeating
        } else if !self.pressed_modifier_flags.is_empty() {
            // A held physical modifier would leak into pointer events.
            UngrabbableTemporarilyReason::ModifierKeyPressed
        } else if !self.pressed_pointing_buttons.is_empty() {
            // The release of a pressed button could never be delivered.
            UngrabbableTemporarilyReason::PointingButtonPressed
        } else {
            UngrabbableTemporarilyReason::None
        };

        // A `None` reason yields a grabbable state.
        self.grabbable_state = GrabbableState::ungrabbable_temporarily(device_id, reason, timestamp);
    }
}
