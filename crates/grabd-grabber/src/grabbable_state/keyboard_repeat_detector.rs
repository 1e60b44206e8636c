use grabd_types::{EventType, HidUsage, HidUsagePage, KeyCode};

/// Tracks whether the most recently pressed key is still held, which is when
/// the OS would be generating autorepeat for it.
///
/// Modifier keys do not autorepeat and are never tracked.
#[derive(Debug, Default)]
pub struct KeyboardRepeatDetector {
    key: Option<(HidUsagePage, HidUsage)>,
}

impl KeyboardRepeatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, usage_page: HidUsagePage, usage: HidUsage, event_type: EventType) {
        if usage_page == HidUsagePage::KEYBOARD_OR_KEYPAD
            && KeyCode(usage.0).modifier_flag().is_some()
        {
            return;
        }
        match event_type {
            EventType::KeyDown => self.key = Some((usage_page, usage)),
            EventType::KeyUp => {
                if self.key == Some((usage_page, usage)) {
                    self.key = None;
                }
            }
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.key.is_some()
    }
}
