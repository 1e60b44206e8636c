//! Observed input event types.
//!
//! Key codes are USB HID usages so that every platform backend reports the
//! same identity for the same physical key.

use crate::device::DeviceId;

/// HID usage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidUsagePage(pub u16);

impl HidUsagePage {
    pub const KEYBOARD_OR_KEYPAD: Self = Self(0x07);
    pub const CONSUMER: Self = Self(0x0C);
}

/// HID usage within a usage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidUsage(pub u16);

/// Whether a key or button went down or came back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    KeyDown,
    KeyUp,
}

/// Keyboard key, as a usage on the keyboard/keypad page (0x07).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const A: Self = Self(0x04);
    pub const Z: Self = Self(0x1D);
    pub const RETURN_OR_ENTER: Self = Self(0x28);
    pub const ESCAPE: Self = Self(0x29);
    pub const SPACEBAR: Self = Self(0x2C);
    pub const CAPS_LOCK: Self = Self(0x39);
    pub const LEFT_CONTROL: Self = Self(0xE0);
    pub const LEFT_SHIFT: Self = Self(0xE1);
    pub const LEFT_OPTION: Self = Self(0xE2);
    pub const LEFT_COMMAND: Self = Self(0xE3);
    pub const RIGHT_CONTROL: Self = Self(0xE4);
    pub const RIGHT_SHIFT: Self = Self(0xE5);
    pub const RIGHT_OPTION: Self = Self(0xE6);
    pub const RIGHT_COMMAND: Self = Self(0xE7);

    pub fn usage_page(self) -> HidUsagePage {
        HidUsagePage::KEYBOARD_OR_KEYPAD
    }

    pub fn usage(self) -> HidUsage {
        HidUsage(self.0)
    }

    /// The modifier flag this key sets while held, if any.
    pub fn modifier_flag(self) -> Option<ModifierFlag> {
        match self {
            Self::CAPS_LOCK => Some(ModifierFlag::CapsLock),
            Self::LEFT_CONTROL => Some(ModifierFlag::LeftControl),
            Self::LEFT_SHIFT => Some(ModifierFlag::LeftShift),
            Self::LEFT_OPTION => Some(ModifierFlag::LeftOption),
            Self::LEFT_COMMAND => Some(ModifierFlag::LeftCommand),
            Self::RIGHT_CONTROL => Some(ModifierFlag::RightControl),
            Self::RIGHT_SHIFT => Some(ModifierFlag::RightShift),
            Self::RIGHT_OPTION => Some(ModifierFlag::RightOption),
            Self::RIGHT_COMMAND => Some(ModifierFlag::RightCommand),
            _ => None,
        }
    }
}

/// Consumer-control key (media keys), as a usage on the consumer page (0x0C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerKeyCode(pub u16);

impl ConsumerKeyCode {
    pub const PLAY_OR_PAUSE: Self = Self(0xCD);
    pub const MUTE: Self = Self(0xE2);
    pub const VOLUME_INCREMENT: Self = Self(0xE9);
    pub const VOLUME_DECREMENT: Self = Self(0xEA);

    pub fn usage_page(self) -> HidUsagePage {
        HidUsagePage::CONSUMER
    }

    pub fn usage(self) -> HidUsage {
        HidUsage(self.0)
    }
}

/// Pointing-device button, numbered from 1 like the HID button page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointingButton(pub u16);

impl PointingButton {
    pub const BUTTON1: Self = Self(1);
    pub const BUTTON2: Self = Self(2);
    pub const BUTTON3: Self = Self(3);
    pub const BUTTON4: Self = Self(4);
    pub const BUTTON5: Self = Self(5);
}

/// Modifier classification of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierFlag {
    CapsLock,
    LeftControl,
    LeftShift,
    LeftOption,
    LeftCommand,
    RightControl,
    RightShift,
    RightOption,
    RightCommand,
}

/// What an observed event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Key(KeyCode),
    ConsumerKey(ConsumerKeyCode),
    PointingButton(PointingButton),
}

/// A key or button transition seen on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservedEvent {
    pub event_type: EventType,
    pub code: EventCode,
}

impl ObservedEvent {
    pub fn key_down(key: KeyCode) -> Self {
        Self {
            event_type: EventType::KeyDown,
            code: EventCode::Key(key),
        }
    }

    pub fn key_up(key: KeyCode) -> Self {
        Self {
            event_type: EventType::KeyUp,
            code: EventCode::Key(key),
        }
    }

    pub fn consumer_key(key: ConsumerKeyCode, event_type: EventType) -> Self {
        Self {
            event_type,
            code: EventCode::ConsumerKey(key),
        }
    }

    pub fn button(button: PointingButton, event_type: EventType) -> Self {
        Self {
            event_type,
            code: EventCode::PointingButton(button),
        }
    }
}

/// An observed event with its source device and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Which device produced this event.
    pub device_id: DeviceId,
    /// Monotonic event time in microseconds.
    pub timestamp: u64,
    /// The event itself.
    pub event: ObservedEvent,
}
