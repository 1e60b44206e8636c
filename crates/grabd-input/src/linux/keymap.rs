//! Mapping from evdev key codes to HID-based observed events.

use evdev::KeyCode as EvdevKey;
use grabd_types::{ConsumerKeyCode, EventType, KeyCode, ObservedEvent, PointingButton};

/// Keys with no HID keyboard usage are reported above this base so they stay
/// distinct from every real usage.
pub const UNMAPPED_BASE: u16 = 0x1000;

/// Convert an evdev key value to an event type. Autorepeat (2) is dropped;
/// repeats are derived from held keys instead.
pub fn evdev_value_to_event_type(value: i32) -> Option<EventType> {
    match value {
        0 => Some(EventType::KeyUp),
        1 => Some(EventType::KeyDown),
        _ => None,
    }
}

/// Convert one evdev key transition into an [`ObservedEvent`].
pub fn evdev_key_to_event(key: EvdevKey, value: i32) -> Option<ObservedEvent> {
    let event_type = evdev_value_to_event_type(value)?;
    if let Some(button) = evdev_key_to_pointing_button(key) {
        return Some(ObservedEvent::button(button, event_type));
    }
    if let Some(consumer) = evdev_key_to_consumer_key(key) {
        return Some(ObservedEvent::consumer_key(consumer, event_type));
    }
    let code = evdev_key_to_keycode(key);
    Some(match event_type {
        EventType::KeyDown => ObservedEvent::key_down(code),
        EventType::KeyUp => ObservedEvent::key_up(code),
    })
}

pub fn evdev_key_to_pointing_button(key: EvdevKey) -> Option<PointingButton> {
    match key {
        EvdevKey::BTN_LEFT => Some(PointingButton::BUTTON1),
        EvdevKey::BTN_RIGHT => Some(PointingButton::BUTTON2),
        EvdevKey::BTN_MIDDLE => Some(PointingButton::BUTTON3),
        EvdevKey::BTN_SIDE => Some(PointingButton::BUTTON4),
        EvdevKey::BTN_EXTRA => Some(PointingButton::BUTTON5),
        _ => None,
    }
}

pub fn evdev_key_to_consumer_key(key: EvdevKey) -> Option<ConsumerKeyCode> {
    match key {
        EvdevKey::KEY_PLAYPAUSE => Some(ConsumerKeyCode::PLAY_OR_PAUSE),
        EvdevKey::KEY_MUTE => Some(ConsumerKeyCode::MUTE),
        EvdevKey::KEY_VOLUMEUP => Some(ConsumerKeyCode::VOLUME_INCREMENT),
        EvdevKey::KEY_VOLUMEDOWN => Some(ConsumerKeyCode::VOLUME_DECREMENT),
        _ => None,
    }
}

/// Convert an evdev key to its keyboard/keypad page usage.
#[allow(clippy::too_many_lines)]
pub fn evdev_key_to_keycode(key: EvdevKey) -> KeyCode {
    let usage = match key {
        // Letters
        EvdevKey::KEY_A => 0x04,
        EvdevKey::KEY_B => 0x05,
        EvdevKey::KEY_C => 0x06,
        EvdevKey::KEY_D => 0x07,
        EvdevKey::KEY_E => 0x08,
        EvdevKey::KEY_F => 0x09,
        EvdevKey::KEY_G => 0x0A,
        EvdevKey::KEY_H => 0x0B,
        EvdevKey::KEY_I => 0x0C,
        EvdevKey::KEY_J => 0x0D,
        EvdevKey::KEY_K => 0x0E,
        EvdevKey::KEY_L => 0x0F,
        EvdevKey::KEY_M => 0x10,
        EvdevKey::KEY_N => 0x11,
        EvdevKey::KEY_O => 0x12,
        EvdevKey::KEY_P => 0x13,
        EvdevKey::KEY_Q => 0x14,
        EvdevKey::KEY_R => 0x15,
        EvdevKey::KEY_S => 0x16,
        EvdevKey::KEY_T => 0x17,
        EvdevKey::KEY_U => 0x18,
        EvdevKey::KEY_V => 0x19,
        EvdevKey::KEY_W => 0x1A,
        EvdevKey::KEY_X => 0x1B,
        EvdevKey::KEY_Y => 0x1C,
        EvdevKey::KEY_Z => 0x1D,

        // Numbers
        EvdevKey::KEY_1 => 0x1E,
        EvdevKey::KEY_2 => 0x1F,
        EvdevKey::KEY_3 => 0x20,
        EvdevKey::KEY_4 => 0x21,
        EvdevKey::KEY_5 => 0x22,
        EvdevKey::KEY_6 => 0x23,
        EvdevKey::KEY_7 => 0x24,
        EvdevKey::KEY_8 => 0x25,
        EvdevKey::KEY_9 => 0x26,
        EvdevKey::KEY_0 => 0x27,

        // Editing and whitespace
        EvdevKey::KEY_ENTER => 0x28,
        EvdevKey::KEY_ESC => 0x29,
        EvdevKey::KEY_BACKSPACE => 0x2A,
        EvdevKey::KEY_TAB => 0x2B,
        EvdevKey::KEY_SPACE => 0x2C,

        // Punctuation
        EvdevKey::KEY_MINUS => 0x2D,
        EvdevKey::KEY_EQUAL => 0x2E,
        EvdevKey::KEY_LEFTBRACE => 0x2F,
        EvdevKey::KEY_RIGHTBRACE => 0x30,
        EvdevKey::KEY_BACKSLASH => 0x31,
        EvdevKey::KEY_SEMICOLON => 0x33,
        EvdevKey::KEY_APOSTROPHE => 0x34,
        EvdevKey::KEY_GRAVE => 0x35,
        EvdevKey::KEY_COMMA => 0x36,
        EvdevKey::KEY_DOT => 0x37,
        EvdevKey::KEY_SLASH => 0x38,
        EvdevKey::KEY_CAPSLOCK => 0x39,

        // Function keys
        EvdevKey::KEY_F1 => 0x3A,
        EvdevKey::KEY_F2 => 0x3B,
        EvdevKey::KEY_F3 => 0x3C,
        EvdevKey::KEY_F4 => 0x3D,
        EvdevKey::KEY_F5 => 0x3E,
        EvdevKey::KEY_F6 => 0x3F,
        EvdevKey::KEY_F7 => 0x40,
        EvdevKey::KEY_F8 => 0x41,
        EvdevKey::KEY_F9 => 0x42,
        EvdevKey::KEY_F10 => 0x43,
        EvdevKey::KEY_F11 => 0x44,
        EvdevKey::KEY_F12 => 0x45,

        // Navigation
        EvdevKey::KEY_SYSRQ => 0x46,
        EvdevKey::KEY_SCROLLLOCK => 0x47,
        EvdevKey::KEY_PAUSE => 0x48,
        EvdevKey::KEY_INSERT => 0x49,
        EvdevKey::KEY_HOME => 0x4A,
        EvdevKey::KEY_PAGEUP => 0x4B,
        EvdevKey::KEY_DELETE => 0x4C,
        EvdevKey::KEY_END => 0x4D,
        EvdevKey::KEY_PAGEDOWN => 0x4E,
        EvdevKey::KEY_RIGHT => 0x4F,
        EvdevKey::KEY_LEFT => 0x50,
        EvdevKey::KEY_DOWN => 0x51,
        EvdevKey::KEY_UP => 0x52,

        // Keypad
        EvdevKey::KEY_NUMLOCK => 0x53,
        EvdevKey::KEY_KPSLASH => 0x54,
        EvdevKey::KEY_KPASTERISK => 0x55,
        EvdevKey::KEY_KPMINUS => 0x56,
        EvdevKey::KEY_KPPLUS => 0x57,
        EvdevKey::KEY_KPENTER => 0x58,
        EvdevKey::KEY_KP1 => 0x59,
        EvdevKey::KEY_KP2 => 0x5A,
        EvdevKey::KEY_KP3 => 0x5B,
        EvdevKey::KEY_KP4 => 0x5C,
        EvdevKey::KEY_KP5 => 0x5D,
        EvdevKey::KEY_KP6 => 0x5E,
        EvdevKey::KEY_KP7 => 0x5F,
        EvdevKey::KEY_KP8 => 0x60,
        EvdevKey::KEY_KP9 => 0x61,
        EvdevKey::KEY_KP0 => 0x62,
        EvdevKey::KEY_KPDOT => 0x63,

        // Modifiers
        EvdevKey::KEY_LEFTCTRL => return KeyCode::LEFT_CONTROL,
        EvdevKey::KEY_LEFTSHIFT => return KeyCode::LEFT_SHIFT,
        EvdevKey::KEY_LEFTALT => return KeyCode::LEFT_OPTION,
        EvdevKey::KEY_LEFTMETA => return KeyCode::LEFT_COMMAND,
        EvdevKey::KEY_RIGHTCTRL => return KeyCode::RIGHT_CONTROL,
        EvdevKey::KEY_RIGHTSHIFT => return KeyCode::RIGHT_SHIFT,
        EvdevKey::KEY_RIGHTALT => return KeyCode::RIGHT_OPTION,
        EvdevKey::KEY_RIGHTMETA => return KeyCode::RIGHT_COMMAND,

        other => UNMAPPED_BASE.saturating_add(other.0),
    };
    KeyCode(usage)
}
