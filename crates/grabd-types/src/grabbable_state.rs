//! Derived judgment of whether a device can be grabbed right now.

use thiserror::Error;

use crate::device::DeviceId;

/// A byte did not name any variant of the target enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid {kind} discriminant: {value}")]
pub struct InvalidDiscriminant {
    pub kind: &'static str,
    pub value: u8,
}

/// Grabbability of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    /// Nothing observed yet.
    None = 0,
    Grabbable = 1,
    UngrabbableTemporarily = 2,
    UngrabbablePermanently = 3,
}

impl TryFrom<u8> for State {
    type Error = InvalidDiscriminant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Grabbable),
            2 => Ok(Self::UngrabbableTemporarily),
            3 => Ok(Self::UngrabbablePermanently),
            _ => Err(InvalidDiscriminant {
                kind: "grabbable state",
                value,
            }),
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Grabbable => write!(f, "grabbable"),
            Self::UngrabbableTemporarily => write!(f, "ungrabbable_temporarily"),
            Self::UngrabbablePermanently => write!(f, "ungrabbable_permanently"),
        }
    }
}

/// Why a device is temporarily ungrabbable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UngrabbableTemporarilyReason {
    None = 0,
    KeyRepeating = 1,
    ModifierKeyPressed = 2,
    PointingButtonPressed = 3,
}

impl TryFrom<u8> for UngrabbableTemporarilyReason {
    type Error = InvalidDiscriminant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::KeyRepeating),
            2 => Ok(Self::ModifierKeyPressed),
            3 => Ok(Self::PointingButtonPressed),
            _ => Err(InvalidDiscriminant {
                kind: "ungrabbable reason",
                value,
            }),
        }
    }
}

impl std::fmt::Display for UngrabbableTemporarilyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::KeyRepeating => write!(f, "key_repeating"),
            Self::ModifierKeyPressed => write!(f, "modifier_key_pressed"),
            Self::PointingButtonPressed => write!(f, "pointing_button_pressed"),
        }
    }
}

/// Grabbable state of one device at one point in time.
///
/// `reason` is not `None` exactly when `state` is
/// [`State::UngrabbableTemporarily`]. The constructors keep that invariant;
/// [`GrabbableState::from_parts`] checks it for untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrabbableState {
    device_id: DeviceId,
    state: State,
    reason: UngrabbableTemporarilyReason,
    timestamp: u64,
}

impl GrabbableState {
    /// Initial state of a device nothing is known about.
    pub fn none(device_id: DeviceId) -> Self {
        Self {
            device_id,
            state: State::None,
            reason: UngrabbableTemporarilyReason::None,
            timestamp: 0,
        }
    }

    pub fn grabbable(device_id: DeviceId, timestamp: u64) -> Self {
        Self {
            device_id,
            state: State::Grabbable,
            reason: UngrabbableTemporarilyReason::None,
            timestamp,
        }
    }

    /// A `None` reason leaves nothing blocking the grab, so it yields a
    /// grabbable state.
    pub fn ungrabbable_temporarily(
        device_id: DeviceId,
        reason: UngrabbableTemporarilyReason,
        timestamp: u64,
    ) -> Self {
        if reason == UngrabbableTemporarilyReason::None {
            return Self::grabbable(device_id, timestamp);
        }
        Self {
            device_id,
            state: State::UngrabbableTemporarily,
            reason,
            timestamp,
        }
    }

    /// Rebuild a state from loose parts, rejecting combinations that break
    /// the reason/state invariant.
    pub fn from_parts(
        device_id: DeviceId,
        state: State,
        reason: UngrabbableTemporarilyReason,
        timestamp: u64,
    ) -> Option<Self> {
        let has_reason = reason != UngrabbableTemporarilyReason::None;
        if has_reason != (state == State::UngrabbableTemporarily) {
            return None;
        }
        Some(Self {
            device_id,
            state,
            reason,
            timestamp,
        })
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn reason(&self) -> UngrabbableTemporarilyReason {
        self.reason
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_grabbable(&self) -> bool {
        self.state == State::Grabbable
    }

    /// Same state and reason, ignoring the timestamp.
    pub fn same_judgment(&self, other: &Self) -> bool {
        self.device_id == other.device_id && self.state == other.state && self.reason == other.reason
    }
}

impl std::fmt::Display for GrabbableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason == UngrabbableTemporarilyReason::None {
            write!(f, "{}", self.state)
        } else {
            write!(f, "{}/{}", self.state, self.reason)
        }
    }
}
