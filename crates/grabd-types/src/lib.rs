//! Shared types for grabd.
//!
//! This crate contains the value types shared across the grabd workspace:
//! device identity, observed key and pointing-button events, the derived
//! grabbable state, and the session context forwarded to device grabbers.

pub mod device;
pub mod event;
pub mod grabbable_state;
pub mod preferences;

pub use device::DeviceId;
pub use event::{
    CapturedEvent, ConsumerKeyCode, EventCode, EventType, HidUsage, HidUsagePage, KeyCode,
    ModifierFlag, ObservedEvent, PointingButton,
};
pub use grabbable_state::{GrabbableState, InvalidDiscriminant, State, UngrabbableTemporarilyReason};
pub use preferences::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences};
