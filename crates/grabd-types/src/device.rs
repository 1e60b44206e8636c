//! Device identity.

/// Opaque ID for a physical input device.
///
/// Stable for as long as the device stays attached. The evdev observer uses
/// the `N` of `/dev/input/eventN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
