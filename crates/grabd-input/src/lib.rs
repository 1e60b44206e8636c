//! Device grabber and input observer interfaces for grabd.
//!
//! The grabber core drives two kinds of collaborators through the traits
//! defined here:
//!
//! - a [`DeviceGrabber`], the lifecycle owner that claims exclusive access to
//!   input devices for one session and receives the session context;
//! - an [`InputObserver`], which watches devices without grabbing them and
//!   reports key and button transitions so that grabbable state can be
//!   derived.
//!
//! Device grabbers never decide on their own whether a device is safe to
//! grab; they ask a [`GrabbableStateQuery`] before every attempt.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use grabd_types::{
    CapturedEvent, DeviceId, GrabbableState, InputSourceIdentifiers, SystemPreferences,
};
use tokio::sync::mpsc;

pub mod error;
pub mod passive;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::InputError;
pub use passive::PassiveDeviceGrabber;

/// Read access to the process-wide grabbable-state registry.
pub trait GrabbableStateQuery: Send + Sync {
    /// Current state of a device, or `None` if nothing was recorded for it.
    /// Callers must treat `None` as not yet safe to grab.
    fn grabbable_state(&self, device_id: DeviceId) -> Option<GrabbableState>;

    /// Devices the registry has an entry for.
    fn known_devices(&self) -> Vec<DeviceId>;
}

/// Owner of device grabs for one session.
///
/// Dropping a grabber releases every device it holds.
pub trait DeviceGrabber: Send {
    /// Start grabbing against the given core configuration file.
    fn start(&mut self, core_configuration_file_path: &Path) -> Result<(), InputError>;

    fn set_system_preferences(&mut self, system_preferences: SystemPreferences);

    fn post_frontmost_application_changed_event(&mut self, bundle_identifier: &str, file_path: &str);

    fn post_input_source_changed_event(&mut self, input_source: InputSourceIdentifiers);
}

/// Builds a fresh [`DeviceGrabber`] whenever a session (re)starts.
pub trait DeviceGrabberFactory: Send {
    fn create(&mut self, query: Arc<dyn GrabbableStateQuery>) -> Box<dyn DeviceGrabber>;
}

impl<F> DeviceGrabberFactory for F
where
    F: FnMut(Arc<dyn GrabbableStateQuery>) -> Box<dyn DeviceGrabber> + Send,
{
    fn create(&mut self, query: Arc<dyn GrabbableStateQuery>) -> Box<dyn DeviceGrabber> {
        self(query)
    }
}

/// Something an observer saw happen on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A key or button transition.
    Input(CapturedEvent),
    /// The device went away; its state should be forgotten.
    Removed(DeviceId),
}

/// Watches input devices passively and forwards what they report.
#[async_trait]
pub trait InputObserver: Send + 'static {
    /// Start observing, sending events to `tx`.
    async fn start(&mut self, tx: mpsc::Sender<DeviceEvent>) -> Result<(), InputError>;

    /// Stop observing and release all resources.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}
