//! Device grabber that follows the session lifecycle without claiming devices.
//!
//! Used by the daemon binary when no platform grab backend is configured. It
//! validates the core configuration path, keeps the latest session context,
//! and reports which known devices would be grabbable right now.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grabd_types::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences};
use tracing::{debug, info};

use crate::error::InputError;
use crate::{DeviceGrabber, GrabbableStateQuery};

pub struct PassiveDeviceGrabber {
    query: Arc<dyn GrabbableStateQuery>,
    core_configuration_file_path: Option<PathBuf>,
    system_preferences: SystemPreferences,
    frontmost_application: Option<FrontmostApplication>,
    input_source: Option<InputSourceIdentifiers>,
}

impl PassiveDeviceGrabber {
    pub fn new(query: Arc<dyn GrabbableStateQuery>) -> Self {
        Self {
            query,
            core_configuration_file_path: None,
            system_preferences: SystemPreferences::default(),
            frontmost_application: None,
            input_source: None,
        }
    }

    pub fn core_configuration_file_path(&self) -> Option<&Path> {
        self.core_configuration_file_path.as_deref()
    }

    pub fn system_preferences(&self) -> SystemPreferences {
        self.system_preferences
    }

    pub fn frontmost_application(&self) -> Option<&FrontmostApplication> {
        self.frontmost_application.as_ref()
    }

    pub fn input_source(&self) -> Option<&InputSourceIdentifiers> {
        self.input_source.as_ref()
    }

    /// Number of known devices currently judged grabbable.
    pub fn grabbable_device_count(&self) -> usize {
        self.query
            .known_devices()
            .into_iter()
            .filter_map(|id| self.query.grabbable_state(id))
            .filter(grabd_types::GrabbableState::is_grabbable)
            .count()
    }
}

impl DeviceGrabber for PassiveDeviceGrabber {
    fn start(&mut self, core_configuration_file_path: &Path) -> Result<(), InputError> {
        std::fs::metadata(core_configuration_file_path).map_err(|source| {
            InputError::Configuration {
                path: core_configuration_file_path.to_path_buf(),
                source,
            }
        })?;

        self.core_configuration_file_path = Some(core_configuration_file_path.to_path_buf());
        info!(
            path = %core_configuration_file_path.display(),
            grabbable = self.grabbable_device_count(),
            "device grabber started"
        );
        Ok(())
    }

    fn set_system_preferences(&mut self, system_preferences: SystemPreferences) {
        debug!(?system_preferences, "system preferences updated");
        self.system_preferences = system_preferences;
    }

    fn post_frontmost_application_changed_event(&mut self, bundle_identifier: &str, file_path: &str) {
        debug!(bundle_identifier, file_path, "frontmost application changed");
        self.frontmost_application = Some(FrontmostApplication {
            bundle_identifier: bundle_identifier.to_string(),
            file_path: file_path.to_string(),
        });
    }

    fn post_input_source_changed_event(&mut self, input_source: InputSourceIdentifiers) {
        debug!(
            language = %input_source.language,
            input_source_id = %input_source.input_source_id,
            "input source changed"
        );
        self.input_source = Some(input_source);
    }
}

impl Drop for PassiveDeviceGrabber {
    fn drop(&mut self) {
        if let Some(path) = &self.core_configuration_file_path {
            info!(path = %path.display(), "device grabber stopped");
        }
    }
}
