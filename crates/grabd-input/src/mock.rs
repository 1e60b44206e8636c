//! Mock backends for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use grabd_types::{DeviceId, GrabbableState, InputSourceIdentifiers, SystemPreferences};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::InputError;
use crate::{DeviceEvent, DeviceGrabber, DeviceGrabberFactory, GrabbableStateQuery, InputObserver};

// ---------------------------------------------------------------------------
// MockDeviceGrabber
// ---------------------------------------------------------------------------

/// One recorded interaction with a mock grabber, tagged with the instance
/// number the factory gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabberCall {
    Created(usize),
    Started(usize, PathBuf),
    SystemPreferences(usize, SystemPreferences),
    FrontmostApplication {
        grabber: usize,
        bundle_identifier: String,
        file_path: String,
    },
    InputSource(usize, InputSourceIdentifiers),
    Dropped(usize),
}

#[derive(Debug, Default)]
struct MockGrabberLog {
    calls: Vec<GrabberCall>,
    next_id: usize,
    fail_start: bool,
}

/// Factory producing [`MockDeviceGrabber`]s that all record into one log.
pub struct MockDeviceGrabberFactory {
    log: Arc<Mutex<MockGrabberLog>>,
}

impl Default for MockDeviceGrabberFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeviceGrabberFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MockGrabberLog::default())),
        }
    }

    /// Get a clonable handle for observing grabber activity from tests.
    pub fn handle(&self) -> MockGrabberHandle {
        MockGrabberHandle {
            log: Arc::clone(&self.log),
        }
    }
}

impl DeviceGrabberFactory for MockDeviceGrabberFactory {
    fn create(&mut self, _query: Arc<dyn GrabbableStateQuery>) -> Box<dyn DeviceGrabber> {
        let mut log = self.log.lock();
        log.next_id += 1;
        let id = log.next_id;
        log.calls.push(GrabberCall::Created(id));
        Box::new(MockDeviceGrabber {
            id,
            log: Arc::clone(&self.log),
        })
    }
}

/// Clonable observer handle for mock grabbers.
#[derive(Clone)]
pub struct MockGrabberHandle {
    log: Arc<Mutex<MockGrabberLog>>,
}

impl MockGrabberHandle {
    /// Snapshot of every recorded call, in order.
    pub fn calls(&self) -> Vec<GrabberCall> {
        self.log.lock().calls.clone()
    }

    /// Instances created and not yet dropped.
    pub fn live_grabbers(&self) -> Vec<usize> {
        let mut live: HashMap<usize, bool> = HashMap::new();
        for call in &self.log.lock().calls {
            match call {
                GrabberCall::Created(id) => {
                    live.insert(*id, true);
                }
                GrabberCall::Dropped(id) => {
                    live.insert(*id, false);
                }
                _ => {}
            }
        }
        let mut ids: Vec<usize> = live
            .into_iter()
            .filter_map(|(id, alive)| alive.then_some(id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Paths passed to `start`, in order.
    pub fn started_paths(&self) -> Vec<PathBuf> {
        self.log
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GrabberCall::Started(_, path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make subsequent `start` calls fail.
    pub fn fail_start(&self, fail: bool) {
        self.log.lock().fail_start = fail;
    }
}

/// Device grabber that records what it is asked to do.
pub struct MockDeviceGrabber {
    id: usize,
    log: Arc<Mutex<MockGrabberLog>>,
}

impl DeviceGrabber for MockDeviceGrabber {
    fn start(&mut self, core_configuration_file_path: &Path) -> Result<(), InputError> {
        let mut log = self.log.lock();
        log.calls.push(GrabberCall::Started(
            self.id,
            core_configuration_file_path.to_path_buf(),
        ));
        if log.fail_start {
            return Err(InputError::Other(anyhow::anyhow!("mock start failure")));
        }
        Ok(())
    }

    fn set_system_preferences(&mut self, system_preferences: SystemPreferences) {
        self.log
            .lock()
            .calls
            .push(GrabberCall::SystemPreferences(self.id, system_preferences));
    }

    fn post_frontmost_application_changed_event(&mut self, bundle_identifier: &str, file_path: &str) {
        self.log.lock().calls.push(GrabberCall::FrontmostApplication {
            grabber: self.id,
            bundle_identifier: bundle_identifier.to_string(),
            file_path: file_path.to_string(),
        });
    }

    fn post_input_source_changed_event(&mut self, input_source: InputSourceIdentifiers) {
        self.log
            .lock()
            .calls
            .push(GrabberCall::InputSource(self.id, input_source));
    }
}

impl Drop for MockDeviceGrabber {
    fn drop(&mut self) {
        self.log.lock().calls.push(GrabberCall::Dropped(self.id));
    }
}

// ---------------------------------------------------------------------------
// StaticStateQuery
// ---------------------------------------------------------------------------

/// Fixed registry contents for grabber tests.
pub struct StaticStateQuery {
    states: HashMap<DeviceId, GrabbableState>,
}

impl StaticStateQuery {
    pub fn new(states: Vec<GrabbableState>) -> Self {
        Self {
            states: states.into_iter().map(|s| (s.device_id(), s)).collect(),
        }
    }
}

impl GrabbableStateQuery for StaticStateQuery {
    fn grabbable_state(&self, device_id: DeviceId) -> Option<GrabbableState> {
        self.states.get(&device_id).copied()
    }

    fn known_devices(&self) -> Vec<DeviceId> {
        self.states.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// MockObserver
// ---------------------------------------------------------------------------

/// Mock input observer.
///
/// Returns a `mpsc::Sender<DeviceEvent>` that tests use to inject events.
/// When `start()` is called, it spawns a task that forwards injected events
/// to the observer channel.
pub struct MockObserver {
    feed_rx: Option<mpsc::Receiver<DeviceEvent>>,
    shutdown: Arc<AtomicBool>,
}

impl MockObserver {
    /// Create a new mock observer and a sender for injecting events.
    pub fn new() -> (Self, mpsc::Sender<DeviceEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(1024);
        let observer = Self {
            feed_rx: Some(feed_rx),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        (observer, feed_tx)
    }
}

#[async_trait]
impl InputObserver for MockObserver {
    async fn start(&mut self, tx: mpsc::Sender<DeviceEvent>) -> Result<(), InputError> {
        let mut feed_rx = self.feed_rx.take().ok_or(InputError::AlreadyStarted)?;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }
}
