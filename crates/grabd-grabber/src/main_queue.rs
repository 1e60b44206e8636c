//! Serialized execution context owning the device grabber.
//!
//! Every change to the grabber, the process monitor and the registry
//! overrides runs here, one event at a time, in arrival order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use grabd_input::{DeviceGrabber, DeviceGrabberFactory, GrabbableStateQuery};
use grabd_protocol::Operation;
use grabd_types::{GrabbableState, InputSourceIdentifiers, SystemPreferences};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::GrabberError;
use crate::grabbable_state::GrabbableStateQueuesManager;
use crate::process_monitor::ProcessMonitor;

/// Events processed by the main queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainEvent {
    /// An authoritative grabbable state for one device.
    GrabbableStateChanged(GrabbableState),
    /// A console user session attached.
    Connect {
        pid: i32,
        user_core_configuration_file_path: PathBuf,
    },
    /// The monitored session process went away.
    ConsoleUserServerExited { pid: i32 },
    SystemPreferencesUpdated(SystemPreferences),
    FrontmostApplicationChanged {
        bundle_identifier: String,
        file_path: String,
    },
    InputSourceChanged(InputSourceIdentifiers),
    /// Start a grabber against the system configuration if it exists.
    StartSystemGrabber,
    /// Drop the process monitor, then the grabber.
    Teardown,
    /// Stop the queue after everything sent before it.
    Stop,
}

impl From<Operation> for MainEvent {
    fn from(op: Operation) -> Self {
        match op {
            Operation::GrabbableStateChanged(state) => Self::GrabbableStateChanged(state),
            Operation::Connect {
                pid,
                user_core_configuration_file_path,
            } => Self::Connect {
                pid,
                user_core_configuration_file_path: PathBuf::from(user_core_configuration_file_path),
            },
            Operation::SystemPreferencesUpdated(prefs) => Self::SystemPreferencesUpdated(prefs),
            Operation::FrontmostApplicationChanged {
                bundle_identifier,
                file_path,
            } => Self::FrontmostApplicationChanged {
                bundle_identifier,
                file_path,
            },
            Operation::InputSourceChanged(input_source) => Self::InputSourceChanged(input_source),
        }
    }
}

/// Everything the main queue owns.
pub struct GrabberState {
    manager: Arc<GrabbableStateQueuesManager>,
    factory: Box<dyn DeviceGrabberFactory>,
    device_grabber: Option<Box<dyn DeviceGrabber>>,
    process_monitor: Option<ProcessMonitor>,
    system_core_configuration_file_path: PathBuf,
    process_poll_interval: Duration,
}

impl GrabberState {
    pub fn new(
        manager: Arc<GrabbableStateQueuesManager>,
        factory: Box<dyn DeviceGrabberFactory>,
        system_core_configuration_file_path: PathBuf,
        process_poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            factory,
            device_grabber: None,
            process_monitor: None,
            system_core_configuration_file_path,
            process_poll_interval,
        }
    }

    fn apply(&mut self, event: MainEvent, queue: &MainQueueHandle) {
        match event {
            MainEvent::GrabbableStateChanged(state) => {
                self.manager.update_grabbable_state(state);
            }
            MainEvent::Connect {
                pid,
                user_core_configuration_file_path,
            } => {
                info!(pid, path = %user_core_configuration_file_path.display(), "console user server connected");
                self.stop_device_grabber();
                self.start_device_grabber(&user_core_configuration_file_path);

                self.process_monitor = None;
                let exit_queue = queue.clone();
                match ProcessMonitor::new(pid, self.process_poll_interval, move || {
                    if exit_queue
                        .post(MainEvent::ConsoleUserServerExited { pid })
                        .is_err()
                    {
                        debug!(pid, "main queue gone before process exit was reported");
                    }
                }) {
                    Ok(monitor) => self.process_monitor = Some(monitor),
                    Err(e) => warn!(pid, error = %e, "failed to monitor console user server"),
                }
            }
            MainEvent::ConsoleUserServerExited { pid } => {
                if self.process_monitor.as_ref().map(ProcessMonitor::pid) != Some(pid) {
                    debug!(pid, "ignoring exit of a process no longer monitored");
                    return;
                }
                info!(pid, "console user server exited");
                self.process_monitor = None;
                self.stop_device_grabber();
                self.start_system_device_grabber();
            }
            MainEvent::SystemPreferencesUpdated(prefs) => {
                if let Some(grabber) = &mut self.device_grabber {
                    grabber.set_system_preferences(prefs);
                }
            }
            MainEvent::FrontmostApplicationChanged {
                bundle_identifier,
                file_path,
            } => {
                if let Some(grabber) = &mut self.device_grabber {
                    grabber.post_frontmost_application_changed_event(&bundle_identifier, &file_path);
                }
            }
            MainEvent::InputSourceChanged(input_source) => {
                if let Some(grabber) = &mut self.device_grabber {
                    grabber.post_input_source_changed_event(input_source);
                }
            }
            MainEvent::StartSystemGrabber => self.start_system_device_grabber(),
            MainEvent::Teardown => {
                self.process_monitor = None;
                self.stop_device_grabber();
            }
            MainEvent::Stop => {}
        }
    }

    fn start_device_grabber(&mut self, core_configuration_file_path: &Path) {
        let query: Arc<dyn GrabbableStateQuery> = self.manager.clone();
        let mut grabber = self.factory.create(query);
        // A grabber that failed to start holds no devices; keep it so later
        // notifications still reach it.
        if let Err(e) = grabber.start(core_configuration_file_path) {
            warn!(path = %core_configuration_file_path.display(), error = %e, "device grabber failed to start");
        }
        self.device_grabber = Some(grabber);
    }

    fn start_system_device_grabber(&mut self) {
        if self.system_core_configuration_file_path.exists() {
            let path = self.system_core_configuration_file_path.clone();
            info!(path = %path.display(), "starting device grabber with system configuration");
            self.start_device_grabber(&path);
        }
    }

    fn stop_device_grabber(&mut self) {
        if self.device_grabber.take().is_some() {
            debug!("device grabber dropped");
        }
    }
}

struct Envelope {
    event: MainEvent,
    done: Option<oneshot::Sender<()>>,
}

/// Clonable sender into the main queue.
#[derive(Clone)]
pub struct MainQueueHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl MainQueueHandle {
    /// Run `event` on the main queue and block until it has been applied.
    ///
    /// Must not be called from the main queue itself or from inside an async
    /// runtime.
    pub fn dispatch_sync(&self, event: MainEvent) -> Result<(), GrabberError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                event,
                done: Some(done_tx),
            })
            .map_err(|_| GrabberError::MainQueueClosed)?;
        done_rx
            .blocking_recv()
            .map_err(|_| GrabberError::MainQueueClosed)
    }

    /// Queue `event` without waiting for it.
    pub fn post(&self, event: MainEvent) -> Result<(), GrabberError> {
        self.tx
            .send(Envelope { event, done: None })
            .map_err(|_| GrabberError::MainQueueClosed)
    }
}

/// The thread behind [`MainQueueHandle`].
pub struct MainQueue {
    handle: MainQueueHandle,
    thread: Option<JoinHandle<()>>,
}

impl MainQueue {
    pub fn start(mut state: GrabberState) -> Result<Self, GrabberError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let handle = MainQueueHandle { tx };
        let queue = handle.clone();

        let thread = thread::Builder::new()
            .name("grabd-main-queue".to_string())
            .spawn(move || {
                while let Some(Envelope { event, done }) = rx.blocking_recv() {
                    let stop = matches!(event, MainEvent::Stop);
                    state.apply(event, &queue);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    if stop {
                        break;
                    }
                }
                // Monitor before grabber, as in an explicit teardown.
                state.apply(MainEvent::Teardown, &queue);
                debug!("main queue stopped");
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> MainQueueHandle {
        self.handle.clone()
    }

    /// Drain everything queued so far, then stop and join the thread.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.handle.post(MainEvent::Stop).is_err() {
            debug!("main queue already closed");
        }
        if thread.join().is_err() {
            error!("main queue thread panicked");
        }
    }
}

impl Drop for MainQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_monitor::{Lifecycle, LIFECYCLE};
    use grabd_input::mock::{GrabberCall, MockDeviceGrabberFactory, MockGrabberHandle};
    use grabd_types::DeviceId;
    use std::process::{Child, Command, Stdio};

    fn start_queue(system_path: PathBuf) -> (MainQueue, MockGrabberHandle, Arc<GrabbableStateQueuesManager>) {
        let manager = Arc::new(GrabbableStateQueuesManager::new());
        let factory = MockDeviceGrabberFactory::new();
        let grabbers = factory.handle();
        let state = GrabberState::new(
            Arc::clone(&manager),
            Box::new(factory),
            system_path,
            Duration::from_millis(10),
        );
        (MainQueue::start(state).unwrap(), grabbers, manager)
    }

    fn own_pid() -> i32 {
        i32::try_from(std::process::id()).unwrap()
    }

    fn spawn_session_process() -> (Child, i32) {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = i32::try_from(child.id()).unwrap();
        (child, pid)
    }

    fn connect(pid: i32, path: &str) -> MainEvent {
        MainEvent::Connect {
            pid,
            user_core_configuration_file_path: PathBuf::from(path),
        }
    }

    /// Lifecycle entries for `pids` only; other tests arm monitors too.
    fn monitor_lifecycle(pids: &[i32]) -> Vec<Lifecycle> {
        LIFECYCLE
            .lock()
            .iter()
            .copied()
            .filter(|event| match event {
                Lifecycle::Armed(pid) | Lifecycle::Dropped(pid) => pids.contains(pid),
            })
            .collect()
    }

    #[test]
    fn notifications_without_grabber_are_ignored() {
        let (queue, grabbers, _) = start_queue(PathBuf::from("/nonexistent/core.json"));
        let handle = queue.handle();
        handle
            .dispatch_sync(MainEvent::SystemPreferencesUpdated(SystemPreferences::default()))
            .unwrap();
        handle.dispatch_sync(MainEvent::StartSystemGrabber).unwrap();
        assert!(grabbers.calls().is_empty());
    }

    #[test]
    fn state_overrides_reach_the_registry() {
        let (queue, _, manager) = start_queue(PathBuf::from("/nonexistent/core.json"));
        let state = GrabbableState::grabbable(DeviceId(3), 9);
        queue
            .handle()
            .dispatch_sync(MainEvent::GrabbableStateChanged(state))
            .unwrap();
        assert_eq!(manager.grabbable_state(DeviceId(3)), Some(state));
    }

    #[test]
    fn stale_exit_is_ignored() {
        let (queue, grabbers, _) = start_queue(PathBuf::from("/nonexistent/core.json"));
        let handle = queue.handle();
        handle
            .dispatch_sync(MainEvent::Connect {
                pid: own_pid(),
                user_core_configuration_file_path: PathBuf::from("/tmp/user.json"),
            })
            .unwrap();
        handle
            .dispatch_sync(MainEvent::ConsoleUserServerExited { pid: own_pid() + 1 })
            .unwrap();
        assert_eq!(grabbers.live_grabbers(), vec![1]);
    }

    #[test]
    fn reconnect_drops_old_monitor_before_arming_new_one() {
        let (mut first, first_pid) = spawn_session_process();
        let (mut second, second_pid) = spawn_session_process();
        let (mut queue, grabbers, _) = start_queue(PathBuf::from("/nonexistent/core.json"));
        let handle = queue.handle();

        handle.dispatch_sync(connect(first_pid, "/first.json")).unwrap();
        handle.dispatch_sync(connect(second_pid, "/second.json")).unwrap();

        assert_eq!(
            monitor_lifecycle(&[first_pid, second_pid]),
            vec![
                Lifecycle::Armed(first_pid),
                Lifecycle::Dropped(first_pid),
                Lifecycle::Armed(second_pid),
            ]
        );
        assert_eq!(grabbers.live_grabbers(), vec![2]);

        queue.stop();
        assert_eq!(
            monitor_lifecycle(&[first_pid, second_pid]),
            vec![
                Lifecycle::Armed(first_pid),
                Lifecycle::Dropped(first_pid),
                Lifecycle::Armed(second_pid),
                Lifecycle::Dropped(second_pid),
            ]
        );

        for child in [&mut first, &mut second] {
            child.kill().unwrap();
            child.wait().unwrap();
        }
    }

    #[test]
    fn stop_tears_down_grabber() {
        let (mut queue, grabbers, _) = start_queue(PathBuf::from("/nonexistent/core.json"));
        let handle = queue.handle();
        handle
            .dispatch_sync(MainEvent::Connect {
                pid: own_pid(),
                user_core_configuration_file_path: PathBuf::from("/tmp/user.json"),
            })
            .unwrap();
        queue.stop();

        assert!(grabbers.live_grabbers().is_empty());
        assert_eq!(grabbers.calls().last(), Some(&GrabberCall::Dropped(1)));
        assert!(matches!(
            handle.dispatch_sync(MainEvent::StartSystemGrabber),
            Err(GrabberError::MainQueueClosed)
        ));
    }
}
