//! IPC receiver: the privileged endpoint that session processes and the
//! input observer talk to.
//!
//! A dedicated thread receives datagrams, decodes them, and hands each
//! decoded operation to the main queue, waiting for it to be applied before
//! receiving the next one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use grabd_input::DeviceGrabberFactory;
use grabd_protocol::{remove_socket_file, wire, LocalDatagramServer, ProtocolError};
use tracing::{debug, error, info, trace, warn};

use crate::config::GrabberConfig;
use crate::error::GrabberError;
use crate::grabbable_state::GrabbableStateQueuesManager;
use crate::main_queue::{GrabberState, MainEvent, MainQueue, MainQueueHandle};
use crate::session;

/// Pause after a failed receive so a broken socket does not spin.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct Receiver {
    socket_path: PathBuf,
    exit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    main_queue: Option<MainQueue>,
}

impl Receiver {
    /// Bind the socket, start the main queue and the receive thread.
    ///
    /// If the system core configuration exists, a device grabber is already
    /// running against it when this returns.
    pub fn start(
        config: &GrabberConfig,
        manager: Arc<GrabbableStateQueuesManager>,
        factory: Box<dyn DeviceGrabberFactory>,
    ) -> Result<Self, GrabberError> {
        let server = LocalDatagramServer::bind(&config.socket_path, config.receive_timeout())?;
        let socket_path = server.path().to_path_buf();

        match Self::spawn(server, config, manager, factory) {
            Ok((main_queue, thread, exit)) => {
                info!(path = %socket_path.display(), "receiver started");
                Ok(Self {
                    socket_path,
                    exit,
                    thread: Some(thread),
                    main_queue: Some(main_queue),
                })
            }
            Err(e) => {
                if let Err(unlink) = remove_socket_file(&socket_path) {
                    warn!(path = %socket_path.display(), error = %unlink, "failed to remove socket file");
                }
                Err(e)
            }
        }
    }

    fn spawn(
        server: LocalDatagramServer,
        config: &GrabberConfig,
        manager: Arc<GrabbableStateQueuesManager>,
        factory: Box<dyn DeviceGrabberFactory>,
    ) -> Result<(MainQueue, JoinHandle<()>, Arc<AtomicBool>), GrabberError> {
        server.restrict_access(session::current_console_user_id(&config.console_device_path))?;

        let main_queue = MainQueue::start(GrabberState::new(
            Arc::clone(&manager),
            factory,
            config.system_core_configuration_file_path.clone(),
            config.process_poll_interval(),
        ))?;
        let queue = main_queue.handle();
        queue.dispatch_sync(MainEvent::StartSystemGrabber)?;

        let exit = Arc::new(AtomicBool::new(false));
        let worker_exit = Arc::clone(&exit);
        let buffer_size = config.receive_buffer_size;
        let thread = thread::Builder::new()
            .name("grabd-receiver".to_string())
            .spawn(move || {
                worker(
                    |buf| server.receive(buf),
                    &manager,
                    &queue,
                    &worker_exit,
                    buffer_size,
                );
            })?;

        Ok((main_queue, thread, exit))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Handle for queueing work onto the main queue.
    pub fn main_queue(&self) -> Option<MainQueueHandle> {
        self.main_queue.as_ref().map(MainQueue::handle)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        if let Err(e) = remove_socket_file(&self.socket_path) {
            warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket file");
        }
        self.exit.store(true, Ordering::SeqCst);
        if thread.join().is_err() {
            error!("receiver thread panicked");
        }

        if let Some(mut main_queue) = self.main_queue.take() {
            if let Err(e) = main_queue.handle().dispatch_sync(MainEvent::Teardown) {
                warn!(error = %e, "failed to tear down device grabber");
            }
            main_queue.stop();
        }
        info!(path = %self.socket_path.display(), "receiver stopped");
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker(
    mut receive: impl FnMut(&mut [u8]) -> Result<Option<usize>, ProtocolError>,
    manager: &GrabbableStateQueuesManager,
    queue: &MainQueueHandle,
    exit: &AtomicBool,
    buffer_size: usize,
) {
    manager.clear();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    while !exit.load(Ordering::SeqCst) {
        let n = match receive(&mut buffer) {
            Ok(Some(n)) if n > 0 => n,
            Ok(_) => continue,
            Err(e) => {
                if !exit.load(Ordering::SeqCst) {
                    debug!(error = %e, "receive failed");
                    thread::sleep(RECEIVE_ERROR_BACKOFF);
                }
                continue;
            }
        };

        let op = match wire::decode(&buffer[..n]) {
            Ok(op) => op,
            Err(ProtocolError::UnknownOperation(tag)) => {
                trace!(tag, "ignoring unknown operation");
                continue;
            }
            Err(e) => {
                error!(error = %e, size = n, "dropping malformed message");
                continue;
            }
        };

        trace!(operation = %op.operation_type(), "received operation");
        if let Err(e) = queue.dispatch_sync(MainEvent::from(op)) {
            error!(error = %e, "main queue unavailable, receiver exiting");
            break;
        }
    }
}
