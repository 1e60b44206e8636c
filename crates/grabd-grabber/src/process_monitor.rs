//! Watches a process and reports once when it exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::error::GrabberError;

/// Arm and drop order of every monitor created in this process.
#[cfg(test)]
pub(crate) static LIFECYCLE: Mutex<Vec<Lifecycle>> = parking_lot::const_mutex(Vec::new());

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Armed(i32),
    Dropped(i32),
}

/// Polls a pid until it disappears, then calls `on_exit` once.
///
/// Dropping the monitor stops the polling thread without calling `on_exit`.
pub struct ProcessMonitor {
    pid: i32,
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl ProcessMonitor {
    pub fn new<F>(pid: i32, poll_interval: Duration, on_exit: F) -> Result<Self, GrabberError>
    where
        F: FnOnce() + Send + 'static,
    {
        if pid <= 0 {
            return Err(GrabberError::Config(format!("cannot monitor pid {pid}")));
        }

        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("grabd-process-monitor-{pid}"))
            .spawn(move || {
                let (stopped, wake) = &*thread_stop;
                loop {
                    if !process_exists(pid) {
                        debug!(pid, "monitored process exited");
                        on_exit();
                        return;
                    }
                    let mut guard = stopped.lock();
                    if !*guard {
                        wake.wait_for(&mut guard, poll_interval);
                    }
                    if *guard {
                        return;
                    }
                }
            })?;

        debug!(pid, "process monitor armed");
        #[cfg(test)]
        LIFECYCLE.lock().push(Lifecycle::Armed(pid));
        Ok(Self {
            pid,
            stop,
            thread: Some(thread),
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        let (stopped, wake) = &*self.stop;
        *stopped.lock() = true;
        wake.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(pid = self.pid, "process monitor thread panicked");
            }
        }
        debug!(pid = self.pid, "process monitor dropped");
        #[cfg(test)]
        LIFECYCLE.lock().push(Lifecycle::Dropped(self.pid));
    }
}

/// Signal 0 checks for existence; `EPERM` still means the process is alive.
fn process_exists(pid: i32) -> bool {
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}
