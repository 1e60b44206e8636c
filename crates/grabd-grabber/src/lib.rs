//! Grabber core for grabd.
//!
//! Tracks per-device grabbable state, receives control messages from the
//! console user session and the input observer over a local datagram
//! socket, and owns the device grabber for the current session.

pub mod config;
pub mod error;
pub mod grabbable_state;
pub mod main_queue;
pub mod process_monitor;
pub mod receiver;
pub mod session;
pub mod setup;

pub use config::{Config, GrabberConfig};
pub use error::GrabberError;
pub use grabbable_state::{Entry, GrabbableStateQueuesManager, KeyboardRepeatDetector};
pub use main_queue::{MainEvent, MainQueue, MainQueueHandle};
pub use process_monitor::ProcessMonitor;
pub use receiver::Receiver;
