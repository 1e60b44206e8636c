//! Per-device grabbable state derivation and the process-wide registry.

mod entry;
mod keyboard_repeat_detector;
mod manager;

pub use entry::Entry;
pub use keyboard_repeat_detector::KeyboardRepeatDetector;
pub use manager::GrabbableStateQueuesManager;
