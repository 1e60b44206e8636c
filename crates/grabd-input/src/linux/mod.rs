//! evdev backend for Linux.

pub mod keymap;
pub mod observer;

pub use observer::EvdevObserver;
