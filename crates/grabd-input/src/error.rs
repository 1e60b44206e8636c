//! Input subsystem errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("core configuration unavailable at {path}: {source}")]
    Configuration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open device: {0}")]
    DeviceOpen(String),

    #[error("observer already started")]
    AlreadyStarted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
