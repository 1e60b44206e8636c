//! Grabber errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrabberError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] grabd_protocol::ProtocolError),

    #[error("input error: {0}")]
    Input(#[from] grabd_input::InputError),

    #[error("main queue closed")]
    MainQueueClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
