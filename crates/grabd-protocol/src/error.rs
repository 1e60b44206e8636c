//! Protocol and transport errors.

use thiserror::Error;

use crate::wire::{OperationType, SizeRule};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown operation type: {0}")]
    UnknownOperation(u8),

    #[error("invalid size for {operation} ({actual} bytes, expected {expected})")]
    InvalidSize {
        operation: OperationType,
        expected: SizeRule,
        actual: usize,
    },

    #[error("malformed {operation} payload: {reason}")]
    Malformed {
        operation: OperationType,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
