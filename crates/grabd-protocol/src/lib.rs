//! Local datagram transport and wire protocol for grabd.
//!
//! The companion session process talks to the grabber over a filesystem
//! addressed Unix datagram socket. Every datagram is one operation: a tag
//! byte followed by a fixed little-endian layout (see [`wire`]).

pub mod error;
pub mod transport;
pub mod wire;

pub use error::ProtocolError;
pub use transport::{remove_socket_file, LocalDatagramClient, LocalDatagramServer};
pub use wire::{Operation, OperationType, SizeRule};
