//! Filesystem-addressed Unix datagram endpoints.

use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{chown, Gid, Uid};
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::wire::{self, Operation};

/// Smallest receive timeout the socket accepts; a zero timeout would mean
/// "block forever".
const MIN_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1);

/// Remove a socket file, treating "already gone" as success.
pub fn remove_socket_file(path: &Path) -> Result<(), ProtocolError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Receiving end bound to a filesystem path.
pub struct LocalDatagramServer {
    socket: UnixDatagram,
    path: PathBuf,
}

impl LocalDatagramServer {
    /// Bind at `path`, replacing any stale socket file left by a previous run.
    pub fn bind(path: impl Into<PathBuf>, receive_timeout: Duration) -> Result<Self, ProtocolError> {
        let path = path.into();
        remove_socket_file(&path)?;

        let socket = UnixDatagram::bind(&path)?;
        socket.set_read_timeout(Some(receive_timeout.max(MIN_RECEIVE_TIMEOUT)))?;
        info!(path = %path.display(), "datagram server bound");

        Ok(Self { socket, path })
    }

    /// Restrict the socket file to its owner (0600), handing ownership to
    /// `owner` when given.
    ///
    /// A failed ownership transfer is logged and the mode is still applied.
    pub fn restrict_access(&self, owner: Option<u32>) -> Result<(), ProtocolError> {
        if let Some(uid) = owner {
            match chown(&self.path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(0))) {
                Ok(()) => debug!(path = %self.path.display(), uid, "socket ownership transferred"),
                Err(e) => warn!(path = %self.path.display(), uid, error = %e, "failed to transfer socket ownership"),
            }
        }
        std::fs::set_permissions(&self.path, Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Wait up to the receive timeout for one datagram.
    ///
    /// Returns `Ok(None)` when the wait timed out.
    pub fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>, ProtocolError> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sending end used by the session process and the observer.
pub struct LocalDatagramClient {
    socket: UnixDatagram,
}

impl LocalDatagramClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self { socket })
    }

    pub fn send(&self, op: &Operation) -> Result<(), ProtocolError> {
        self.send_raw(&wire::encode(op))
    }

    /// Send bytes as-is, bypassing the encoder.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.socket.send(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grabd_types::{DeviceId, GrabbableState};

    #[test]
    fn receive_times_out_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            LocalDatagramServer::bind(dir.path().join("s.sock"), Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 64];
        assert!(server.receive(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"stale").unwrap();

        let server = LocalDatagramServer::bind(&path, Duration::from_millis(20)).unwrap();
        assert_eq!(server.path(), path.as_path());
    }

    #[test]
    fn restrict_access_sets_owner_only_mode() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            LocalDatagramServer::bind(dir.path().join("m.sock"), Duration::from_millis(20)).unwrap();
        server.restrict_access(None).unwrap();
        let mode = std::fs::metadata(server.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn ownership_transfer_failure_still_restricts_mode() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            LocalDatagramServer::bind(dir.path().join("o.sock"), Duration::from_millis(20)).unwrap();
        // Non-root callers cannot give the file to root; root can.
        server.restrict_access(Some(0)).unwrap();
        let mode = std::fs::metadata(server.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn client_datagram_reaches_server() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            LocalDatagramServer::bind(dir.path().join("c.sock"), Duration::from_secs(1)).unwrap();
        let client = LocalDatagramClient::connect(server.path()).unwrap();

        let op = Operation::GrabbableStateChanged(GrabbableState::grabbable(DeviceId(3), 77));
        client.send(&op).unwrap();

        let mut buf = vec![0u8; 4096];
        let n = server.receive(&mut buf).unwrap().unwrap();
        assert_eq!(wire::decode(&buf[..n]).unwrap(), op);
    }

    #[test]
    fn removing_missing_socket_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_socket_file(&dir.path().join("missing.sock")).unwrap();
    }
}
