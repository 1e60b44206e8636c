//! Integration tests driving the receiver over a real datagram socket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use grabd_grabber::{GrabbableStateQueuesManager, GrabberConfig, MainEvent, Receiver};
use grabd_input::mock::{GrabberCall, MockDeviceGrabberFactory, MockGrabberHandle};
use grabd_protocol::wire::{
    CONNECT_SIZE, FRONTMOST_APPLICATION_CHANGED_MIN_SIZE, GRABBABLE_STATE_CHANGED_SIZE,
    PATH_CAPACITY,
};
use grabd_protocol::{LocalDatagramClient, Operation, OperationType};
use grabd_types::{
    DeviceId, GrabbableState, InputSourceIdentifiers, SystemPreferences,
    UngrabbableTemporarilyReason,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const SYNC_DEVICE: DeviceId = DeviceId(u64::MAX);

/// Everything needed to talk to one running receiver.
struct TestGrabber {
    receiver: Option<Receiver>,
    client: LocalDatagramClient,
    grabbers: MockGrabberHandle,
    manager: Arc<GrabbableStateQueuesManager>,
    sync_counter: u64,
    // Dropped last so the socket directory outlives the receiver.
    dir: TempDir,
}

impl TestGrabber {
    fn start(with_system_configuration: bool) -> Self {
        Self::start_with(with_system_configuration, |_| {})
    }

    fn start_with(with_system_configuration: bool, prepare: impl FnOnce(&MockGrabberHandle)) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let config = GrabberConfig {
            socket_path: dir.path().join("grabd.sock"),
            system_core_configuration_file_path: dir.path().join("system.json"),
            console_device_path: dir.path().join("no-console"),
            receive_timeout_ms: 20,
            process_poll_interval_ms: 10,
            ..GrabberConfig::default()
        };
        if with_system_configuration {
            std::fs::write(&config.system_core_configuration_file_path, "{}").unwrap();
        }

        let factory = MockDeviceGrabberFactory::new();
        let grabbers = factory.handle();
        prepare(&grabbers);

        let manager = Arc::new(GrabbableStateQueuesManager::new());
        let receiver = Receiver::start(&config, Arc::clone(&manager), Box::new(factory)).unwrap();
        let client = LocalDatagramClient::connect(receiver.socket_path()).unwrap();

        Self {
            receiver: Some(receiver),
            client,
            grabbers,
            manager,
            sync_counter: 0,
            dir,
        }
    }

    fn system_path(&self) -> PathBuf {
        self.dir.path().join("system.json")
    }

    fn send(&self, op: &Operation) {
        self.client.send(op).unwrap();
    }

    /// Wait until everything sent so far has been applied. Operations are
    /// applied in order, so seeing a marker state means the rest landed.
    fn sync(&mut self) {
        self.sync_counter += 1;
        let marker = GrabbableState::grabbable(SYNC_DEVICE, self.sync_counter);
        self.send(&Operation::GrabbableStateChanged(marker));
        assert!(
            wait_until(|| self.manager.grabbable_state(SYNC_DEVICE) == Some(marker)),
            "receiver did not apply marker {}",
            self.sync_counter
        );
    }

    fn shutdown(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.shutdown();
        }
    }
}

fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    f()
}

fn own_pid() -> i32 {
    i32::try_from(std::process::id()).unwrap()
}

fn spawn_session_process() -> Child {
    Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap()
}

fn connect(pid: i32, path: &Path) -> Operation {
    Operation::Connect {
        pid,
        user_core_configuration_file_path: path.to_string_lossy().into_owned(),
    }
}

#[test]
fn connect_starts_user_grabber_and_forwards_context() {
    let mut grabber = TestGrabber::start(false);
    let user_path = PathBuf::from("/home/user/.config/grabd/core.json");

    grabber.send(&connect(own_pid(), &user_path));
    let prefs = SystemPreferences {
        keyboard_fn_state: true,
        swipe_scroll_direction_natural: false,
        keyboard_type: 40,
    };
    grabber.send(&Operation::SystemPreferencesUpdated(prefs));
    grabber.send(&Operation::FrontmostApplicationChanged {
        bundle_identifier: "org.example.editor".to_string(),
        file_path: "/usr/bin/editor".to_string(),
    });
    let input_source = InputSourceIdentifiers {
        language: "de".to_string(),
        input_source_id: "xkb:de::ger".to_string(),
        input_mode_id: String::new(),
    };
    grabber.send(&Operation::InputSourceChanged(input_source.clone()));
    grabber.sync();

    assert_eq!(
        grabber.grabbers.calls(),
        vec![
            GrabberCall::Created(1),
            GrabberCall::Started(1, user_path),
            GrabberCall::SystemPreferences(1, prefs),
            GrabberCall::FrontmostApplication {
                grabber: 1,
                bundle_identifier: "org.example.editor".to_string(),
                file_path: "/usr/bin/editor".to_string(),
            },
            GrabberCall::InputSource(1, input_source),
        ]
    );

    grabber.shutdown();
    assert!(grabber.grabbers.live_grabbers().is_empty());
}

#[test]
fn notifications_before_connect_are_dropped() {
    let mut grabber = TestGrabber::start(false);
    grabber.send(&Operation::SystemPreferencesUpdated(SystemPreferences::default()));
    grabber.send(&Operation::FrontmostApplicationChanged {
        bundle_identifier: "org.example.a".to_string(),
        file_path: "/a".to_string(),
    });
    grabber.sync();
    assert!(grabber.grabbers.calls().is_empty());
}

#[test]
fn grabbable_state_reports_update_the_registry() {
    let mut grabber = TestGrabber::start(false);
    let state = GrabbableState::ungrabbable_temporarily(
        DeviceId(3),
        UngrabbableTemporarilyReason::PointingButtonPressed,
        1234,
    );
    grabber.send(&Operation::GrabbableStateChanged(state));
    grabber.sync();

    assert_eq!(grabber.manager.grabbable_state(DeviceId(3)), Some(state));
    assert!(!grabber.manager.is_grabbable(DeviceId(3)));

    grabber.send(&Operation::GrabbableStateChanged(GrabbableState::grabbable(
        DeviceId(3),
        1300,
    )));
    grabber.sync();
    assert!(grabber.manager.is_grabbable(DeviceId(3)));
}

#[test]
fn unterminated_connect_path_is_cut_at_capacity() {
    let mut grabber = TestGrabber::start(false);

    let mut raw = Vec::with_capacity(CONNECT_SIZE);
    raw.push(OperationType::Connect as u8);
    raw.extend_from_slice(&own_pid().to_le_bytes());
    raw.extend(std::iter::repeat(b'a').take(PATH_CAPACITY));
    assert_eq!(raw.len(), CONNECT_SIZE);
    grabber.client.send_raw(&raw).unwrap();
    grabber.sync();

    let expected = PathBuf::from("a".repeat(PATH_CAPACITY - 1));
    assert_eq!(grabber.grabbers.started_paths(), vec![expected]);
}

#[test]
fn size_rules_drop_short_and_accept_minimum_messages() {
    let mut grabber = TestGrabber::start(false);
    grabber.send(&connect(own_pid(), Path::new("/user.json")));

    // One byte short of a grabbable state report.
    let mut short = Vec::with_capacity(GRABBABLE_STATE_CHANGED_SIZE);
    short.push(OperationType::GrabbableStateChanged as u8);
    short.extend_from_slice(&7u64.to_le_bytes());
    short.extend_from_slice(&[1, 0]);
    short.extend_from_slice(&[0u8; 7]);
    assert_eq!(short.len(), GRABBABLE_STATE_CHANGED_SIZE - 1);
    grabber.client.send_raw(&short).unwrap();

    // Exactly the minimum frontmost application size.
    let mut frontmost = vec![0u8; FRONTMOST_APPLICATION_CHANGED_MIN_SIZE];
    frontmost[0] = OperationType::FrontmostApplicationChanged as u8;
    frontmost[1..4].copy_from_slice(b"app");
    grabber.client.send_raw(&frontmost).unwrap();
    grabber.sync();

    assert_eq!(grabber.manager.grabbable_state(DeviceId(7)), None);
    assert!(grabber.grabbers.calls().contains(&GrabberCall::FrontmostApplication {
        grabber: 1,
        bundle_identifier: "app".to_string(),
        file_path: String::new(),
    }));
}

#[test]
fn unknown_and_malformed_messages_do_not_stop_the_receiver() {
    let mut grabber = TestGrabber::start(false);

    grabber.client.send_raw(&[0]).unwrap();
    grabber.client.send_raw(&[200, 1, 2, 3]).unwrap();

    // Reason set on a grabbable state.
    let mut inconsistent = Vec::with_capacity(GRABBABLE_STATE_CHANGED_SIZE);
    inconsistent.push(OperationType::GrabbableStateChanged as u8);
    inconsistent.extend_from_slice(&8u64.to_le_bytes());
    inconsistent.extend_from_slice(&[1, 2]);
    inconsistent.extend_from_slice(&5u64.to_le_bytes());
    grabber.client.send_raw(&inconsistent).unwrap();

    grabber.sync();
    assert_eq!(grabber.manager.grabbable_state(DeviceId(8)), None);
    assert!(grabber.grabbers.calls().is_empty());
}

#[test]
fn reconnect_replaces_grabber_and_monitor() {
    let mut grabber = TestGrabber::start(false);
    let mut session = spawn_session_process();
    let session_pid = i32::try_from(session.id()).unwrap();

    grabber.send(&connect(own_pid(), Path::new("/first.json")));
    grabber.send(&connect(session_pid, Path::new("/second.json")));
    grabber.sync();

    assert_eq!(grabber.grabbers.live_grabbers(), vec![2]);
    assert_eq!(
        grabber.grabbers.calls(),
        vec![
            GrabberCall::Created(1),
            GrabberCall::Started(1, PathBuf::from("/first.json")),
            GrabberCall::Dropped(1),
            GrabberCall::Created(2),
            GrabberCall::Started(2, PathBuf::from("/second.json")),
        ]
    );

    // A late exit report for the first session is ignored.
    let queue = grabber.receiver.as_ref().unwrap().main_queue().unwrap();
    queue
        .dispatch_sync(MainEvent::ConsoleUserServerExited { pid: own_pid() })
        .unwrap();
    assert_eq!(grabber.grabbers.live_grabbers(), vec![2]);

    // The second session's monitor is live.
    session.kill().unwrap();
    session.wait().unwrap();
    assert!(wait_until(|| grabber.grabbers.live_grabbers().is_empty()));
}

#[test]
fn system_configuration_starts_grabber_without_ipc() {
    let grabber = TestGrabber::start(true);
    assert_eq!(grabber.grabbers.live_grabbers(), vec![1]);
    assert_eq!(grabber.grabbers.started_paths(), vec![grabber.system_path()]);
}

#[test]
fn session_exit_falls_back_to_system_configuration() {
    let mut grabber = TestGrabber::start(true);
    let mut session = spawn_session_process();
    let session_pid = i32::try_from(session.id()).unwrap();

    grabber.send(&connect(session_pid, Path::new("/user.json")));
    grabber.sync();
    assert_eq!(grabber.grabbers.live_grabbers(), vec![2]);

    session.kill().unwrap();
    session.wait().unwrap();
    assert!(wait_until(|| grabber.grabbers.live_grabbers() == vec![3]));
    assert_eq!(
        grabber.grabbers.started_paths(),
        vec![
            grabber.system_path(),
            PathBuf::from("/user.json"),
            grabber.system_path(),
        ]
    );
}

#[test]
fn session_exit_without_system_configuration_leaves_no_grabber() {
    let mut grabber = TestGrabber::start(false);
    let mut session = spawn_session_process();
    let session_pid = i32::try_from(session.id()).unwrap();

    grabber.send(&connect(session_pid, Path::new("/user.json")));
    grabber.sync();
    assert_eq!(grabber.grabbers.live_grabbers(), vec![1]);

    session.kill().unwrap();
    session.wait().unwrap();
    assert!(wait_until(|| grabber.grabbers.live_grabbers().is_empty()));

    grabber.sync();
    assert_eq!(grabber.grabbers.started_paths(), vec![PathBuf::from("/user.json")]);
}

#[test]
fn failed_start_keeps_grabber_for_notifications() {
    let mut grabber = TestGrabber::start_with(false, |handle| handle.fail_start(true));

    grabber.send(&connect(own_pid(), Path::new("/broken.json")));
    grabber.send(&Operation::SystemPreferencesUpdated(SystemPreferences::default()));
    grabber.sync();

    assert_eq!(grabber.grabbers.live_grabbers(), vec![1]);
    assert!(grabber
        .grabbers
        .calls()
        .contains(&GrabberCall::SystemPreferences(1, SystemPreferences::default())));
}

#[test]
fn shutdown_removes_socket_and_drops_grabber() {
    let mut grabber = TestGrabber::start(true);
    let socket_path = grabber.dir.path().join("grabd.sock");
    assert!(socket_path.exists());

    grabber.shutdown();
    assert!(!socket_path.exists());
    assert!(grabber.grabbers.live_grabbers().is_empty());
    assert_eq!(grabber.grabbers.calls().last(), Some(&GrabberCall::Dropped(1)));
}

#[test]
fn socket_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let grabber = TestGrabber::start(false);
    let socket_path = grabber.dir.path().join("grabd.sock");
    let mode = std::fs::metadata(socket_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
