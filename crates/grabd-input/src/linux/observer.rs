//! Passive evdev observer for Linux.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use evdev::{Device, EventSummary, EventType, KeyCode as EvdevKey};
use grabd_types::{CapturedEvent, DeviceId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::keymap;
use crate::error::InputError;
use crate::{DeviceEvent, InputObserver};

/// Reads key and button transitions from `/dev/input/event*` without grabbing
/// the devices, so their grabbable state can be tracked before anything
/// claims them.
#[derive(Default)]
pub struct EvdevObserver {
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl EvdevObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate devices that report keys or pointing buttons.
    pub fn enumerate_devices() -> Vec<(PathBuf, DeviceId, String)> {
        let mut result = Vec::new();
        for (path, device) in evdev::enumerate() {
            if !device.supported_events().contains(EventType::KEY) {
                continue;
            }
            let Some(keys) = device.supported_keys() else {
                continue;
            };
            let is_keyboard = keys.contains(EvdevKey::KEY_A) && keys.contains(EvdevKey::KEY_ENTER);
            let is_pointing = keys.contains(EvdevKey::BTN_LEFT);
            if !is_keyboard && !is_pointing {
                continue;
            }
            let Some(device_id) = device_id_from_path(&path) else {
                debug!(path = %path.display(), "skipping device without event index");
                continue;
            };
            let name = device.name().unwrap_or("Unknown Device").to_string();
            result.push((path, device_id, name));
        }
        result
    }
}

/// Devices are identified by their `eventN` node index.
pub fn device_id_from_path(path: &Path) -> Option<DeviceId> {
    path.file_name()?
        .to_str()?
        .strip_prefix("event")?
        .parse()
        .ok()
        .map(DeviceId)
}

#[async_trait]
impl InputObserver for EvdevObserver {
    async fn start(&mut self, tx: mpsc::Sender<DeviceEvent>) -> Result<(), InputError> {
        if self.task.is_some() {
            return Err(InputError::AlreadyStarted);
        }

        let device_list = Self::enumerate_devices();
        if device_list.is_empty() {
            return Err(InputError::DeviceOpen(
                "no keyboard or pointing devices found".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let mut handles = Vec::new();
        for (path, device_id, name) in device_list {
            info!(device = %name, path = %path.display(), %device_id, "observing device");
            let tx = tx.clone();
            let mut shutdown_rx = shutdown_rx.clone();

            let handle: JoinHandle<()> = tokio::spawn(async move {
                let device = match Device::open(&path) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to open device");
                        return;
                    }
                };
                let mut stream = match device.into_event_stream() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to create event stream");
                        return;
                    }
                };

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        result = stream.next_event() => match result {
                            Ok(ev) => {
                                let EventSummary::Key(_, key, value) = ev.destructure() else {
                                    continue;
                                };
                                let Some(event) = keymap::evdev_key_to_event(key, value) else {
                                    continue;
                                };
                                let timestamp = ev
                                    .timestamp()
                                    .duration_since(UNIX_EPOCH)
                                    .ok()
                                    .and_then(|d| u64::try_from(d.as_micros()).ok())
                                    .unwrap_or(0);
                                let captured = CapturedEvent { device_id, timestamp, event };
                                if tx.send(DeviceEvent::Input(captured)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(%device_id, error = %e, "device read error");
                                let _ = tx.send(DeviceEvent::Removed(device_id)).await;
                                break;
                            }
                        },
                    }
                }
            });
            handles.push(handle);
        }

        self.task = Some(tokio::spawn(async move {
            for h in handles {
                let _ = h.await;
            }
        }));

        info!("input observer started");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("input observer shut down");
        Ok(())
    }
}
