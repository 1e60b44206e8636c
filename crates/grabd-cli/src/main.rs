//! grabd CLI — runs the grabber daemon and talks to it over its socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use grabd_grabber::{GrabbableStateQueuesManager, GrabberConfig, Receiver};
use grabd_input::{DeviceGrabber, GrabbableStateQuery, PassiveDeviceGrabber};
use grabd_protocol::{LocalDatagramClient, Operation};
use grabd_types::{
    DeviceId, GrabbableState, InputSourceIdentifiers, State, SystemPreferences,
    UngrabbableTemporarilyReason,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "grabd",
    about = "Exclusive input device grabbing for keyboard remapping",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Socket path, overriding the configured one.
    #[arg(short, long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the grabber until interrupted.
    Run,

    /// Attach a console user session.
    Connect {
        /// Core configuration file for the session.
        path: PathBuf,

        /// Session process to monitor (defaults to the parent process).
        #[arg(long)]
        pid: Option<i32>,
    },

    /// Forward a session context change to the grabber.
    Notify {
        #[command(subcommand)]
        notification: Notification,
    },

    /// Report the grabbable state of one device.
    Report {
        device_id: u64,

        #[arg(value_enum)]
        state: StateArg,

        #[arg(long, value_enum, default_value_t = ReasonArg::None)]
        reason: ReasonArg,

        /// Event time in microseconds (defaults to now).
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Watch input devices and report grabbable state changes.
    #[cfg(feature = "linux")]
    Observe,
}

#[derive(Subcommand)]
enum Notification {
    FrontmostApp {
        bundle_identifier: String,
        file_path: String,
    },
    InputSource {
        language: String,
        input_source_id: String,
        #[arg(long, default_value = "")]
        input_mode_id: String,
    },
    SystemPreferences {
        #[arg(long)]
        keyboard_fn_state: bool,
        #[arg(long)]
        natural_scroll: bool,
        #[arg(long, default_value_t = 0)]
        keyboard_type: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    None,
    Grabbable,
    UngrabbableTemporarily,
    UngrabbablePermanently,
}

impl From<StateArg> for State {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::None => Self::None,
            StateArg::Grabbable => Self::Grabbable,
            StateArg::UngrabbableTemporarily => Self::UngrabbableTemporarily,
            StateArg::UngrabbablePermanently => Self::UngrabbablePermanently,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReasonArg {
    None,
    KeyRepeating,
    ModifierKeyPressed,
    PointingButtonPressed,
}

impl From<ReasonArg> for UngrabbableTemporarilyReason {
    fn from(arg: ReasonArg) -> Self {
        match arg {
            ReasonArg::None => Self::None,
            ReasonArg::KeyRepeating => Self::KeyRepeating,
            ReasonArg::ModifierKeyPressed => Self::ModifierKeyPressed,
            ReasonArg::PointingButtonPressed => Self::PointingButtonPressed,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = grabd_grabber::setup::load_config(cli.config.as_deref())?.grabber;
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Run => run(&config),
        Commands::Connect { path, pid } => {
            let pid = pid.unwrap_or_else(|| nix::unistd::getppid().as_raw());
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()
                    .context("failed to resolve working directory")?
                    .join(path)
            };
            info!(pid, path = %path.display(), "connecting session");
            send(
                &config.socket_path,
                &Operation::Connect {
                    pid,
                    user_core_configuration_file_path: path.to_string_lossy().into_owned(),
                },
            )
        }
        Commands::Notify { notification } => send(&config.socket_path, &notification.into_operation()),
        Commands::Report {
            device_id,
            state,
            reason,
            timestamp,
        } => {
            let state = GrabbableState::from_parts(
                DeviceId(device_id),
                state.into(),
                reason.into(),
                timestamp.unwrap_or_else(now_micros),
            )
            .context("a reason is required with, and only allowed with, ungrabbable-temporarily")?;
            send(&config.socket_path, &Operation::GrabbableStateChanged(state))
        }
        #[cfg(feature = "linux")]
        Commands::Observe => observe(&config.socket_path),
    }
}

impl Notification {
    fn into_operation(self) -> Operation {
        match self {
            Self::FrontmostApp {
                bundle_identifier,
                file_path,
            } => Operation::FrontmostApplicationChanged {
                bundle_identifier,
                file_path,
            },
            Self::InputSource {
                language,
                input_source_id,
                input_mode_id,
            } => Operation::InputSourceChanged(InputSourceIdentifiers {
                language,
                input_source_id,
                input_mode_id,
            }),
            Self::SystemPreferences {
                keyboard_fn_state,
                natural_scroll,
                keyboard_type,
            } => Operation::SystemPreferencesUpdated(SystemPreferences {
                keyboard_fn_state,
                swipe_scroll_direction_natural: natural_scroll,
                keyboard_type,
            }),
        }
    }
}

fn run(config: &GrabberConfig) -> anyhow::Result<()> {
    let manager = Arc::new(GrabbableStateQueuesManager::new());
    let factory = |query: Arc<dyn GrabbableStateQuery>| -> Box<dyn DeviceGrabber> {
        Box::new(PassiveDeviceGrabber::new(query))
    };
    let receiver = Receiver::start(config, manager, Box::new(factory))?;

    // The receiver blocks on its main queue, so it stays outside the runtime.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(wait_for_shutdown_signal())?;

    info!("shutting down");
    receiver.shutdown();
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

fn send(socket_path: &Path, op: &Operation) -> anyhow::Result<()> {
    let client = LocalDatagramClient::connect(socket_path)
        .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
    client.send(op)?;
    info!(operation = %op.operation_type(), "sent");
    Ok(())
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_micros()).ok())
        .unwrap_or(0)
}

#[cfg(feature = "linux")]
fn observe(socket_path: &Path) -> anyhow::Result<()> {
    use grabd_input::linux::EvdevObserver;
    use grabd_input::{DeviceEvent, InputObserver};
    use tokio::sync::mpsc;
    use tracing::{debug, warn};

    let client = LocalDatagramClient::connect(socket_path)
        .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
    let manager = GrabbableStateQueuesManager::new();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut observer = EvdevObserver::new();
        let (tx, mut rx) = mpsc::channel(1024);
        observer.start(tx).await?;

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    break;
                }
                event = rx.recv() => match event {
                    Some(DeviceEvent::Input(captured)) => {
                        let Some(state) =
                            manager.update(captured.device_id, captured.timestamp, &captured.event)
                        else {
                            continue;
                        };
                        debug!(device_id = %state.device_id(), %state, "reporting");
                        if let Err(e) = client.send(&Operation::GrabbableStateChanged(state)) {
                            warn!(error = %e, "failed to report grabbable state");
                        }
                    }
                    Some(DeviceEvent::Removed(device_id)) => {
                        manager.remove(device_id);
                        info!(%device_id, "device removed");
                    }
                    None => break,
                },
            }
        }

        observer.shutdown().await?;
        Ok::<(), anyhow::Error>(())
    })
}
