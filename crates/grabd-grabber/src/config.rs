//! Grabber configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grabber: GrabberConfig,
}

/// Receiver, session and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrabberConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Core configuration used while no console user is connected.
    #[serde(default = "default_system_core_configuration_file_path")]
    pub system_core_configuration_file_path: PathBuf,
    /// Device whose owner is taken to be the console user.
    #[serde(default = "default_console_device_path")]
    pub console_device_path: PathBuf,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_process_poll_interval_ms")]
    pub process_poll_interval_ms: u64,
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            system_core_configuration_file_path: default_system_core_configuration_file_path(),
            console_device_path: default_console_device_path(),
            receive_timeout_ms: default_receive_timeout_ms(),
            process_poll_interval_ms: default_process_poll_interval_ms(),
            receive_buffer_size: default_receive_buffer_size(),
            log_level: default_log_level(),
        }
    }
}

impl GrabberConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn process_poll_interval(&self) -> Duration {
        Duration::from_millis(self.process_poll_interval_ms)
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/grabd/grabd.sock")
}

fn default_system_core_configuration_file_path() -> PathBuf {
    PathBuf::from("/etc/grabd/core.json")
}

fn default_console_device_path() -> PathBuf {
    PathBuf::from("/dev/console")
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

fn default_process_poll_interval_ms() -> u64 {
    500
}

fn default_receive_buffer_size() -> usize {
    32 * 1024 // 32 KiB
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("receive_timeout_ms = 1000"));
        assert!(toml_str.contains("/run/grabd/grabd.sock"));
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[grabber]
socket_path = "/tmp/grabd-test.sock"
receive_timeout_ms = 50
log_level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.grabber.socket_path, PathBuf::from("/tmp/grabd-test.sock"));
        assert_eq!(config.grabber.receive_timeout(), Duration::from_millis(50));
        assert_eq!(config.grabber.log_level, "debug");
        assert_eq!(config.grabber.process_poll_interval_ms, 500);
        assert_eq!(config.grabber.receive_buffer_size, 32 * 1024);
        assert_eq!(
            config.grabber.console_device_path,
            PathBuf::from("/dev/console")
        );
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.grabber.receive_timeout_ms, 1000);
    }
}
