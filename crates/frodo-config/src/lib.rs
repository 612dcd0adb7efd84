//! Shared configuration for the FRODO instrument-control daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, an
//! optional TOML file (`--config-path` or `FRODO_CONFIG_PATH`), `FRODO_*`
//! environment variables, and finally command-line flags. The resulting
//! [`Config`] is immutable once loaded and is handed to the daemon's context.

mod defaults;
mod logging;
mod restart;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ACK_MS, DEFAULT_ERROR_CODE_BASE, DEFAULT_LAMP_WAIT_INTERVAL_MS,
    DEFAULT_LOG_FILTER, DEFAULT_MASTER_CALIBRATION_ACK_MS, DEFAULT_TCP_PORT, default_log_filter,
    default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use restart::RestartPolicy;
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FRODO")]
pub struct Config {
    /// Endpoint the daemon listens on for client commands.
    #[serde(default = "defaults::default_socket_endpoint")]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter expression applied to daemon logs.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Offset added to every completion error code.
    #[serde(default = "defaults::default_error_code_base")]
    pub error_code_base: i32,
    /// Acknowledgement estimate used when a command has nothing better.
    #[serde(default = "defaults::default_ack_ms")]
    pub default_ack_ms: u64,
    /// Interval between keep-alives while blocked on the lamp unit.
    #[serde(default = "defaults::default_lamp_wait_interval_ms")]
    pub lamp_wait_interval_ms: u64,
    /// Acknowledgement estimate for building master calibration frames.
    #[serde(default = "defaults::default_master_calibration_ack_ms")]
    pub master_calibration_ack_ms: u64,
    /// Directory handed to the pipeline when building master frames.
    #[serde(default)]
    pub master_calibration_directory: Option<String>,
    /// Whether `restart` may reinitialise the controller in-process.
    #[serde(default = "defaults::enabled")]
    pub restart_reinitialise_enabled: bool,
    /// Whether `restart` may exit the process for a software restart.
    #[serde(default = "defaults::enabled")]
    pub restart_software_enabled: bool,
    /// Whether `restart` may reboot the host.
    #[serde(default)]
    pub restart_hardware_enabled: bool,
    /// Whether `restart` may power the host off.
    #[serde(default)]
    pub restart_power_off_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            error_code_base: DEFAULT_ERROR_CODE_BASE,
            default_ack_ms: DEFAULT_ACK_MS,
            lamp_wait_interval_ms: DEFAULT_LAMP_WAIT_INTERVAL_MS,
            master_calibration_ack_ms: DEFAULT_MASTER_CALIBRATION_ACK_MS,
            master_calibration_directory: None,
            restart_reinitialise_enabled: true,
            restart_software_enabled: true,
            restart_hardware_enabled: false,
            restart_power_off_enabled: false,
        }
    }
}

impl Config {
    /// Socket endpoint the daemon binds.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Base offset for completion error codes.
    #[must_use]
    pub fn error_code_base(&self) -> i32 {
        self.error_code_base
    }

    /// Default acknowledgement estimate.
    #[must_use]
    pub fn default_ack(&self) -> Duration {
        Duration::from_millis(self.default_ack_ms)
    }

    /// Wait slice used by the lamp arbiter between keep-alives.
    ///
    /// A zero value is clamped to one millisecond so waiters still poll.
    #[must_use]
    pub fn lamp_wait_interval(&self) -> Duration {
        Duration::from_millis(self.lamp_wait_interval_ms.max(1))
    }

    /// Acknowledgement estimate for master calibration builds.
    #[must_use]
    pub fn master_calibration_ack(&self) -> Duration {
        Duration::from_millis(self.master_calibration_ack_ms)
    }

    /// Directory for master calibration products, if configured.
    #[must_use]
    pub fn master_calibration_directory(&self) -> Option<&str> {
        self.master_calibration_directory.as_deref()
    }

    /// Which restart levels are permitted.
    #[must_use]
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            reinitialise: self.restart_reinitialise_enabled,
            software: self.restart_software_enabled,
            hardware: self.restart_hardware_enabled,
            power_off: self.restart_power_off_enabled,
        }
    }
}
