//! Built-in configuration defaults.

#[cfg(unix)]
use std::env;

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::socket::SocketEndpoint;

/// TCP port used when Unix domain sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 7083;

/// Log filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Offset added to every completion error code.
pub const DEFAULT_ERROR_CODE_BASE: i32 = 100_000;

/// Acknowledgement estimate for commands without a better figure.
pub const DEFAULT_ACK_MS: u64 = 10_000;

/// Keep-alive cadence while waiting on the shared lamp unit.
pub const DEFAULT_LAMP_WAIT_INTERVAL_MS: u64 = 10_000;

/// Acknowledgement estimate for master calibration builds.
pub const DEFAULT_MASTER_CALIBRATION_ACK_MS: u64 = 600_000;

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log output format.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

pub(crate) const fn default_error_code_base() -> i32 {
    DEFAULT_ERROR_CODE_BASE
}

pub(crate) const fn default_ack_ms() -> u64 {
    DEFAULT_ACK_MS
}

pub(crate) const fn default_lamp_wait_interval_ms() -> u64 {
    DEFAULT_LAMP_WAIT_INTERVAL_MS
}

pub(crate) const fn default_master_calibration_ack_ms() -> u64 {
    DEFAULT_MASTER_CALIBRATION_ACK_MS
}

pub(crate) const fn enabled() -> bool {
    true
}

/// Computes the default socket endpoint for the daemon.
///
/// On Unix this is `frodo/frodod.sock` under the user's runtime directory,
/// falling back to a uid-namespaced directory below the system temp dir.
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let mut base = runtime_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| {
            let mut fallback = Utf8PathBuf::from_path_buf(env::temp_dir())
                .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
            fallback.push(format!("uid-{}", unsafe { geteuid() }));
            fallback
        });
    base.push("frodo");
    SocketEndpoint::unix(base.join("frodod.sock"))
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
