//! Per-level restart permissions.

/// Which `restart` severity levels the daemon will honour.
///
/// A disabled level is acknowledged and completed successfully without
/// touching any collaborator, so operators can fence off host reboots on a
/// bench controller without clients having to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Reinitialise hardware connections without leaving the process.
    pub reinitialise: bool,
    /// Exit so the service manager restarts the daemon.
    pub software: bool,
    /// Reboot the controller host.
    pub hardware: bool,
    /// Power the controller host off.
    pub power_off: bool,
}

impl RestartPolicy {
    /// Policy with every level enabled.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            reinitialise: true,
            software: true,
            hardware: true,
            power_off: true,
        }
    }
}
