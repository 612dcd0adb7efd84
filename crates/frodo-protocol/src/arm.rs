use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two optical channels of the spectrograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    /// The red arm.
    Red,
    /// The blue arm.
    Blue,
}

impl Arm {
    /// Both arms in canonical order.
    pub const ALL: [Self; 2] = [Self::Red, Self::Blue];

    /// Lower-case name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Which arm(s) a command addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmSelector {
    /// The command is not arm-specific.
    #[default]
    None,
    /// Only the red arm.
    Red,
    /// Only the blue arm.
    Blue,
    /// Both arms, red first.
    Both,
}

impl ArmSelector {
    /// Arms selected, in canonical order.
    #[must_use]
    pub const fn arms(self) -> &'static [Arm] {
        match self {
            Self::None => &[],
            Self::Red => &[Arm::Red],
            Self::Blue => &[Arm::Blue],
            Self::Both => &Arm::ALL,
        }
    }

    /// True when no arm is selected.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Arm> for ArmSelector {
    fn from(arm: Arm) -> Self {
        match arm {
            Arm::Red => Self::Red,
            Arm::Blue => Self::Blue,
        }
    }
}

/// Last-known activity of an arm, as recorded by its owning worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposurePhase {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Waiting for the shared lamp unit.
    Acquiring,
    /// Detector or grating configuration in progress.
    Setup,
    /// Shutter open or detector integrating.
    Exposing,
    /// Frame handed to the reduction pipeline.
    Reducing,
}
