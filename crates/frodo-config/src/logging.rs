use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output format for daemon logs.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for the observatory log collector.
    #[default]
    Json,
    /// Single-line human-readable output for bench work.
    Compact,
}

/// Error returned when a [`LogFormat`] cannot be parsed.
pub type LogFormatParseError = strum::ParseError;
