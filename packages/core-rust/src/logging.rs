use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Diagnostic verbosity of the synchronization engine.
///
/// Has no effect on behavior, only on how much the engine logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logging {
    /// Only failures are logged.
    Off,
    /// One line per dispatched action and per fired rule.
    #[default]
    Trace,
    /// Trace plus full input/output documents and frames.
    Verbose,
}

impl Logging {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Logging::Off => "off",
            Logging::Trace => "trace",
            Logging::Verbose => "verbose",
        }
    }

    #[must_use]
    pub fn traces(self) -> bool {
        self >= Logging::Trace
    }

    #[must_use]
    pub fn is_verbose(self) -> bool {
        self == Logging::Verbose
    }
}

impl fmt::Display for Logging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown logging level `{0}` (expected off, trace or verbose)")]
pub struct ParseLoggingError(String);

impl FromStr for Logging {
    type Err = ParseLoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Logging::Off),
            "trace" => Ok(Logging::Trace),
            "verbose" => Ok(Logging::Verbose),
            other => Err(ParseLoggingError(other.to_string())),
        }
    }
}
