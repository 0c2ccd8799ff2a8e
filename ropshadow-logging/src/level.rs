//! Log levels and emphasis for monitor diagnostics.

use core::{
    fmt,
    str::FromStr,
};

/// Severity of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum LogLevel {
    /// Every call and return
    Trace,
    /// Frame skips and bookkeeping details
    Debug,
    /// Exception and signal notices
    #[default]
    Info,
    /// Recoverable anomalies such as popping an empty shadow stack
    #[cfg_attr(feature = "serde", serde(alias = "warning"))]
    Warn,
    /// Events the monitor could not process
    #[cfg_attr(feature = "serde", serde(alias = "err"))]
    Error,
    /// Security violations
    #[cfg_attr(feature = "serde", serde(alias = "fatal"))]
    Critical,
}

/// Custom error for parsing log levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLogLevelError {
    /// Static error message
    pub message: &'static str,
}

impl fmt::Display for ParseLogLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid log level: {}", self.message)
    }
}

impl std::error::Error for ParseLogLevelError {}

impl From<ParseLogLevelError> for ropshadow_error::Error {
    fn from(_: ParseLogLevelError) -> Self {
        ropshadow_error::Error::invalid_configuration("Invalid log level")
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            _ => Err(ParseLogLevelError {
                message: "expected one of trace, debug, info, warn, error, critical",
            }),
        }
    }
}

impl LogLevel {
    /// Creates a `LogLevel` from a string, defaulting to Info for invalid
    /// levels
    #[must_use]
    pub fn from_string_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or(Self::Info)
    }

    /// Convert `LogLevel` to a string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a diagnostic line is highlighted on a colour terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Emphasis {
    /// No highlighting
    #[default]
    Plain,
    /// Call line, call site highlighted
    Call,
    /// Return line, target highlighted
    Return,
    /// A shadow frame discarded during reconciliation
    Skip,
    /// Exception handler or signal bookkeeping
    Notice,
    /// Fatal signals and violations
    Alert,
}
