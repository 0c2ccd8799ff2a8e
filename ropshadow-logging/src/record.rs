//! A single diagnostic line.

use core::fmt;

use crate::level::{
    Emphasis,
    LogLevel,
};

/// One line of monitor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Monitored thread the line is about
    pub thread:   u32,
    /// Severity
    pub level:    LogLevel,
    /// Highlighting hint for colour terminals
    pub emphasis: Emphasis,
    /// Indentation depth of the thread when the line was produced
    pub depth:    usize,
    /// Message body, without thread prefix or indentation
    pub text:     String,
}

impl DiagnosticRecord {
    /// Creates a record.
    pub fn new(
        thread: u32,
        level: LogLevel,
        emphasis: Emphasis,
        depth: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            thread,
            level,
            emphasis,
            depth,
            text: text.into(),
        }
    }

    /// The line as printed without colour: `<depth spaces>t<thread>: <text>`.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:width$}t{}: {}", "", self.thread, self.text, width = self.depth)
    }
}
