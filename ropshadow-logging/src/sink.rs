//! Destinations for diagnostic records.

use std::{
    io::Write,
    sync::Arc,
};

use colored::Colorize;
use ropshadow_sync::SpinMutex;

use crate::{
    level::Emphasis,
    record::DiagnosticRecord,
};

/// A trait for receiving diagnostic records
pub trait DiagnosticSink: Send + Sync {
    /// Write one record
    fn write_record(&self, record: &DiagnosticRecord);

    /// Flush buffered output, if any
    fn flush(&self) {}
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> DiagnosticSink for FnSink<F>
where
    F: Fn(&DiagnosticRecord) + Send + Sync,
{
    fn write_record(&self, record: &DiagnosticRecord) {
        (self.0)(record);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn write_record(&self, record: &DiagnosticRecord) {
        (**self).write_record(record);
    }

    fn flush(&self) {
        (**self).flush();
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn write_record(&self, record: &DiagnosticRecord) {
        (**self).write_record(record);
    }

    fn flush(&self) {
        (**self).flush();
    }
}

/// Stream a [`ConsoleSink`] writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    /// Standard output
    #[default]
    Stdout,
    /// Standard error
    Stderr,
}

/// Writes records to the terminal, optionally with ANSI colour.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    colour: bool,
    target: ConsoleTarget,
}

impl ConsoleSink {
    /// Create a console sink
    #[must_use]
    pub const fn new(target: ConsoleTarget, colour: bool) -> Self {
        Self { colour, target }
    }

    /// Standard output with colour
    #[must_use]
    pub const fn stdout() -> Self {
        Self::new(ConsoleTarget::Stdout, true)
    }

    /// Whether lines are coloured
    #[must_use]
    pub const fn colour(&self) -> bool {
        self.colour
    }

    fn paint(&self, record: &DiagnosticRecord) -> String {
        if !self.colour {
            return record.render();
        }
        let indent = " ".repeat(record.depth);
        let body = format!("t{}: {}", record.thread, record.text);
        let painted = match record.emphasis {
            Emphasis::Plain => body.normal(),
            Emphasis::Call => body.yellow(),
            Emphasis::Return => body.green(),
            Emphasis::Skip | Emphasis::Alert => body.on_red(),
            Emphasis::Notice => body.on_blue(),
        };
        format!("{indent}{painted}")
    }
}

impl DiagnosticSink for ConsoleSink {
    fn write_record(&self, record: &DiagnosticRecord) {
        let line = self.paint(record);
        // Console write failures are not actionable from inside the monitor.
        let _ = match self.target {
            ConsoleTarget::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            ConsoleTarget::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }

    fn flush(&self) {
        let _ = match self.target {
            ConsoleTarget::Stdout => std::io::stdout().flush(),
            ConsoleTarget::Stderr => std::io::stderr().flush(),
        };
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: SpinMutex<Vec<DiagnosticRecord>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all records so far
    #[must_use]
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    /// Rendered lines, uncoloured
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(DiagnosticRecord::render).collect()
    }

    /// Message bodies only, without indentation or thread prefix
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.text.clone()).collect()
    }

    /// Drop all records
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn write_record(&self, record: &DiagnosticRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn write_record(&self, _record: &DiagnosticRecord) {}
}

/// Forwards records to the `log` facade under the `ropshadow` target.
#[cfg(feature = "log")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

#[cfg(feature = "log")]
impl DiagnosticSink for LogCrateSink {
    fn write_record(&self, record: &DiagnosticRecord) {
        use crate::level::LogLevel;

        let level = match record.level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical => log::Level::Error,
        };
        log::log!(target: "ropshadow", level, "{}", record.render());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::level::LogLevel;

    fn record(emphasis: Emphasis) -> DiagnosticRecord {
        DiagnosticRecord::new(2, LogLevel::Debug, emphasis, 1, "skipping a frame")
    }

    #[test]
    fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.write_record(&record(Emphasis::Skip));
        sink.write_record(&DiagnosticRecord::new(2, LogLevel::Info, Emphasis::Plain, 0, "done"));
        assert_eq!(sink.lines(), vec![" t2: skipping a frame", "t2: done"]);
        assert_eq!(sink.texts(), vec!["skipping a frame", "done"]);
        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(SpinMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = FnSink(move |r: &DiagnosticRecord| seen_clone.lock().push(r.thread));
        sink.write_record(&record(Emphasis::Plain));
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn test_uncoloured_console_matches_render() {
        let sink = ConsoleSink::new(ConsoleTarget::Stderr, false);
        let r = record(Emphasis::Alert);
        assert_eq!(sink.paint(&r), r.render());
    }

    #[test]
    fn test_coloured_console_keeps_indent_plain() {
        colored::control::set_override(true);
        let sink = ConsoleSink::new(ConsoleTarget::Stdout, true);
        let painted = sink.paint(&record(Emphasis::Skip));
        assert!(painted.starts_with(' '));
        assert!(painted.contains("t2: skipping a frame"));
        assert!(painted.contains("\u{1b}["));
    }
}
