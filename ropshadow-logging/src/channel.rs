//! Level filtering and serialized delivery of diagnostic records.

use core::fmt;

use ropshadow_sync::SpinMutex;

use crate::{
    level::LogLevel,
    record::DiagnosticRecord,
    sink::DiagnosticSink,
};

/// Shared output channel for all monitored threads.
///
/// The level check happens before the lock is taken, so suppressed lines
/// cost one comparison and no formatting when built through
/// [`DiagnosticChannel::emit_with`].
pub struct DiagnosticChannel {
    min_level: LogLevel,
    sink:      SpinMutex<Box<dyn DiagnosticSink>>,
}

impl DiagnosticChannel {
    /// Channel delivering records at or above `min_level` to `sink`.
    pub fn new(sink: impl DiagnosticSink + 'static, min_level: LogLevel) -> Self {
        Self {
            min_level,
            sink: SpinMutex::new(Box::new(sink)),
        }
    }

    /// Lowest level delivered
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Whether a record at `level` would be delivered
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Deliver a record if its level passes the filter.
    pub fn emit(&self, record: DiagnosticRecord) {
        if self.enabled(record.level) {
            self.sink.lock().write_record(&record);
        }
    }

    /// Build and deliver a record only if `level` passes the filter.
    pub fn emit_with(&self, level: LogLevel, build: impl FnOnce() -> DiagnosticRecord) {
        if self.enabled(level) {
            let record = build();
            self.sink.lock().write_record(&record);
        }
    }

    /// Swap the sink, returning the previous one.
    pub fn replace_sink(&self, sink: impl DiagnosticSink + 'static) -> Box<dyn DiagnosticSink> {
        core::mem::replace(&mut *self.sink.lock(), Box::new(sink))
    }

    /// Flush the sink.
    pub fn flush(&self) {
        self.sink.lock().flush();
    }
}

impl fmt::Debug for DiagnosticChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChannel")
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}
