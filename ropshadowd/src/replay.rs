//! Drives a [`Monitor`] from a recorded trace.

use std::{
    io::BufRead,
    sync::Arc,
};

use anyhow::Result;
use ropshadow_core::{
    EventConsumer,
    Monitor,
    MonitorConfig,
    ReplayThreadStore,
    StatisticsSnapshot,
    SymbolTable,
    TableResolver,
    Violation,
};
use ropshadow_logging::DiagnosticSink;
use tracing::{
    debug,
    info,
    warn,
};

use crate::trace::{
    Directive,
    TraceReader,
    TraceRecord,
};

/// How a replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every event was accepted
    Completed {
        /// Events delivered to the monitor
        events: usize,
    },
    /// The monitor reported a violation; the rest of the trace was not read
    Violation {
        /// Trace line of the offending event
        line:      usize,
        /// Events delivered, including the offending one
        events:    usize,
        /// What was detected
        violation: Violation,
    },
}

impl ReplayOutcome {
    /// The violation, if any
    #[must_use]
    pub const fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Completed { .. } => None,
            Self::Violation { violation, .. } => Some(violation),
        }
    }
}

/// A monitor fed from a trace, with the resolvers its directives fill in.
pub struct Replayer {
    monitor:  Monitor<ReplayThreadStore>,
    resolver: Arc<TableResolver>,
    symbols:  Arc<SymbolTable>,
}

impl Replayer {
    /// Replayer printing diagnostics to `sink`.
    pub fn new(config: MonitorConfig, sink: impl DiagnosticSink + 'static) -> Self {
        let resolver = Arc::new(TableResolver::new());
        let symbols = Arc::new(SymbolTable::new());
        let monitor = Monitor::builder(config)
            .thread_store(ReplayThreadStore::new())
            .sink(sink)
            .unwind_resolver(Arc::clone(&resolver))
            .symbols(Arc::clone(&symbols))
            .build();
        Self {
            monitor,
            resolver,
            symbols,
        }
    }

    /// The monitor being driven
    #[must_use]
    pub const fn monitor(&self) -> &Monitor<ReplayThreadStore> {
        &self.monitor
    }

    /// Counters so far
    #[must_use]
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.monitor.statistics().snapshot()
    }

    /// Apply one record.
    ///
    /// # Errors
    ///
    /// The violation the monitor detected, if any.
    pub fn apply(&self, record: TraceRecord) -> Result<(), Violation> {
        match record {
            TraceRecord::Event(event) => self.monitor.dispatch(&event),
            TraceRecord::Directive(Directive::UnwindContext { handle, handler }) => {
                debug!(%handle, %handler, "registered unwind context");
                self.resolver.insert(handle, handler);
                Ok(())
            },
            TraceRecord::Directive(Directive::Symbol { address, name }) => {
                debug!(%address, %name, "registered symbol");
                self.symbols.insert(address, name);
                Ok(())
            },
        }
    }

    /// Replay every record from `reader`, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// If the trace cannot be read or a line does not parse.
    pub fn run(&self, reader: impl BufRead) -> Result<ReplayOutcome> {
        let mut events = 0;
        let mut outcome = None;

        for entry in TraceReader::new(reader) {
            let (line, record) = entry?;
            if matches!(record, TraceRecord::Event(_)) {
                events += 1;
            }
            if let Err(violation) = self.apply(record) {
                warn!(line, thread = %violation.thread(), "{}", violation.headline());
                outcome = Some(ReplayOutcome::Violation {
                    line,
                    events,
                    violation,
                });
                break;
            }
        }
        self.monitor.channel().flush();

        let outcome = outcome.unwrap_or(ReplayOutcome::Completed { events });
        info!(events, clean = outcome.violation().is_none(), "trace replay finished");
        Ok(outcome)
    }
}
