//! # ropshadow trace driver
//!
//! Replays a recorded instrumentation trace through the ropshadow monitor.
//! The trace stands in for a live instrumentation engine: it carries the
//! engine events one JSON object per line, plus directives for the symbol
//! names and unwind contexts an engine would look up on demand.
//!
//! The binary prints the monitor's diagnostics and exits with status 1 on
//! the first violation, or 2 if the trace or configuration cannot be read.

#![warn(missing_docs)]

pub mod replay;
pub mod settings;
pub mod trace;

pub use replay::{
    ReplayOutcome,
    Replayer,
};
pub use settings::Overrides;
pub use trace::{
    Directive,
    TraceReader,
    TraceRecord,
};

/// Exit status for a violation
pub const EXIT_VIOLATION: u8 = 1;
/// Exit status for unreadable input or configuration
pub const EXIT_INPUT_ERROR: u8 = 2;
