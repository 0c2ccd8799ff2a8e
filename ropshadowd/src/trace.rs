//! Recorded trace format.
//!
//! A trace is a JSON-lines file. Each line is either a monitor event, tagged
//! by `event` exactly as [`MonitorEvent`] serializes, or a directive that
//! supplies information a live engine would provide on demand:
//!
//! ```text
//! {"event":"unwind_context","handle":"0x7ffd0000","handler":"0x401080"}
//! {"event":"symbol","address":"0x401000","name":"main"}
//! {"event":"thread_start","thread":0}
//! {"event":"call","thread":0,"call_site":"0x401000","return_address":"0x401005"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::io::BufRead;

use anyhow::{
    Context,
    Result,
};
use ropshadow_core::{
    Address,
    MonitorEvent,
    UnwindHandle,
};
use serde::Deserialize;

/// Information a live engine would provide on demand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Directive {
    /// The catch handler an unwind context resolves to
    UnwindContext {
        /// Context handle as reported by `exception_dispatch`
        handle:  UnwindHandle,
        /// Resolved catch handler address
        handler: Address,
    },
    /// A routine start address and name
    Symbol {
        /// Routine start
        address: Address,
        /// Routine name
        name:    String,
    },
}

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TraceRecord {
    /// An engine event
    Event(MonitorEvent),
    /// A directive
    Directive(Directive),
}

/// Parse one line, `None` for blank lines and comments.
///
/// # Errors
///
/// If the line is neither a known event nor a directive.
pub fn parse_line(line: &str) -> Option<Result<TraceRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line).with_context(|| format!("unrecognized trace record: {line}")))
}

/// Iterator over the records of a trace, with 1-based line numbers.
pub struct TraceReader<R> {
    reader:      R,
    line_number: usize,
    buffer:      String,
}

impl<R: BufRead> TraceReader<R> {
    /// Read records from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: String::new(),
        }
    }

    /// Number of the last line read
    #[must_use]
    pub const fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<(usize, TraceRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => self.line_number += 1,
                Err(e) => {
                    return Some(
                        Err(e).with_context(|| format!("failed to read trace line {}", self.line_number + 1)),
                    );
                },
            }
            let line_number = self.line_number;
            if let Some(record) = parse_line(&self.buffer) {
                return Some(record.map(|r| (line_number, r)).with_context(|| format!("line {line_number}")));
            }
        }
    }
}
