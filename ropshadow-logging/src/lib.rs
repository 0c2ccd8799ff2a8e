// ropshadow - ropshadow-logging
// Module: Diagnostic Output
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Diagnostic output for the ropshadow monitor.
//!
//! Every line the monitor prints is a [`DiagnosticRecord`]: a thread id, a
//! level, an [`Emphasis`] used for colouring, and the indentation depth of
//! the thread's call nesting. Records flow through a [`DiagnosticChannel`],
//! which filters by level and serializes writes so lines from concurrent
//! threads never interleave.
//!
//! ```
//! use std::sync::Arc;
//!
//! use ropshadow_logging::{
//!     DiagnosticChannel, DiagnosticRecord, Emphasis, LogLevel, MemorySink,
//! };
//!
//! let sink = Arc::new(MemorySink::new());
//! let channel = DiagnosticChannel::new(Arc::clone(&sink), LogLevel::Debug);
//! channel.emit(DiagnosticRecord::new(3, LogLevel::Info, Emphasis::Skip, 2, "skipping a frame"));
//! assert_eq!(sink.lines(), vec!["  t3: skipping a frame".to_string()]);
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod indent;
pub mod level;
pub mod record;
pub mod sink;

pub use channel::DiagnosticChannel;
pub use indent::IndentContext;
pub use level::{
    Emphasis,
    LogLevel,
    ParseLogLevelError,
};
pub use record::DiagnosticRecord;
#[cfg(feature = "log")]
pub use sink::LogCrateSink;
pub use sink::{
    ConsoleSink,
    ConsoleTarget,
    DiagnosticSink,
    FnSink,
    MemorySink,
    NullSink,
};
