// ropshadow - ropshadow-core
// Module: Shadow Stack Verifier
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Runtime control-flow integrity checks for an instrumented process.
//!
//! The [`Monitor`] consumes the call, return, unwind and signal events an
//! instrumentation engine reports for every thread, and keeps a shadow copy
//! of each thread's call stack. A return whose target matches no recorded
//! frame is a [`Violation`]. Legitimate non-local control flow is tolerated:
//! returns may skip frames, exception unwinding inserts a frame for the
//! catch handler, and signal delivery pushes a frame for the interrupted
//! instruction. A second detector flags chains of very short
//! return-terminated instruction sequences.
//!
//! Detection never terminates the process by itself. Every callback returns
//! `Result<(), Violation>`, and the driver hands errors to a [`Reporter`].
//!
//! ```
//! use ropshadow_core::{
//!     Address, EventConsumer, Monitor, MonitorConfig, ReplayThreadStore, ThreadId, Violation,
//! };
//! use ropshadow_logging::NullSink;
//!
//! let monitor = Monitor::builder(MonitorConfig::default())
//!     .thread_store(ReplayThreadStore::new())
//!     .sink(NullSink)
//!     .build();
//!
//! let t = ThreadId(7);
//! monitor.on_thread_start(t).unwrap();
//! monitor.on_call(t, Address(0x1000), Address(0x1005)).unwrap();
//! monitor.on_call(t, Address(0x2000), Address(0x2005)).unwrap();
//! // A longjmp-style return straight to the outer caller is accepted.
//! monitor.on_return(t, Address(0x3000), Address(0x1005)).unwrap();
//!
//! monitor.on_call(t, Address(0x1000), Address(0x1005)).unwrap();
//! let violation = monitor.on_return(t, Address(0x3000), Address(0x4141_4141)).unwrap_err();
//! assert!(matches!(violation, Violation::ReturnAddress { .. }));
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod event;
pub mod exception;
pub mod frame;
pub mod heuristic;
pub mod monitor;
pub mod reconciler;
pub mod shadow_stack;
pub mod signal;
pub mod stats;
pub mod symbols;
pub mod thread;
pub mod violation;

pub use config::{
    DetectionMode,
    MonitorConfig,
};
pub use event::{
    EventConsumer,
    MonitorEvent,
};
pub use exception::{
    ExceptionBridge,
    FnResolver,
    HandlerInsertion,
    PendingUnwinds,
    TableResolver,
    UnwindHandle,
    UnwindResolver,
};
pub use frame::{
    Address,
    CallFrame,
    FrameKind,
    ThreadId,
};
pub use heuristic::{
    ChainSuspicion,
    GadgetChainDetector,
    HeuristicThresholds,
    ReturnClass,
};
pub use monitor::{
    Monitor,
    MonitorBuilder,
};
pub use reconciler::{
    Reconciliation,
    reconcile,
};
pub use ropshadow_error::{
    Error,
    ErrorCategory,
    Result,
};
pub use shadow_stack::ShadowStack;
pub use signal::{
    ContextChangeReason,
    SignalAction,
    SignalContext,
    bridge_context_change,
};
pub use stats::{
    MonitorStatistics,
    StatisticsSnapshot,
};
pub use symbols::{
    NoSymbols,
    SymbolResolver,
    SymbolTable,
};
pub use thread::{
    LocalThreadStore,
    ReplayThreadStore,
    ThreadState,
    ThreadStore,
};
pub use violation::{
    ProcessReporter,
    Reporter,
    Violation,
};
