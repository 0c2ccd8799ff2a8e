// ropshadow - ropshadow-core
// Module: Monitor
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! The monitor: per-thread state, detectors and diagnostics behind one
//! [`EventConsumer`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use ropshadow_core::{Address, EventConsumer, Monitor, MonitorConfig, ThreadId};
//! use ropshadow_logging::MemorySink;
//!
//! let sink = Arc::new(MemorySink::new());
//! let monitor = Monitor::builder(MonitorConfig::default())
//!     .sink(Arc::clone(&sink))
//!     .build();
//!
//! let t = ThreadId(0);
//! monitor.on_thread_start(t).unwrap();
//! monitor.on_call(t, Address(0x40_1000), Address(0x40_1005)).unwrap();
//! monitor.on_return(t, Address(0x40_2010), Address(0x40_1005)).unwrap();
//! assert!(monitor.on_call(t, Address(0x40_1000), Address(0x40_1005)).is_ok());
//! assert!(monitor.on_return(t, Address(0x40_2010), Address(0xdead)).is_err());
//! assert_eq!(sink.lines()[0], "t0: 0x401000: call 0x401005 <?>");
//! ```

use core::fmt;

use ropshadow_error::Error;
use ropshadow_logging::{
    ConsoleSink,
    ConsoleTarget,
    DiagnosticChannel,
    DiagnosticRecord,
    DiagnosticSink,
    Emphasis,
    LogLevel,
};
use ropshadow_sync::{
    CriticalSection,
    ParkingCriticalSection,
};

use crate::{
    config::MonitorConfig,
    event::EventConsumer,
    exception::{
        ExceptionBridge,
        TableResolver,
        UnwindHandle,
        UnwindResolver,
    },
    frame::{
        Address,
        CallFrame,
        ThreadId,
    },
    heuristic::ReturnClass,
    reconciler::{
        Reconciliation,
        reconcile,
    },
    signal::{
        ContextChangeReason,
        SignalAction,
        SignalContext,
        bridge_context_change,
    },
    stats::MonitorStatistics,
    symbols::{
        NoSymbols,
        SymbolResolver,
    },
    thread::{
        LocalThreadStore,
        ThreadState,
        ThreadStore,
    },
    violation::Violation,
};

/// Control-flow integrity monitor.
///
/// `S` decides where per-thread state lives. With the default
/// [`LocalThreadStore`] the monitor is `Sync` and every callback must run on
/// the thread it describes.
pub struct Monitor<S: ThreadStore = LocalThreadStore> {
    config:   MonitorConfig,
    store:    S,
    channel:  DiagnosticChannel,
    resolver: Box<dyn UnwindResolver>,
    symbols:  Box<dyn SymbolResolver>,
    critical: Box<dyn CriticalSection>,
    stats:    MonitorStatistics,
}

impl Monitor {
    /// Builder with thread-local state storage.
    #[must_use]
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }
}

impl<S: ThreadStore> Monitor<S> {
    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Event counters
    #[must_use]
    pub const fn statistics(&self) -> &MonitorStatistics {
        &self.stats
    }

    /// Thread state storage
    #[must_use]
    pub const fn thread_store(&self) -> &S {
        &self.store
    }

    /// Diagnostic channel
    #[must_use]
    pub const fn channel(&self) -> &DiagnosticChannel {
        &self.channel
    }

    /// Shadow stack depth of `thread`, `None` if it has no state here.
    #[must_use]
    pub fn depth(&self, thread: ThreadId) -> Option<usize> {
        self.store.with_thread(thread, |state| state.stack.size())
    }

    fn fresh_state(&self, thread: ThreadId) -> ThreadState {
        ThreadState::new(thread, self.config.max_pending_unwinds, self.config.thresholds())
    }

    /// Run `f` on the state of `thread`, creating it if the thread never
    /// announced itself.
    fn with_state<R>(&self, thread: ThreadId, f: impl FnOnce(&mut ThreadState) -> R) -> Option<R> {
        let mut pending = Some(f);
        if let Some(result) = self
            .store
            .with_thread(thread, |state| pending.take().map(|f| f(state)))
            .flatten()
        {
            return Some(result);
        }
        let f = pending?;

        self.channel.emit_with(LogLevel::Warn, || {
            DiagnosticRecord::new(
                thread.get(),
                LogLevel::Warn,
                Emphasis::Notice,
                0,
                "event for unknown thread, starting an empty shadow stack",
            )
        });
        self.store.attach(self.fresh_state(thread));
        let result = self.store.with_thread(thread, f);
        if result.is_none() {
            self.channel.emit_with(LogLevel::Error, || {
                DiagnosticRecord::new(
                    thread.get(),
                    LogLevel::Error,
                    Emphasis::Alert,
                    0,
                    Error::THREAD_NOT_REGISTERED.message,
                )
            });
        }
        result
    }

    fn note(
        &self,
        state: &ThreadState,
        level: LogLevel,
        emphasis: Emphasis,
        text: impl FnOnce() -> String,
    ) {
        self.channel.emit_with(level, || {
            DiagnosticRecord::new(state.thread.get(), level, emphasis, state.indent.depth(), text())
        });
    }

    fn symbol(&self, address: Address) -> String {
        self.symbols
            .symbol_for(address)
            .map_or_else(|| String::from("?"), |name| name.into_owned())
    }
}

impl<S: ThreadStore> EventConsumer for Monitor<S> {
    fn on_call(&self, thread: ThreadId, call_site: Address, return_address: Address) -> Result<(), Violation> {
        if !self.config.mode.shadow_stack() {
            return Ok(());
        }
        self.with_state(thread, |state| {
            state.stack.push(CallFrame::call(call_site, return_address));
            self.stats.record_call(state.stack.size());
            if self.config.trace_calls {
                self.note(state, LogLevel::Trace, Emphasis::Call, || {
                    format!("{call_site}: call {return_address} <{}>", self.symbol(return_address))
                });
            }
            state.indent.indent();
        });
        Ok(())
    }

    fn on_return(&self, thread: ThreadId, return_site: Address, target: Address) -> Result<(), Violation> {
        if !self.config.mode.shadow_stack() {
            return Ok(());
        }
        self.stats.record_return();

        let outcome = self.with_state(thread, |state| {
            state.indent.unindent();

            let ThreadState { stack, indent, .. } = state;
            let mut skipped = 0;
            let outcome = reconcile(stack, target, |_| {
                let depth = indent.depth();
                self.channel.emit_with(LogLevel::Debug, || {
                    DiagnosticRecord::new(thread.get(), LogLevel::Debug, Emphasis::Skip, depth, "skipping a frame")
                });
                indent.unindent();
                skipped += 1;
            });
            self.stats.record_skips(skipped);

            if outcome == Reconciliation::EmptyStack {
                self.stats.record_empty_pop();
                self.note(state, LogLevel::Warn, Emphasis::Notice, || {
                    Error::SHADOW_STACK_EMPTY.message.to_string()
                });
            }
            if self.config.trace_calls {
                self.note(state, LogLevel::Trace, Emphasis::Return, || {
                    format!("{return_site}: ret (to {target})")
                });
            }
            outcome
        });

        match outcome {
            Some(Reconciliation::Unmatched { expected, examined }) => {
                self.stats.record_violation();
                Err(Violation::ReturnAddress {
                    thread,
                    return_site,
                    observed: target,
                    expected,
                    examined,
                })
            },
            // An empty pop yields a null frame, which no real target matches.
            Some(Reconciliation::EmptyStack) => {
                self.stats.record_violation();
                Err(Violation::ReturnAddress {
                    thread,
                    return_site,
                    observed: target,
                    expected: Address::NULL,
                    examined: 0,
                })
            },
            Some(Reconciliation::Matched { .. }) | None => Ok(()),
        }
    }

    fn on_exception_dispatch(&self, thread: ThreadId, handle: UnwindHandle) -> Result<(), Violation> {
        let bridge = ExceptionBridge::new(self.resolver.as_ref(), self.critical.as_ref());
        self.with_state(thread, |state| {
            if let Some(evicted) = bridge.on_dispatch(&mut state.unwinds, handle) {
                self.note(state, LogLevel::Warn, Emphasis::Notice, || {
                    format!("{}: dropped unwind context {evicted}", Error::UNWIND_CONTEXT_LIMIT.message)
                });
            }
        });
        Ok(())
    }

    fn on_exception_resume(&self, thread: ThreadId) -> Result<(), Violation> {
        if !self.config.mode.shadow_stack() {
            return Ok(());
        }
        let bridge = ExceptionBridge::new(self.resolver.as_ref(), self.critical.as_ref());
        self.with_state(thread, |state| {
            let ThreadState { stack, unwinds, .. } = state;
            match bridge.on_resume(unwinds, stack) {
                Ok(insertion) => {
                    self.stats.record_exception_frame();
                    self.note(state, LogLevel::Info, Emphasis::Notice, || {
                        format!("catch handler @ {}", insertion.handler)
                    });
                },
                Err(error) if error == Error::UNWIND_CONTEXT_MISSING => {
                    self.note(state, LogLevel::Warn, Emphasis::Notice, || error.message.to_string());
                },
                Err(error) => {
                    self.stats.record_unwind_failure();
                    self.note(state, LogLevel::Error, Emphasis::Alert, || error.to_string());
                },
            }
        });
        Ok(())
    }

    fn on_context_change(
        &self,
        thread: ThreadId,
        reason: ContextChangeReason,
        context: SignalContext,
    ) -> Result<(), Violation> {
        let track = self.config.mode.shadow_stack();
        self.with_state(thread, |state| match reason {
            ContextChangeReason::Signal => {
                self.note(state, LogLevel::Info, Emphasis::Notice, || {
                    format!("client program received signal {}", context.info)
                });
                if track {
                    if let SignalAction::FramePushed(_) =
                        bridge_context_change(&mut state.stack, reason, context)
                    {
                        self.stats.record_signal_frame(state.stack.size());
                    }
                }
            },
            ContextChangeReason::FatalSignal => {
                self.note(state, LogLevel::Error, Emphasis::Alert, || {
                    format!("client program received fatal signal {}", context.info)
                });
            },
            ContextChangeReason::Other(code) => {
                self.note(state, LogLevel::Info, Emphasis::Notice, || {
                    format!("unknown context change ({code})")
                });
            },
        });
        Ok(())
    }

    fn on_instruction(&self, thread: ThreadId, address: Address, is_return: bool) -> Result<(), Violation> {
        if !self.config.mode.heuristic() {
            return Ok(());
        }
        self.stats.record_instruction();
        let verdict = self.with_state(thread, |state| {
            if !is_return {
                state.gadgets.observe_instruction();
                return Ok(ReturnClass::Long);
            }
            state.gadgets.observe_return()
        });

        match verdict {
            Some(Err(suspicion)) => {
                self.stats.record_violation();
                Err(Violation::GadgetChain {
                    thread,
                    return_site: address,
                    chain: suspicion.chain,
                    instructions: suspicion.instructions,
                })
            },
            _ => Ok(()),
        }
    }

    fn on_thread_start(&self, thread: ThreadId) -> Result<(), Violation> {
        self.stats.record_thread_start();
        if let Some(previous) = self.store.attach(self.fresh_state(thread)) {
            self.note(&previous, LogLevel::Warn, Emphasis::Notice, || {
                format!("thread restarted, discarding {} frames", previous.stack.size())
            });
        }
        Ok(())
    }

    fn on_thread_end(&self, thread: ThreadId) -> Result<(), Violation> {
        self.stats.record_thread_end();
        if let Some(state) = self.store.detach(thread) {
            if !state.stack.is_empty() {
                self.note(&state, LogLevel::Debug, Emphasis::Plain, || {
                    format!("thread ended with {} frames outstanding", state.stack.size())
                });
            }
        }
        Ok(())
    }
}

impl<S: ThreadStore + fmt::Debug> fmt::Debug for Monitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("channel", &self.channel)
            .field("critical", &self.critical.name())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Monitor`].
pub struct MonitorBuilder<S: ThreadStore = LocalThreadStore> {
    config:   MonitorConfig,
    store:    S,
    sink:     Option<Box<dyn DiagnosticSink>>,
    resolver: Option<Box<dyn UnwindResolver>>,
    symbols:  Option<Box<dyn SymbolResolver>>,
    critical: Option<Box<dyn CriticalSection>>,
}

impl MonitorBuilder {
    /// Builder with thread-local state storage and a console sink.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: LocalThreadStore::new(),
            sink: None,
            resolver: None,
            symbols: None,
            critical: None,
        }
    }
}

impl<S: ThreadStore> MonitorBuilder<S> {
    /// Keep thread state in `store` instead.
    #[must_use]
    pub fn thread_store<T: ThreadStore>(self, store: T) -> MonitorBuilder<T> {
        MonitorBuilder {
            config: self.config,
            store,
            sink: self.sink,
            resolver: self.resolver,
            symbols: self.symbols,
            critical: self.critical,
        }
    }

    /// Deliver diagnostics to `sink`.
    #[must_use]
    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Resolve unwind contexts with `resolver`.
    #[must_use]
    pub fn unwind_resolver(mut self, resolver: impl UnwindResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Name call targets with `symbols`.
    #[must_use]
    pub fn symbols(mut self, symbols: impl SymbolResolver + 'static) -> Self {
        self.symbols = Some(Box::new(symbols));
        self
    }

    /// Guard unwind resolution with `section`.
    #[must_use]
    pub fn critical_section(mut self, section: impl CriticalSection + 'static) -> Self {
        self.critical = Some(Box::new(section));
        self
    }

    /// Build the monitor.
    ///
    /// Without a resolver every unwind resolution fails. Without a sink,
    /// diagnostics go to standard output.
    #[must_use]
    pub fn build(self) -> Monitor<S> {
        let colour = self.config.colour;
        let sink = self
            .sink
            .unwrap_or_else(|| Box::new(ConsoleSink::new(ConsoleTarget::Stdout, colour)));
        Monitor {
            channel:  DiagnosticChannel::new(sink, self.config.log_level),
            config:   self.config,
            store:    self.store,
            resolver: self.resolver.unwrap_or_else(|| Box::new(TableResolver::new())),
            symbols:  self.symbols.unwrap_or_else(|| Box::new(NoSymbols)),
            critical: self.critical.unwrap_or_else(|| Box::new(ParkingCriticalSection::new())),
            stats:    MonitorStatistics::new(),
        }
    }
}
