// ropshadow - ropshadow-core
// Module: Event Model
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Events delivered by the instrumentation engine, and the interface that
//! consumes them.

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    exception::UnwindHandle,
    frame::{
        Address,
        ThreadId,
    },
    signal::{
        ContextChangeReason,
        SignalContext,
    },
    violation::Violation,
};

/// One observation from the instrumentation engine.
///
/// Serialized with an `event` tag, one JSON object per line in recorded
/// traces:
///
/// ```
/// use ropshadow_core::{Address, MonitorEvent, ThreadId};
///
/// let event: MonitorEvent = serde_json::from_str(
///     r#"{"event":"call","thread":1,"call_site":"0x401000","return_address":"0x401005"}"#,
/// )
/// .unwrap();
/// assert_eq!(
///     event,
///     MonitorEvent::Call {
///         thread:         ThreadId(1),
///         call_site:      Address(0x40_1000),
///         return_address: Address(0x40_1005),
///     }
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A routine was entered through a call
    Call {
        /// Calling thread
        thread:         ThreadId,
        /// Address of the call instruction
        call_site:      Address,
        /// Address the callee will return to
        #[serde(alias = "target")]
        return_address: Address,
    },
    /// A return instruction is about to transfer control
    Return {
        /// Returning thread
        thread:      ThreadId,
        /// Address of the return instruction
        return_site: Address,
        /// Where it transfers to
        target:      Address,
    },
    /// The unwinder entered its dispatch phase
    ExceptionDispatch {
        /// Unwinding thread
        thread: ThreadId,
        /// Unwinder context for this dispatch
        handle: UnwindHandle,
    },
    /// The unwinder's dispatch routine is about to return into the handler
    ExceptionResume {
        /// Unwinding thread
        thread: ThreadId,
    },
    /// Asynchronous interruption of a thread
    ContextChange {
        /// Interrupted thread
        thread: ThreadId,
        /// Kind of interruption
        reason: ContextChangeReason,
        /// Interrupted instruction pointer
        ip:     Address,
        /// Interrupted stack pointer
        sp:     Address,
        /// Signal number or engine detail
        #[serde(default)]
        info:   i32,
    },
    /// An instruction executed, for the gadget-chain heuristic
    Instruction {
        /// Executing thread
        thread:    ThreadId,
        /// Instruction address
        address:   Address,
        /// Whether it is a return
        #[serde(default)]
        is_return: bool,
    },
    /// A thread started
    ThreadStart {
        /// New thread
        thread: ThreadId,
    },
    /// A thread ended
    ThreadEnd {
        /// Finished thread
        thread: ThreadId,
    },
}

impl MonitorEvent {
    /// Thread the event belongs to
    #[must_use]
    pub const fn thread(&self) -> ThreadId {
        match self {
            Self::Call { thread, .. }
            | Self::Return { thread, .. }
            | Self::ExceptionDispatch { thread, .. }
            | Self::ExceptionResume { thread }
            | Self::ContextChange { thread, .. }
            | Self::Instruction { thread, .. }
            | Self::ThreadStart { thread }
            | Self::ThreadEnd { thread } => *thread,
        }
    }

    /// Event name as it appears in traces
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Return { .. } => "return",
            Self::ExceptionDispatch { .. } => "exception_dispatch",
            Self::ExceptionResume { .. } => "exception_resume",
            Self::ContextChange { .. } => "context_change",
            Self::Instruction { .. } => "instruction",
            Self::ThreadStart { .. } => "thread_start",
            Self::ThreadEnd { .. } => "thread_end",
        }
    }
}

/// Consumer of engine events.
///
/// Methods take `&self` because the engine calls them concurrently from
/// every monitored thread. A method returns `Err` only for a confirmed
/// violation, which the caller must hand to a
/// [`Reporter`](crate::violation::Reporter).
pub trait EventConsumer {
    /// A call from `call_site` that will return to `return_address`.
    fn on_call(&self, thread: ThreadId, call_site: Address, return_address: Address) -> Result<(), Violation>;

    /// A return at `return_site` transferring to `target`.
    fn on_return(&self, thread: ThreadId, return_site: Address, target: Address) -> Result<(), Violation>;

    /// The unwinder began dispatching with context `handle`.
    fn on_exception_dispatch(&self, _thread: ThreadId, _handle: UnwindHandle) -> Result<(), Violation> {
        Ok(())
    }

    /// The unwinder's dispatch routine is about to return.
    fn on_exception_resume(&self, _thread: ThreadId) -> Result<(), Violation> {
        Ok(())
    }

    /// The thread was interrupted.
    fn on_context_change(
        &self,
        _thread: ThreadId,
        _reason: ContextChangeReason,
        _context: SignalContext,
    ) -> Result<(), Violation> {
        Ok(())
    }

    /// An instruction executed.
    fn on_instruction(&self, _thread: ThreadId, _address: Address, _is_return: bool) -> Result<(), Violation> {
        Ok(())
    }

    /// A thread started.
    fn on_thread_start(&self, _thread: ThreadId) -> Result<(), Violation> {
        Ok(())
    }

    /// A thread ended.
    fn on_thread_end(&self, _thread: ThreadId) -> Result<(), Violation> {
        Ok(())
    }

    /// Route `event` to the matching method.
    fn dispatch(&self, event: &MonitorEvent) -> Result<(), Violation> {
        match *event {
            MonitorEvent::Call {
                thread,
                call_site,
                return_address,
            } => self.on_call(thread, call_site, return_address),
            MonitorEvent::Return {
                thread,
                return_site,
                target,
            } => self.on_return(thread, return_site, target),
            MonitorEvent::ExceptionDispatch { thread, handle } => self.on_exception_dispatch(thread, handle),
            MonitorEvent::ExceptionResume { thread } => self.on_exception_resume(thread),
            MonitorEvent::ContextChange {
                thread,
                reason,
                ip,
                sp,
                info,
            } => self.on_context_change(thread, reason, SignalContext { ip, sp, info }),
            MonitorEvent::Instruction {
                thread,
                address,
                is_return,
            } => self.on_instruction(thread, address, is_return),
            MonitorEvent::ThreadStart { thread } => self.on_thread_start(thread),
            MonitorEvent::ThreadEnd { thread } => self.on_thread_end(thread),
        }
    }
}
