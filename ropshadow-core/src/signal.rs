// ropshadow - ropshadow-core
// Module: Signal Bridge
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Synthetic frames for asynchronous interruptions.

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    frame::{
        Address,
        CallFrame,
    },
    shadow_stack::ShadowStack,
};

/// Why the engine reports a context change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextChangeReason {
    /// A signal delivered to the program's handler
    Signal,
    /// A signal that will terminate the program
    FatalSignal,
    /// Any other engine-specific reason, by raw code
    Other(i32),
}

/// Register state captured at the interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalContext {
    /// Interrupted instruction pointer
    pub ip:   Address,
    /// Stack pointer at interruption
    pub sp:   Address,
    /// Signal number or engine-specific detail
    #[serde(default)]
    pub info: i32,
}

/// What the bridge did with a context change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// A frame expecting a return to the interrupted instruction was pushed
    FramePushed(CallFrame),
    /// Fatal signal, nothing to track
    Fatal,
    /// Unrecognized reason, nothing to track
    Unknown(i32),
}

/// Applies a context change to the interrupted thread's shadow stack.
///
/// Only deliverable signals change the stack. Their handler eventually
/// returns into the interrupted instruction, which is what the pushed frame
/// expects.
pub fn bridge_context_change(
    stack: &mut ShadowStack,
    reason: ContextChangeReason,
    context: SignalContext,
) -> SignalAction {
    match reason {
        ContextChangeReason::Signal => {
            let frame = CallFrame::signal(context.sp, context.ip);
            stack.push(frame);
            SignalAction::FramePushed(frame)
        },
        ContextChangeReason::FatalSignal => SignalAction::Fatal,
        ContextChangeReason::Other(code) => SignalAction::Unknown(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::FrameKind,
        reconciler::{
            Reconciliation,
            reconcile,
        },
    };

    fn context() -> SignalContext {
        SignalContext {
            ip:   Address(0x4005_00),
            sp:   Address(0x7ffe_1000),
            info: 10,
        }
    }

    #[test]
    fn test_signal_pushes_interrupted_ip() {
        let mut stack = ShadowStack::new();
        let action = bridge_context_change(&mut stack, ContextChangeReason::Signal, context());
        let SignalAction::FramePushed(frame) = action else {
            panic!("expected a pushed frame, got {action:?}");
        };
        assert_eq!(frame.kind(), FrameKind::Signal);
        assert_eq!(frame.call_site(), Address(0x7ffe_1000));
        assert_eq!(frame.expected_return(), Address(0x4005_00));
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_fatal_and_unknown_leave_stack_alone() {
        let mut stack = ShadowStack::new();
        assert_eq!(
            bridge_context_change(&mut stack, ContextChangeReason::FatalSignal, context()),
            SignalAction::Fatal
        );
        assert_eq!(
            bridge_context_change(&mut stack, ContextChangeReason::Other(7), context()),
            SignalAction::Unknown(7)
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn test_signal_frame_reconciles_without_disturbing_earlier_frames() {
        let mut stack = ShadowStack::new();
        stack.push(CallFrame::call(Address(0x100), Address(0x105)));
        bridge_context_change(&mut stack, ContextChangeReason::Signal, context());

        let outcome = reconcile(&mut stack, Address(0x4005_00), |_| panic!("no skip expected"));
        assert!(matches!(outcome, Reconciliation::Matched { skipped: 0, .. }));
        assert_eq!(stack.top().map(CallFrame::expected_return), Some(Address(0x105)));
    }

    #[test]
    fn test_reason_serde() {
        let reason: ContextChangeReason = serde_json::from_str("\"fatal_signal\"").unwrap();
        assert_eq!(reason, ContextChangeReason::FatalSignal);
        let other: ContextChangeReason = serde_json::from_str("{\"other\":3}").unwrap();
        assert_eq!(other, ContextChangeReason::Other(3));
    }
}
