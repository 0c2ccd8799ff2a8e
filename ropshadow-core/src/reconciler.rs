// ropshadow - ropshadow-core
// Module: Stack Reconciler
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Verification of return targets against the shadow stack.
//!
//! A return is accepted when its target matches the top frame, or a frame
//! further down after the frames above it are discarded. Discarding covers
//! legitimate returns that bypass nested calls (`longjmp`, unwinding, tail
//! calls the instrumentation saw as calls). A return that exhausts the stack
//! without a match, or arrives when the stack is already empty, has no
//! recorded call site and is a violation.

use crate::{
    frame::{
        Address,
        CallFrame,
    },
    shadow_stack::ShadowStack,
};

/// Result of reconciling one return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The target matched `frame` after discarding `skipped` frames above it.
    Matched {
        /// Frame the return closed
        frame:   CallFrame,
        /// Frames discarded on the way
        skipped: usize,
    },
    /// Nothing was recorded, so the target cannot be verified.
    EmptyStack,
    /// Every frame was examined and none matched. The stack is now empty.
    Unmatched {
        /// Return target the top frame expected
        expected: Address,
        /// Frames popped while searching
        examined: usize,
    },
}

impl Reconciliation {
    /// Whether the return is acceptable
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Checks `observed` against `stack`, popping frames until one matches.
///
/// `on_skip` sees every frame discarded before the match. The last frame
/// examined in an unmatched search is not reported as a skip.
pub fn reconcile(
    stack: &mut ShadowStack,
    observed: Address,
    mut on_skip: impl FnMut(&CallFrame),
) -> Reconciliation {
    let Ok(mut frame) = stack.pop() else {
        return Reconciliation::EmptyStack;
    };
    let expected = frame.expected_return();
    let mut examined = 1;

    while !frame.matches(observed) {
        if stack.is_empty() {
            return Reconciliation::Unmatched { expected, examined };
        }
        on_skip(&frame);
        if let Ok(next) = stack.pop() {
            frame = next;
            examined += 1;
        }
    }

    Reconciliation::Matched {
        frame,
        skipped: examined - 1,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn stack_of(returns: &[u64]) -> ShadowStack {
        let mut stack = ShadowStack::new();
        for &ret in returns {
            stack.push(CallFrame::call(Address(ret - 5), Address(ret)));
        }
        stack
    }

    #[test]
    fn test_top_frame_matches() {
        let mut stack = stack_of(&[0x105, 0x205]);
        let outcome = reconcile(&mut stack, Address(0x205), |_| panic!("no skip expected"));
        assert!(matches!(outcome, Reconciliation::Matched { skipped: 0, .. }));
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_skips_intermediate_frames() {
        let mut stack = stack_of(&[0x105, 0x205, 0x305, 0x405]);
        let mut skipped = Vec::new();
        let outcome = reconcile(&mut stack, Address(0x205), |f| skipped.push(f.expected_return()));
        assert_eq!(skipped, vec![Address(0x405), Address(0x305)]);
        match outcome {
            Reconciliation::Matched { frame, skipped } => {
                assert_eq!(frame.expected_return(), Address(0x205));
                assert_eq!(skipped, 2);
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_unknown_target_is_unmatched() {
        let mut stack = stack_of(&[0x105, 0x205, 0x305]);
        let mut skips = 0;
        let outcome = reconcile(&mut stack, Address(0xdead), |_| skips += 1);
        assert_eq!(
            outcome,
            Reconciliation::Unmatched {
                expected: Address(0x305),
                examined: 3,
            }
        );
        assert!(!outcome.is_accepted());
        assert_eq!(skips, 2);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_empty_stack() {
        let mut stack = ShadowStack::new();
        let outcome = reconcile(&mut stack, Address(0x10), |_| {});
        assert_eq!(outcome, Reconciliation::EmptyStack);
        assert!(!outcome.is_accepted());
        assert!(stack.is_empty());
    }

    proptest! {
        #[test]
        fn balanced_calls_leave_stack_empty(depth in 1usize..64, base in 0x1000u64..0x10_0000) {
            let returns: Vec<u64> = (0..depth as u64).map(|i| base + i * 0x10 + 5).collect();
            let mut stack = stack_of(&returns);
            for &ret in returns.iter().rev() {
                let outcome = reconcile(&mut stack, Address(ret), |_| {});
                let matched = matches!(outcome, Reconciliation::Matched { skipped: 0, .. });
                prop_assert!(matched, "outcome was {:?}", outcome);
            }
            prop_assert!(stack.is_empty());
        }

        #[test]
        fn skipping_pops_exactly_the_frames_above(depth in 2usize..48, pick in 0usize..48) {
            let target_index = pick % depth;
            let returns: Vec<u64> = (0..depth as u64).map(|i| 0x4000 + i * 0x10 + 5).collect();
            let mut stack = stack_of(&returns);
            let mut skipped = 0;
            let outcome = reconcile(&mut stack, Address(returns[target_index]), |_| skipped += 1);
            let above = depth - 1 - target_index;
            prop_assert_eq!(skipped, above);
            let matched = matches!(outcome, Reconciliation::Matched { skipped: s, .. } if s == above);
            prop_assert!(matched, "outcome was {:?}", outcome);
            prop_assert_eq!(stack.size(), target_index);
        }

        #[test]
        fn absent_target_is_always_unmatched(depth in 1usize..32) {
            let returns: Vec<u64> = (0..depth as u64).map(|i| 0x8000 + i * 0x10 + 5).collect();
            let mut stack = stack_of(&returns);
            let outcome = reconcile(&mut stack, Address(0x1), |_| {});
            let unmatched = matches!(outcome, Reconciliation::Unmatched { examined, .. } if examined == depth);
            prop_assert!(unmatched, "outcome was {:?}", outcome);
        }
    }
}
