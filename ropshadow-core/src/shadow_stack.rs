// ropshadow - ropshadow-core
// Module: Shadow Stack
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Per-thread mirror of the real call stack.

use ropshadow_error::{
    Error,
    Result,
};

use crate::frame::CallFrame;

/// Last-in-first-out sequence of [`CallFrame`]s owned by one thread.
///
/// There is no lock here: a shadow stack is only ever reached through its
/// owning thread's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowStack {
    frames: Vec<CallFrame>,
    peak:   usize,
}

impl ShadowStack {
    /// An empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: Vec::new(),
            peak:   0,
        }
    }

    /// An empty stack with room for `capacity` frames before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            peak:   0,
        }
    }

    /// Append `frame` to the top.
    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
        self.peak = self.peak.max(self.frames.len());
    }

    /// Remove and return the top frame.
    ///
    /// # Errors
    ///
    /// [`Error::SHADOW_STACK_EMPTY`] if there is nothing to pop. Callers log
    /// it and carry on.
    pub fn pop(&mut self) -> Result<CallFrame> {
        self.frames.pop().ok_or(Error::SHADOW_STACK_EMPTY)
    }

    /// The top frame, if any.
    #[must_use]
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Number of frames.
    #[must_use]
    pub fn size(&self) -> usize {
        self.frames.len()
    }

    /// Whether the stack holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Deepest the stack has been since creation.
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    /// Frames from top to bottom.
    pub fn iter_top_down(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter().rev()
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Address;

    fn frame(n: u64) -> CallFrame {
        CallFrame::call(Address(n), Address(n + 5))
    }

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = ShadowStack::new();
        stack.push(frame(0x10));
        stack.push(frame(0x20));
        assert_eq!(stack.size(), 2);
        assert_eq!(stack.pop().unwrap(), frame(0x20));
        assert_eq!(stack.pop().unwrap(), frame(0x10));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_empty_is_reported() {
        let mut stack = ShadowStack::new();
        assert_eq!(stack.pop(), Err(Error::SHADOW_STACK_EMPTY));
        // The stack is still usable afterwards.
        stack.push(frame(1));
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_peak_tracks_deepest_point() {
        let mut stack = ShadowStack::with_capacity(4);
        for n in 0..3 {
            stack.push(frame(n));
        }
        stack.pop().unwrap();
        stack.pop().unwrap();
        stack.push(frame(9));
        assert_eq!(stack.peak(), 3);
        assert_eq!(stack.size(), 2);
    }

    #[test]
    fn test_iter_top_down() {
        let mut stack = ShadowStack::new();
        stack.push(frame(1));
        stack.push(frame(2));
        let order: Vec<_> = stack.iter_top_down().map(|f| f.call_site()).collect();
        assert_eq!(order, vec![Address(2), Address(1)]);
        stack.clear();
        assert!(stack.top().is_none());
    }
}
