// ropshadow - ropshadow-core
// Module: Exception Bridge
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Synthetic frames for exception unwinding.
//!
//! When the unwinder starts dispatching, the monitor records the handle of
//! its context. When the dispatch routine is about to return, the handle is
//! resolved to the catch handler address and a frame expecting that address
//! is slid in just below the top frame. The unwinder's eventual jump into
//! the handler then reconciles against it by skipping, instead of being
//! flagged.

use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    fmt,
};

use ropshadow_error::{
    Error,
    Result,
};
use ropshadow_sync::{
    CriticalSection,
    SpinMutex,
    with_critical,
};
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

/// Opaque reference to the unwinder's live context for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnwindHandle(pub Address);

impl fmt::Display for UnwindHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Turns an unwind handle into the address execution will resume at.
///
/// Implementations read live unwinder state, so callers hold the client
/// critical section while resolving.
pub trait UnwindResolver: Send + Sync {
    /// Catch handler address for `handle`.
    ///
    /// # Errors
    ///
    /// An unwind error if the handle is unknown or the unwinder state cannot
    /// be read.
    fn resolve(&self, handle: UnwindHandle) -> Result<Address>;
}

/// Adapts a closure into an [`UnwindResolver`].
pub struct FnResolver<F>(pub F);

impl<F> UnwindResolver for FnResolver<F>
where
    F: Fn(UnwindHandle) -> Option<Address> + Send + Sync,
{
    fn resolve(&self, handle: UnwindHandle) -> Result<Address> {
        (self.0)(handle).ok_or(Error::UNWIND_RESOLUTION_FAILED)
    }
}

/// Resolver backed by a table of known contexts.
///
/// Recorded traces declare each context's handler address ahead of the
/// dispatch that uses it.
#[derive(Debug, Default)]
pub struct TableResolver {
    table: SpinMutex<HashMap<UnwindHandle, Address>>,
}

impl TableResolver {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the handler address for `handle`.
    pub fn insert(&self, handle: UnwindHandle, handler: Address) {
        self.table.lock().insert(handle, handler);
    }

    /// Number of known contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no context is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

impl UnwindResolver for TableResolver {
    fn resolve(&self, handle: UnwindHandle) -> Result<Address> {
        self.table
            .lock()
            .get(&handle)
            .copied()
            .ok_or(Error::UNWIND_RESOLUTION_FAILED)
    }
}

impl<R: UnwindResolver + ?Sized> UnwindResolver for std::sync::Arc<R> {
    fn resolve(&self, handle: UnwindHandle) -> Result<Address> {
        (**self).resolve(handle)
    }
}

/// Unresolved unwind handles of one thread, newest last.
///
/// Nested dispatches stack up instead of overwriting each other. The bound
/// keeps a thread that dispatches without ever resuming from growing without
/// limit; past it the oldest handle is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUnwinds {
    handles: VecDeque<UnwindHandle>,
    limit:   usize,
}

impl PendingUnwinds {
    /// Default bound on unresolved handles per thread
    pub const DEFAULT_LIMIT: usize = 16;

    /// Empty set holding at most `limit` handles (at least one).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            handles: VecDeque::with_capacity(limit.min(Self::DEFAULT_LIMIT)),
            limit,
        }
    }

    /// Record a new dispatch. Returns the evicted oldest handle, if any.
    pub fn push(&mut self, handle: UnwindHandle) -> Option<UnwindHandle> {
        let evicted = if self.handles.len() >= self.limit {
            self.handles.pop_front()
        } else {
            None
        };
        self.handles.push_back(handle);
        evicted
    }

    /// Take the most recent unresolved handle.
    pub fn pop_newest(&mut self) -> Option<UnwindHandle> {
        self.handles.pop_back()
    }

    /// Number of unresolved handles
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Bound on unresolved handles
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for PendingUnwinds {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

/// What the bridge did on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInsertion {
    /// Handle that was consumed
    pub handle:  UnwindHandle,
    /// Resolved catch handler address
    pub handler: Address,
    /// Real frame lifted over the handler frame, `None` if the stack was empty
    pub lifted:  Option<CallFrame>,
}

/// Pushes a handler frame below the current top frame.
///
/// The top frame belongs to the routine that is about to return normally,
/// so it has to stay on top. On an empty stack the handler frame is simply
/// pushed.
pub fn splice_handler_frame(stack: &mut ShadowStack, handler: Address) -> Option<CallFrame> {
    let top = stack.pop().ok();
    stack.push(CallFrame::exception_handler(handler));
    if let Some(frame) = top {
        stack.push(frame);
    }
    top
}

/// Exception bridge bound to an unwinder and the engine's client lock.
pub struct ExceptionBridge<'a> {
    resolver: &'a dyn UnwindResolver,
    section:  &'a dyn CriticalSection,
}

impl<'a> ExceptionBridge<'a> {
    /// Bridge using `resolver` under `section`.
    pub fn new(resolver: &'a dyn UnwindResolver, section: &'a dyn CriticalSection) -> Self {
        Self { resolver, section }
    }

    /// Record the context of a dispatch that just started.
    ///
    /// Returns a handle evicted because the pending set was full.
    pub fn on_dispatch(
        &self,
        pending: &mut PendingUnwinds,
        handle: UnwindHandle,
    ) -> Option<UnwindHandle> {
        pending.push(handle)
    }

    /// Resolve the newest pending context and insert its handler frame.
    ///
    /// Resolution and the stack edit run inside the client critical section.
    ///
    /// # Errors
    ///
    /// [`Error::UNWIND_CONTEXT_MISSING`] if nothing is pending, or the
    /// resolver's error. In both cases the stack is untouched; a resolution
    /// failure still consumes the handle.
    pub fn on_resume(
        &self,
        pending: &mut PendingUnwinds,
        stack: &mut ShadowStack,
    ) -> Result<HandlerInsertion> {
        let handle = pending.pop_newest().ok_or(Error::UNWIND_CONTEXT_MISSING)?;
        let resolver = self.resolver;
        with_critical(self.section, || {
            let handler = resolver.resolve(handle)?;
            let lifted = splice_handler_frame(stack, handler);
            Ok(HandlerInsertion {
                handle,
                handler,
                lifted,
            })
        })
        .unwrap_or(Err(Error::UNWIND_RESOLUTION_FAILED))
    }
}
