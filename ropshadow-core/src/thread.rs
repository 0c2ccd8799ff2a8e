// ropshadow - ropshadow-core
// Module: Thread State
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Per-thread monitor state and where it lives.
//!
//! Everything the monitor mutates per event belongs to exactly one monitored
//! thread and is never touched by another, so none of it is locked. A
//! [`ThreadStore`] decides how a thread finds its own state: real
//! thread-local storage when callbacks run on the monitored threads, or a
//! map keyed by logical thread id when a trace is replayed on one thread.

use std::{
    cell::RefCell,
    collections::HashMap,
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
};

use ropshadow_logging::IndentContext;

use crate::{
    exception::PendingUnwinds,
    frame::ThreadId,
    heuristic::{
        GadgetChainDetector,
        HeuristicThresholds,
    },
    shadow_stack::ShadowStack,
};

/// Everything the monitor tracks for one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    /// Owning thread
    pub thread:  ThreadId,
    /// Mirror of the thread's call stack
    pub stack:   ShadowStack,
    /// Unwind contexts awaiting resolution
    pub unwinds: PendingUnwinds,
    /// Gadget-chain counters
    pub gadgets: GadgetChainDetector,
    /// Indentation of this thread's diagnostic lines
    pub indent:  IndentContext,
}

impl ThreadState {
    /// Fresh state for `thread`.
    #[must_use]
    pub fn new(thread: ThreadId, max_pending_unwinds: usize, thresholds: HeuristicThresholds) -> Self {
        Self {
            thread,
            stack: ShadowStack::new(),
            unwinds: PendingUnwinds::new(max_pending_unwinds),
            gadgets: GadgetChainDetector::new(thresholds),
            indent: IndentContext::new(),
        }
    }
}

/// Where thread states live.
pub trait ThreadStore {
    /// Install state for its thread, returning any state it replaces.
    fn attach(&self, state: ThreadState) -> Option<ThreadState>;

    /// Remove and return the state of `thread`.
    fn detach(&self, thread: ThreadId) -> Option<ThreadState>;

    /// Run `f` on the state of `thread`.
    ///
    /// `None` if the thread has no state, or if called re-entrantly from
    /// inside another `with_thread` on the same store and thread.
    fn with_thread<R>(&self, thread: ThreadId, f: impl FnOnce(&mut ThreadState) -> R) -> Option<R>;
}

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static LOCAL_STATES: RefCell<HashMap<(usize, ThreadId), ThreadState>> =
        RefCell::new(HashMap::new());
}

/// Thread states in real thread-local storage.
///
/// Each OS thread sees only the states it attached itself. Several stores
/// may coexist; each has its own slots.
#[derive(Debug)]
pub struct LocalThreadStore {
    id: usize,
}

impl LocalThreadStore {
    /// A store with slots of its own.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for LocalThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadStore for LocalThreadStore {
    fn attach(&self, state: ThreadState) -> Option<ThreadState> {
        LOCAL_STATES
            .try_with(|slots| {
                slots
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut slots| slots.insert((self.id, state.thread), state))
            })
            .ok()
            .flatten()
    }

    fn detach(&self, thread: ThreadId) -> Option<ThreadState> {
        LOCAL_STATES
            .try_with(|slots| {
                slots
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut slots| slots.remove(&(self.id, thread)))
            })
            .ok()
            .flatten()
    }

    fn with_thread<R>(&self, thread: ThreadId, f: impl FnOnce(&mut ThreadState) -> R) -> Option<R> {
        LOCAL_STATES
            .try_with(|slots| {
                let mut slots = slots.try_borrow_mut().ok()?;
                slots.get_mut(&(self.id, thread)).map(f)
            })
            .ok()
            .flatten()
    }
}

impl Drop for LocalThreadStore {
    fn drop(&mut self) {
        // Other threads' slots go away with those threads.
        let id = self.id;
        let _ = LOCAL_STATES.try_with(|slots| {
            if let Ok(mut slots) = slots.try_borrow_mut() {
                slots.retain(|(store, _), _| *store != id);
            }
        });
    }
}

/// Thread states keyed by logical thread id, for replaying a recorded trace
/// on a single OS thread.
#[derive(Debug, Default)]
pub struct ReplayThreadStore {
    states: RefCell<HashMap<ThreadId, ThreadState>>,
}

impl ReplayThreadStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Threads with state, in ascending id order
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        let mut ids: Vec<_> = self.states.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of the state of `thread`
    #[must_use]
    pub fn snapshot(&self, thread: ThreadId) -> Option<ThreadState> {
        self.states.borrow().get(&thread).cloned()
    }
}

impl ThreadStore for ReplayThreadStore {
    fn attach(&self, state: ThreadState) -> Option<ThreadState> {
        self.states.try_borrow_mut().ok()?.insert(state.thread, state)
    }

    fn detach(&self, thread: ThreadId) -> Option<ThreadState> {
        self.states.try_borrow_mut().ok()?.remove(&thread)
    }

    fn with_thread<R>(&self, thread: ThreadId, f: impl FnOnce(&mut ThreadState) -> R) -> Option<R> {
        self.states.try_borrow_mut().ok()?.get_mut(&thread).map(f)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
    };

    use super::*;
    use crate::frame::{
        Address,
        CallFrame,
    };

    fn state(tid: u32) -> ThreadState {
        ThreadState::new(ThreadId(tid), 4, HeuristicThresholds::default())
    }

    fn push(store: &impl ThreadStore, tid: u32, ret: u64) {
        store
            .with_thread(ThreadId(tid), |s| s.stack.push(CallFrame::call(Address(ret - 5), Address(ret))))
            .unwrap();
    }

    #[test]
    fn test_replay_store_lifecycle() {
        let store = ReplayThreadStore::new();
        assert!(store.attach(state(1)).is_none());
        push(&store, 1, 0x105);
        assert_eq!(store.threads(), vec![ThreadId(1)]);
        assert_eq!(store.snapshot(ThreadId(1)).map(|s| s.stack.size()), Some(1));

        let detached = store.detach(ThreadId(1)).unwrap();
        assert_eq!(detached.stack.size(), 1);
        assert!(store.with_thread(ThreadId(1), |_| ()).is_none());
    }

    #[test]
    fn test_replay_store_rejects_reentry() {
        let store = ReplayThreadStore::new();
        store.attach(state(1));
        let inner = store.with_thread(ThreadId(1), |_| store.with_thread(ThreadId(1), |_| ()));
        assert_eq!(inner, Some(None));
    }

    #[test]
    fn test_local_stores_are_separate() {
        let a = LocalThreadStore::new();
        let b = LocalThreadStore::new();
        a.attach(state(0));
        b.attach(state(0));
        push(&a, 0, 0x105);
        assert_eq!(a.with_thread(ThreadId(0), |s| s.stack.size()), Some(1));
        assert_eq!(b.with_thread(ThreadId(0), |s| s.stack.size()), Some(0));
    }

    #[test]
    fn test_local_store_is_per_os_thread() {
        let store = Arc::new(LocalThreadStore::new());
        store.attach(state(0));
        push(&*store, 0, 0x105);

        let remote = Arc::clone(&store);
        let seen_elsewhere = thread::spawn(move || remote.with_thread(ThreadId(0), |s| s.stack.size()))
            .join()
            .unwrap();
        assert_eq!(seen_elsewhere, None);
        assert_eq!(store.with_thread(ThreadId(0), |s| s.stack.size()), Some(1));
    }

    #[test]
    fn test_local_store_drop_clears_slots() {
        let store = LocalThreadStore::new();
        let id = store.id;
        store.attach(state(3));
        drop(store);
        let remaining = LOCAL_STATES.with(|slots| slots.borrow().keys().filter(|(s, _)| *s == id).count());
        assert_eq!(remaining, 0);
    }
}
