// ropshadow - ropshadow-sync
// Module: Client Critical Sections
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Critical sections that exclude the monitored program's own threads.
//!
//! Reading another thread's unwinder state while the program keeps running
//! is only sound if the instrumentation engine holds its client lock for the
//! duration. [`CriticalSection`] is the seam the engine plugs its lock into.

use core::sync::atomic::{
    AtomicBool,
    Ordering,
};

/// A lock that keeps the monitored program out while the monitor inspects it.
pub trait CriticalSection: Send + Sync {
    /// Runs `f` while holding the section.
    fn run(&self, f: &mut dyn FnMut());

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "critical-section"
    }
}

/// Runs `f` inside `section` and returns its result.
pub fn with_critical<R>(section: &dyn CriticalSection, f: impl FnOnce() -> R) -> Option<R> {
    let mut f = Some(f);
    let mut out = None;
    section.run(&mut || {
        if let Some(f) = f.take() {
            out = Some(f());
        }
    });
    out
}

/// Spinning critical section for engines without a client lock of their own.
#[derive(Debug, Default)]
pub struct SpinCriticalSection {
    held: AtomicBool,
}

impl SpinCriticalSection {
    /// Creates an unheld section.
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl CriticalSection for SpinCriticalSection {
    fn run(&self, f: &mut dyn FnMut()) {
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        f();
        self.held.store(false, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "spin"
    }
}

/// Blocking critical section backed by `parking_lot`.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct ParkingCriticalSection {
    lock: parking_lot::Mutex<()>,
}

#[cfg(feature = "std")]
impl ParkingCriticalSection {
    /// Creates an unheld section.
    pub const fn new() -> Self {
        Self {
            lock: parking_lot::const_mutex(()),
        }
    }
}

#[cfg(feature = "std")]
impl CriticalSection for ParkingCriticalSection {
    fn run(&self, f: &mut dyn FnMut()) {
        let _guard = self.lock.lock();
        f();
    }

    fn name(&self) -> &'static str {
        "parking"
    }
}

/// Section that excludes nothing.
///
/// For offline replay, where no monitored program is running.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCriticalSection;

impl CriticalSection for NoopCriticalSection {
    fn run(&self, f: &mut dyn FnMut()) {
        f();
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
