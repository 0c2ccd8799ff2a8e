// ropshadow - ropshadow-sync
// Module: Spin Mutex
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Spin mutex guarding the shared diagnostic channel.

use core::{
    cell::UnsafeCell,
    fmt,
    ops::{
        Deref,
        DerefMut,
    },
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use ropshadow_error::{
    Error,
    Result,
};

/// A non-reentrant spinlock mutex.
///
/// Used for state that every monitored thread touches briefly, such as the
/// diagnostic sink. It spins aggressively under contention and has no
/// poisoning, so critical sections protected by it must stay short.
pub struct SpinMutex<T: ?Sized> {
    locked: AtomicBool,
    data:   UnsafeCell<T>,
}

/// A guard that provides mutable access to the data protected by a
/// `SpinMutex`.
///
/// When the guard is dropped, the mutex is unlocked.
#[clippy::has_significant_drop]
pub struct SpinMutexGuard<'a, T: ?Sized + 'a> {
    mutex: &'a SpinMutex<T>,
}

/// # Safety
/// Access to the `UnsafeCell` data is protected by the atomic `locked` flag,
/// so only one thread reaches the data at a time (if `T` is `Send`).
unsafe impl<T: ?Sized + Send> Send for SpinMutex<T> {}
/// # Safety
/// All accesses to the data go through the lock, so sharing
/// `&SpinMutex<T>` between threads is sound whenever `T` is `Send`.
unsafe impl<T: ?Sized + Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Creates a new `SpinMutex` protecting the given data.
    #[inline]
    pub const fn new(data: T) -> Self {
        SpinMutex {
            locked: AtomicBool::new(false),
            data:   UnsafeCell::new(data),
        }
    }

    /// Consumes the mutex and returns the protected data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinMutex<T> {
    /// Acquires the lock, spinning until it is available.
    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        // Acquire on success so reads of the data happen after the lock is
        // taken. Failure needs no ordering, we just retry.
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinMutexGuard { mutex: self }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// # Errors
    ///
    /// Returns a concurrency error if another holder owns the lock.
    #[inline]
    pub fn try_lock(&self) -> Result<SpinMutexGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(SpinMutexGuard { mutex: self })
        } else {
            Err(Error::lock_contended("SpinMutex is held by another context"))
        }
    }

    /// Runs `f` with exclusive access to the protected data.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Returns a mutable reference to the data without locking.
    ///
    /// The exclusive borrow of `self` already rules out other holders.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Whether the lock is currently held. Only a snapshot.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never block inside Debug.
        match self.try_lock() {
            Ok(guard) => f.debug_struct("SpinMutex").field("data", &&*guard).finish(),
            Err(_) => f.debug_struct("SpinMutex").field("data", &"<locked>").finish(),
        }
    }
}

impl<T: ?Sized> Deref for SpinMutexGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &Self::Target {
        // # Safety
        // A guard only exists while the associated mutex is locked, which
        // grants this guard exclusive access to the data.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // # Safety
        // A guard only exists while the associated mutex is locked, which
        // grants this guard exclusive access to the data.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinMutexGuard<'_, T> {
    /// Releases the lock when the guard goes out of scope.
    #[inline]
    fn drop(&mut self) {
        // Release so writes made under the lock are visible to the next holder.
        self.mutex.locked.store(false, Ordering::Release);
    }
}
