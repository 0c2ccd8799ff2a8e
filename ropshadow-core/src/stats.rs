// ropshadow - ropshadow-core
// Module: Monitor Statistics
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Counters shared by all monitored threads.

use core::{
    fmt,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

use serde::Serialize;

/// Event counters, updated with relaxed atomics from every thread.
#[derive(Debug, Default)]
pub struct MonitorStatistics {
    calls:            AtomicU64,
    returns:          AtomicU64,
    frames_skipped:   AtomicU64,
    exception_frames: AtomicU64,
    signal_frames:    AtomicU64,
    empty_pops:       AtomicU64,
    unwind_failures:  AtomicU64,
    instructions:     AtomicU64,
    threads_started:  AtomicU64,
    threads_ended:    AtomicU64,
    peak_depth:       AtomicU64,
    violations:       AtomicU64,
}

impl MonitorStatistics {
    /// All counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_call(&self, depth: usize) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skips(&self, count: usize) {
        if count > 0 {
            self.frames_skipped.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_exception_frame(&self) {
        self.exception_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_signal_frame(&self, depth: usize) {
        self.signal_frames.fetch_add(1, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_pop(&self) {
        self.empty_pops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unwind_failure(&self) {
        self.unwind_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_instruction(&self) {
        self.instructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_thread_start(&self) {
        self.threads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_thread_end(&self) {
        self.threads_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    ///
    /// Counters are read one at a time, so a snapshot taken while threads
    /// are running need not be consistent across fields.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            calls:            self.calls.load(Ordering::Relaxed),
            returns:          self.returns.load(Ordering::Relaxed),
            frames_skipped:   self.frames_skipped.load(Ordering::Relaxed),
            exception_frames: self.exception_frames.load(Ordering::Relaxed),
            signal_frames:    self.signal_frames.load(Ordering::Relaxed),
            empty_pops:       self.empty_pops.load(Ordering::Relaxed),
            unwind_failures:  self.unwind_failures.load(Ordering::Relaxed),
            instructions:     self.instructions.load(Ordering::Relaxed),
            threads_started:  self.threads_started.load(Ordering::Relaxed),
            threads_ended:    self.threads_ended.load(Ordering::Relaxed),
            peak_depth:       self.peak_depth.load(Ordering::Relaxed),
            violations:       self.violations.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`MonitorStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatisticsSnapshot {
    /// Calls pushed
    pub calls:            u64,
    /// Returns checked
    pub returns:          u64,
    /// Frames discarded by frame skipping
    pub frames_skipped:   u64,
    /// Handler frames inserted by the exception bridge
    pub exception_frames: u64,
    /// Frames pushed by the signal bridge
    pub signal_frames:    u64,
    /// Returns seen with an empty shadow stack
    pub empty_pops:       u64,
    /// Unwind contexts that could not be resolved
    pub unwind_failures:  u64,
    /// Instructions fed to the gadget heuristic
    pub instructions:     u64,
    /// Threads started
    pub threads_started:  u64,
    /// Threads ended
    pub threads_ended:    u64,
    /// Deepest shadow stack seen on any thread
    pub peak_depth:       u64,
    /// Violations detected
    pub violations:       u64,
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "calls:            {}", self.calls)?;
        writeln!(f, "returns:          {}", self.returns)?;
        writeln!(f, "frames skipped:   {}", self.frames_skipped)?;
        writeln!(f, "exception frames: {}", self.exception_frames)?;
        writeln!(f, "signal frames:    {}", self.signal_frames)?;
        writeln!(f, "empty pops:       {}", self.empty_pops)?;
        writeln!(f, "unwind failures:  {}", self.unwind_failures)?;
        writeln!(f, "instructions:     {}", self.instructions)?;
        writeln!(f, "threads:          {} started, {} ended", self.threads_started, self.threads_ended)?;
        writeln!(f, "peak depth:       {}", self.peak_depth)?;
        write!(f, "violations:       {}", self.violations)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
    };

    use super::*;

    #[test]
    fn test_peak_depth_keeps_maximum() {
        let stats = MonitorStatistics::new();
        stats.record_call(3);
        stats.record_call(1);
        stats.record_signal_frame(5);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.calls, 2);
        assert_eq!(snapshot.signal_frames, 1);
        assert_eq!(snapshot.peak_depth, 5);
    }

    #[test]
    fn test_zero_skips_are_not_counted() {
        let stats = MonitorStatistics::new();
        stats.record_skips(0);
        stats.record_skips(2);
        assert_eq!(stats.snapshot().frames_skipped, 2);
    }

    #[test]
    fn test_counts_from_many_threads() {
        let stats = Arc::new(MonitorStatistics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_return();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().returns, 1000);
    }

    #[test]
    fn test_summary_lines() {
        let stats = MonitorStatistics::new();
        stats.record_thread_start();
        stats.record_violation();
        let text = stats.snapshot().to_string();
        assert!(text.contains("threads:          1 started, 0 ended"));
        assert!(text.ends_with("violations:       1"));
    }
}
