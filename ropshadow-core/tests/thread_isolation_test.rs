//! Thread isolation tests for the ropshadow monitor.
//!
//! The monitor is shared by reference between real OS threads, exactly as
//! engine callbacks would share it, and every thread keeps its own shadow
//! stack in thread-local storage.

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            Barrier,
        },
        thread,
    };

    use ropshadow_core::{
        Address,
        DetectionMode,
        EventConsumer,
        Monitor,
        MonitorConfig,
        ThreadId,
        Violation,
    };
    use ropshadow_logging::{
        LogLevel,
        MemorySink,
    };

    fn shared_monitor(config: MonitorConfig) -> (Arc<Monitor>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let monitor = Monitor::builder(config).sink(Arc::clone(&sink)).build();
        (Arc::new(monitor), sink)
    }

    /// Nested calls then returns in reverse order, with addresses unique to
    /// `tid` so a cross-thread mix-up would be a violation.
    fn nested_run(monitor: &Monitor, tid: u32, depth: u64, barrier: &Barrier) -> Result<(), Violation> {
        let thread = ThreadId(tid);
        let base = u64::from(tid) << 32;
        monitor.on_thread_start(thread)?;
        for level in 0..depth {
            let site = base + level * 0x100;
            monitor.on_call(thread, Address(site), Address(site + 5))?;
            if level == depth / 2 {
                barrier.wait();
            }
        }
        for level in (0..depth).rev() {
            let site = base + level * 0x100;
            monitor.on_return(thread, Address(site + 0x80), Address(site + 5))?;
        }
        let remaining = monitor.depth(thread);
        monitor.on_thread_end(thread)?;
        assert_eq!(remaining, Some(0));
        Ok(())
    }

    #[test]
    fn concurrent_threads_never_cross_verify() {
        let (monitor, _sink) = shared_monitor(MonitorConfig {
            log_level: LogLevel::Warn,
            ..MonitorConfig::default()
        });
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [1u32, 2]
            .into_iter()
            .map(|tid| {
                let monitor = Arc::clone(&monitor);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || nested_run(&monitor, tid, 64, &barrier))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let stats = monitor.statistics().snapshot();
        assert_eq!(stats.calls, 128);
        assert_eq!(stats.returns, 128);
        assert_eq!(stats.violations, 0);
        assert_eq!(stats.peak_depth, 64);
    }

    #[test]
    fn state_of_one_thread_is_invisible_to_another() {
        let (monitor, _sink) = shared_monitor(MonitorConfig::default());
        let main = ThreadId(10);
        monitor.on_thread_start(main).unwrap();
        monitor.on_call(main, Address(0x1000), Address(0x1005)).unwrap();

        let remote = Arc::clone(&monitor);
        let seen = thread::spawn(move || remote.depth(main)).join().unwrap();
        assert_eq!(seen, None);
        assert_eq!(monitor.depth(main), Some(1));
    }

    #[test]
    fn diagnostic_lines_never_interleave() {
        let (monitor, sink) = shared_monitor(MonitorConfig::default());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (1u32..=4)
            .map(|tid| {
                let monitor = Arc::clone(&monitor);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || nested_run(&monitor, tid, 16, &barrier))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        for record in sink.records() {
            let rendered = record.render();
            assert_eq!(rendered.trim_start(), format!("t{}: {}", record.thread, record.text));
        }
        assert_eq!(sink.records().len(), 4 * 32);
    }

    #[test]
    fn gadget_counters_are_per_thread() {
        let (monitor, _sink) = shared_monitor(MonitorConfig {
            mode: DetectionMode::GadgetHeuristic,
            ..MonitorConfig::default()
        });

        // One short sequence on each of two threads is not a chain.
        monitor.on_instruction(ThreadId(1), Address(0x10), true).unwrap();
        let remote = Arc::clone(&monitor);
        thread::spawn(move || remote.on_instruction(ThreadId(2), Address(0x20), true))
            .join()
            .unwrap()
            .unwrap();

        // A second one on the first thread is.
        assert!(monitor.on_instruction(ThreadId(1), Address(0x11), true).is_err());
    }
}
