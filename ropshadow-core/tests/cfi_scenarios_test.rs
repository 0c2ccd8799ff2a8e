//! End-to-end control-flow scenarios for the ropshadow monitor.
//!
//! Each test drives a [`Monitor`] through a recorded sequence of engine
//! events and checks the verdict, the resulting shadow stack and the
//! diagnostic lines.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use ropshadow_core::{
        Address,
        ContextChangeReason,
        DetectionMode,
        EventConsumer,
        FrameKind,
        Monitor,
        MonitorConfig,
        MonitorEvent,
        ReplayThreadStore,
        SignalContext,
        TableResolver,
        ThreadId,
        UnwindHandle,
        Violation,
    };
    use ropshadow_logging::{
        LogLevel,
        MemorySink,
    };

    const MAIN: ThreadId = ThreadId(1);

    struct Harness {
        monitor:  Monitor<ReplayThreadStore>,
        sink:     Arc<MemorySink>,
        resolver: Arc<TableResolver>,
    }

    fn harness(config: MonitorConfig) -> Harness {
        let sink = Arc::new(MemorySink::new());
        let resolver = Arc::new(TableResolver::new());
        let monitor = Monitor::builder(config)
            .thread_store(ReplayThreadStore::new())
            .sink(Arc::clone(&sink))
            .unwind_resolver(Arc::clone(&resolver))
            .build();
        monitor.on_thread_start(MAIN).unwrap();
        Harness {
            monitor,
            sink,
            resolver,
        }
    }

    fn call(site: u64, ret: u64) -> MonitorEvent {
        MonitorEvent::Call {
            thread:         MAIN,
            call_site:      Address(site),
            return_address: Address(ret),
        }
    }

    fn ret(site: u64, target: u64) -> MonitorEvent {
        MonitorEvent::Return {
            thread:      MAIN,
            return_site: Address(site),
            target:      Address(target),
        }
    }

    fn run(harness: &Harness, events: &[MonitorEvent]) -> Result<(), Violation> {
        events.iter().try_for_each(|event| harness.monitor.dispatch(event))
    }

    #[test]
    fn balanced_nesting_is_accepted() {
        let h = harness(MonitorConfig::default());
        run(
            &h,
            &[
                call(0x1000, 0x1005),
                call(0x2000, 0x2005),
                call(0x3000, 0x3005),
                ret(0x3100, 0x3005),
                ret(0x2100, 0x2005),
                ret(0x1100, 0x1005),
            ],
        )
        .unwrap();

        assert_eq!(h.monitor.depth(MAIN), Some(0));
        let stats = h.monitor.statistics().snapshot();
        assert_eq!((stats.calls, stats.returns, stats.peak_depth), (3, 3, 3));
        assert_eq!(stats.frames_skipped, 0);
    }

    #[test]
    fn longjmp_past_two_frames_is_accepted() {
        let h = harness(MonitorConfig::default());
        run(
            &h,
            &[
                call(0x1000, 0x1005),
                call(0x2000, 0x2005),
                call(0x3000, 0x3005),
                call(0x4000, 0x4005),
                // Unwinds straight back into the second frame.
                ret(0x4100, 0x2005),
            ],
        )
        .unwrap();

        assert_eq!(h.monitor.depth(MAIN), Some(1));
        assert_eq!(
            h.sink.texts().iter().filter(|t| *t == "skipping a frame").count(),
            2
        );
    }

    #[test]
    fn corrupted_return_terminates_with_both_addresses() {
        let h = harness(MonitorConfig::default());
        let result = run(
            &h,
            &[
                call(0x1000, 0x1005),
                call(0x2000, 0x2005),
                call(0x3000, 0x3005),
                ret(0x3100, 0x4141_4141),
            ],
        );

        let violation = result.unwrap_err();
        assert_eq!(violation.headline(), "RETURN ADDRESS REWRITING DETECTED!!!!!");
        assert_eq!(
            violation,
            Violation::ReturnAddress {
                thread:      MAIN,
                return_site: Address(0x3100),
                observed:    Address(0x4141_4141),
                expected:    Address(0x3005),
                examined:    3,
            }
        );
        assert!(violation.to_error().is_fatal());
    }

    #[test]
    fn throw_and_catch_reconciles_against_handler() {
        let h = harness(MonitorConfig::default());
        let context = UnwindHandle(Address(0x7ffd_0000));
        h.resolver.insert(context, Address(0x1080));

        run(
            &h,
            &[
                // main calls f, f calls g, g throws and main catches.
                call(0x1000, 0x1005),
                call(0x2000, 0x2005),
                call(0x3000, 0x3005),
                // The throw calls the unwinder's dispatch routine.
                call(0x3050, 0x3055),
                MonitorEvent::ExceptionDispatch {
                    thread: MAIN,
                    handle: context,
                },
                MonitorEvent::ExceptionResume { thread: MAIN },
                // Dispatch returns to its own caller first...
                ret(0x9000, 0x3055),
                // ...then the landing pad is entered through a return.
                ret(0x9100, 0x1080),
            ],
        )
        .unwrap();

        // The frames of f and g are still recorded under main's.
        let state = h.monitor.thread_store().snapshot(MAIN).unwrap();
        assert_eq!(state.stack.size(), 3);
        assert_eq!(state.stack.top().map(|f| f.kind()), Some(FrameKind::Call));
        assert!(h.sink.texts().contains(&"catch handler @ 0x1080".to_string()));

        // main's own return skips them.
        run(&h, &[ret(0x1100, 0x1005)]).unwrap();
        assert_eq!(h.monitor.depth(MAIN), Some(0));
        let stats = h.monitor.statistics().snapshot();
        assert_eq!((stats.exception_frames, stats.frames_skipped), (1, 2));
    }

    #[test]
    fn nested_exceptions_resolve_newest_first() {
        let h = harness(MonitorConfig::default());
        let outer = UnwindHandle(Address(0x100));
        let inner = UnwindHandle(Address(0x200));
        h.resolver.insert(outer, Address(0x1080));
        h.resolver.insert(inner, Address(0x2080));

        run(
            &h,
            &[
                call(0x1000, 0x1005),
                MonitorEvent::ExceptionDispatch {
                    thread: MAIN,
                    handle: outer,
                },
                MonitorEvent::ExceptionDispatch {
                    thread: MAIN,
                    handle: inner,
                },
                MonitorEvent::ExceptionResume { thread: MAIN },
            ],
        )
        .unwrap();

        assert!(h.sink.texts().contains(&"catch handler @ 0x2080".to_string()));
        let state = h.monitor.thread_store().snapshot(MAIN).unwrap();
        assert_eq!(state.unwinds.len(), 1);
    }

    #[test]
    fn signal_handler_return_matches_interrupted_ip() {
        let h = harness(MonitorConfig::default());
        h.monitor.dispatch(&call(0x1000, 0x1005)).unwrap();
        h.monitor
            .on_context_change(
                MAIN,
                ContextChangeReason::Signal,
                SignalContext {
                    ip:   Address(0x1040),
                    sp:   Address(0x7ffe_f000),
                    info: 14,
                },
            )
            .unwrap();
        run(
            &h,
            &[
                // The handler itself calls and returns normally.
                call(0x5000, 0x5005),
                ret(0x5100, 0x5005),
                // Signal return lands on the interrupted instruction.
                ret(0x5200, 0x1040),
                ret(0x1100, 0x1005),
            ],
        )
        .unwrap();

        assert_eq!(h.monitor.depth(MAIN), Some(0));
        assert_eq!(h.monitor.statistics().snapshot().signal_frames, 1);
    }

    #[test]
    fn gadget_chain_is_reported_in_heuristic_mode() {
        let h = harness(MonitorConfig {
            mode: DetectionMode::GadgetHeuristic,
            ..MonitorConfig::default()
        });
        let instruction = |address: u64, is_return: bool| MonitorEvent::Instruction {
            thread: MAIN,
            address: Address(address),
            is_return,
        };

        // Ordinary code: long sequences between returns.
        let mut events: Vec<_> = (0..8).map(|i| instruction(0x1000 + i, false)).collect();
        events.push(instruction(0x1008, true));
        run(&h, &events).unwrap();

        // Two one-instruction gadgets in a row.
        let result = run(
            &h,
            &[
                instruction(0x4000, false),
                instruction(0x4001, true),
                instruction(0x5000, false),
                instruction(0x5001, true),
            ],
        );
        let violation = result.unwrap_err();
        assert_eq!(violation.headline(), "ROP ATTACK !!!!!");
        assert!(matches!(violation, Violation::GadgetChain { chain: 2, instructions: 1, .. }));
    }

    #[test]
    fn diagnostics_follow_call_depth() {
        let h = harness(MonitorConfig {
            log_level: LogLevel::Trace,
            ..MonitorConfig::default()
        });
        run(&h, &[call(0x1000, 0x1005), call(0x2000, 0x2005), ret(0x2100, 0x2005)]).unwrap();
        let depths: Vec<_> = h.sink.records().iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 1]);
    }
}
