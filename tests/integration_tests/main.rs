use coreclr_gc_episodes::{
    AnalyzerProps, EpisodePhase, EventHeader, GcEventListener, GcGlobalHistoryPayload,
    GcHeapStatsPayload, GcJoinPayload, GcJoinTime, GcJoinType, GcPerHeapGenData,
    GcPerHeapHistoryPayload, GcStartPayload, GcStopPayload, GcSuspendEePayload, GcTraceAnalyzer,
    GcType, HeapSyncState, ProcessStartPayload, WorkSpanKind,
};

const PID: u32 = 1234;
const MAIN_TID: u32 = 2001;

fn new_analyzer() -> GcTraceAnalyzer {
    let _ = env_logger::builder().is_test(true).try_init();
    GcTraceAnalyzer::new(AnalyzerProps::default())
}

fn header(ts: f64) -> EventHeader {
    header_for(PID, MAIN_TID, 0, ts)
}

fn header_for(pid: u32, tid: u32, processor: u32, ts: f64) -> EventHeader {
    EventHeader {
        process_id: pid,
        thread_id: tid,
        processor_number: processor,
        timestamp_relative_msec: ts,
    }
}

fn gc_start(count: u32, depth: u32, gc_type: GcType) -> GcStartPayload {
    GcStartPayload {
        count,
        depth,
        reason: 0,
        gc_type: Some(gc_type as u32),
    }
}

fn gc_stop(count: u32, depth: u32) -> GcStopPayload {
    GcStopPayload { count, depth }
}

fn heap_stats() -> GcHeapStatsPayload {
    GcHeapStatsPayload {
        generation_size: [4_000_000, 2_000_000, 8_000_000, 1_000_000],
        total_promoted: [1_000_000, 500_000, 0, 0],
        finalization_promoted_size: 0,
        finalization_promoted_count: 0,
        pinned_object_count: 3,
        sink_block_count: 1,
        gc_handle_count: 120,
    }
}

fn suspend_gc() -> GcSuspendEePayload {
    // Reason 1 == suspension for GC.
    GcSuspendEePayload { reason: 1, count: 0 }
}

fn global_history(num_heaps: u32, condemned_generation: u32) -> GcGlobalHistoryPayload {
    GcGlobalHistoryPayload {
        version: 1,
        final_youngest_desired: 8_000_000,
        num_heaps,
        condemned_generation,
        gen0_reduction_count: 0,
        reason: 0,
        global_mechanisms: 0x2 | 0x4,
        pause_mode: None,
        memory_pressure: None,
    }
}

fn per_heap_history(version: u32, heap_index: u32) -> GcPerHeapHistoryPayload {
    GcPerHeapHistoryPayload {
        version,
        heap_index,
        free_list_allocated: Some(0),
        free_list_rejected: Some(0),
        generations: vec![GcPerHeapGenData {
            generation: 0,
            size_before: 6_000_000,
            size_after: 4_000_000,
            fragmentation: 500_000,
            promoted: 1_000_000,
            budget: 8_000_000,
            surv_rate_percent: 20,
            pinned_surv: 0,
            non_pinned_surv: 1_000_000,
        }],
    }
}

fn join(heap: i32, join_type: GcJoinType, join_time: GcJoinTime) -> GcJoinPayload {
    GcJoinPayload {
        heap,
        join_time: join_time as u32,
        join_type: join_type as u32,
    }
}

/// Scenario: a minimal blocking collection, start to restart.
#[test]
fn minimal_blocking_gc() {
    let mut analyzer = new_analyzer();
    analyzer.on_process_start(
        header(0.0),
        ProcessStartPayload {
            name: "app.exe".into(),
            command_line: "app.exe --serve".into(),
        },
    );
    analyzer.on_runtime_information(
        header(0.5),
        coreclr_gc_episodes::RuntimeInformationPayload {
            major: 8,
            minor: 0,
            build: 100,
            revision: 0,
            bitness: 64,
        },
    );
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_suspend_ee_begin(header(10.5), suspend_gc());
    analyzer.on_suspend_ee_end(header(11.0));
    analyzer.on_gc_stop(header(14.0), gc_stop(1, 0));
    analyzer.on_gc_heap_stats(header(14.2), heap_stats());
    analyzer.on_restart_ee_end(header(15.0));
    analyzer.finish();

    assert_eq!(analyzer.event_count(), 8);
    let process = analyzer.process(PID).unwrap();
    assert_eq!(process.name(), Some("app.exe"));
    assert_eq!(process.runtime().map(|r| (r.major, r.bitness)), Some((8, 64)));
    assert_eq!(process.episodes().len(), 1);

    let episode = &process.episodes()[0];
    assert!(episode.is_complete());
    assert_eq!(episode.phase(), EpisodePhase::Complete);
    assert_eq!(episode.generation, 0);
    assert!(episode.pause_duration_msec > 0.0);
    assert_eq!(episode.pause_duration_msec, 5.0);
    assert_eq!(episode.suspend_duration_msec, 0.5);
    assert_eq!(episode.duration_msec, 4.0);
    assert_eq!(process.rollup().gc_count(), 1);
}

/// Scenario: providers that emit the start notification twice produce one
/// episode, not two.
#[test]
fn duplicate_gc_start_is_filtered() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(7, 1, GcType::Blocking));
    analyzer.on_gc_start(header(10.01), gc_start(7, 1, GcType::Blocking));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    assert_eq!(process.episodes().len(), 1);
    assert_eq!(process.episodes()[0].number, 7);
}

/// Scenario: a blocking collection nested inside a background collection.
/// Both complete, and the background episode's pause includes the nested
/// foreground pause.
#[test]
fn nested_background_and_foreground() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(1, 2, GcType::Background));
    analyzer.on_suspend_ee_begin(header(11.0), suspend_gc());
    analyzer.on_suspend_ee_end(header(11.5));
    analyzer.on_gc_start(header(12.0), gc_start(2, 0, GcType::Blocking));
    analyzer.on_suspend_ee_begin(header(12.5), suspend_gc());
    analyzer.on_suspend_ee_end(header(13.0));
    analyzer.on_gc_stop(header(15.0), gc_stop(2, 0));
    analyzer.on_gc_heap_stats(header(15.2), heap_stats());
    analyzer.on_restart_ee_end(header(16.0));
    analyzer.on_gc_heap_stats(header(20.0), heap_stats());
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    assert_eq!(process.episodes().len(), 2);

    let background = &process.episodes()[0];
    let foreground = &process.episodes()[1];
    assert!(background.is_complete());
    assert!(foreground.is_complete());
    assert_eq!(background.gc_type, GcType::Background);

    // The ephemeral collection inside the background GC pauses from its own
    // start, not from the outer suspension.
    assert_eq!(foreground.pause_start_msec, 12.0);
    assert_eq!(foreground.pause_duration_msec, 4.0);

    // The background pause covers the whole suspend/restart cycle and
    // therefore contains the nested foreground pause.
    assert!(background.pause_duration_msec >= foreground.pause_duration_msec);
    assert_eq!(background.pause_duration_msec, 5.0);
}

/// Scenario: server-mode span classification. A known low-priority thread on
/// a worker's processor is not interference.
#[test]
fn server_gc_low_priority_thread_is_not_interference() {
    let worker_tid = 100;
    let rival_tid = 300;
    let other_pid = 7777;

    let mut analyzer = new_analyzer();
    // The heap count arrives with a previous collection's global history;
    // here it simply precedes the collection under test.
    analyzer.on_gc_global_heap_history(header(1.0), global_history(2, 0));

    analyzer.on_gc_start(header(10.0), gc_start(1, 1, GcType::Blocking));
    // Worker switches in on processor 0.
    analyzer.on_thread_context_switch(
        header_for(PID, worker_tid, 0, 11.0),
        coreclr_gc_episodes::ContextSwitchPayload {
            old_thread_id: 0,
            old_thread_priority: 0,
            new_thread_id: worker_tid,
            new_thread_priority: 10,
        },
    );
    // The worker announces itself at the barrier; heap 0 now knows its
    // worker thread.
    analyzer.on_gc_join(
        header_for(PID, worker_tid, 0, 12.0),
        join(0, GcJoinType::FirstJoin, GcJoinTime::Start),
    );
    // A lower-priority thread from another process takes the processor.
    analyzer.on_thread_context_switch(
        header_for(other_pid, rival_tid, 0, 14.0),
        coreclr_gc_episodes::ContextSwitchPayload {
            old_thread_id: worker_tid,
            old_thread_priority: 10,
            new_thread_id: rival_tid,
            new_thread_priority: 5,
        },
    );
    analyzer.on_thread_context_switch(
        header_for(PID, worker_tid, 0, 16.0),
        coreclr_gc_episodes::ContextSwitchPayload {
            old_thread_id: rival_tid,
            old_thread_priority: 5,
            new_thread_id: worker_tid,
            new_thread_priority: 10,
        },
    );
    analyzer.on_gc_stop(header(17.0), gc_stop(1, 1));
    analyzer.on_gc_heap_stats(header(17.2), heap_stats());
    analyzer.on_restart_ee_end(header(18.0));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    assert!(process.uses_server_gc());
    let episode = &process.episodes()[0];
    assert!(episode.is_complete());
    assert_eq!(episode.server_heaps.len(), 2);

    let heap = &episode.server_heaps[0];
    assert_eq!(heap.gc_worker_thread_id, Some(worker_tid));
    assert_eq!(heap.gc_worker_priority, Some(10));
    assert_eq!(heap.spans.len(), 2);

    // Worker ran 11.0..14.0.
    assert_eq!(heap.spans[0].kind, WorkSpanKind::GcThread);
    assert_eq!(heap.spans[0].duration_msec, 3.0);

    // The rival span started at 14.0, after the FirstJoin at 12.0, so the
    // worker was waiting in the join. Its priority (5) is below the
    // worker's (10): low-priority, and zero interference recorded.
    assert_eq!(heap.spans[1].kind, WorkSpanKind::LowPriorityThread);
    assert_eq!(heap.spans[1].sync_state, HeapSyncState::WaitInJoin);
    assert_eq!(heap.stolen_msec(HeapSyncState::WaitInJoin), 0.0);
    assert_eq!(heap.gc_thread_msec, 3.0);
}

/// A restart broadcast with no heap index lands in every heap's history.
#[test]
fn restart_join_broadcasts_to_all_heaps() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_global_heap_history(header(1.0), global_history(4, 0));
    analyzer.on_gc_start(header(10.0), gc_start(1, 2, GcType::Background));
    analyzer.on_gc_join(
        header_for(PID, 100, 0, 11.0),
        join(-1, GcJoinType::Restart, GcJoinTime::End),
    );
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    let episode = &process.episodes()[0];
    assert_eq!(episode.server_heaps.len(), 4);
    for heap in &episode.server_heaps {
        assert_eq!(heap.join_events.len(), 1);
    }
}

#[test]
fn complete_episodes_never_exceed_start_events() {
    let mut analyzer = new_analyzer();
    let mut starts = 0;
    // A mix of finished, duplicated, and abandoned collections.
    for (count, finish_it) in [(1u32, true), (2, false), (3, true), (3, true), (4, false)] {
        starts += 1;
        let base = count as f64 * 100.0;
        analyzer.on_gc_start(header(base), gc_start(count, 0, GcType::Blocking));
        if finish_it {
            analyzer.on_gc_heap_stats(header(base + 5.0), heap_stats());
            analyzer.on_restart_ee_end(header(base + 6.0));
        }
    }
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    let complete = process.episodes().iter().filter(|e| e.is_complete()).count();
    assert!(complete <= starts);

    // Sequence numbers of completed episodes never go backwards.
    let numbers: Vec<u32> = process
        .episodes()
        .iter()
        .filter(|e| e.is_complete())
        .map(|e| e.number)
        .collect();
    assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn rollup_generation_counts_sum_to_total() {
    let mut analyzer = new_analyzer();
    for (count, depth) in [(1u32, 0u32), (2, 0), (3, 1), (4, 2), (5, 0)] {
        let base = count as f64 * 100.0;
        analyzer.on_gc_start(header(base), gc_start(count, depth, GcType::Blocking));
        analyzer.on_suspend_ee_begin(header(base + 1.0), suspend_gc());
        analyzer.on_suspend_ee_end(header(base + 2.0));
        analyzer.on_gc_stop(header(base + 4.0), gc_stop(count, depth));
        analyzer.on_gc_heap_stats(header(base + 4.5), heap_stats());
        analyzer.on_restart_ee_end(header(base + 5.0));
    }
    analyzer.finish();

    let rollup = analyzer.process(PID).unwrap().rollup();
    let per_generation: u32 = rollup.generations.iter().map(|g| g.count).sum();
    assert_eq!(per_generation, rollup.total.count);
    assert_eq!(rollup.total.count, 5);
    assert_eq!(rollup.generations[0].count, 3);
    assert_eq!(rollup.generations[1].count, 1);
    assert_eq!(rollup.generations[2].count, 1);
}

#[test]
fn rollup_is_idempotent() {
    let mut analyzer = new_analyzer();
    for count in 1u32..=3 {
        let base = count as f64 * 50.0;
        analyzer.on_gc_start(header(base), gc_start(count, 0, GcType::Blocking));
        analyzer.on_gc_heap_stats(header(base + 2.0), heap_stats());
        analyzer.on_restart_ee_end(header(base + 3.0));
    }
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    let first = serde_json::to_string(&process.rollup()).unwrap();
    let second = serde_json::to_string(&process.rollup()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unknown_history_schema_sets_sticky_flag() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_gc_per_heap_history(header(12.0), per_heap_history(99, 0));
    analyzer.on_gc_heap_stats(header(14.0), heap_stats());
    analyzer.on_restart_ee_end(header(15.0));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    assert!(process.version_mismatch());
    assert!(!process.has_detailed_heap_data());
    // The stream kept going; the episode still completed, just without the
    // detailed fields.
    let episode = &process.episodes()[0];
    assert!(episode.is_complete());
    assert!(episode.per_heap_histories.is_empty());
    assert_eq!(episode.size_before_mb(), None);
}

#[test]
fn recognized_history_schema_populates_detail() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_gc_per_heap_history(header(12.0), per_heap_history(2, 0));
    analyzer.on_gc_global_heap_history(header(12.5), global_history(1, 1));
    analyzer.on_gc_heap_stats(header(14.0), heap_stats());
    analyzer.on_restart_ee_end(header(15.0));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    assert!(!process.version_mismatch());
    assert!(process.has_detailed_heap_data());

    let episode = &process.episodes()[0];
    // The global history escalated the condemned generation.
    assert_eq!(episode.generation, 1);
    assert_eq!(episode.size_before_mb(), Some(6.0));
    assert_eq!(episode.fragmentation_mb(), Some(0.5));
}

#[test]
fn allocation_accumulators_difference_at_episode_boundaries() {
    use coreclr_gc_episodes::GcAllocationTickPayload;

    let mut analyzer = new_analyzer();
    analyzer.on_gc_allocation_tick(
        header(1.0),
        GcAllocationTickPayload {
            kind: 0,
            amount_bytes: 1_000_000,
            type_name: None,
        },
    );
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_gc_heap_stats(header(12.0), heap_stats());
    analyzer.on_restart_ee_end(header(13.0));

    analyzer.on_gc_allocation_tick(
        header(20.0),
        GcAllocationTickPayload {
            kind: 0,
            amount_bytes: 2_000_000,
            type_name: None,
        },
    );
    analyzer.on_gc_allocation_tick(
        header(21.0),
        GcAllocationTickPayload {
            kind: 1,
            amount_bytes: 4_000_000,
            type_name: Some("Byte[]".into()),
        },
    );
    analyzer.on_gc_start(header(30.0), gc_start(2, 0, GcType::Blocking));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    let first = &process.episodes()[0];
    let second = &process.episodes()[1];
    assert_eq!(first.allocated_since_last_mb(), 1.0);
    assert_eq!(second.allocated_small_mb, 2.0);
    assert_eq!(second.allocated_large_mb, 4.0);
    assert_eq!(second.allocated_since_last_mb(), 6.0);
    // Rate over the 17ms since the previous collection's restart.
    let rate = second.allocation_rate_mb_per_sec().unwrap();
    assert!((rate - 6.0 / 17.0 * 1000.0).abs() < 1e-9);
}

#[test]
fn pid_reuse_keeps_the_old_incarnation_reachable() {
    let mut analyzer = new_analyzer();
    analyzer.on_process_start(
        header(0.0),
        ProcessStartPayload {
            name: "worker.exe".into(),
            command_line: "worker.exe 1".into(),
        },
    );
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_gc_heap_stats(header(12.0), heap_stats());
    analyzer.on_restart_ee_end(header(13.0));
    analyzer.on_process_stop(header(50.0));

    // The OS hands the same pid to a new process.
    analyzer.on_process_start(
        header(60.0),
        ProcessStartPayload {
            name: "worker.exe".into(),
            command_line: "worker.exe 2".into(),
        },
    );
    analyzer.on_gc_start(header(70.0), gc_start(1, 0, GcType::Blocking));
    analyzer.finish();

    let incarnations: Vec<_> = analyzer
        .processes()
        .filter(|p| p.name() == Some("worker.exe"))
        .collect();
    assert_eq!(incarnations.len(), 2);

    let current = analyzer.process(PID).unwrap();
    assert_eq!(current.command_line(), Some("worker.exe 2"));
    assert_eq!(current.episodes().len(), 1);
    assert!(!current.episodes()[0].is_complete());

    let old = incarnations
        .iter()
        .find(|p| p.command_line() == Some("worker.exe 1"))
        .unwrap();
    assert!(!old.is_alive());
    assert_eq!(old.rollup().gc_count(), 1);
}

/// Suspensions that are not collector-initiated are excluded from pause
/// accounting.
#[test]
fn debugger_suspension_is_not_a_gc_pause() {
    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    // Reason 5 == debugger.
    analyzer.on_suspend_ee_begin(header(11.0), GcSuspendEePayload { reason: 5, count: 0 });
    analyzer.on_suspend_ee_end(header(19.0));
    analyzer.on_gc_heap_stats(header(20.0), heap_stats());
    analyzer.on_restart_ee_end(header(21.0));
    analyzer.finish();

    let episode = &analyzer.process(PID).unwrap().episodes()[0];
    assert!(episode.is_complete());
    assert_eq!(episode.suspend_duration_msec, 0.0);
}

#[test]
fn mark_and_pinning_detail_is_retained() {
    use coreclr_gc_episodes::{GcMarkPayload, GcPinObjectPayload, MarkRootKind};

    let mut analyzer = new_analyzer();
    analyzer.on_gc_start(header(10.0), gc_start(1, 1, GcType::Blocking));
    for (ts, root_kind, promoted) in [(10.2, 0u32, 100_000u64), (10.4, 2, 40_000), (10.6, 3, 0)] {
        analyzer.on_gc_mark(
            header(ts),
            GcMarkPayload {
                heap_index: 0,
                root_kind,
                promoted_bytes: promoted,
            },
        );
    }
    analyzer.on_gc_pin_object(
        header(10.7),
        GcPinObjectPayload {
            object_id: 0xdead_beef,
            object_size: 96,
            type_name: "System.Byte[]".into(),
        },
    );
    analyzer.on_gc_pin_object(
        header(10.8),
        GcPinObjectPayload {
            object_id: 0xfeed_f00d,
            object_size: 32,
            type_name: "OverlappedData".into(),
        },
    );
    analyzer.on_gc_pin_plug(
        header(10.9),
        coreclr_gc_episodes::GcPinPlugPayload {
            plug_start: 0x1000,
            plug_end: 0x1400,
            gap_before_size: 64,
        },
    );
    analyzer.on_gc_heap_stats(header(12.0), heap_stats());
    analyzer.on_restart_ee_end(header(13.0));
    analyzer.finish();

    let episode = &analyzer.process(PID).unwrap().episodes()[0];
    assert!(episode.is_complete());
    assert_eq!(episode.mark_info.len(), 1);
    let marks = &episode.mark_info[0];
    assert_eq!(marks.mark_time_msec[MarkRootKind::Stack as usize], Some(10.2));
    assert_eq!(marks.mark_time_msec[MarkRootKind::Handles as usize], Some(10.4));
    assert_eq!(marks.mark_time_msec[MarkRootKind::FinalizeQueue as usize], None);
    assert_eq!(
        marks.promoted_bytes[MarkRootKind::Stack as usize],
        Some(100_000)
    );

    assert_eq!(episode.pinned_objects.len(), 2);
    assert_eq!(episode.pinned_object_bytes(), 128);
    assert_eq!(episode.pinned_plugs.len(), 1);
    assert_eq!(episode.pinned_plugs[0].gap_before_size, 64);
    let rollup = analyzer.process(PID).unwrap().rollup();
    assert_eq!(rollup.total.total_pinned_objects, 2);
    assert_eq!(rollup.total.total_pinned_bytes, 128);
}

#[test]
fn detail_collection_can_be_disabled() {
    use coreclr_gc_episodes::{GcMarkPayload, GcPinObjectPayload};

    let props = AnalyzerProps {
        collect_detailed_heap_data: false,
        ..AnalyzerProps::default()
    };
    let mut analyzer = GcTraceAnalyzer::new(props);
    analyzer.on_gc_start(header(10.0), gc_start(1, 0, GcType::Blocking));
    analyzer.on_gc_per_heap_history(header(11.0), per_heap_history(2, 0));
    analyzer.on_gc_mark(
        header(11.5),
        GcMarkPayload {
            heap_index: 0,
            root_kind: 0,
            promoted_bytes: 1,
        },
    );
    analyzer.on_gc_pin_object(
        header(11.7),
        GcPinObjectPayload {
            object_id: 1,
            object_size: 8,
            type_name: "X".into(),
        },
    );
    analyzer.on_gc_heap_stats(header(12.0), heap_stats());
    analyzer.on_restart_ee_end(header(13.0));
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    let episode = &process.episodes()[0];
    assert!(episode.is_complete());
    assert!(episode.per_heap_histories.is_empty());
    assert!(episode.mark_info.is_empty());
    assert!(episode.pinned_objects.is_empty());
    assert!(!process.has_detailed_heap_data());
    // Schema checking still runs with detail collection off.
    analyzer.on_gc_start(header(20.0), gc_start(2, 0, GcType::Blocking));
    analyzer.on_gc_per_heap_history(header(21.0), per_heap_history(99, 0));
    assert!(analyzer.process(PID).unwrap().version_mismatch());
}

#[test]
fn cpu_samples_accrue_to_process_and_gc_workers() {
    use coreclr_gc_episodes::CpuSamplePayload;

    let worker_tid = 100;
    let mut analyzer = new_analyzer();
    analyzer.on_gc_global_heap_history(header(1.0), global_history(2, 0));
    analyzer.on_gc_start(header(10.0), gc_start(1, 2, GcType::Background));
    analyzer.on_gc_join(
        header_for(PID, worker_tid, 0, 10.5),
        join(0, GcJoinType::Join, GcJoinTime::Start),
    );
    // Three samples land on the worker, one on an unrelated thread of the
    // same process.
    for ts in [11.0, 12.0, 13.0] {
        analyzer.on_cpu_sample(
            header_for(PID, worker_tid, 0, ts),
            CpuSamplePayload {
                instruction_pointer: 0x7ff6_0000_1000,
            },
        );
    }
    analyzer.on_cpu_sample(
        header_for(PID, MAIN_TID, 1, 13.5),
        CpuSamplePayload {
            instruction_pointer: 0x7ff6_0000_2000,
        },
    );
    analyzer.on_gc_heap_stats(header(14.0), heap_stats());
    analyzer.finish();

    let process = analyzer.process(PID).unwrap();
    // Default sampling interval is 1ms per sample.
    assert_eq!(process.cpu_msec(), 4.0);
    let episode = &process.episodes()[0];
    assert!(episode.is_complete());
    assert_eq!(episode.server_heaps[0].gc_cpu_msec, 3.0);
    assert_eq!(episode.server_heaps[1].gc_cpu_msec, 0.0);
}
