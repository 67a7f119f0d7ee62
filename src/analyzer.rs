//! The analysis engine: owns all per-process state and implements the
//! listener interface the adapter drives.

use num_traits::FromPrimitive;

use crate::event::*;
use crate::listener::GcEventListener;
use crate::process::{ProcessGcState, ProcessRegistry};
use crate::server_gc::{ProcessorSpanTracker, RecentSpanRing, ThreadSpan};

/// Engine configuration, fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerProps {
    /// Retain per-heap histories, mark timings and pinning records. Turning
    /// this off keeps the episode timeline and pause accounting but drops
    /// the detailed per-heap columns.
    pub collect_detailed_heap_data: bool,
    /// The trace session's CPU sampling interval; each sample event accounts
    /// for this much thread time.
    pub sample_interval_msec: f64,
    /// Capacity of the recent scheduling-span ring used to retroactively
    /// seed newly recognized server collections.
    pub recent_span_capacity: usize,
}

impl Default for AnalyzerProps {
    fn default() -> Self {
        Self {
            collect_detailed_heap_data: true,
            sample_interval_msec: 1.0,
            recent_span_capacity: 1000,
        }
    }
}

/// Reconstructs GC episodes from the event stream.
///
/// The adapter owns the event bus and calls one [`GcEventListener`] method
/// per event, in trace timestamp order. All results are exposed through
/// read-only accessors once (or while) the stream is processed.
pub struct GcTraceAnalyzer {
    props: AnalyzerProps,
    registry: ProcessRegistry,
    /// Machine-wide per-processor scheduling state; context switches and
    /// samples are not per traced process.
    processor_spans: ProcessorSpanTracker,
    recent_spans: RecentSpanRing,
    event_count: u64,
}

impl GcTraceAnalyzer {
    pub fn new(props: AnalyzerProps) -> Self {
        Self {
            props,
            registry: ProcessRegistry::new(),
            processor_spans: ProcessorSpanTracker::default(),
            recent_spans: RecentSpanRing::new(props.recent_span_capacity),
            event_count: 0,
        }
    }

    /// All tracked process incarnations, dead ones included.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessGcState> {
        self.registry.all_processes()
    }

    /// The current incarnation for `pid`, if any events referenced it.
    pub fn process(&self, pid: u32) -> Option<&ProcessGcState> {
        self.registry.get(pid)
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// End of stream. No event after this is expected; episodes still open
    /// stay permanently incomplete and are reported as such.
    pub fn finish(&mut self) {
        for process in self.registry.live_processes_mut() {
            if let Some(idx) = process.in_flight_episode() {
                log::debug!(
                    "pid {}: GC #{} still open at end of stream",
                    process.pid(),
                    process.episodes[idx].number
                );
            }
        }
    }

    /// Deliver a closed scheduling span to every process with an in-flight
    /// server collection, attributing it to the heap whose worker owns the
    /// span's processor.
    fn route_span(&mut self, span: ThreadSpan) {
        for process in self.registry.live_processes_mut() {
            let Some(idx) = process.in_flight_episode() else {
                continue;
            };
            let episode = &mut process.episodes[idx];
            if let Some(heap) = episode.server_heaps.get_mut(span.processor as usize) {
                heap.record_span(span);
            }
        }
        self.recent_spans.push(span);
    }
}

impl GcEventListener for GcTraceAnalyzer {
    fn on_process_start(&mut self, header: EventHeader, payload: ProcessStartPayload) {
        self.event_count += 1;
        // A state that is dead, or alive but already named by an earlier
        // start event, belongs to a previous incarnation of this pid. An
        // unnamed live state is just the placeholder created by events that
        // beat the start notification; fill it in.
        let needs_replace = match self.registry.get(header.process_id) {
            Some(existing) => !existing.is_alive() || existing.name().is_some(),
            None => false,
        };
        let process = if needs_replace {
            self.registry
                .replace_on_restart(header.process_id, header.timestamp_relative_msec, &self.props)
        } else {
            self.registry
                .get_or_create(header.process_id, header.timestamp_relative_msec, &self.props)
        };
        process.name = Some(payload.name);
        process.command_line = Some(payload.command_line);
    }

    fn on_process_stop(&mut self, header: EventHeader) {
        self.event_count += 1;
        self.registry
            .mark_dead(header.process_id, header.timestamp_relative_msec);
    }

    fn on_runtime_information(&mut self, header: EventHeader, payload: RuntimeInformationPayload) {
        self.event_count += 1;
        let process =
            self.registry
                .get_or_create(header.process_id, header.timestamp_relative_msec, &self.props);
        process.runtime = Some(payload);
    }

    fn on_gc_start(&mut self, header: EventHeader, payload: GcStartPayload) {
        self.event_count += 1;
        let process =
            self.registry
                .get_or_create(header.process_id, header.timestamp_relative_msec, &self.props);
        if !process.gc_start(header.timestamp_relative_msec, &payload) {
            return;
        }
        // Server collections get retroactively seeded with the scheduling
        // activity from the window between the pause start and this event.
        let Some(episode) = process.episodes.last_mut() else {
            return;
        };
        if !episode.server_heaps.is_empty() {
            for span in self.recent_spans.spans_since(episode.pause_start_msec) {
                if let Some(heap) = episode.server_heaps.get_mut(span.processor as usize) {
                    heap.record_span(*span);
                }
            }
        }
    }

    fn on_gc_stop(&mut self, header: EventHeader, payload: GcStopPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.gc_stop(header.timestamp_relative_msec, &payload);
        }
    }

    fn on_gc_heap_stats(&mut self, header: EventHeader, payload: GcHeapStatsPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.heap_stats(header.timestamp_relative_msec, payload);
        }
    }

    fn on_gc_global_heap_history(&mut self, header: EventHeader, payload: GcGlobalHistoryPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.global_heap_history(header.timestamp_relative_msec, payload);
        }
    }

    fn on_gc_per_heap_history(&mut self, header: EventHeader, payload: GcPerHeapHistoryPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.per_heap_history(header.timestamp_relative_msec, payload);
        }
    }

    fn on_gc_allocation_tick(&mut self, header: EventHeader, payload: GcAllocationTickPayload) {
        self.event_count += 1;
        let Some(kind) = AllocationKind::from_u32(payload.kind) else {
            log::warn!("unknown allocation kind {}", payload.kind);
            return;
        };
        let process =
            self.registry
                .get_or_create(header.process_id, header.timestamp_relative_msec, &self.props);
        process.allocation_tick(kind, payload.amount_bytes);
    }

    fn on_suspend_ee_begin(&mut self, header: EventHeader, payload: GcSuspendEePayload) {
        self.event_count += 1;
        let reason = GcSuspendReason::from_u32(payload.reason).unwrap_or_else(|| {
            log::warn!("unknown suspension reason {}", payload.reason);
            GcSuspendReason::Other
        });
        let process =
            self.registry
                .get_or_create(header.process_id, header.timestamp_relative_msec, &self.props);
        process.suspension.begin(reason, header.timestamp_relative_msec);
        if reason.counts_toward_gc_pause() && process.open_pause_start.is_none() {
            process.open_pause_start = Some(header.timestamp_relative_msec);
        }
    }

    fn on_suspend_ee_end(&mut self, header: EventHeader) {
        self.event_count += 1;
        let Some(process) = self.registry.get_mut(header.process_id) else {
            return;
        };
        if let Some(interval) = process.suspension.end(header.timestamp_relative_msec) {
            process.suspension_ended(&interval);
        }
    }

    fn on_restart_ee_end(&mut self, header: EventHeader) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.restart_ee_end(header.timestamp_relative_msec);
        }
    }

    fn on_gc_mark(&mut self, header: EventHeader, payload: GcMarkPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.mark(header.timestamp_relative_msec, header.thread_id, &payload);
        }
    }

    fn on_gc_pin_object(&mut self, header: EventHeader, payload: GcPinObjectPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.pin_object(payload);
        }
    }

    fn on_gc_pin_plug(&mut self, header: EventHeader, payload: GcPinPlugPayload) {
        self.event_count += 1;
        if let Some(process) = self.registry.get_mut(header.process_id) {
            process.pin_plug(&payload);
        }
    }

    fn on_gc_join(&mut self, header: EventHeader, payload: GcJoinPayload) {
        self.event_count += 1;
        let Some(join_type) = GcJoinType::from_u32(payload.join_type) else {
            log::warn!("unknown GC join type {}", payload.join_type);
            return;
        };
        let Some(join_time) = GcJoinTime::from_u32(payload.join_time) else {
            log::warn!("unknown GC join time {}", payload.join_time);
            return;
        };
        let Some(process) = self.registry.get_mut(header.process_id) else {
            return;
        };
        // Per-heap join events arrive on their heap's worker thread; this is
        // how worker identities are learned, episode or not.
        if payload.heap >= 0 && process.heap_count() > 1 {
            process
                .server_worker_tids
                .insert(header.thread_id, payload.heap as u32);
        }
        let Some(idx) = process.in_flight_episode() else {
            return;
        };
        let episode = &mut process.episodes[idx];
        if episode.server_heaps.is_empty() {
            return;
        }
        let join = crate::server_gc::GcJoinEvent {
            timestamp_msec: header.timestamp_relative_msec,
            heap: payload.heap,
            join_type,
            join_time,
            thread_id: header.thread_id,
        };
        if payload.heap < 0 {
            // The global wake-up signal carries no heap index; every heap's
            // history gets it.
            for heap in &mut episode.server_heaps {
                heap.record_join(join);
            }
        } else if let Some(heap) = episode.server_heaps.get_mut(payload.heap as usize) {
            heap.set_worker_thread(header.thread_id);
            heap.record_join(join);
        }
    }

    fn on_thread_context_switch(&mut self, header: EventHeader, payload: ContextSwitchPayload) {
        self.event_count += 1;
        let closed = self.processor_spans.switch(
            header.processor_number,
            header.timestamp_relative_msec,
            payload.new_thread_id,
            header.process_id,
            payload.new_thread_priority,
        );
        if let Some(span) = closed {
            self.route_span(span);
        }
    }

    fn on_cpu_sample(&mut self, header: EventHeader, _payload: CpuSamplePayload) {
        self.event_count += 1;
        let closed = self.processor_spans.sample(
            header.processor_number,
            header.timestamp_relative_msec,
            header.thread_id,
            header.process_id,
        );
        if let Some(span) = closed {
            self.route_span(span);
        }

        // Sampled CPU accounting: the sampled process accrues one interval;
        // if the sampled thread is a known server GC worker and a collection
        // is in flight, its heap accrues GC CPU as well.
        let interval = self.props.sample_interval_msec;
        let Some(process) = self.registry.get_mut(header.process_id) else {
            return;
        };
        process.cpu_msec += interval;
        if let Some(heap_index) = process.worker_heap_for_thread(header.thread_id) {
            if let Some(idx) = process.in_flight_episode() {
                let episode = &mut process.episodes[idx];
                if let Some(heap) = episode.server_heaps.get_mut(heap_index as usize) {
                    heap.add_gc_cpu_msec(interval);
                }
            }
        }
    }
}
