//! Server-GC worker-thread correlation.
//!
//! Server mode runs one dedicated collector thread per logical heap,
//! affinitized one per processor core. Reconstructing what each worker was
//! doing requires correlating three event streams: scheduler context
//! switches and CPU samples (who actually ran on the worker's processor),
//! and the collector's join-barrier events (which synchronization phase the
//! worker was in). The output is, per heap, a time-ordered sequence of
//! classified spans plus a "time stolen from the GC thread" total per
//! synchronization state.

use std::collections::VecDeque;

use serde_derive::Serialize;

use crate::episode::GcEpisode;
use crate::event::{GcJoinTime, GcJoinType, IDLE_PROCESS_ID};

/// What was running on a heap's processor during one scheduling span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkSpanKind {
    /// The heap's own collector worker thread.
    GcThread,
    /// A thread at or above the worker's priority: it steals processor time
    /// the worker could have used.
    RivalThread,
    /// A thread below the worker's priority; it only ran because the worker
    /// had nothing to do.
    LowPriorityThread,
    /// The OS idle loop.
    Idle,
}

/// Join-barrier synchronization state of one heap's worker, transitioned
/// solely by join events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeapSyncState {
    /// Doing parallel collection work.
    Ready = 0,
    /// Arrived at a barrier, waiting for peers.
    WaitInJoin,
    /// Last to arrive; performing the single-threaded work.
    SingleThreaded,
    /// Issued the restart signal, waking the other workers.
    WaitingInRestart,
}

pub const SYNC_STATE_COUNT: usize = 4;

/// A synchronization-barrier marker. Immutable once recorded.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GcJoinEvent {
    pub timestamp_msec: f64,
    /// Heap index, or negative for restart broadcasts that carry none.
    pub heap: i32,
    pub join_type: GcJoinType,
    pub join_time: GcJoinTime,
    pub thread_id: u32,
}

/// A closed scheduling span: `thread_id` of `process_id` ran on `processor`
/// from `start_msec` for `duration_msec`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThreadSpan {
    pub thread_id: u32,
    pub process_id: u32,
    /// Scheduler priority of the running thread; negative when unknown
    /// (spans opened by CPU samples carry no priority).
    pub priority: i8,
    pub processor: u32,
    pub start_msec: f64,
    pub duration_msec: f64,
}

/// A span after classification against the heap's worker and join timeline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassifiedSpan {
    pub kind: WorkSpanKind,
    /// The synchronization state the worker was in at the span's timestamp.
    pub sync_state: HeapSyncState,
    pub thread_id: u32,
    pub priority: i8,
    pub start_msec: f64,
    pub duration_msec: f64,
}

/// One logical heap's activity for one episode.
#[derive(Debug, Serialize)]
pub struct ServerGcHeapHistory {
    pub heap_index: u32,
    /// The worker thread owning this heap, learned from per-heap join and
    /// mark events (they arrive on the worker's thread).
    pub gc_worker_thread_id: Option<u32>,
    /// The worker's scheduler priority, learned the first time a context
    /// switch runs it. None if the worker was never observed switching in.
    pub gc_worker_priority: Option<i8>,
    pub join_events: Vec<GcJoinEvent>,
    /// Classified spans, produced when the owning episode completes.
    pub spans: Vec<ClassifiedSpan>,
    /// Processor time taken by rival threads, bucketed by the
    /// synchronization state the worker was in at the time.
    pub stolen_msec_by_state: [f64; SYNC_STATE_COUNT],
    /// Time the worker thread itself was scheduled.
    pub gc_thread_msec: f64,
    /// Sampled CPU attributed to the worker thread.
    pub gc_cpu_msec: f64,

    #[serde(skip)]
    raw_spans: Vec<ThreadSpan>,
}

impl ServerGcHeapHistory {
    pub(crate) fn new(heap_index: u32) -> Self {
        Self {
            heap_index,
            gc_worker_thread_id: None,
            gc_worker_priority: None,
            join_events: Vec::new(),
            spans: Vec::new(),
            stolen_msec_by_state: [0.0; SYNC_STATE_COUNT],
            gc_thread_msec: 0.0,
            gc_cpu_msec: 0.0,
            raw_spans: Vec::new(),
        }
    }

    pub(crate) fn set_worker_thread(&mut self, thread_id: u32) {
        self.gc_worker_thread_id = Some(thread_id);
    }

    pub(crate) fn add_gc_cpu_msec(&mut self, msec: f64) {
        self.gc_cpu_msec += msec;
    }

    pub(crate) fn record_span(&mut self, span: ThreadSpan) {
        if self.gc_worker_thread_id == Some(span.thread_id) && span.priority >= 0 {
            self.gc_worker_priority = Some(span.priority);
        }
        self.raw_spans.push(span);
    }

    pub(crate) fn record_join(&mut self, join: GcJoinEvent) {
        self.join_events.push(join);
    }

    fn classify(&self, span: &ThreadSpan) -> WorkSpanKind {
        if self.gc_worker_thread_id == Some(span.thread_id) {
            WorkSpanKind::GcThread
        } else if span.process_id == IDLE_PROCESS_ID {
            WorkSpanKind::Idle
        } else {
            match self.gc_worker_priority {
                Some(worker_priority) if span.priority < worker_priority => {
                    WorkSpanKind::LowPriorityThread
                }
                // Unknown worker priority must not hide interference.
                _ => WorkSpanKind::RivalThread,
            }
        }
    }

    /// Replays the join timeline over the recorded raw spans, classifying
    /// each span and attributing its duration to the synchronization state
    /// active at its timestamp.
    fn finalize(&mut self) {
        let mut state = HeapSyncState::Ready;
        let mut joins = self.join_events.iter().peekable();
        let raw_spans = std::mem::take(&mut self.raw_spans);
        self.spans.reserve(raw_spans.len());

        for span in raw_spans {
            while let Some(join) = joins.peek() {
                if join.timestamp_msec > span.start_msec {
                    break;
                }
                state = transition(state, join.join_type, join.join_time);
                joins.next();
            }

            let kind = self.classify(&span);
            match kind {
                WorkSpanKind::GcThread => self.gc_thread_msec += span.duration_msec,
                WorkSpanKind::RivalThread => {
                    self.stolen_msec_by_state[state as usize] += span.duration_msec;
                }
                WorkSpanKind::LowPriorityThread | WorkSpanKind::Idle => {}
            }
            self.spans.push(ClassifiedSpan {
                kind,
                sync_state: state,
                thread_id: span.thread_id,
                priority: span.priority,
                start_msec: span.start_msec,
                duration_msec: span.duration_msec,
            });
        }
    }

    pub fn stolen_msec(&self, state: HeapSyncState) -> f64 {
        self.stolen_msec_by_state[state as usize]
    }
}

fn transition(state: HeapSyncState, join_type: GcJoinType, join_time: GcJoinTime) -> HeapSyncState {
    match (join_type, join_time) {
        (GcJoinType::Join | GcJoinType::FirstJoin, GcJoinTime::Start) => HeapSyncState::WaitInJoin,
        (GcJoinType::Join | GcJoinType::FirstJoin, GcJoinTime::End) => HeapSyncState::Ready,
        (GcJoinType::LastJoin, GcJoinTime::Start) => HeapSyncState::SingleThreaded,
        (GcJoinType::LastJoin, GcJoinTime::End) => HeapSyncState::Ready,
        (GcJoinType::Restart, GcJoinTime::Start) => {
            // Only the heap that did the single-threaded work issues the
            // restart; the others keep waiting until the restart completes.
            if state == HeapSyncState::SingleThreaded {
                HeapSyncState::WaitingInRestart
            } else {
                state
            }
        }
        (GcJoinType::Restart, GcJoinTime::End) => HeapSyncState::Ready,
    }
}

/// Classifies every heap's recorded activity. Called once, when the owning
/// episode's terminating signal arrives.
pub(crate) fn finalize_episode(episode: &mut GcEpisode) {
    for heap in &mut episode.server_heaps {
        heap.finalize();
    }
}

/// Scheduling/sample events observed shortly before a server GC is
/// recognized as started. Fixed capacity, evict-oldest: the window between
/// the actual GC start and the engine noticing it is small, and the newly
/// opened episode is retroactively seeded from this buffer.
#[derive(Debug)]
pub(crate) struct RecentSpanRing {
    spans: VecDeque<ThreadSpan>,
    capacity: usize,
}

impl RecentSpanRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            spans: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, span: ThreadSpan) {
        if self.capacity == 0 {
            return;
        }
        if self.spans.len() == self.capacity {
            self.spans.pop_front();
        }
        self.spans.push_back(span);
    }

    pub(crate) fn spans_since(&self, timestamp_msec: f64) -> impl Iterator<Item = &ThreadSpan> {
        self.spans
            .iter()
            .filter(move |span| span.start_msec >= timestamp_msec)
    }
}

/// Tracks the open scheduling span per processor, machine-wide. A context
/// switch or a sample for a different thread closes the processor's open
/// span and starts a new one.
#[derive(Debug, Default)]
pub(crate) struct ProcessorSpanTracker {
    processors: Vec<Option<OpenSpan>>,
}

#[derive(Debug, Clone, Copy)]
struct OpenSpan {
    thread_id: u32,
    process_id: u32,
    priority: i8,
    start_msec: f64,
}

impl ProcessorSpanTracker {
    fn slot(&mut self, processor: u32) -> &mut Option<OpenSpan> {
        let processor = processor as usize;
        if self.processors.len() <= processor {
            self.processors.resize(processor + 1, None);
        }
        &mut self.processors[processor]
    }

    /// A context switch on `processor`: closes the span of whatever was
    /// running and opens one for the incoming thread.
    pub(crate) fn switch(
        &mut self,
        processor: u32,
        timestamp_msec: f64,
        new_thread_id: u32,
        new_process_id: u32,
        new_priority: i8,
    ) -> Option<ThreadSpan> {
        let slot = self.slot(processor);
        let closed = slot.take().map(|open| ThreadSpan {
            thread_id: open.thread_id,
            process_id: open.process_id,
            priority: open.priority,
            processor,
            start_msec: open.start_msec,
            duration_msec: (timestamp_msec - open.start_msec).max(0.0),
        });
        *slot = Some(OpenSpan {
            thread_id: new_thread_id,
            process_id: new_process_id,
            priority: new_priority,
            start_msec: timestamp_msec,
        });
        closed
    }

    /// A CPU sample on `processor`. If it shows the same thread the open
    /// span already tracks, the span simply continues. A different thread
    /// means the switch event was lost; close the stale span and open one
    /// for the sampled thread, with unknown priority.
    pub(crate) fn sample(
        &mut self,
        processor: u32,
        timestamp_msec: f64,
        thread_id: u32,
        process_id: u32,
    ) -> Option<ThreadSpan> {
        let slot = self.slot(processor);
        match *slot {
            Some(open) if open.thread_id == thread_id => None,
            _ => {
                let closed = slot.take().map(|open| ThreadSpan {
                    thread_id: open.thread_id,
                    process_id: open.process_id,
                    priority: open.priority,
                    processor,
                    start_msec: open.start_msec,
                    duration_msec: (timestamp_msec - open.start_msec).max(0.0),
                });
                *slot = Some(OpenSpan {
                    thread_id,
                    process_id,
                    priority: -1,
                    start_msec: timestamp_msec,
                });
                closed
            }
        }
    }
}
