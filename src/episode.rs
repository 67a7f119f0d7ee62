//! GC episode records and the per-process episode state machine.
//!
//! An episode is one collection attempt, from its start notification through
//! its terminating heap-statistics/restart signal. Episodes are built up
//! incrementally as correlated events arrive; an episode that never receives
//! a required follow-up event stays permanently incomplete and is excluded
//! from rollups, but remains visible to consumers.

use num_traits::FromPrimitive;
use serde_derive::Serialize;

use crate::event::{
    GcGlobalHistoryPayload, GcHeapStatsPayload, GcPerHeapHistoryPayload, GcPinObjectPayload,
    GcPinPlugPayload, GcReason, GcStartPayload, GcStopPayload, GcType, MarkRootKind,
    MARK_ROOT_KIND_COUNT,
};
use crate::process::ProcessGcState;
use crate::server_gc::ServerGcHeapHistory;
use crate::suspension::SuspensionInterval;

const BYTES_PER_MB: f64 = 1_000_000.0;

/// Lifecycle of an episode. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EpisodePhase {
    /// Start notification received.
    Open,
    /// A suspend/resume cycle has been attributed.
    SuspendRecorded,
    /// The GC thread finished; terminal signals outstanding.
    HeapStatsPending,
    /// All terminating signals arrived; fields are frozen.
    Complete,
}

/// A pinned object reported during the mark phase.
#[derive(Debug, Clone, Serialize)]
pub struct PinnedObject {
    pub object_id: u64,
    pub size: u64,
    pub type_name: String,
}

/// A pinned plug (a run of objects the compactor must leave in place).
#[derive(Debug, Clone, Serialize)]
pub struct PinnedPlug {
    pub start: u64,
    pub end: u64,
    pub gap_before_size: u64,
}

/// Mark-phase timing for one heap, indexed by [`MarkRootKind`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeapMarkInfo {
    pub mark_time_msec: [Option<f64>; MARK_ROOT_KIND_COUNT],
    pub promoted_bytes: [Option<u64>; MARK_ROOT_KIND_COUNT],
}

/// One garbage collection attempt.
#[derive(Debug, Serialize)]
pub struct GcEpisode {
    /// Monotonic per-process collection sequence number.
    pub number: u32,
    /// Condemned generation (0/1/2). The global heap history may revise the
    /// start event's claim upward.
    pub generation: u32,
    pub gc_type: GcType,
    /// None when the raw reason value was unknown to this engine.
    pub reason: Option<GcReason>,
    /// True when the start event carried no collection type and the kind was
    /// assumed (legacy runtimes), possibly revised by the restart heuristic.
    pub kind_was_inferred: bool,

    pub start_msec: f64,
    /// GC-thread duration, stop minus start. Zero until the stop arrives.
    pub duration_msec: f64,
    pub pause_start_msec: f64,
    /// Total stop-the-world time attributed to this collection. Background
    /// collections accumulate this over several suspend/resume cycles.
    pub pause_duration_msec: f64,
    pub suspend_duration_msec: f64,
    pub stop_msec: Option<f64>,
    pub restart_end_msec: Option<f64>,

    pub heap_stats: Option<GcHeapStatsPayload>,
    pub global_history: Option<GcGlobalHistoryPayload>,
    pub per_heap_histories: Vec<GcPerHeapHistoryPayload>,
    /// Indexed by heap.
    pub mark_info: Vec<HeapMarkInfo>,
    pub pinned_objects: Vec<PinnedObject>,
    pub pinned_plugs: Vec<PinnedPlug>,

    /// Per logical heap, for server-mode collections; empty otherwise.
    pub server_heaps: Vec<ServerGcHeapHistory>,

    /// Running process allocation accumulators (small, large) in MB when
    /// this episode opened; the next episode differences against these.
    #[serde(skip)]
    pub(crate) alloc_snapshot_mb: (f64, f64),
    pub allocated_small_mb: f64,
    pub allocated_large_mb: f64,
    /// Wall time since the previous collection's restart, for rate metrics.
    pub msec_since_last_restart: Option<f64>,

    phase: EpisodePhase,
}

impl GcEpisode {
    #[allow(clippy::too_many_arguments)]
    fn new(
        number: u32,
        generation: u32,
        gc_type: GcType,
        reason: Option<GcReason>,
        kind_was_inferred: bool,
        start_msec: f64,
        pause_start_msec: f64,
    ) -> Self {
        Self {
            number,
            generation,
            gc_type,
            reason,
            kind_was_inferred,
            start_msec,
            duration_msec: 0.0,
            pause_start_msec,
            pause_duration_msec: 0.0,
            suspend_duration_msec: 0.0,
            stop_msec: None,
            restart_end_msec: None,
            heap_stats: None,
            global_history: None,
            per_heap_histories: Vec::new(),
            mark_info: Vec::new(),
            pinned_objects: Vec::new(),
            pinned_plugs: Vec::new(),
            server_heaps: Vec::new(),
            alloc_snapshot_mb: (0.0, 0.0),
            allocated_small_mb: 0.0,
            allocated_large_mb: 0.0,
            msec_since_last_restart: None,
            phase: EpisodePhase::Open,
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == EpisodePhase::Complete
    }

    pub fn is_induced(&self) -> bool {
        self.reason.is_some_and(|r| r.is_induced())
    }

    pub fn allocated_since_last_mb(&self) -> f64 {
        self.allocated_small_mb + self.allocated_large_mb
    }

    /// Allocation rate leading into this collection, MB/sec.
    pub fn allocation_rate_mb_per_sec(&self) -> Option<f64> {
        match self.msec_since_last_restart {
            Some(interval) if interval > 0.0 => {
                Some(self.allocated_since_last_mb() / interval * 1000.0)
            }
            _ => None,
        }
    }

    /// Heap size after the collection, from the heap-stats snapshot.
    pub fn size_after_mb(&self) -> Option<f64> {
        let stats = self.heap_stats.as_ref()?;
        Some(stats.generation_size.iter().sum::<u64>() as f64 / BYTES_PER_MB)
    }

    pub fn gen_size_after_mb(&self, generation: usize) -> Option<f64> {
        let stats = self.heap_stats.as_ref()?;
        Some(*stats.generation_size.get(generation)? as f64 / BYTES_PER_MB)
    }

    pub fn promoted_mb(&self) -> Option<f64> {
        let stats = self.heap_stats.as_ref()?;
        Some(stats.total_promoted.iter().sum::<u64>() as f64 / BYTES_PER_MB)
    }

    /// Heap size before the collection, summed over per-heap histories.
    /// Only meaningful when detailed per-heap data is present.
    pub fn size_before_mb(&self) -> Option<f64> {
        if self.per_heap_histories.is_empty() {
            return None;
        }
        let bytes: u64 = self
            .per_heap_histories
            .iter()
            .flat_map(|h| h.generations.iter())
            .map(|g| g.size_before)
            .sum();
        Some(bytes as f64 / BYTES_PER_MB)
    }

    /// Fragmentation after the collection, summed over per-heap histories.
    pub fn fragmentation_mb(&self) -> Option<f64> {
        if self.per_heap_histories.is_empty() {
            return None;
        }
        let bytes: u64 = self
            .per_heap_histories
            .iter()
            .flat_map(|h| h.generations.iter())
            .map(|g| g.fragmentation)
            .sum();
        Some(bytes as f64 / BYTES_PER_MB)
    }

    pub fn pinned_object_bytes(&self) -> u64 {
        self.pinned_objects.iter().map(|p| p.size).sum()
    }

    fn advance(&mut self, phase: EpisodePhase) {
        self.phase = self.phase.max(phase);
    }

    fn attach_suspension(&mut self, interval: &SuspensionInterval) {
        if self.is_complete() {
            return;
        }
        match self.gc_type {
            // Background collections stop the world more than once; every
            // cycle adds up.
            GcType::Background => {
                self.suspend_duration_msec += interval.duration_msec;
            }
            _ => {
                if self.phase >= EpisodePhase::SuspendRecorded {
                    log::debug!(
                        "second suspend interval for blocking GC #{}, keeping the first",
                        self.number
                    );
                    return;
                }
                self.suspend_duration_msec = interval.duration_msec;
            }
        }
        self.advance(EpisodePhase::SuspendRecorded);
    }

    fn record_stop(&mut self, timestamp_msec: f64) {
        if self.is_complete() {
            return;
        }
        self.stop_msec = Some(timestamp_msec);
        self.duration_msec = (timestamp_msec - self.start_msec).max(0.0);
        self.advance(EpisodePhase::HeapStatsPending);
    }

    fn record_restart_end(&mut self, timestamp_msec: f64) {
        if self.is_complete() {
            return;
        }
        self.restart_end_msec = Some(timestamp_msec);
        self.pause_duration_msec = (timestamp_msec - self.pause_start_msec).max(0.0);
    }

    /// One suspend/restart cycle ended while this background collection was
    /// in flight; fold the cycle into its accumulated pause time.
    fn accumulate_background_pause(&mut self, cycle_start_msec: f64, timestamp_msec: f64) {
        if self.is_complete() {
            return;
        }
        self.pause_duration_msec += (timestamp_msec - cycle_start_msec).max(0.0);
    }

    /// Whether all terminating signals for this episode's kind have arrived.
    /// Background collections end on their heap-stats snapshot; blocking
    /// collections need both heap-stats and the restart, in either order.
    fn ready_to_complete(&self) -> bool {
        match self.gc_type {
            GcType::Background => self.heap_stats.is_some(),
            _ => self.heap_stats.is_some() && self.restart_end_msec.is_some(),
        }
    }

    fn complete(&mut self) {
        if self.is_complete() {
            debug_assert!(false, "episode finalized twice");
            log::error!("episode #{} finalized twice", self.number);
            return;
        }
        self.phase = EpisodePhase::Complete;
    }
}

/// Episode state machine: routes correlated GC events onto the right episode
/// of a process. The two routing slots (`current_foreground`,
/// `current_background`) are the only lookup; anything that arrives with no
/// matching open episode is dropped for that event.
impl ProcessGcState {
    /// Returns true when a new episode was opened (false for duplicates).
    pub(crate) fn gc_start(&mut self, timestamp_msec: f64, payload: &GcStartPayload) -> bool {
        // Some providers emit the start notification twice. Duplicates are
        // always adjacent in the stream, so comparing against the tail
        // episode alone is sufficient.
        if let Some(tail) = self.episodes.last() {
            if tail.number == payload.count {
                log::debug!("duplicate GCStart #{} dropped", payload.count);
                return false;
            }
        }

        let reason = GcReason::from_u32(payload.reason);
        if reason.is_none() {
            log::warn!("unknown GC reason {} on GCStart", payload.reason);
        }
        let (gc_type, kind_was_inferred) = match payload.gc_type {
            Some(raw) => match GcType::from_u32(raw) {
                Some(t) => (t, false),
                None => {
                    log::warn!("unknown GC type {raw} on GCStart");
                    (GcType::Blocking, true)
                }
            },
            // Legacy runtimes carry no type field. Assume blocking; the
            // restart handler may reclassify (see restart_ee_end).
            None => (GcType::Blocking, true),
        };

        // A non-concurrent collection starting while an incomplete background
        // collection is open is the ephemeral collection that runs inside the
        // background GC's initial suspension. It does not share the outer
        // suspension interval, so its pause starts at its own timestamp.
        let background_open = self
            .current_background
            .map(|idx| !self.episodes[idx].is_complete())
            .unwrap_or(false);
        let pause_start_msec = if background_open && gc_type != GcType::Background {
            timestamp_msec
        } else {
            self.open_pause_start.unwrap_or(timestamp_msec)
        };

        let mut episode = GcEpisode::new(
            payload.count,
            payload.depth,
            gc_type,
            reason,
            kind_was_inferred,
            timestamp_msec,
            pause_start_msec,
        );

        episode.alloc_snapshot_mb = (self.alloc_small_mb, self.alloc_large_mb);
        let (prev_small, prev_large) = self
            .episodes
            .last()
            .map(|e| e.alloc_snapshot_mb)
            .unwrap_or((0.0, 0.0));
        episode.allocated_small_mb = (self.alloc_small_mb - prev_small).max(0.0);
        episode.allocated_large_mb = (self.alloc_large_mb - prev_large).max(0.0);
        episode.msec_since_last_restart = self
            .last_restart_end_msec
            .map(|t| (timestamp_msec - t).max(0.0));

        if self.heap_count > 1 {
            episode.server_heaps = (0..self.heap_count)
                .map(|h| ServerGcHeapHistory::new(h))
                .collect();
        }

        let idx = self.episodes.len();
        self.episodes.push(episode);
        if gc_type == GcType::Background {
            if self.current_background.is_some() {
                debug_assert!(false, "background GC started while one is open");
                log::error!("background GC #{} started while one is open", payload.count);
            }
            self.current_background = Some(idx);
        } else {
            if self.current_foreground.is_some() {
                // The previous collection never saw its terminating events;
                // it stays incomplete and loses the routing slot.
                log::debug!("GCStart #{} while a foreground GC is open", payload.count);
            }
            self.current_foreground = Some(idx);
        }
        true
    }

    pub(crate) fn allocation_tick(&mut self, kind: crate::event::AllocationKind, amount_bytes: u64) {
        let mb = amount_bytes as f64 / BYTES_PER_MB;
        match kind {
            crate::event::AllocationKind::Small => self.alloc_small_mb += mb,
            crate::event::AllocationKind::Large => self.alloc_large_mb += mb,
        }
    }

    pub(crate) fn gc_stop(&mut self, timestamp_msec: f64, payload: &GcStopPayload) {
        // Match by sequence number, foreground first: for server-mode
        // background collections, a foreground collection's events interleave
        // with the background collection's.
        let idx = [self.current_foreground, self.current_background]
            .into_iter()
            .flatten()
            .find(|&idx| self.episodes[idx].number == payload.count);
        let Some(idx) = idx else {
            log::debug!("GCStop #{} with no matching open episode", payload.count);
            return;
        };
        self.episodes[idx].record_stop(timestamp_msec);
    }

    pub(crate) fn suspension_ended(&mut self, interval: &SuspensionInterval) {
        if !interval.counts_toward_gc_pause() {
            return;
        }
        if let Some(idx) = self.current_foreground.or(self.current_background) {
            self.episodes[idx].attach_suspension(interval);
        }
    }

    pub(crate) fn heap_stats(&mut self, timestamp_msec: f64, payload: GcHeapStatsPayload) {
        // Route to the "last GC": the open foreground if any, else the open
        // background. For server-mode background collections this snapshot
        // can be observed interleaved with unrelated foreground collections
        // that started and finished afterward, which is why the slots are
        // consulted in this order.
        let Some(idx) = self.current_foreground.or(self.current_background) else {
            log::debug!("GCHeapStats with no open episode at {timestamp_msec}");
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        episode.heap_stats = Some(payload);
        self.try_complete(idx);
    }

    pub(crate) fn restart_ee_end(&mut self, timestamp_msec: f64) {
        let cycle_start = self.open_pause_start.take();

        if let Some(idx) = self.current_foreground {
            let episode = &mut self.episodes[idx];

            // Legacy runtimes never say whether a collection was concurrent.
            // A collection whose GC thread has reported no work by restart
            // time is assumed concurrent. Best-effort only; structured start
            // events never take this path.
            if episode.kind_was_inferred && episode.stop_msec.is_none() {
                log::debug!(
                    "reclassifying GC #{} as background (no stop before restart)",
                    episode.number
                );
                episode.gc_type = GcType::Background;
                if self.current_background.is_none() {
                    self.current_background = Some(idx);
                }
                self.current_foreground = None;
            } else {
                episode.record_restart_end(timestamp_msec);
                self.last_restart_end_msec = Some(timestamp_msec);
                self.try_complete(idx);

                // A background collection whose interval the foreground
                // collection nests within pauses for this cycle too.
                if let Some(bidx) = self.current_background {
                    if bidx != idx {
                        let fg_pause_start = self.episodes[idx].pause_start_msec;
                        let start = cycle_start.unwrap_or(fg_pause_start);
                        self.episodes[bidx].accumulate_background_pause(start, timestamp_msec);
                    }
                }
                return;
            }
        }

        if let Some(bidx) = self.current_background {
            let episode = &mut self.episodes[bidx];
            let start = cycle_start.unwrap_or(episode.pause_start_msec);
            episode.accumulate_background_pause(start, timestamp_msec);
            self.last_restart_end_msec = Some(timestamp_msec);
        }
    }

    pub(crate) fn global_heap_history(
        &mut self,
        timestamp_msec: f64,
        payload: GcGlobalHistoryPayload,
    ) {
        if let Err(err) = payload.check_schema() {
            log::warn!("pid {}: {err}", self.pid);
            self.version_mismatch = true;
            return;
        }

        // The heap count is process-wide configuration; track it even if no
        // episode is open so the next collection starts in server mode.
        if payload.num_heaps > self.heap_count {
            self.heap_count = payload.num_heaps;
        }

        let Some(idx) = self.current_foreground.or(self.current_background) else {
            log::debug!("GCGlobalHeapHistory with no open episode at {timestamp_msec}");
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        // The start event under-reports the condemned generation when the
        // collector escalates; the global history is authoritative.
        if payload.condemned_generation > episode.generation {
            episode.generation = payload.condemned_generation;
        }
        episode.global_history = Some(payload);
    }

    pub(crate) fn per_heap_history(
        &mut self,
        timestamp_msec: f64,
        payload: GcPerHeapHistoryPayload,
    ) {
        if let Err(err) = payload.check_schema() {
            log::warn!("pid {}: {err}", self.pid);
            self.version_mismatch = true;
            return;
        }
        if !self.props.collect_detailed_heap_data {
            return;
        }
        let Some(idx) = self.current_foreground.or(self.current_background) else {
            log::debug!("GCPerHeapHistory with no open episode at {timestamp_msec}");
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        episode.per_heap_histories.push(payload);
        self.has_detailed_heap_data = true;
    }

    pub(crate) fn mark(
        &mut self,
        timestamp_msec: f64,
        thread_id: u32,
        payload: &crate::event::GcMarkPayload,
    ) {
        // Mark events arrive on the worker thread of their heap; that is how
        // server-mode worker identities are learned.
        if self.heap_count > 1 {
            self.server_worker_tids.insert(thread_id, payload.heap_index);
        }

        let Some(idx) = self.current_foreground.or(self.current_background) else {
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        if let Some(heap) = episode.server_heaps.get_mut(payload.heap_index as usize) {
            heap.set_worker_thread(thread_id);
        }
        if !self.props.collect_detailed_heap_data {
            return;
        }
        let Some(root_kind) = MarkRootKind::from_u32(payload.root_kind) else {
            log::warn!("unknown mark root kind {}", payload.root_kind);
            return;
        };
        let heap_index = payload.heap_index as usize;
        if episode.mark_info.len() <= heap_index {
            episode
                .mark_info
                .resize_with(heap_index + 1, HeapMarkInfo::default);
        }
        let info = &mut episode.mark_info[heap_index];
        info.mark_time_msec[root_kind as usize] = Some(timestamp_msec);
        info.promoted_bytes[root_kind as usize] = Some(payload.promoted_bytes);
    }

    pub(crate) fn pin_object(&mut self, payload: GcPinObjectPayload) {
        if !self.props.collect_detailed_heap_data {
            return;
        }
        let Some(idx) = self.current_foreground.or(self.current_background) else {
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        episode.pinned_objects.push(PinnedObject {
            object_id: payload.object_id,
            size: payload.object_size,
            type_name: payload.type_name,
        });
    }

    pub(crate) fn pin_plug(&mut self, payload: &GcPinPlugPayload) {
        if !self.props.collect_detailed_heap_data {
            return;
        }
        let Some(idx) = self.current_foreground.or(self.current_background) else {
            return;
        };
        let episode = &mut self.episodes[idx];
        if episode.is_complete() {
            return;
        }
        episode.pinned_plugs.push(PinnedPlug {
            start: payload.plug_start,
            end: payload.plug_end,
            gap_before_size: payload.gap_before_size,
        });
    }

    /// Finalize the episode at `idx` if its terminating signals are all in,
    /// freeing whichever routing slot pointed at it.
    fn try_complete(&mut self, idx: usize) {
        if !self.episodes[idx].ready_to_complete() {
            return;
        }
        let episode = &mut self.episodes[idx];
        crate::server_gc::finalize_episode(episode);
        episode.complete();
        if self.current_foreground == Some(idx) {
            self.current_foreground = None;
        }
        if self.current_background == Some(idx) {
            self.current_background = None;
        }
    }
}

#[cfg(test)]
impl GcEpisode {
    pub(crate) fn new_for_test(
        number: u32,
        generation: u32,
        gc_type: GcType,
        reason: GcReason,
    ) -> Self {
        Self::new(number, generation, gc_type, Some(reason), false, 0.0, 0.0)
    }

    pub(crate) fn force_complete_for_test(&mut self) {
        self.phase = EpisodePhase::Complete;
    }
}
