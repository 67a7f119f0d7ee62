//! Per-process analysis state and the process registry.

use rustc_hash::FxHashMap;

use crate::analyzer::AnalyzerProps;
use crate::episode::GcEpisode;
use crate::event::RuntimeInformationPayload;
use crate::rollup::GcRollup;
use crate::suspension::SuspensionTracker;

/// Mutable analysis state for one process incarnation.
///
/// Consumers get read-only access through the accessor methods; all mutation
/// happens through the event handlers in this crate.
#[derive(Debug)]
pub struct ProcessGcState {
    pub(crate) pid: u32,
    pub(crate) name: Option<String>,
    pub(crate) command_line: Option<String>,
    pub(crate) runtime: Option<RuntimeInformationPayload>,
    pub(crate) start_time_msec: Option<f64>,
    pub(crate) end_time_msec: Option<f64>,
    pub(crate) alive: bool,

    pub(crate) cpu_msec: f64,
    /// Running allocation accumulators in MB, split by object size class.
    /// Episodes difference these at their boundaries.
    pub(crate) alloc_small_mb: f64,
    pub(crate) alloc_large_mb: f64,

    /// Append-only, ordered by creation.
    pub(crate) episodes: Vec<GcEpisode>,
    /// Routing slots for in-flight collections. At most one of each is open
    /// at any time; out-of-order sub-events resolve against these.
    pub(crate) current_foreground: Option<usize>,
    pub(crate) current_background: Option<usize>,

    pub(crate) suspension: SuspensionTracker,
    /// Pause start of the suspend/restart cycle currently in effect. Set at
    /// suspend-begin for collector-initiated suspensions, consumed at
    /// restart-end. Outlives the suspension tracker's interval because the
    /// pause extends past suspend-end until the restart.
    pub(crate) open_pause_start: Option<f64>,
    pub(crate) last_restart_end_msec: Option<f64>,

    /// Logical heap count, learned from the global heap history. A value
    /// greater than one switches the process into server-GC correlation.
    pub(crate) heap_count: u32,
    /// Server-GC worker thread ids, learned from mark and join events.
    pub(crate) server_worker_tids: FxHashMap<u32, u32>,

    /// Sticky: some history payload used an unrecognized schema version.
    pub(crate) version_mismatch: bool,
    /// At least one episode carries per-heap detail, so detailed derived
    /// columns are meaningful for this process.
    pub(crate) has_detailed_heap_data: bool,

    pub(crate) props: AnalyzerProps,
}

impl ProcessGcState {
    fn new(pid: u32, start_time_msec: Option<f64>, props: AnalyzerProps) -> Self {
        Self {
            pid,
            name: None,
            command_line: None,
            runtime: None,
            start_time_msec,
            end_time_msec: None,
            alive: true,
            cpu_msec: 0.0,
            alloc_small_mb: 0.0,
            alloc_large_mb: 0.0,
            episodes: Vec::new(),
            current_foreground: None,
            current_background: None,
            suspension: SuspensionTracker::new(),
            open_pause_start: None,
            last_restart_end_msec: None,
            heap_count: 1,
            server_worker_tids: FxHashMap::default(),
            version_mismatch: false,
            has_detailed_heap_data: false,
            props,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    pub fn runtime(&self) -> Option<&RuntimeInformationPayload> {
        self.runtime.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn start_time_msec(&self) -> Option<f64> {
        self.start_time_msec
    }

    pub fn end_time_msec(&self) -> Option<f64> {
        self.end_time_msec
    }

    pub fn cpu_msec(&self) -> f64 {
        self.cpu_msec
    }

    pub fn heap_count(&self) -> u32 {
        self.heap_count
    }

    pub fn uses_server_gc(&self) -> bool {
        self.heap_count > 1
    }

    /// The ordered episode list, including incomplete episodes.
    pub fn episodes(&self) -> &[GcEpisode] {
        &self.episodes
    }

    /// Sticky flag: a history payload used a schema revision this engine
    /// does not understand, and detailed fields were dropped for at least
    /// one episode.
    pub fn version_mismatch(&self) -> bool {
        self.version_mismatch
    }

    /// Gates which detailed derived columns are meaningful.
    pub fn has_detailed_heap_data(&self) -> bool {
        self.has_detailed_heap_data
    }

    /// Aggregate statistics over this process's completed episodes.
    /// Recomputed from scratch on every call; order-independent and
    /// side-effect free.
    pub fn rollup(&self) -> GcRollup {
        GcRollup::compute(&self.episodes)
    }

    pub(crate) fn worker_heap_for_thread(&self, tid: u32) -> Option<u32> {
        self.server_worker_tids.get(&tid).copied()
    }

    /// Index of the episode in-flight for routing purposes: the open
    /// foreground collection if any, else the open background one.
    pub(crate) fn in_flight_episode(&self) -> Option<usize> {
        self.current_foreground.or(self.current_background)
    }
}

/// Maps process ids to live analysis state, keeping dead incarnations
/// reachable for reporting.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes_by_pid: FxHashMap<u32, ProcessGcState>,
    /// Earlier incarnations of pids that were reused by a new process.
    dead_processes_with_reused_pids: Vec<ProcessGcState>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live state for `pid`, created on first reference. Events can
    /// legitimately arrive before the process-start notification (or for
    /// processes that started before the trace), so creation is implicit.
    pub fn get_or_create(
        &mut self,
        pid: u32,
        timestamp_msec: f64,
        props: &AnalyzerProps,
    ) -> &mut ProcessGcState {
        self.processes_by_pid
            .entry(pid)
            .or_insert_with(|| ProcessGcState::new(pid, Some(timestamp_msec), *props))
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut ProcessGcState> {
        self.processes_by_pid.get_mut(&pid)
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessGcState> {
        self.processes_by_pid.get(&pid)
    }

    /// Flags a process as dead without destroying it: its history must
    /// survive for the final rollup, and late events for the old incarnation
    /// keep routing to it until the pid is actually reused. Death only gates
    /// reuse detection.
    pub fn mark_dead(&mut self, pid: u32, timestamp_msec: f64) {
        if let Some(process) = self.processes_by_pid.get_mut(&pid) {
            process.alive = false;
            process.end_time_msec = Some(timestamp_msec);
        }
    }

    /// Installs a fresh state for a pid that the OS reused for a new
    /// process. The previous incarnation moves to the dead list, where it
    /// stays reachable for reporting.
    pub fn replace_on_restart(
        &mut self,
        pid: u32,
        new_start_timestamp_msec: f64,
        props: &AnalyzerProps,
    ) -> &mut ProcessGcState {
        if let Some(mut old) = self.processes_by_pid.remove(&pid) {
            old.alive = false;
            if old.end_time_msec.is_none() {
                old.end_time_msec = Some(new_start_timestamp_msec);
            }
            self.dead_processes_with_reused_pids.push(old);
        }
        self.processes_by_pid
            .entry(pid)
            .or_insert_with(|| ProcessGcState::new(pid, Some(new_start_timestamp_msec), *props))
    }

    /// All tracked incarnations: current states plus earlier incarnations
    /// of reused pids. Iteration order of the current states is arbitrary.
    pub fn all_processes(&self) -> impl Iterator<Item = &ProcessGcState> {
        self.dead_processes_with_reused_pids
            .iter()
            .chain(self.processes_by_pid.values())
    }

    pub(crate) fn live_processes_mut(&mut self) -> impl Iterator<Item = &mut ProcessGcState> {
        self.processes_by_pid.values_mut()
    }
}
