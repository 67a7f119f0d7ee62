//! Typed trace event records.
//!
//! The event source adapter normalizes the wire format and hands each record
//! to the [`GcEventListener`](crate::GcEventListener) as an owned payload
//! value plus a fixed [`EventHeader`]. Payloads are plain value types; moving
//! them into the listener is the single copy out of whatever buffer the
//! adapter reuses for the next record.

use std::fmt::Display;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use serde_derive::Serialize;
use thiserror::Error;

/// Fields common to every event record.
///
/// `timestamp_relative_msec` is relative to the start of the trace. For
/// scheduler events (`ContextSwitch`, `CpuSample`) the header's
/// `process_id` / `thread_id` identify the thread that is *running* after
/// the event.
#[derive(Debug, Clone, Copy)]
pub struct EventHeader {
    pub process_id: u32,
    pub thread_id: u32,
    pub processor_number: u32,
    pub timestamp_relative_msec: f64,
}

/// The process id the OS scheduler reports for the idle loop.
pub const IDLE_PROCESS_ID: u32 = 0;

/// Why a collection was triggered.
/// <https://learn.microsoft.com/en-us/dotnet/fundamentals/diagnostics/runtime-garbage-collection-events>
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum GcReason {
    AllocSmall = 0,
    Induced,
    LowMemory,
    Empty,
    AllocLarge,
    OutOfSpaceSmallObjectHeap,
    OutOfSpaceLargeObjectHeap,
    InducedNoForce,
    Stress,
    InducedLowMemory,
}

impl GcReason {
    /// True for the reasons that count toward the rollup's induced-GC totals.
    pub fn is_induced(&self) -> bool {
        matches!(
            self,
            GcReason::Induced | GcReason::InducedNoForce | GcReason::InducedLowMemory
        )
    }
}

impl Display for GcReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcReason::AllocSmall => f.write_str("Small object heap allocation"),
            GcReason::Induced => f.write_str("Induced"),
            GcReason::LowMemory => f.write_str("Low memory"),
            GcReason::Empty => f.write_str("Empty"),
            GcReason::AllocLarge => f.write_str("Large object heap allocation"),
            GcReason::OutOfSpaceSmallObjectHeap => {
                f.write_str("Out of space (for small object heap)")
            }
            GcReason::OutOfSpaceLargeObjectHeap => {
                f.write_str("Out of space (for large object heap)")
            }
            GcReason::InducedNoForce => f.write_str("Induced but not forced as blocking"),
            GcReason::Stress => f.write_str("Stress"),
            GcReason::InducedLowMemory => f.write_str("Induced low memory"),
        }
    }
}

/// The collection kind carried by the GC start event.
///
/// `BlockingDuringBackground` is a foreground collection of an ephemeral
/// generation that runs (and stops the world) while a background gen2
/// collection is still in flight on the same process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum GcType {
    Blocking = 0,
    Background,
    BlockingDuringBackground,
}

impl Display for GcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcType::Blocking => f.write_str("Blocking GC"),
            GcType::Background => f.write_str("Background GC"),
            GcType::BlockingDuringBackground => f.write_str("Blocking GC during background GC"),
        }
    }
}

/// Why the execution engine suspended managed threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum GcSuspendReason {
    Other = 0,
    GC,
    AppDomainShutdown,
    CodePitching,
    Shutdown,
    Debugger,
    GcPrep,
    DebuggerSweep,
}

impl GcSuspendReason {
    /// Only collector-initiated suspensions feed pause-time accounting; a
    /// debugger or shutdown suspension is recorded but excluded.
    pub fn counts_toward_gc_pause(&self) -> bool {
        matches!(self, GcSuspendReason::GC | GcSuspendReason::GcPrep)
    }
}

impl Display for GcSuspendReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcSuspendReason::Other => f.write_str("Other"),
            GcSuspendReason::GC => f.write_str("GC"),
            GcSuspendReason::AppDomainShutdown => f.write_str("AppDomain shutdown"),
            GcSuspendReason::CodePitching => f.write_str("Code pitching"),
            GcSuspendReason::Shutdown => f.write_str("Shutdown"),
            GcSuspendReason::Debugger => f.write_str("Debugger"),
            GcSuspendReason::GcPrep => f.write_str("GC prep"),
            GcSuspendReason::DebuggerSweep => f.write_str("Debugger sweep"),
        }
    }
}

/// Which root set a mark-phase sub-event covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum MarkRootKind {
    Stack = 0,
    FinalizeQueue,
    Handles,
    OlderGeneration,
    SizedRef,
}

/// The number of [`MarkRootKind`] variants, for fixed-size per-heap arrays.
pub const MARK_ROOT_KIND_COUNT: usize = 5;

/// Small-object vs. large-object allocation, from the allocation tick event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum AllocationKind {
    Small = 0,
    Large,
}

/// The barrier flavor carried by a GC join event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum GcJoinType {
    /// The last worker to arrive; it performs the single-threaded work.
    LastJoin = 0,
    /// An ordinary worker arriving at the barrier.
    Join,
    /// The global wake-up signal after the single-threaded work.
    Restart,
    /// The first worker to arrive at the barrier.
    FirstJoin,
}

/// Whether a join event marks entry into or exit out of the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum GcJoinTime {
    Start = 0,
    End,
}

bitflags! {
    /// Mechanisms the collector reports having used, from the global heap
    /// history event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcGlobalMechanisms: u32 {
        const CONCURRENT = 0x1;
        const COMPACTION = 0x2;
        const PROMOTION = 0x4;
        const DEMOTION = 0x8;
        const CARD_BUNDLES = 0x10;
        const ELEVATION = 0x20;

        const _ = !0;
    }
}

/// A history payload used a schema revision this engine does not understand.
///
/// Handlers catch this at the attach site, set the sticky per-process
/// version-mismatch flag and drop the detailed fields; the stream continues.
#[derive(Debug, Clone, Error)]
pub enum HistorySchemaError {
    #[error("unsupported per-heap history schema version {0}")]
    UnsupportedPerHeapVersion(u32),
    #[error("unsupported global heap history schema version {0}")]
    UnsupportedGlobalVersion(u32),
}

#[derive(Debug, Clone)]
pub struct ProcessStartPayload {
    pub name: String,
    pub command_line: String,
}

/// Managed runtime version and pointer width, from the runtime-information
/// rundown event.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RuntimeInformationPayload {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
    pub bitness: u32,
}

#[derive(Debug, Clone)]
pub struct GcStartPayload {
    /// Monotonic per-process collection sequence number.
    pub count: u32,
    /// Condemned generation as claimed by the start event. The global heap
    /// history may later revise this upward.
    pub depth: u32,
    /// Raw [`GcReason`] value.
    pub reason: u32,
    /// Raw [`GcType`] value. Legacy runtimes do not emit this field.
    pub gc_type: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GcStopPayload {
    pub count: u32,
    pub depth: u32,
}

/// Heap-wide size and promotion snapshot emitted once per collection.
/// <https://learn.microsoft.com/en-us/dotnet/fundamentals/diagnostics/runtime-garbage-collection-events#gcheapstats_v2-event>
#[derive(Debug, Clone, Serialize)]
pub struct GcHeapStatsPayload {
    /// Bytes per generation after the collection; index 3 is the large
    /// object heap.
    pub generation_size: [u64; 4],
    /// Bytes promoted out of each generation.
    pub total_promoted: [u64; 4],
    pub finalization_promoted_size: u64,
    pub finalization_promoted_count: u64,
    pub pinned_object_count: u32,
    pub sink_block_count: u32,
    pub gc_handle_count: u32,
}

/// Whole-process heap history emitted at the end of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct GcGlobalHistoryPayload {
    pub version: u32,
    pub final_youngest_desired: u64,
    pub num_heaps: u32,
    pub condemned_generation: u32,
    pub gen0_reduction_count: u32,
    pub reason: u32,
    /// Raw [`GcGlobalMechanisms`] bits.
    pub global_mechanisms: u32,
    pub pause_mode: Option<u32>,
    pub memory_pressure: Option<u32>,
}

impl GcGlobalHistoryPayload {
    const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 1..=2;

    pub fn check_schema(&self) -> Result<(), HistorySchemaError> {
        if Self::SUPPORTED_VERSIONS.contains(&self.version) {
            Ok(())
        } else {
            Err(HistorySchemaError::UnsupportedGlobalVersion(self.version))
        }
    }

    pub fn mechanisms(&self) -> GcGlobalMechanisms {
        GcGlobalMechanisms::from_bits_retain(self.global_mechanisms)
    }
}

/// Per-generation detail within a per-heap history.
#[derive(Debug, Clone, Serialize)]
pub struct GcPerHeapGenData {
    pub generation: u32,
    pub size_before: u64,
    pub size_after: u64,
    pub fragmentation: u64,
    pub promoted: u64,
    /// Allocation budget for the generation going forward.
    pub budget: u64,
    pub surv_rate_percent: u32,
    pub pinned_surv: u64,
    pub non_pinned_surv: u64,
}

/// One heap's history for one collection, emitted per logical heap.
#[derive(Debug, Clone, Serialize)]
pub struct GcPerHeapHistoryPayload {
    pub version: u32,
    pub heap_index: u32,
    pub free_list_allocated: Option<u64>,
    pub free_list_rejected: Option<u64>,
    /// One entry per generation the collection touched, youngest first.
    pub generations: Vec<GcPerHeapGenData>,
}

impl GcPerHeapHistoryPayload {
    const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 1..=3;

    pub fn check_schema(&self) -> Result<(), HistorySchemaError> {
        if Self::SUPPORTED_VERSIONS.contains(&self.version) {
            Ok(())
        } else {
            Err(HistorySchemaError::UnsupportedPerHeapVersion(self.version))
        }
    }
}

#[derive(Debug, Clone)]
pub struct GcAllocationTickPayload {
    /// Raw [`AllocationKind`] value.
    pub kind: u32,
    /// Bytes allocated since the previous tick of this kind.
    pub amount_bytes: u64,
    pub type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GcSuspendEePayload {
    /// Raw [`GcSuspendReason`] value.
    pub reason: u32,
    /// Sequence number of the collection this suspension belongs to, when
    /// the runtime knows it at suspension time.
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct GcMarkPayload {
    pub heap_index: u32,
    /// Raw [`MarkRootKind`] value.
    pub root_kind: u32,
    pub promoted_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GcPinObjectPayload {
    pub object_id: u64,
    pub object_size: u64,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub struct GcPinPlugPayload {
    pub plug_start: u64,
    pub plug_end: u64,
    pub gap_before_size: u64,
}

#[derive(Debug, Clone)]
pub struct GcJoinPayload {
    /// Heap index, or negative when the join carries no heap (restart
    /// broadcasts).
    pub heap: i32,
    /// Raw [`GcJoinTime`] value.
    pub join_time: u32,
    /// Raw [`GcJoinType`] value.
    pub join_type: u32,
}

/// A scheduler context switch. The header identifies the incoming thread;
/// the payload carries both sides' ids and priorities.
#[derive(Debug, Clone, Copy)]
pub struct ContextSwitchPayload {
    pub old_thread_id: u32,
    pub old_thread_priority: i8,
    pub new_thread_id: u32,
    pub new_thread_priority: i8,
}

/// A sampled-profile interrupt. The header identifies the running thread and
/// processor.
#[derive(Debug, Clone, Copy)]
pub struct CpuSamplePayload {
    pub instruction_pointer: u64,
}
