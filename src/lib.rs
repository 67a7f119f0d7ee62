//! Reconstruct garbage-collection episodes from CoreCLR diagnostic traces.
//!
//! This crate turns a chronological, multi-provider stream of runtime and
//! OS-scheduler trace events into, per traced process, an ordered timeline
//! of GC episodes with derived metrics: pause times, heap sizes, allocation
//! and promotion rates, and server-GC worker-thread concurrency.
//!
//! The engine is purely computational. An event source adapter (ETW, nettrace,
//! or anything else that can produce the typed records in [`event`]) owns the
//! session and the wire format; it drives a [`GcTraceAnalyzer`] through the
//! [`GcEventListener`] trait, one call per event, in trace timestamp order.
//! Report renderers read the results back through accessors.
//!
//! ## Example
//!
//! ```
//! use coreclr_gc_episodes::{
//!     AnalyzerProps, EventHeader, GcEventListener, GcStartPayload, GcTraceAnalyzer,
//! };
//!
//! let mut analyzer = GcTraceAnalyzer::new(AnalyzerProps::default());
//!
//! // The adapter delivers events like this one, in timestamp order.
//! let header = EventHeader {
//!     process_id: 1234,
//!     thread_id: 5678,
//!     processor_number: 0,
//!     timestamp_relative_msec: 10.0,
//! };
//! analyzer.on_gc_start(
//!     header,
//!     GcStartPayload { count: 1, depth: 0, reason: 0, gc_type: Some(0) },
//! );
//! // ... the rest of the stream ...
//! analyzer.finish();
//!
//! let process = analyzer.process(1234).unwrap();
//! assert_eq!(process.episodes().len(), 1);
//! // Never received its terminating events, so it is incomplete and the
//! // rollup excludes it.
//! assert!(!process.episodes()[0].is_complete());
//! assert_eq!(process.rollup().gc_count(), 0);
//! ```

mod analyzer;
mod episode;
mod event;
mod listener;
mod process;
mod rollup;
mod server_gc;
mod suspension;

pub use analyzer::{AnalyzerProps, GcTraceAnalyzer};
pub use episode::{EpisodePhase, GcEpisode, HeapMarkInfo, PinnedObject, PinnedPlug};
pub use event::{
    AllocationKind, ContextSwitchPayload, CpuSamplePayload, EventHeader, GcAllocationTickPayload,
    GcGlobalHistoryPayload, GcGlobalMechanisms, GcHeapStatsPayload, GcJoinPayload, GcJoinTime,
    GcJoinType, GcMarkPayload, GcPerHeapGenData, GcPerHeapHistoryPayload, GcPinObjectPayload,
    GcPinPlugPayload, GcReason, GcStartPayload, GcStopPayload, GcSuspendEePayload,
    GcSuspendReason, GcType, HistorySchemaError, MarkRootKind, ProcessStartPayload,
    RuntimeInformationPayload, IDLE_PROCESS_ID, MARK_ROOT_KIND_COUNT,
};
pub use listener::GcEventListener;
pub use process::{ProcessGcState, ProcessRegistry};
pub use rollup::{GcRollup, HeapGenerationStats};
pub use server_gc::{
    ClassifiedSpan, GcJoinEvent, HeapSyncState, ServerGcHeapHistory, ThreadSpan, WorkSpanKind,
    SYNC_STATE_COUNT,
};
pub use suspension::{SuspensionInterval, SuspensionTracker};
