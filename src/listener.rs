//! The listener interface between the event source adapter and the engine.

use crate::event::*;

/// One method per event kind, invoked by the adapter-owned event bus.
///
/// Dispatch is strictly sequential: the adapter delivers one event at a time
/// in trace timestamp order, and every method runs to completion before the
/// next is invoked. Implementations must not block. A method that cannot make
/// sense of an event is a no-op for that event; nothing here returns an
/// error to the adapter.
///
/// Default implementations ignore the event, so partial adapters (e.g. one
/// that only has the runtime provider enabled, without scheduler events)
/// only forward what they have.
pub trait GcEventListener {
    fn on_process_start(&mut self, header: EventHeader, payload: ProcessStartPayload) {
        let _ = (header, payload);
    }
    fn on_process_stop(&mut self, header: EventHeader) {
        let _ = header;
    }
    fn on_runtime_information(&mut self, header: EventHeader, payload: RuntimeInformationPayload) {
        let _ = (header, payload);
    }

    fn on_gc_start(&mut self, header: EventHeader, payload: GcStartPayload) {
        let _ = (header, payload);
    }
    fn on_gc_stop(&mut self, header: EventHeader, payload: GcStopPayload) {
        let _ = (header, payload);
    }
    fn on_gc_heap_stats(&mut self, header: EventHeader, payload: GcHeapStatsPayload) {
        let _ = (header, payload);
    }
    fn on_gc_global_heap_history(&mut self, header: EventHeader, payload: GcGlobalHistoryPayload) {
        let _ = (header, payload);
    }
    fn on_gc_per_heap_history(&mut self, header: EventHeader, payload: GcPerHeapHistoryPayload) {
        let _ = (header, payload);
    }
    fn on_gc_allocation_tick(&mut self, header: EventHeader, payload: GcAllocationTickPayload) {
        let _ = (header, payload);
    }

    fn on_suspend_ee_begin(&mut self, header: EventHeader, payload: GcSuspendEePayload) {
        let _ = (header, payload);
    }
    fn on_suspend_ee_end(&mut self, header: EventHeader) {
        let _ = header;
    }
    fn on_restart_ee_end(&mut self, header: EventHeader) {
        let _ = header;
    }

    fn on_gc_mark(&mut self, header: EventHeader, payload: GcMarkPayload) {
        let _ = (header, payload);
    }
    fn on_gc_pin_object(&mut self, header: EventHeader, payload: GcPinObjectPayload) {
        let _ = (header, payload);
    }
    fn on_gc_pin_plug(&mut self, header: EventHeader, payload: GcPinPlugPayload) {
        let _ = (header, payload);
    }
    fn on_gc_join(&mut self, header: EventHeader, payload: GcJoinPayload) {
        let _ = (header, payload);
    }

    fn on_thread_context_switch(&mut self, header: EventHeader, payload: ContextSwitchPayload) {
        let _ = (header, payload);
    }
    fn on_cpu_sample(&mut self, header: EventHeader, payload: CpuSamplePayload) {
        let _ = (header, payload);
    }
}
