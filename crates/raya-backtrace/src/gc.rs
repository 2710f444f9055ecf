//! Collector integration
//!
//! A [`Backtrace`] holds raw references to managed objects that the host's
//! collector does not know about. The owner forwards the collector's phases
//! to the buffer:
//! - mark phase: [`Backtrace::gc_mark`] (pins) or [`Backtrace::gc_mark_movable`]
//! - after compaction: [`Backtrace::gc_update_locations`]
//! - custom traversals: [`Backtrace::gc_mark_custom`]
//!
//! Every callback only reads and writes the records in place. None of them
//! allocates or calls back into the host runtime, so they are safe inside a
//! stop-the-world phase.

use crate::backtrace::Backtrace;
use crate::host::ObjRef;

/// Collector primitives a backtrace forwards its references to
///
/// Hosts without a moving collector only implement [`mark`](Self::mark):
/// movable marking then pins, and locations never change.
pub trait GcMarker {
    /// Mark a reference as live and pinned
    fn mark(&mut self, obj: ObjRef);

    /// Mark a reference as live, allowing the collector to move it
    fn mark_movable(&mut self, obj: ObjRef) {
        self.mark(obj);
    }

    /// Current location of a possibly moved object
    fn location(&self, obj: ObjRef) -> ObjRef {
        obj
    }
}

impl Backtrace {
    /// Mark every held reference, pinning it
    pub fn gc_mark(&self, marker: &mut dyn GcMarker) {
        for record in self.frames() {
            record.each_ref(|obj| marker.mark(obj));
        }
    }

    /// Mark every held reference, allowing relocation
    ///
    /// Must be paired with [`gc_update_locations`](Self::gc_update_locations)
    /// after the collector compacts.
    pub fn gc_mark_movable(&self, marker: &mut dyn GcMarker) {
        for record in self.frames() {
            record.each_ref(|obj| marker.mark_movable(obj));
        }
    }

    /// Replace every held reference with its post-compaction location
    pub fn gc_update_locations(&mut self, marker: &dyn GcMarker) {
        for record in self.frames_mut() {
            record.each_ref_mut(|obj| marker.location(obj));
        }
    }

    /// Visit every held reference with a caller-supplied visitor
    pub fn gc_mark_custom(&self, mut visit: impl FnMut(ObjRef)) {
        for record in self.frames() {
            record.each_ref(&mut visit);
        }
    }
}
