//! Mark / sweep / compact collector of the reference runtime
//!
//! A collection is driven step by step through a [`GcCycle`], which holds the
//! runtime's state exclusively for its whole lifetime:
//!
//! ```rust,ignore
//! let mut gc = rt.start_gc();           // roots marked (movable)
//! bt.gc_mark_movable(&mut gc);          // external references
//! gc.sweep();
//! gc.compact();                         // unpinned live objects move
//! bt.gc_update_locations(&gc);
//! drop(gc);
//! ```
//!
//! `mark` pins an object in place; `mark_movable` lets compaction relocate
//! it. The top-level self is always pinned. Compaction moves every live, unpinned object to a fresh address and
//! records the move in a forwarding table consulted by
//! [`GcMarker::location`].

use super::{SimRuntime, SimState};
use crate::gc::GcMarker;
use crate::host::ObjRef;
use parking_lot::RwLockWriteGuard;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Counters of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects marked live
    pub marked: usize,
    /// Objects freed by the sweep
    pub freed: usize,
    /// Objects relocated by compaction
    pub moved: usize,
}

/// One collection in progress
pub struct GcCycle<'a> {
    state: RwLockWriteGuard<'a, SimState>,
    forwarding: FxHashMap<ObjRef, ObjRef>,
    stats: GcStats,
}

impl SimRuntime {
    /// Begin a collection and mark the runtime's own roots as movable
    ///
    /// The runtime is locked until the returned cycle is dropped; host
    /// queries made meanwhile block.
    pub fn start_gc(&self) -> GcCycle<'_> {
        let mut state = self.state.write();
        state.heap.clear_marks();

        let mut cycle = GcCycle {
            state,
            forwarding: FxHashMap::default(),
            stats: GcStats::default(),
        };
        cycle.mark_roots();
        cycle
    }

    /// Run a full collection with compaction and no external references
    pub fn gc_compact(&self) -> GcStats {
        let mut gc = self.start_gc();
        gc.sweep();
        gc.compact();
        gc.stats()
    }
}

impl GcCycle<'_> {
    fn roots(&self) -> Vec<ObjRef> {
        let state = &*self.state;
        let builtins = state.builtins;
        let mut roots = vec![
            builtins.object,
            builtins.module,
            builtins.class,
            builtins.string,
        ];
        roots.extend(state.constants.values().copied());
        for thread in &state.threads {
            roots.extend(thread.frame_refs());
        }
        roots
    }

    fn mark_roots(&mut self) {
        // Top-level self never moves; engines may cache it
        let top_self = self.state.top_self;
        self.trace(top_self, true);

        for root in self.roots() {
            self.trace(root, false);
        }
    }

    fn trace(&mut self, obj: ObjRef, pin: bool) {
        let mut pending = vec![(obj, pin)];

        while let Some((obj, pin)) = pending.pop() {
            let Some(slot) = self.state.heap.slot_mut(obj) else {
                continue;
            };
            if pin {
                slot.pinned = true;
            }
            if slot.marked {
                continue;
            }
            slot.marked = true;
            self.stats.marked += 1;
            pending.extend(slot.object.children().into_iter().map(|child| (child, false)));
        }
    }

    /// Free every unmarked object
    pub fn sweep(&mut self) -> usize {
        let dead = self.state.heap.addresses(|slot| !slot.marked);
        for addr in &dead {
            self.state.heap.remove(*addr);
        }
        self.stats.freed += dead.len();
        dead.len()
    }

    /// Move every live, unpinned object and rewrite the runtime's own
    /// references to them
    pub fn compact(&mut self) -> usize {
        let state = &mut *self.state;

        for addr in state.heap.addresses(|slot| slot.marked && !slot.pinned) {
            let new_addr = state.heap.reserve();
            if let Some(slot) = state.heap.remove(addr) {
                state.heap.insert(new_addr, slot);
                self.forwarding.insert(addr, new_addr);
            }
        }

        let forwarding = &self.forwarding;
        let forward = |obj: ObjRef| forwarding.get(&obj).copied().unwrap_or(obj);

        for object in state.heap.objects_mut() {
            object.update_refs(forward);
        }
        for thread in &mut state.threads {
            for r in thread.frame_refs_mut() {
                *r = forward(*r);
            }
        }
        for r in state.constants.values_mut() {
            *r = forward(*r);
        }
        let builtins = &mut state.builtins;
        for r in [
            &mut builtins.object,
            &mut builtins.module,
            &mut builtins.class,
            &mut builtins.string,
            &mut state.top_self,
        ] {
            *r = forward(*r);
        }

        self.stats.moved += self.forwarding.len();
        debug!(moved = self.forwarding.len(), "compacted reference heap");
        self.forwarding.len()
    }

    /// Counters so far
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Check if `obj` is currently pinned
    pub fn is_pinned(&self, obj: ObjRef) -> bool {
        self.state.heap.slot(obj).is_some_and(|slot| slot.pinned)
    }
}

impl GcMarker for GcCycle<'_> {
    fn mark(&mut self, obj: ObjRef) {
        self.trace(obj, true);
    }

    fn mark_movable(&mut self, obj: ObjRef) {
        self.trace(obj, false);
    }

    fn location(&self, obj: ObjRef) -> ObjRef {
        self.forwarding.get(&obj).copied().unwrap_or(obj)
    }
}

impl Drop for GcCycle<'_> {
    fn drop(&mut self) {
        self.state.heap.clear_marks();
    }
}
