//! Object heap of the reference runtime
//!
//! Objects live in slots keyed by address. Addresses are handed out from a
//! bump counter and never reused, so a reference that was not updated after
//! compaction reliably misses instead of aliasing a newer object.

use super::object::HeapObject;
use crate::host::ObjRef;
use rustc_hash::FxHashMap;

/// First address handed out
const HEAP_BASE: u64 = 0x1000;

/// Distance between consecutive addresses (one object slot)
const SLOT_SIZE: u64 = 0x28;

#[derive(Debug)]
pub(crate) struct Slot {
    pub object: HeapObject,
    pub marked: bool,
    pub pinned: bool,
}

/// Address → object table
#[derive(Debug)]
pub(crate) struct Heap {
    slots: FxHashMap<ObjRef, Slot>,
    next_addr: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: FxHashMap::default(),
            next_addr: HEAP_BASE,
        }
    }

    /// Next unused address
    pub fn reserve(&mut self) -> ObjRef {
        let addr = ObjRef::from_raw(self.next_addr);
        self.next_addr += SLOT_SIZE;
        addr
    }

    pub fn allocate(&mut self, object: HeapObject) -> ObjRef {
        let addr = self.reserve();
        self.insert(
            addr,
            Slot {
                object,
                marked: false,
                pinned: false,
            },
        );
        addr
    }

    pub fn insert(&mut self, addr: ObjRef, slot: Slot) {
        self.slots.insert(addr, slot);
    }

    pub fn get(&self, addr: ObjRef) -> Option<&HeapObject> {
        self.slots.get(&addr).map(|slot| &slot.object)
    }

    pub fn get_mut(&mut self, addr: ObjRef) -> Option<&mut HeapObject> {
        self.slots.get_mut(&addr).map(|slot| &mut slot.object)
    }

    pub fn slot(&self, addr: ObjRef) -> Option<&Slot> {
        self.slots.get(&addr)
    }

    pub fn slot_mut(&mut self, addr: ObjRef) -> Option<&mut Slot> {
        self.slots.get_mut(&addr)
    }

    pub fn remove(&mut self, addr: ObjRef) -> Option<Slot> {
        self.slots.remove(&addr)
    }

    pub fn contains(&self, addr: ObjRef) -> bool {
        self.slots.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Addresses of all slots matching `filter`
    pub fn addresses(&self, filter: impl Fn(&Slot) -> bool) -> Vec<ObjRef> {
        let mut addrs: Vec<ObjRef> = self
            .slots
            .iter()
            .filter(|(_, slot)| filter(slot))
            .map(|(&addr, _)| addr)
            .collect();
        addrs.sort_unstable();
        addrs
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut HeapObject> {
        self.slots.values_mut().map(|slot| &mut slot.object)
    }

    pub fn clear_marks(&mut self) {
        for slot in self.slots.values_mut() {
            slot.marked = false;
            slot.pinned = false;
        }
    }
}
