//! Opaque handles into the host runtime
//!
//! The engine never dereferences these itself. Every read goes back through
//! [`HostRuntime`](super::HostRuntime), and every reference stored in a
//! backtrace must be refreshed after a compacting collection.

use std::fmt;

/// Raw reference to a host-managed object
///
/// The value is the object's current address in the host heap. A moving
/// collector may relocate the object, after which the old value dangles
/// until it is passed through the collector's location lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjRef(u64);

impl ObjRef {
    /// The host's `nil`. Never heap-allocated, safe to mark.
    pub const NIL: ObjRef = ObjRef(0x08);

    /// Wrap a raw address
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        ObjRef(raw)
    }

    /// Raw address
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Check if this is the host's `nil`
    #[inline]
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }
}

impl Default for ObjRef {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "ObjRef(nil)")
        } else {
            write!(f, "ObjRef({:#x})", self.0)
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Handle to a host thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadRef(u64);

impl ThreadRef {
    /// Create from raw ID
    pub const fn from_u64(id: u64) -> Self {
        ThreadRef(id)
    }

    /// Get raw ID
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Handle to a thread's execution context (its control-frame chain)
///
/// Only valid while the host keeps the owning thread alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionContext(u64);

impl ExecutionContext {
    /// Create from raw ID
    pub const fn from_u64(id: u64) -> Self {
        ExecutionContext(id)
    }

    /// Get raw ID
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}
