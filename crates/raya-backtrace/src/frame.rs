//! Frame records
//!
//! A [`FrameRecord`] holds the raw findings for one captured stack frame.
//! It stores host references, not resolved strings; names and paths are
//! computed on demand by the [`NameResolver`](crate::resolve::NameResolver).

use crate::host::{MethodKind, ObjRef};

/// Method kind tag stored when an internal walk found no method entry
pub const METHOD_KIND_NONE: i32 = 0;

/// Method kind tag stored when the tier cannot see method entries at all
pub const METHOD_KIND_UNKNOWN: i32 = -1;

/// Raw findings for one stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Frame executes compiled bytecode (false: native method)
    pub is_interpreted: bool,

    /// Bytecode unit name/path are authoritative over the method entry
    pub prefer_bytecode_unit: bool,

    /// The stored native name is authoritative (no method entry available)
    pub prefer_native_name: bool,

    /// [`MethodKind`] tag, or [`METHOD_KIND_NONE`] / [`METHOD_KIND_UNKNOWN`]
    pub method_kind_tag: i32,

    /// Source line; meaningful only when `is_interpreted`
    pub line_number: u32,

    /// Bytecode unit being executed
    pub bytecode_unit: Option<ObjRef>,

    /// Resolved callable method entry
    pub method_entry: Option<ObjRef>,

    /// Object the method was invoked on
    pub receiver: ObjRef,

    /// Bare native method name (legacy tier only)
    pub native_name: Option<String>,
}

impl FrameRecord {
    /// Empty record for a frame about to be classified
    pub(crate) fn blank(receiver: ObjRef) -> Self {
        Self {
            is_interpreted: false,
            prefer_bytecode_unit: false,
            prefer_native_name: false,
            method_kind_tag: METHOD_KIND_NONE,
            line_number: 0,
            bytecode_unit: None,
            method_entry: None,
            receiver,
            native_name: None,
        }
    }

    /// Decoded method kind, when the record carries a method entry
    pub fn method_kind(&self) -> Option<MethodKind> {
        self.method_entry?;
        MethodKind::from_tag(self.method_kind_tag)
    }

    /// Line number, for interpreted frames only
    #[inline]
    pub fn line(&self) -> Option<u32> {
        if self.is_interpreted {
            Some(self.line_number)
        } else {
            None
        }
    }

    /// Reflective view backing name and path queries
    pub fn frame_value(&self) -> Option<FrameValue> {
        match (self.prefer_bytecode_unit, self.bytecode_unit, self.method_entry) {
            (true, Some(iseq), _) => Some(FrameValue::BytecodeUnit {
                iseq,
                receiver: self.receiver,
            }),
            (_, _, Some(cme)) => Some(FrameValue::MethodEntry(cme)),
            _ => None,
        }
    }

    /// Visit every held reference (unit and entry if present, receiver always)
    #[inline]
    pub(crate) fn each_ref(&self, mut visit: impl FnMut(ObjRef)) {
        if let Some(iseq) = self.bytecode_unit {
            visit(iseq);
        }
        if let Some(cme) = self.method_entry {
            visit(cme);
        }
        visit(self.receiver);
    }

    /// Rewrite every held reference in place
    #[inline]
    pub(crate) fn each_ref_mut(&mut self, mut update: impl FnMut(ObjRef) -> ObjRef) {
        if let Some(iseq) = self.bytecode_unit.as_mut() {
            *iseq = update(*iseq);
        }
        if let Some(cme) = self.method_entry.as_mut() {
            *cme = update(*cme);
        }
        self.receiver = update(self.receiver);
    }
}

/// Reflective per-frame view
///
/// Either the bytecode unit (plus receiver) or the method entry, depending on
/// which one the classifier marked as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameValue {
    /// View backed by a bytecode unit
    BytecodeUnit {
        /// Bytecode unit
        iseq: ObjRef,
        /// Frame receiver
        receiver: ObjRef,
    },
    /// View backed by a callable method entry
    MethodEntry(ObjRef),
}
