//! Host runtime adapter
//!
//! Every read of the host's private layout goes through [`HostRuntime`].
//! Supporting another runtime (or another version of the same runtime) means
//! supplying a new implementation of this trait; the walker, classifier and
//! resolver stay untouched.
//!
//! # Frame chain addressing
//!
//! ```text
//! depth 0                 ← innermost frame (currently executing)
//! depth 1
//! ...
//! depth count-2           ← second dummy frame (main thread only)
//! depth count-1           ← bottom dummy frame (always present)
//! ```

mod layout;
mod value;

pub use layout::{
    ClassKind, ClassLayout, ControlFrame, FrameMagic, IseqKind, IseqLayout, IseqLocation, LazyLine,
    LocationPayload, MethodEntry, MethodKind,
};
pub use value::{ExecutionContext, ObjRef, ThreadRef};

use crate::frame::FrameValue;

/// What a host exposes, used to pick the capability tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    /// Internal control frames, method entries and unit layouts are readable
    pub internal_frames: bool,
    /// The host's own frame-reflection primitive names native method frames
    pub native_frame_reflection: bool,
    /// Public backtrace location objects with a readable payload
    pub public_locations: bool,
    /// The collector has a movable (non-pinning) mark primitive
    pub movable_marking: bool,
    /// The collector can report the new location of a moved object
    pub location_update: bool,
}

/// Read-only access to a host runtime's internals
///
/// Implementations must be callable from a capturing thread while the target
/// thread is held still by the host (e.g. under a global interpreter lock).
/// None of these methods may be called from inside a collector callback.
pub trait HostRuntime {
    /// Capabilities this host exposes
    fn capabilities(&self) -> HostCapabilities;

    /// The top-level `self` object
    fn top_self(&self) -> ObjRef;

    // ── Execution contexts ─────────────────────────────────────────────

    /// Execution context of the calling thread
    fn current_execution_context(&self) -> ExecutionContext;

    /// Execution context of `thread`, or `None` if the thread is not live
    /// (killed, being torn down, or unknown)
    fn thread_execution_context(&self, thread: ThreadRef) -> Option<ExecutionContext>;

    // ── Control frames ─────────────────────────────────────────────────

    /// Number of control frames in the chain, dummy frames included
    fn control_frame_count(&self, ec: ExecutionContext) -> usize;

    /// Control frame at `depth` (0 = innermost)
    fn control_frame(&self, ec: ExecutionContext, depth: usize) -> Option<ControlFrame>;

    /// Resolve the callable method entry for a frame, if its environment
    /// holds one
    fn frame_method_entry(&self, frame: &ControlFrame) -> Option<ObjRef>;

    // ── Method entries ─────────────────────────────────────────────────

    /// Kind of a method entry
    fn method_kind(&self, cme: ObjRef) -> Option<MethodKind>;

    /// Full method entry
    fn method_entry(&self, cme: ObjRef) -> Option<MethodEntry>;

    // ── Bytecode units ─────────────────────────────────────────────────

    /// Instruction layout of a bytecode unit
    fn iseq_layout(&self, iseq: ObjRef) -> Option<IseqLayout>;

    /// Source line of the instruction at slot offset `pos`
    fn iseq_line_no(&self, iseq: ObjRef, pos: usize) -> u32;

    /// Labels and path of a bytecode unit
    fn iseq_location(&self, iseq: ObjRef) -> Option<IseqLocation>;

    // ── Classes and objects ────────────────────────────────────────────

    /// Immediate class of an object (singleton and include classes included)
    fn class_of(&self, obj: ObjRef) -> Option<ObjRef>;

    /// Real class of an object (singleton and include classes skipped)
    fn real_class_of(&self, obj: ObjRef) -> Option<ObjRef>;

    /// Layout flags of a class-like object
    fn class_layout(&self, klass: ObjRef) -> Option<ClassLayout>;

    /// Constant path of a named class or module
    fn class_path(&self, klass: ObjRef) -> Option<String>;

    /// Read an instance variable (including hidden `__x__` attributes)
    fn ivar_get(&self, obj: ObjRef, name: &str) -> Option<ObjRef>;

    /// Host's `inspect` of an object
    fn inspect(&self, obj: ObjRef) -> String;

    // ── Host reflection primitives ─────────────────────────────────────

    /// The host's own qualified method name for a frame value
    ///
    /// Hosts without `native_frame_reflection` return `None` for native
    /// method entries.
    fn profile_frame_qualified_method_name(&self, _frame: &FrameValue) -> Option<String> {
        None
    }

    // ── Public backtrace facility ──────────────────────────────────────

    /// Freshly allocated public location objects for a context, innermost
    /// first
    fn backtrace_locations(&self, _ec: ExecutionContext) -> Option<Vec<ObjRef>> {
        None
    }

    /// Internal payload of a public location object
    fn location_payload(&self, _location: ObjRef) -> Option<LocationPayload> {
        None
    }

    /// Query a location's line number through the public API, forcing the
    /// lazy computation
    fn location_lineno(&self, _location: ObjRef) -> Option<u32> {
        None
    }
}
