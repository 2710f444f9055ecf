//! Reference host runtime
//!
//! `SimRuntime` is a small in-memory model of an interpreter that implements
//! [`HostRuntime`]. It has a heap of managed objects, a class hierarchy with
//! singleton classes, include classes and refinements, threads with
//! control-frame chains, the runtime's own backtrace facility with lazily
//! computed location lines, and a mark/sweep/compact collector.
//!
//! Programs are not executed: stacks are built directly with
//! [`SimRuntime::push_frame`].
//!
//! ```rust,ignore
//! let rt = SimRuntime::new(HostVersion::Modern);
//! let foo = rt.define_class("Foo", None)?;
//! let iseq = rt.new_iseq(IseqSpec::method("bar", "foo.raya", &[1, 2]))?;
//! let bar = rt.define_method(foo, "bar", MethodBody::Iseq(iseq))?;
//! let obj = rt.new_object(foo)?;
//! rt.push_frame(rt.main_thread(), FrameSpec::method(obj, bar, 2))?;
//! ```
//!
//! All state sits behind one `parking_lot::RwLock`. Host queries take it
//! shared, builders and the collector take it exclusively.

mod builder;
mod gc;
mod heap;
mod object;
mod reflect;
mod thread;

pub use builder::{FrameSpec, IseqSpec, MethodBody};
pub use gc::{GcCycle, GcStats};
pub use reflect::OfficialFrame;
pub use thread::ThreadStatus;

use crate::frame::FrameValue;
use crate::host::{
    ClassKind, ClassLayout, ControlFrame, ExecutionContext, HostCapabilities, HostRuntime,
    IseqLayout, IseqLocation, LazyLine, LocationPayload, MethodEntry, MethodKind, ObjRef,
    ThreadRef,
};
use heap::Heap;
use object::{ClassObject, HeapObject, IseqObject, LocationObject, MethodEntryObject, PlainObject};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thread::{SimThread, MAIN_THREAD_DUMMIES};

/// Reference runtime errors (builder misuse)
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Reference does not name a live object
    #[error("Unknown object: {0:?}")]
    UnknownObject(ObjRef),

    /// Object has the wrong type for the operation
    #[error("Expected {expected}, found {found} ({obj:?})")]
    WrongType {
        /// Offending object
        obj: ObjRef,
        /// Type the operation needs
        expected: &'static str,
        /// Type found
        found: &'static str,
    },

    /// Frame line not covered by the bytecode unit
    #[error("Line {line} is not in bytecode unit {iseq:?}")]
    LineNotInUnit {
        /// Bytecode unit
        iseq: ObjRef,
        /// Requested line
        line: u32,
    },

    /// Bytecode unit without instructions
    #[error("Bytecode unit has no instructions")]
    EmptyUnit,

    /// No such thread
    #[error("Unknown thread: {0:?}")]
    UnknownThread(ThreadRef),

    /// Thread is no longer running
    #[error("Thread {0:?} is not running")]
    DeadThread(ThreadRef),

    /// Only dummy frames left
    #[error("No frame to pop on thread {0:?}")]
    EmptyStack(ThreadRef),
}

/// Reference runtime result
pub type SimResult<T> = Result<T, SimError>;

/// Which generation of the host the runtime models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostVersion {
    /// Internal frames, native-frame reflection, moving collector
    Modern,
    /// Internal frames without native-frame reflection
    Backport,
    /// Public backtrace locations only, non-moving collector
    Legacy,
}

impl HostVersion {
    /// Capabilities advertised by this version
    pub fn capabilities(self) -> HostCapabilities {
        match self {
            HostVersion::Modern => HostCapabilities {
                internal_frames: true,
                native_frame_reflection: true,
                public_locations: true,
                movable_marking: true,
                location_update: true,
            },
            HostVersion::Backport => HostCapabilities {
                internal_frames: true,
                native_frame_reflection: false,
                public_locations: true,
                movable_marking: true,
                location_update: true,
            },
            HostVersion::Legacy => HostCapabilities {
                public_locations: true,
                ..HostCapabilities::default()
            },
        }
    }
}

/// Well-known classes
#[derive(Debug, Clone, Copy)]
pub(crate) struct Builtins {
    pub object: ObjRef,
    pub module: ObjRef,
    pub class: ObjRef,
    pub string: ObjRef,
}

/// Mutable runtime state
#[derive(Debug)]
pub(crate) struct SimState {
    pub heap: Heap,
    pub builtins: Builtins,
    pub top_self: ObjRef,
    /// Named classes and modules
    pub constants: FxHashMap<String, ObjRef>,
    pub threads: Vec<SimThread>,
    pub current: ThreadRef,
    /// Next free instruction address
    pub next_encoded: usize,
    /// Fault injection: line queries leave locations uncalculated
    pub stale_location_lines: bool,
}

impl SimState {
    fn new() -> Self {
        fn named(heap: &mut Heap, name: &str) -> ObjRef {
            heap.allocate(HeapObject::Class(ClassObject::new(
                ClassKind::Class,
                Some(name.to_string()),
            )))
        }

        let mut heap = Heap::new();
        let object = named(&mut heap, "Object");
        let module = named(&mut heap, "Module");
        let class = named(&mut heap, "Class");
        let string = named(&mut heap, "String");
        for klass in [module, string] {
            if let Some(HeapObject::Class(c)) = heap.get_mut(klass) {
                c.superclass = Some(object);
            }
        }
        if let Some(HeapObject::Class(c)) = heap.get_mut(class) {
            c.superclass = Some(module);
        }

        let top_self = heap.allocate(HeapObject::Object(PlainObject {
            klass: object,
            singleton: None,
            ivars: FxHashMap::default(),
        }));

        let mut constants = FxHashMap::default();
        for (name, klass) in [
            ("Object", object),
            ("Module", module),
            ("Class", class),
            ("String", string),
        ] {
            constants.insert(name.to_string(), klass);
        }

        let main = ThreadRef::from_u64(1);
        Self {
            heap,
            builtins: Builtins {
                object,
                module,
                class,
                string,
            },
            top_self,
            constants,
            threads: vec![SimThread::new(main, top_self, MAIN_THREAD_DUMMIES)],
            current: main,
            next_encoded: 0x10_0000,
            stale_location_lines: false,
        }
    }

    pub fn class(&self, obj: ObjRef) -> Option<&ClassObject> {
        match self.heap.get(obj)? {
            HeapObject::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn iseq(&self, obj: ObjRef) -> Option<&IseqObject> {
        match self.heap.get(obj)? {
            HeapObject::Iseq(iseq) => Some(iseq),
            _ => None,
        }
    }

    pub fn method_entry(&self, obj: ObjRef) -> Option<&MethodEntryObject> {
        match self.heap.get(obj)? {
            HeapObject::MethodEntry(cme) => Some(cme),
            _ => None,
        }
    }

    pub fn thread(&self, id: ThreadRef) -> Option<&SimThread> {
        self.threads.iter().find(|thread| thread.id == id)
    }

    pub fn thread_mut(&mut self, id: ThreadRef) -> Option<&mut SimThread> {
        self.threads.iter_mut().find(|thread| thread.id == id)
    }

    fn thread_for(&self, ec: ExecutionContext) -> Option<&SimThread> {
        self.thread(ThreadRef::from_u64(ec.as_u64()))
    }
}

/// In-memory reference runtime
#[derive(Debug)]
pub struct SimRuntime {
    version: HostVersion,
    state: RwLock<SimState>,
}

impl SimRuntime {
    /// Create a runtime with the builtin classes, a top-level self and a main
    /// thread
    pub fn new(version: HostVersion) -> Self {
        Self {
            version,
            state: RwLock::new(SimState::new()),
        }
    }

    /// Modeled host generation
    pub fn version(&self) -> HostVersion {
        self.version
    }

    /// Check if `obj` names a live heap object
    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.state.read().heap.contains(obj)
    }

    /// Number of live heap objects
    pub fn object_count(&self) -> usize {
        self.state.read().heap.len()
    }

    /// Make location line queries leave the location uncalculated
    #[doc(hidden)]
    pub fn inject_stale_location_lines(&self, stale: bool) {
        self.state.write().stale_location_lines = stale;
    }
}

impl HostRuntime for SimRuntime {
    fn capabilities(&self) -> HostCapabilities {
        self.version.capabilities()
    }

    fn top_self(&self) -> ObjRef {
        self.state.read().top_self
    }

    fn current_execution_context(&self) -> ExecutionContext {
        ExecutionContext::from_u64(self.state.read().current.as_u64())
    }

    fn thread_execution_context(&self, thread: ThreadRef) -> Option<ExecutionContext> {
        let state = self.state.read();
        let thread = state.thread(thread).filter(|thread| thread.is_live())?;
        Some(ExecutionContext::from_u64(thread.id.as_u64()))
    }

    fn control_frame_count(&self, ec: ExecutionContext) -> usize {
        self.state
            .read()
            .thread_for(ec)
            .map_or(0, |thread| thread.frames.len())
    }

    fn control_frame(&self, ec: ExecutionContext, depth: usize) -> Option<ControlFrame> {
        self.state.read().thread_for(ec)?.frame_at_depth(depth).copied()
    }

    fn frame_method_entry(&self, frame: &ControlFrame) -> Option<ObjRef> {
        let state = self.state.read();
        frame
            .me_cref
            .filter(|&slot| state.method_entry(slot).is_some())
    }

    fn method_kind(&self, cme: ObjRef) -> Option<MethodKind> {
        self.state.read().method_entry(cme).map(|cme| cme.kind)
    }

    fn method_entry(&self, cme: ObjRef) -> Option<MethodEntry> {
        let state = self.state.read();
        let cme = state.method_entry(cme)?;
        Some(MethodEntry {
            kind: cme.kind,
            called_id: cme.called_id.clone(),
            original_id: cme.original_id.clone(),
            owner: cme.owner,
            defined_class: cme.defined_class,
            iseq: cme.iseq,
        })
    }

    fn iseq_layout(&self, iseq: ObjRef) -> Option<IseqLayout> {
        let state = self.state.read();
        let iseq = state.iseq(iseq)?;
        Some(IseqLayout {
            kind: iseq.kind,
            encoded_start: iseq.encoded_start,
            encoded_size: iseq.lines.len(),
        })
    }

    fn iseq_line_no(&self, iseq: ObjRef, pos: usize) -> u32 {
        self.state.read().iseq(iseq).map_or(0, |iseq| iseq.line_at(pos))
    }

    fn iseq_location(&self, iseq: ObjRef) -> Option<IseqLocation> {
        let state = self.state.read();
        let iseq = state.iseq(iseq)?;
        Some(IseqLocation {
            label: iseq.label.clone(),
            base_label: iseq.base_label.clone(),
            path: iseq.path.clone(),
        })
    }

    fn class_of(&self, obj: ObjRef) -> Option<ObjRef> {
        self.state.read().class_of(obj)
    }

    fn real_class_of(&self, obj: ObjRef) -> Option<ObjRef> {
        self.state.read().real_class_of(obj)
    }

    fn class_layout(&self, klass: ObjRef) -> Option<ClassLayout> {
        let state = self.state.read();
        let class = state.class(klass)?;
        Some(ClassLayout {
            kind: class.kind,
            is_refinement: class.is_refinement,
            attached: class.attached,
        })
    }

    fn class_path(&self, klass: ObjRef) -> Option<String> {
        self.state.read().class(klass)?.name.clone()
    }

    fn ivar_get(&self, obj: ObjRef, name: &str) -> Option<ObjRef> {
        self.state.read().ivar_get(obj, name)
    }

    fn inspect(&self, obj: ObjRef) -> String {
        self.state.read().inspect(obj)
    }

    fn profile_frame_qualified_method_name(&self, frame: &FrameValue) -> Option<String> {
        self.state
            .read()
            .profile_qualified_name(frame, self.version.capabilities().native_frame_reflection)
    }

    fn backtrace_locations(&self, ec: ExecutionContext) -> Option<Vec<ObjRef>> {
        if !self.version.capabilities().public_locations {
            return None;
        }
        let mut state = self.state.write();
        let thread = ThreadRef::from_u64(ec.as_u64());
        let entries = state.official_entries(thread)?;

        Some(
            entries
                .into_iter()
                .map(|entry| state.heap.allocate(HeapObject::Location(entry.into_location())))
                .collect(),
        )
    }

    fn location_payload(&self, location: ObjRef) -> Option<LocationPayload> {
        let state = self.state.read();
        match state.heap.get(location)? {
            HeapObject::Location(LocationObject::Iseq { iseq, line, .. }) => {
                Some(LocationPayload::Iseq {
                    iseq: *iseq,
                    line: *line,
                })
            }
            HeapObject::Location(LocationObject::Cfunc { method_name }) => {
                Some(LocationPayload::Cfunc {
                    method_name: method_name.clone(),
                })
            }
            _ => None,
        }
    }

    fn location_lineno(&self, location: ObjRef) -> Option<u32> {
        let mut state = self.state.write();
        let (iseq, pc) = match state.heap.get(location)? {
            HeapObject::Location(LocationObject::Iseq { iseq, pc, .. }) => (*iseq, *pc),
            _ => return None,
        };
        let computed = match pc {
            Some(pc) => state.iseq(iseq).map_or(0, |iseq| iseq.line_for_pc(pc)),
            None => 0,
        };

        if !state.stale_location_lines {
            if let Some(HeapObject::Location(LocationObject::Iseq { line, .. })) =
                state.heap.get_mut(location)
            {
                *line = LazyLine::Calculated(computed);
            }
        }
        Some(computed)
    }
}
