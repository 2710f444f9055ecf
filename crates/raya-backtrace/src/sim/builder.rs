//! Program construction for the reference runtime
//!
//! Classes, methods and bytecode units are defined up front; stacks are then
//! built frame by frame with [`SimRuntime::push_frame`].

use super::object::{ClassObject, HeapObject, IseqObject, MethodEntryObject, PlainObject};
use super::thread::{SimThread, ThreadStatus, SPAWNED_THREAD_DUMMIES};
use super::{SimError, SimResult, SimRuntime, SimState};
use crate::host::{ClassKind, ControlFrame, FrameMagic, IseqKind, MethodKind, ObjRef, ThreadRef};
use rustc_hash::FxHashMap;

/// Gap left between the instruction ranges of consecutive units
const ENCODED_GAP: usize = 0x40;

/// Description of a bytecode unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IseqSpec {
    /// Unit kind
    pub kind: IseqKind,
    /// Full label
    pub label: String,
    /// Base label
    pub base_label: String,
    /// Source path
    pub path: String,
    /// Source line of each instruction slot
    pub lines: Vec<u32>,
}

impl IseqSpec {
    fn new(kind: IseqKind, label: String, base_label: String, path: &str, lines: &[u32]) -> Self {
        Self {
            kind,
            label,
            base_label,
            path: path.to_string(),
            lines: lines.to_vec(),
        }
    }

    /// Method body labelled `name`
    pub fn method(name: &str, path: &str, lines: &[u32]) -> Self {
        Self::new(IseqKind::Method, name.into(), name.into(), path, lines)
    }

    /// Top-level script body (`<main>`)
    pub fn top(path: &str, lines: &[u32]) -> Self {
        Self::new(IseqKind::Top, "<main>".into(), "<main>".into(), path, lines)
    }

    /// Block inside `parent` (`block in parent`)
    pub fn block(parent: &str, path: &str, lines: &[u32]) -> Self {
        Self::new(
            IseqKind::Block,
            format!("block in {parent}"),
            parent.into(),
            path,
            lines,
        )
    }

    /// `rescue` clause inside `parent` (`rescue in parent`)
    pub fn rescue(parent: &str, path: &str, lines: &[u32]) -> Self {
        Self::new(
            IseqKind::Rescue,
            format!("rescue in {parent}"),
            parent.into(),
            path,
            lines,
        )
    }

    /// `eval` body run from `parent`
    pub fn eval(parent: &str, path: &str, lines: &[u32]) -> Self {
        Self::new(IseqKind::Eval, parent.into(), parent.into(), path, lines)
    }

    /// Class body (`<class:Name>`)
    pub fn class_body(name: &str, path: &str, lines: &[u32]) -> Self {
        let label = format!("<class:{name}>");
        Self::new(IseqKind::Class, label.clone(), label, path, lines)
    }
}

/// Implementation of a defined method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodBody {
    /// Bytecode method with this unit
    Iseq(ObjRef),
    /// Native method
    Native,
    /// Attribute reader
    AttrReader,
    /// Method defined from a block with this unit
    Bmethod(ObjRef),
}

/// Description of a frame to push
///
/// A `line` of 0 pushes the frame without a pc, as during runtime bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSpec {
    /// Call of a method entry; the frame type follows the entry's kind
    Method {
        /// Receiver
        receiver: ObjRef,
        /// Callable method entry
        method_entry: ObjRef,
        /// Current line (ignored for native methods)
        line: u32,
    },
    /// Block body
    Block {
        /// Receiver
        receiver: ObjRef,
        /// Block unit
        iseq: ObjRef,
        /// Enclosing method entry
        method_entry: Option<ObjRef>,
        /// Current line
        line: u32,
    },
    /// `eval` body
    Eval {
        /// Receiver
        receiver: ObjRef,
        /// Eval unit
        iseq: ObjRef,
        /// Enclosing method entry
        method_entry: Option<ObjRef>,
        /// Current line
        line: u32,
    },
    /// Top-level script, executed on the top-level self
    Top {
        /// Script unit
        iseq: ObjRef,
        /// Current line
        line: u32,
    },
    /// Class body
    ClassBody {
        /// Class being defined
        class: ObjRef,
        /// Body unit
        iseq: ObjRef,
        /// Current line
        line: u32,
    },
    /// Internal native block
    Ifunc {
        /// Receiver
        receiver: ObjRef,
    },
}

impl FrameSpec {
    /// Call of `method_entry` on `receiver`
    pub fn method(receiver: ObjRef, method_entry: ObjRef, line: u32) -> Self {
        FrameSpec::Method {
            receiver,
            method_entry,
            line,
        }
    }

    /// Block body
    pub fn block(receiver: ObjRef, iseq: ObjRef, method_entry: Option<ObjRef>, line: u32) -> Self {
        FrameSpec::Block {
            receiver,
            iseq,
            method_entry,
            line,
        }
    }

    /// `eval` body
    pub fn eval(receiver: ObjRef, iseq: ObjRef, method_entry: Option<ObjRef>, line: u32) -> Self {
        FrameSpec::Eval {
            receiver,
            iseq,
            method_entry,
            line,
        }
    }

    /// Top-level script
    pub fn top(iseq: ObjRef, line: u32) -> Self {
        FrameSpec::Top { iseq, line }
    }

    /// Class body
    pub fn class_body(class: ObjRef, iseq: ObjRef, line: u32) -> Self {
        FrameSpec::ClassBody { class, iseq, line }
    }

    /// Internal native block
    pub fn ifunc(receiver: ObjRef) -> Self {
        FrameSpec::Ifunc { receiver }
    }
}

impl SimState {
    fn expect_class(&self, obj: ObjRef) -> SimResult<&ClassObject> {
        match self.heap.get(obj) {
            Some(HeapObject::Class(class)) => Ok(class),
            Some(other) => Err(SimError::WrongType {
                obj,
                expected: "class",
                found: other.type_name(),
            }),
            None => Err(SimError::UnknownObject(obj)),
        }
    }

    fn expect_class_mut(&mut self, obj: ObjRef) -> SimResult<&mut ClassObject> {
        match self.heap.get_mut(obj) {
            Some(HeapObject::Class(class)) => Ok(class),
            Some(other) => Err(SimError::WrongType {
                obj,
                expected: "class",
                found: other.type_name(),
            }),
            None => Err(SimError::UnknownObject(obj)),
        }
    }

    fn expect_iseq(&self, obj: ObjRef) -> SimResult<&IseqObject> {
        match self.heap.get(obj) {
            Some(HeapObject::Iseq(iseq)) => Ok(iseq),
            Some(other) => Err(SimError::WrongType {
                obj,
                expected: "iseq",
                found: other.type_name(),
            }),
            None => Err(SimError::UnknownObject(obj)),
        }
    }

    fn expect_method_entry(&self, obj: ObjRef) -> SimResult<&MethodEntryObject> {
        match self.heap.get(obj) {
            Some(HeapObject::MethodEntry(cme)) => Ok(cme),
            Some(other) => Err(SimError::WrongType {
                obj,
                expected: "method entry",
                found: other.type_name(),
            }),
            None => Err(SimError::UnknownObject(obj)),
        }
    }

    fn pc_for(&self, iseq: ObjRef, line: u32) -> SimResult<Option<usize>> {
        if line == 0 {
            return Ok(None);
        }
        self.expect_iseq(iseq)?
            .pc_for_line(line)
            .map(Some)
            .ok_or(SimError::LineNotInUnit { iseq, line })
    }

    fn define_named(&mut self, kind: ClassKind, name: &str, superclass: Option<ObjRef>) -> ObjRef {
        let mut class = ClassObject::new(kind, Some(name.to_string()));
        class.superclass = superclass;
        let klass = self.heap.allocate(HeapObject::Class(class));
        self.constants.insert(name.to_string(), klass);
        klass
    }

    /// Include class standing for `module`, created on first use
    fn include_class_for(&mut self, holder: ObjRef, module: ObjRef) -> SimResult<ObjRef> {
        let existing = self.expect_class(holder)?.extras.iter().copied().find(|&extra| {
            self.class(extra)
                .is_some_and(|c| c.kind == ClassKind::IClass && c.origin == Some(module))
        });
        if let Some(iclass) = existing {
            return Ok(iclass);
        }

        let mut iclass = ClassObject::new(ClassKind::IClass, None);
        iclass.origin = Some(module);
        iclass.superclass = self.expect_class(holder)?.superclass;
        let iclass = self.heap.allocate(HeapObject::Class(iclass));
        self.expect_class_mut(holder)?.extras.push(iclass);
        Ok(iclass)
    }

    fn control_frame_for(&self, spec: FrameSpec) -> SimResult<ControlFrame> {
        let frame = |magic, receiver, iseq: Option<ObjRef>, pc, me_cref| ControlFrame {
            magic,
            receiver,
            iseq,
            pc,
            me_cref,
        };

        Ok(match spec {
            FrameSpec::Method {
                receiver,
                method_entry,
                line,
            } => {
                let cme = self.expect_method_entry(method_entry)?;
                match (cme.kind, cme.iseq) {
                    (MethodKind::Iseq, Some(iseq)) => frame(
                        FrameMagic::Method,
                        receiver,
                        Some(iseq),
                        self.pc_for(iseq, line)?,
                        Some(method_entry),
                    ),
                    (MethodKind::Bmethod, Some(iseq)) => frame(
                        FrameMagic::Block,
                        receiver,
                        Some(iseq),
                        self.pc_for(iseq, line)?,
                        Some(method_entry),
                    ),
                    (MethodKind::Cfunc, _) => {
                        frame(FrameMagic::Cfunc, receiver, None, None, Some(method_entry))
                    }
                    _ => frame(FrameMagic::Ifunc, receiver, None, None, Some(method_entry)),
                }
            }
            FrameSpec::Block {
                receiver,
                iseq,
                method_entry,
                line,
            } => frame(
                FrameMagic::Block,
                receiver,
                Some(iseq),
                self.pc_for(iseq, line)?,
                method_entry,
            ),
            FrameSpec::Eval {
                receiver,
                iseq,
                method_entry,
                line,
            } => frame(
                FrameMagic::Eval,
                receiver,
                Some(iseq),
                self.pc_for(iseq, line)?,
                method_entry,
            ),
            FrameSpec::Top { iseq, line } => frame(
                FrameMagic::Top,
                self.top_self,
                Some(iseq),
                self.pc_for(iseq, line)?,
                None,
            ),
            // The environment of a class body holds its cref, not a method entry
            FrameSpec::ClassBody { class, iseq, line } => frame(
                FrameMagic::Class,
                class,
                Some(iseq),
                self.pc_for(iseq, line)?,
                Some(class),
            ),
            FrameSpec::Ifunc { receiver } => frame(FrameMagic::Ifunc, receiver, None, None, None),
        })
    }

    fn live_thread_mut(&mut self, id: ThreadRef) -> SimResult<&mut SimThread> {
        let thread = self.thread_mut(id).ok_or(SimError::UnknownThread(id))?;
        if !thread.is_live() {
            return Err(SimError::DeadThread(id));
        }
        Ok(thread)
    }
}

impl SimRuntime {
    // ===== Classes and objects =====

    /// Define a named class (superclass defaults to `Object`)
    pub fn define_class(&self, name: &str, superclass: Option<ObjRef>) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        let superclass = match superclass {
            Some(superclass) => {
                state.expect_class(superclass)?;
                superclass
            }
            None => state.builtins.object,
        };
        Ok(state.define_named(ClassKind::Class, name, Some(superclass)))
    }

    /// Define a named module
    pub fn define_module(&self, name: &str) -> SimResult<ObjRef> {
        Ok(self.state.write().define_named(ClassKind::Module, name, None))
    }

    /// Singleton class of `obj`, created on first use
    pub fn singleton_class(&self, obj: ObjRef) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        let (existing, superclass) = match state.heap.get(obj) {
            Some(HeapObject::Object(o)) => (o.singleton, o.klass),
            Some(HeapObject::Class(c)) => (c.singleton, state.builtins.class),
            Some(other) => {
                return Err(SimError::WrongType {
                    obj,
                    expected: "object or class",
                    found: other.type_name(),
                })
            }
            None => return Err(SimError::UnknownObject(obj)),
        };
        if let Some(singleton) = existing {
            return Ok(singleton);
        }

        let mut class = ClassObject::new(ClassKind::Singleton, None);
        class.attached = Some(obj);
        class.superclass = Some(superclass);
        let singleton = state.heap.allocate(HeapObject::Class(class));

        match state.heap.get_mut(obj) {
            Some(HeapObject::Object(o)) => o.singleton = Some(singleton),
            Some(HeapObject::Class(c)) => c.singleton = Some(singleton),
            _ => return Err(SimError::UnknownObject(obj)),
        }
        Ok(singleton)
    }

    /// Define a refinement of `refined` inside module `outer`
    pub fn define_refinement(&self, outer: ObjRef, refined: ObjRef) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        state.expect_class(outer)?;
        state.expect_class(refined)?;

        let mut module = ClassObject::new(ClassKind::Module, None);
        module.is_refinement = true;
        module.ivars.insert("__refined_class__".to_string(), refined);
        module.ivars.insert("__defined_at__".to_string(), outer);
        let refinement = state.heap.allocate(HeapObject::Class(module));

        state.expect_class_mut(outer)?.extras.push(refinement);
        Ok(refinement)
    }

    /// Allocate an instance of `klass`
    pub fn new_object(&self, klass: ObjRef) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        state.expect_class(klass)?;
        Ok(state.heap.allocate(HeapObject::Object(PlainObject {
            klass,
            singleton: None,
            ivars: FxHashMap::default(),
        })))
    }

    /// Allocate a string
    pub fn new_string(&self, value: &str) -> ObjRef {
        self.state.write().heap.allocate(HeapObject::Str(value.to_string()))
    }

    /// Set an instance variable on an object or class
    pub fn ivar_set(&self, obj: ObjRef, name: &str, value: ObjRef) -> SimResult<()> {
        let mut state = self.state.write();
        match state.heap.get_mut(obj) {
            Some(HeapObject::Object(o)) => o.ivars.insert(name.to_string(), value),
            Some(HeapObject::Class(c)) => c.ivars.insert(name.to_string(), value),
            Some(other) => {
                return Err(SimError::WrongType {
                    obj,
                    expected: "object or class",
                    found: other.type_name(),
                })
            }
            None => return Err(SimError::UnknownObject(obj)),
        };
        Ok(())
    }

    // ===== Methods and bytecode =====

    /// Compile a bytecode unit
    pub fn new_iseq(&self, spec: IseqSpec) -> SimResult<ObjRef> {
        if spec.lines.is_empty() {
            return Err(SimError::EmptyUnit);
        }
        let mut state = self.state.write();
        let encoded_start = state.next_encoded;
        state.next_encoded += spec.lines.len() + ENCODED_GAP;

        Ok(state.heap.allocate(HeapObject::Iseq(IseqObject {
            kind: spec.kind,
            label: spec.label,
            base_label: spec.base_label,
            path: spec.path,
            encoded_start,
            lines: spec.lines,
        })))
    }

    /// Define a method on `owner` and return its callable entry
    ///
    /// Methods defined in a refinement resolve against the refinement's
    /// include class.
    pub fn define_method(&self, owner: ObjRef, name: &str, body: MethodBody) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        let is_refinement = state.expect_class(owner)?.is_refinement;

        let (kind, iseq) = match body {
            MethodBody::Iseq(iseq) => (MethodKind::Iseq, Some(iseq)),
            MethodBody::Bmethod(iseq) => (MethodKind::Bmethod, Some(iseq)),
            MethodBody::Native => (MethodKind::Cfunc, None),
            MethodBody::AttrReader => (MethodKind::Ivar, None),
        };
        if let Some(iseq) = iseq {
            state.expect_iseq(iseq)?;
        }

        let defined_class = if is_refinement {
            state.include_class_for(owner, owner)?
        } else {
            owner
        };

        let cme = state.heap.allocate(HeapObject::MethodEntry(MethodEntryObject {
            kind,
            called_id: name.to_string(),
            original_id: name.to_string(),
            owner,
            defined_class,
            iseq,
        }));
        state.expect_class_mut(owner)?.methods.insert(name.to_string(), cme);
        Ok(cme)
    }

    /// Define `alias` on `owner` for the existing entry `cme`
    pub fn alias_method(&self, owner: ObjRef, alias: &str, cme: ObjRef) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        let mut entry = state.expect_method_entry(cme)?.clone();
        entry.called_id = alias.to_string();

        let aliased = state.heap.allocate(HeapObject::MethodEntry(entry));
        state.expect_class_mut(owner)?.methods.insert(alias.to_string(), aliased);
        Ok(aliased)
    }

    /// Include `module` into `klass` and return `cme` (a method of `module`)
    /// as resolved for instances of `klass`
    pub fn include_module(&self, klass: ObjRef, module: ObjRef, cme: ObjRef) -> SimResult<ObjRef> {
        let mut state = self.state.write();
        state.expect_class(module)?;
        let iclass = state.include_class_for(klass, module)?;

        let mut entry = state.expect_method_entry(cme)?.clone();
        entry.defined_class = iclass;
        let name = entry.called_id.clone();

        let resolved = state.heap.allocate(HeapObject::MethodEntry(entry));
        state.expect_class_mut(iclass)?.methods.insert(name, resolved);
        Ok(resolved)
    }

    // ===== Threads and frames =====

    /// The main thread
    pub fn main_thread(&self) -> ThreadRef {
        ThreadRef::from_u64(1)
    }

    /// Thread whose context `current_execution_context` returns
    pub fn current_thread(&self) -> ThreadRef {
        self.state.read().current
    }

    /// Start a new runnable thread with an empty stack
    pub fn spawn_thread(&self) -> ThreadRef {
        let mut state = self.state.write();
        let id = ThreadRef::from_u64(state.threads.len() as u64 + 1);
        let top_self = state.top_self;
        state
            .threads
            .push(SimThread::new(id, top_self, SPAWNED_THREAD_DUMMIES));
        id
    }

    /// Make `thread` the calling thread
    pub fn set_current_thread(&self, thread: ThreadRef) -> SimResult<()> {
        let mut state = self.state.write();
        state.thread(thread).ok_or(SimError::UnknownThread(thread))?;
        state.current = thread;
        Ok(())
    }

    /// Liveness of `thread`
    pub fn thread_status(&self, thread: ThreadRef) -> SimResult<ThreadStatus> {
        self.state
            .read()
            .thread(thread)
            .map(|thread| thread.status)
            .ok_or(SimError::UnknownThread(thread))
    }

    /// Flag `thread` for termination; its stack stays in place
    pub fn request_kill(&self, thread: ThreadRef) -> SimResult<()> {
        let mut state = self.state.write();
        state.live_thread_mut(thread)?.status = ThreadStatus::ToKill;
        Ok(())
    }

    /// Terminate `thread` and release its stack
    pub fn kill_thread(&self, thread: ThreadRef) -> SimResult<()> {
        let mut state = self.state.write();
        let thread = state
            .thread_mut(thread)
            .ok_or(SimError::UnknownThread(thread))?;
        thread.status = ThreadStatus::Killed;
        thread.frames.clear();
        Ok(())
    }

    /// Push a frame on top of `thread`'s stack
    pub fn push_frame(&self, thread: ThreadRef, spec: FrameSpec) -> SimResult<()> {
        let mut state = self.state.write();
        let frame = state.control_frame_for(spec)?;
        state.live_thread_mut(thread)?.frames.push(frame);
        Ok(())
    }

    /// Pop the innermost frame of `thread`
    pub fn pop_frame(&self, thread: ThreadRef) -> SimResult<()> {
        let mut state = self.state.write();
        let thread_state = state.live_thread_mut(thread)?;
        if thread_state.user_frame_count() == 0 {
            return Err(SimError::EmptyStack(thread));
        }
        thread_state.frames.pop();
        Ok(())
    }

    /// Move the innermost frame of `thread` to `line`
    pub fn set_line(&self, thread: ThreadRef, line: u32) -> SimResult<()> {
        let mut state = self.state.write();
        let iseq = state
            .thread(thread)
            .and_then(|t| t.frame_at_depth(0))
            .and_then(|frame| frame.iseq)
            .ok_or(SimError::EmptyStack(thread))?;
        let pc = state.pc_for(iseq, line)?;

        let thread_state = state.live_thread_mut(thread)?;
        if let Some(frame) = thread_state.frames.last_mut() {
            frame.pc = pc;
        }
        Ok(())
    }
}
