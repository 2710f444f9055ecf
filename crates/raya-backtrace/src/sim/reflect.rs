//! Host-side reflection of the reference runtime
//!
//! What the modeled interpreter itself offers: `class_of`, `inspect`, its
//! own frame naming primitive and its official backtrace facility.

use super::object::{HeapObject, LocationObject};
use super::{SimError, SimResult, SimRuntime, SimState};
use crate::frame::FrameValue;
use crate::host::{ClassKind, LazyLine, MethodKind, ObjRef, ThreadRef};

/// One line of the runtime's official backtrace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficialFrame {
    /// Frame label (`bar`, `block in bar`, `puts`)
    pub label: String,
    /// Source path; `None` for native frames
    pub path: Option<String>,
    /// Source line; `None` for native frames
    pub lineno: Option<u32>,
}

/// Frame seen by the official backtrace facility
pub(crate) enum OfficialEntry {
    Iseq { iseq: ObjRef, pc: Option<usize> },
    Cfunc { method_name: String },
}

impl OfficialEntry {
    pub fn into_location(self) -> LocationObject {
        match self {
            OfficialEntry::Iseq { iseq, pc } => LocationObject::Iseq {
                iseq,
                pc,
                line: LazyLine::Pending,
            },
            OfficialEntry::Cfunc { method_name } => LocationObject::Cfunc { method_name },
        }
    }
}

impl SimState {
    pub fn class_of(&self, obj: ObjRef) -> Option<ObjRef> {
        match self.heap.get(obj)? {
            HeapObject::Object(obj) => Some(obj.singleton.unwrap_or(obj.klass)),
            HeapObject::Class(class) => match class.kind {
                ClassKind::IClass => class.origin,
                ClassKind::Module => Some(class.singleton.unwrap_or(self.builtins.module)),
                ClassKind::Class | ClassKind::Singleton => {
                    Some(class.singleton.unwrap_or(self.builtins.class))
                }
            },
            HeapObject::Str(_) => Some(self.builtins.string),
            _ => None,
        }
    }

    pub fn real_class_of(&self, obj: ObjRef) -> Option<ObjRef> {
        match self.heap.get(obj)? {
            HeapObject::Object(obj) => Some(obj.klass),
            HeapObject::Class(class) => match class.kind {
                ClassKind::Module => Some(self.builtins.module),
                ClassKind::Class | ClassKind::Singleton => Some(self.builtins.class),
                ClassKind::IClass => None,
            },
            HeapObject::Str(_) => Some(self.builtins.string),
            _ => None,
        }
    }

    pub fn ivar_get(&self, obj: ObjRef, name: &str) -> Option<ObjRef> {
        match self.heap.get(obj)? {
            HeapObject::Object(obj) => obj.ivars.get(name).copied(),
            HeapObject::Class(class) => class.ivars.get(name).copied(),
            _ => None,
        }
    }

    fn is_class_like(&self, obj: ObjRef) -> bool {
        self.class(obj).is_some_and(|class| {
            matches!(
                class.kind,
                ClassKind::Class | ClassKind::Module | ClassKind::Singleton
            )
        })
    }

    fn real_class_name(&self, obj: ObjRef) -> String {
        self.real_class_of(obj)
            .and_then(|klass| self.class(klass)?.name.clone())
            .unwrap_or_else(|| "Object".to_string())
    }

    pub fn inspect(&self, obj: ObjRef) -> String {
        if obj.is_nil() {
            return "nil".to_string();
        }
        if obj == self.top_self {
            return "main".to_string();
        }

        match self.heap.get(obj) {
            None => format!("#<dangling:{:#x}>", obj.as_raw()),
            Some(HeapObject::Class(class)) => {
                if let Some(name) = &class.name {
                    return name.clone();
                }
                if class.is_refinement {
                    let refined = class.ivars.get("__refined_class__").copied();
                    let defined_at = class.ivars.get("__defined_at__").copied();
                    return format!(
                        "#<refinement:{}@{}>",
                        self.inspect(refined.unwrap_or(ObjRef::NIL)),
                        self.inspect(defined_at.unwrap_or(ObjRef::NIL))
                    );
                }
                match (class.kind, class.attached) {
                    (ClassKind::Singleton, Some(attached)) => {
                        format!("#<Class:{}>", self.inspect(attached))
                    }
                    (ClassKind::Module, _) => format!("#<Module:{:#x}>", obj.as_raw()),
                    _ => format!("#<Class:{:#x}>", obj.as_raw()),
                }
            }
            Some(HeapObject::Object(_)) => {
                format!("#<{}:{:#x}>", self.real_class_name(obj), obj.as_raw())
            }
            Some(HeapObject::Str(s)) => format!("{s:?}"),
            Some(HeapObject::Iseq(iseq)) => {
                format!("<InstructionSequence:{}@{}>", iseq.label, iseq.path)
            }
            Some(HeapObject::MethodEntry(cme)) => format!("#<MethodEntry:{}>", cme.called_id),
            Some(HeapObject::Location(_)) => format!("#<Location:{:#x}>", obj.as_raw()),
        }
    }

    /// The runtime's own class path for a method entry's defining class
    fn profile_classpath(&self, defined_class: ObjRef) -> Option<String> {
        let class = self.class(defined_class)?;
        Some(match class.kind {
            ClassKind::IClass => self.path_or_inspect(class.origin?),
            ClassKind::Singleton => {
                let attached = class.attached?;
                if self.is_class_like(attached) {
                    self.path_or_inspect(attached)
                } else {
                    format!("#<{}:{:#x}>", self.real_class_name(attached), attached.as_raw())
                }
            }
            ClassKind::Class | ClassKind::Module => self.path_or_inspect(defined_class),
        })
    }

    /// Anonymous classes and refinements have no path; use their inspected form
    fn path_or_inspect(&self, klass: ObjRef) -> String {
        match self.class(klass).and_then(|class| class.name.clone()) {
            Some(name) => name,
            None => self.inspect(klass),
        }
    }

    /// The runtime's frame naming primitive
    ///
    /// Without native-frame reflection, native method entries have no name.
    pub fn profile_qualified_name(
        &self,
        frame: &FrameValue,
        native_frame_reflection: bool,
    ) -> Option<String> {
        let cme = match *frame {
            FrameValue::BytecodeUnit { iseq, .. } => return Some(self.iseq(iseq)?.label.clone()),
            FrameValue::MethodEntry(cme) => self.method_entry(cme)?,
        };

        match cme.kind {
            MethodKind::Iseq | MethodKind::Bmethod => {}
            MethodKind::Cfunc if native_frame_reflection => {}
            _ => return None,
        }

        let singleton = self
            .class(cme.defined_class)
            .is_some_and(|class| class.kind == ClassKind::Singleton);
        Some(match self.profile_classpath(cme.defined_class) {
            Some(path) => format!(
                "{path}{}{}",
                if singleton { "." } else { "#" },
                cme.original_id
            ),
            None => cme.original_id.clone(),
        })
    }

    /// Frames the official backtrace reports for a thread, innermost first
    pub fn official_entries(&self, thread: ThreadRef) -> Option<Vec<OfficialEntry>> {
        let thread = self.thread(thread)?;
        let entries = thread
            .frames_innermost_first()
            .filter_map(|frame| {
                if let Some(iseq) = frame.iseq.filter(|_| frame.magic.runs_bytecode()) {
                    return Some(OfficialEntry::Iseq { iseq, pc: frame.pc });
                }
                let cme = self.method_entry(frame.me_cref?)?;
                (cme.kind == MethodKind::Cfunc).then(|| OfficialEntry::Cfunc {
                    method_name: cme.called_id.clone(),
                })
            })
            .collect();
        Some(entries)
    }
}

impl SimRuntime {
    /// The runtime's official backtrace of `thread`, innermost first
    pub fn backtrace(&self, thread: ThreadRef) -> SimResult<Vec<OfficialFrame>> {
        let state = self.state.read();
        let entries = state
            .official_entries(thread)
            .ok_or(SimError::UnknownThread(thread))?;

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                OfficialEntry::Iseq { iseq, pc } => {
                    let unit = state.iseq(iseq);
                    OfficialFrame {
                        label: unit.map(|u| u.label.clone()).unwrap_or_default(),
                        path: unit.map(|u| u.path.clone()),
                        lineno: Some(match (unit, pc) {
                            (Some(unit), Some(pc)) => unit.line_for_pc(pc),
                            _ => 0,
                        }),
                    }
                }
                OfficialEntry::Cfunc { method_name } => OfficialFrame {
                    label: method_name,
                    path: None,
                    lineno: None,
                },
            })
            .collect())
    }
}
