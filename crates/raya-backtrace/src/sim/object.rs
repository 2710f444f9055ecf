//! Managed objects of the reference runtime

use crate::host::{ClassKind, IseqKind, LazyLine, MethodKind, ObjRef};
use rustc_hash::FxHashMap;

/// Class, module, singleton class or include class
#[derive(Debug, Clone)]
pub(crate) struct ClassObject {
    pub kind: ClassKind,
    /// Constant name, for named classes and modules
    pub name: Option<String>,
    pub superclass: Option<ObjRef>,
    /// Singleton class, once created
    pub singleton: Option<ObjRef>,
    /// Object a singleton class is attached to
    pub attached: Option<ObjRef>,
    /// Module an include class stands for
    pub origin: Option<ObjRef>,
    pub is_refinement: bool,
    /// Method name → callable method entry
    pub methods: FxHashMap<String, ObjRef>,
    pub ivars: FxHashMap<String, ObjRef>,
    /// Include classes and refinement modules hanging off this class
    pub extras: Vec<ObjRef>,
}

impl ClassObject {
    pub fn new(kind: ClassKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            superclass: None,
            singleton: None,
            attached: None,
            origin: None,
            is_refinement: false,
            methods: FxHashMap::default(),
            ivars: FxHashMap::default(),
            extras: Vec::new(),
        }
    }
}

/// Plain object
#[derive(Debug, Clone)]
pub(crate) struct PlainObject {
    pub klass: ObjRef,
    pub singleton: Option<ObjRef>,
    pub ivars: FxHashMap<String, ObjRef>,
}

/// Compiled bytecode unit
#[derive(Debug, Clone)]
pub(crate) struct IseqObject {
    pub kind: IseqKind,
    pub label: String,
    pub base_label: String,
    pub path: String,
    /// Address of the first instruction slot; instruction memory is not
    /// moved by compaction
    pub encoded_start: usize,
    /// Source line of each instruction slot
    pub lines: Vec<u32>,
}

impl IseqObject {
    /// Line of the instruction at slot `pos`, clamped to the unit
    pub fn line_at(&self, pos: usize) -> u32 {
        self.lines
            .get(pos)
            .or_else(|| self.lines.last())
            .copied()
            .unwrap_or(0)
    }

    /// pc of a frame currently executing the first slot of `line`
    pub fn pc_for_line(&self, line: u32) -> Option<usize> {
        let slot = self.lines.iter().position(|&l| l == line)?;
        Some(self.encoded_start + slot + 1)
    }

    /// Line for a pc, stepping back over the next-instruction offset
    pub fn line_for_pc(&self, pc: usize) -> u32 {
        let offset = pc.saturating_sub(self.encoded_start);
        self.line_at(offset.saturating_sub(1))
    }
}

/// Callable method entry
#[derive(Debug, Clone)]
pub(crate) struct MethodEntryObject {
    pub kind: MethodKind,
    pub called_id: String,
    pub original_id: String,
    pub owner: ObjRef,
    pub defined_class: ObjRef,
    pub iseq: Option<ObjRef>,
}

/// Public backtrace location
#[derive(Debug, Clone)]
pub(crate) enum LocationObject {
    Iseq {
        iseq: ObjRef,
        pc: Option<usize>,
        line: LazyLine,
    },
    Cfunc {
        method_name: String,
    },
}

/// Any heap object
#[derive(Debug, Clone)]
pub(crate) enum HeapObject {
    Class(ClassObject),
    Object(PlainObject),
    Str(String),
    Iseq(IseqObject),
    MethodEntry(MethodEntryObject),
    Location(LocationObject),
}

impl HeapObject {
    /// Type name used in builder errors
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapObject::Class(_) => "class",
            HeapObject::Object(_) => "object",
            HeapObject::Str(_) => "string",
            HeapObject::Iseq(_) => "iseq",
            HeapObject::MethodEntry(_) => "method entry",
            HeapObject::Location(_) => "location",
        }
    }

    /// Outgoing references
    pub fn children(&self) -> Vec<ObjRef> {
        let mut out = Vec::new();
        match self {
            HeapObject::Class(class) => {
                out.extend(class.superclass);
                out.extend(class.singleton);
                out.extend(class.attached);
                out.extend(class.origin);
                out.extend(class.methods.values().copied());
                out.extend(class.ivars.values().copied());
                out.extend(class.extras.iter().copied());
            }
            HeapObject::Object(obj) => {
                out.push(obj.klass);
                out.extend(obj.singleton);
                out.extend(obj.ivars.values().copied());
            }
            HeapObject::MethodEntry(cme) => {
                out.push(cme.owner);
                out.push(cme.defined_class);
                out.extend(cme.iseq);
            }
            HeapObject::Location(LocationObject::Iseq { iseq, .. }) => out.push(*iseq),
            HeapObject::Location(LocationObject::Cfunc { .. })
            | HeapObject::Str(_)
            | HeapObject::Iseq(_) => {}
        }
        out
    }

    /// Rewrite outgoing references after compaction
    pub fn update_refs(&mut self, mut update: impl FnMut(ObjRef) -> ObjRef) {
        match self {
            HeapObject::Class(class) => rewrite(
                class
                    .superclass
                    .iter_mut()
                    .chain(class.singleton.iter_mut())
                    .chain(class.attached.iter_mut())
                    .chain(class.origin.iter_mut())
                    .chain(class.methods.values_mut())
                    .chain(class.ivars.values_mut())
                    .chain(class.extras.iter_mut()),
                &mut update,
            ),
            HeapObject::Object(obj) => rewrite(
                std::iter::once(&mut obj.klass)
                    .chain(obj.singleton.iter_mut())
                    .chain(obj.ivars.values_mut()),
                &mut update,
            ),
            HeapObject::MethodEntry(cme) => rewrite(
                std::iter::once(&mut cme.owner)
                    .chain(std::iter::once(&mut cme.defined_class))
                    .chain(cme.iseq.iter_mut()),
                &mut update,
            ),
            HeapObject::Location(LocationObject::Iseq { iseq, .. }) => *iseq = update(*iseq),
            HeapObject::Location(LocationObject::Cfunc { .. })
            | HeapObject::Str(_)
            | HeapObject::Iseq(_) => {}
        }
    }
}

fn rewrite<'a>(
    refs: impl Iterator<Item = &'a mut ObjRef>,
    update: &mut impl FnMut(ObjRef) -> ObjRef,
) {
    for r in refs {
        *r = update(*r);
    }
}
