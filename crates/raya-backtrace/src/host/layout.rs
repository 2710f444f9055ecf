//! Host internal layout records
//!
//! Plain-data copies of the host structures the walker and resolver read:
//! control frames, callable method entries, bytecode units (iseqs), class
//! layouts and public backtrace locations.

use super::value::ObjRef;

/// Control frame type, as recorded in the frame's magic bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameMagic {
    /// Bytecode method body
    Method,
    /// Block body
    Block,
    /// Class/module body
    Class,
    /// Top-level script
    Top,
    /// Native (C-level) method
    Cfunc,
    /// Internal native block (iterator glue, attribute dispatch)
    Ifunc,
    /// `eval` body
    Eval,
    /// `rescue`/`ensure` clause
    Rescue,
    /// Non-semantic frame at the bottom of a thread's chain
    Dummy,
}

impl FrameMagic {
    /// Whether frames of this type execute bytecode (when a unit is attached)
    #[inline]
    pub const fn runs_bytecode(self) -> bool {
        matches!(
            self,
            FrameMagic::Method
                | FrameMagic::Block
                | FrameMagic::Class
                | FrameMagic::Top
                | FrameMagic::Eval
                | FrameMagic::Rescue
        )
    }
}

/// One activation record of the host's internal call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Frame type
    pub magic: FrameMagic,
    /// Object the frame executes on ("self")
    pub receiver: ObjRef,
    /// Bytecode unit being executed, if any
    pub iseq: Option<ObjRef>,
    /// Program counter: address of the *next* instruction, in instruction slots
    pub pc: Option<usize>,
    /// Raw method-entry/cref slot of the frame's environment. May hold
    /// something other than a method entry; resolve it through
    /// [`HostRuntime::frame_method_entry`](super::HostRuntime::frame_method_entry).
    pub me_cref: Option<ObjRef>,
}

impl ControlFrame {
    /// Whether this frame executes compiled bytecode
    #[inline]
    pub fn is_bytecode_frame(&self) -> bool {
        self.iseq.is_some() && self.magic.runs_bytecode()
    }
}

/// How a method is implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MethodKind {
    /// Bytecode method
    Iseq = 0,
    /// Native method
    Cfunc = 1,
    /// Attribute writer
    AttrSet = 2,
    /// Attribute reader
    Ivar = 3,
    /// Method defined from a block
    Bmethod = 4,
    /// Implicit `super` placeholder
    Zsuper = 5,
    /// Alias of another entry
    Alias = 6,
    /// Undefined method
    Undef = 7,
    /// Not implemented on this platform
    NotImplemented = 8,
    /// Optimized built-in dispatch
    Optimized = 9,
    /// `method_missing` dispatch
    Missing = 10,
    /// Refined method placeholder
    Refined = 11,
}

impl MethodKind {
    /// Integer tag stored in frame records
    #[inline]
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Decode a tag. Sentinel and unknown values give `None`.
    pub const fn from_tag(tag: i32) -> Option<Self> {
        Some(match tag {
            0 => MethodKind::Iseq,
            1 => MethodKind::Cfunc,
            2 => MethodKind::AttrSet,
            3 => MethodKind::Ivar,
            4 => MethodKind::Bmethod,
            5 => MethodKind::Zsuper,
            6 => MethodKind::Alias,
            7 => MethodKind::Undef,
            8 => MethodKind::NotImplemented,
            9 => MethodKind::Optimized,
            10 => MethodKind::Missing,
            11 => MethodKind::Refined,
            _ => return None,
        })
    }

    /// Whether the method is implemented natively
    #[inline]
    pub const fn is_native(self) -> bool {
        matches!(self, MethodKind::Cfunc)
    }
}

/// Resolved, receiver-specialized callable method entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Implementation kind
    pub kind: MethodKind,
    /// Name the method was called by
    pub called_id: String,
    /// Name the method was originally defined with
    pub original_id: String,
    /// Class or module that owns the definition
    pub owner: ObjRef,
    /// Class the entry was resolved against (may be an include class)
    pub defined_class: ObjRef,
    /// Bytecode unit, for bytecode-backed entries
    pub iseq: Option<ObjRef>,
}

/// Kind of bytecode unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IseqKind {
    /// Top-level script
    Top,
    /// Method body
    Method,
    /// Block body
    Block,
    /// Class/module body
    Class,
    /// `rescue` clause
    Rescue,
    /// `ensure` clause
    Ensure,
    /// `eval` body
    Eval,
    /// Main script
    Main,
}

/// Instruction layout of a bytecode unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IseqLayout {
    /// Unit kind
    pub kind: IseqKind,
    /// Address of the first encoded instruction slot
    pub encoded_start: usize,
    /// Number of encoded instruction slots
    pub encoded_size: usize,
}

/// Source description of a bytecode unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IseqLocation {
    /// Full label (`"block in bar"`, `"<main>"`)
    pub label: String,
    /// Base label (`"bar"`)
    pub base_label: String,
    /// Source path
    pub path: String,
}

/// Kind of class-like object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Regular class
    Class,
    /// Module
    Module,
    /// Include class: proxy inserted in the ancestry for a module
    IClass,
    /// Singleton class of one object
    Singleton,
}

/// Layout flags of a class-like object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    /// Kind
    pub kind: ClassKind,
    /// Module flagged as a refinement
    pub is_refinement: bool,
    /// Object a singleton class is attached to
    pub attached: Option<ObjRef>,
}

/// Line state of a public backtrace location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyLine {
    /// Not computed yet; computed on first line query
    Pending,
    /// Computed
    Calculated(u32),
}

/// Internal payload of a public backtrace location object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationPayload {
    /// Bytecode frame
    Iseq {
        /// Bytecode unit
        iseq: ObjRef,
        /// Line number state
        line: LazyLine,
    },
    /// Native frame
    Cfunc {
        /// Method name
        method_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_kind_tags() {
        for tag in 0..=11 {
            let kind = MethodKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
        assert_eq!(MethodKind::from_tag(-1), None);
        assert_eq!(MethodKind::from_tag(12), None);
    }

    #[test]
    fn test_only_cfunc_is_native() {
        assert!(MethodKind::Cfunc.is_native());
        assert!(!MethodKind::Iseq.is_native());
        assert!(!MethodKind::Ivar.is_native());
        assert!(!MethodKind::Bmethod.is_native());
    }

    #[test]
    fn test_bytecode_frame_needs_unit_and_magic() {
        let mut frame = ControlFrame {
            magic: FrameMagic::Method,
            receiver: ObjRef::NIL,
            iseq: Some(ObjRef::from_raw(0x1000)),
            pc: Some(0),
            me_cref: None,
        };
        assert!(frame.is_bytecode_frame());

        frame.magic = FrameMagic::Cfunc;
        assert!(!frame.is_bytecode_frame());

        frame.magic = FrameMagic::Dummy;
        assert!(!frame.is_bytecode_frame());

        frame.magic = FrameMagic::Block;
        frame.iseq = None;
        assert!(!frame.is_bytecode_frame());
    }
}
