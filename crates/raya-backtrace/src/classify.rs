//! Frame classification
//!
//! Decides, per control frame, whether it is captured as an interpreted
//! frame, captured as a native frame, or skipped, and computes the source
//! line of interpreted frames.

use crate::frame::FrameRecord;
use crate::host::{ControlFrame, HostRuntime, MethodKind, ObjRef};

/// Classification of one control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Executes bytecode; `method_entry` is the resolved entry, if any
    Interpreted {
        /// Bytecode unit
        iseq: ObjRef,
        /// Resolved method entry and its kind
        method_entry: Option<(ObjRef, MethodKind)>,
    },
    /// Executes a native method
    Native {
        /// Native method entry
        method_entry: ObjRef,
    },
}

/// Classify a control frame. `None` means the frame is skipped and does not
/// count toward the capture limit.
pub fn classify(host: &dyn HostRuntime, frame: &ControlFrame) -> Option<FrameClass> {
    let method_entry = host
        .frame_method_entry(frame)
        .and_then(|cme| host.method_kind(cme).map(|kind| (cme, kind)));

    if frame.is_bytecode_frame() {
        let iseq = frame.iseq?;
        return Some(FrameClass::Interpreted { iseq, method_entry });
    }

    match method_entry {
        Some((cme, kind)) if kind.is_native() => Some(FrameClass::Native { method_entry: cme }),
        _ => None,
    }
}

/// Build the frame record for a classified frame
pub fn record_for(host: &dyn HostRuntime, frame: &ControlFrame, class: FrameClass) -> FrameRecord {
    let mut record = FrameRecord::blank(frame.receiver);

    match class {
        FrameClass::Interpreted { iseq, method_entry } => {
            record.is_interpreted = true;
            record.bytecode_unit = Some(iseq);

            if let Some((cme, kind)) = method_entry {
                record.method_entry = Some(cme);
                record.method_kind_tag = kind.tag();
            }

            // Bytecode-backed entries name the frame themselves; every other
            // case (no entry, bmethod, ...) reports through the unit.
            record.prefer_bytecode_unit =
                !matches!(method_entry, Some((_, MethodKind::Iseq)));

            record.line_number = calc_lineno(host, iseq, frame.pc);
        }
        FrameClass::Native { method_entry } => {
            record.method_entry = Some(method_entry);
            record.method_kind_tag = MethodKind::Cfunc.tag();
        }
    }

    record
}

/// Source line for a bytecode frame
///
/// The pc addresses the instruction *after* the one being executed, so the
/// slot offset is stepped back by one before the line-table lookup. A missing
/// pc (runtime bootstrap) gives line 0.
pub fn calc_lineno(host: &dyn HostRuntime, iseq: ObjRef, pc: Option<usize>) -> u32 {
    let Some(pc) = pc else {
        return 0;
    };
    let Some(layout) = host.iseq_layout(iseq) else {
        return 0;
    };

    debug_assert!(pc >= layout.encoded_start, "pc before start of unit");
    let offset = pc.saturating_sub(layout.encoded_start);
    debug_assert!(offset <= layout.encoded_size, "pc past end of unit");

    let pos = offset.saturating_sub(1);
    host.iseq_line_no(iseq, pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::METHOD_KIND_NONE;
    use crate::host::{FrameMagic, ThreadRef};
    use crate::sim::{FrameSpec, HostVersion, IseqSpec, MethodBody, SimRuntime};

    fn innermost(rt: &SimRuntime) -> ControlFrame {
        let ec = rt.current_execution_context();
        rt.control_frame(ec, 0).unwrap()
    }

    fn main(rt: &SimRuntime) -> ThreadRef {
        rt.main_thread()
    }

    #[test]
    fn test_interpreted_iseq_method_prefers_entry() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let iseq = rt
            .new_iseq(IseqSpec::method("bar", "foo.raya", &[10, 11, 12]))
            .unwrap();
        let bar = rt.define_method(foo, "bar", MethodBody::Iseq(iseq)).unwrap();
        let obj = rt.new_object(foo).unwrap();
        rt.push_frame(main(&rt), FrameSpec::method(obj, bar, 11)).unwrap();

        let frame = innermost(&rt);
        let class = classify(&rt, &frame).unwrap();
        let record = record_for(&rt, &frame, class);

        assert!(record.is_interpreted);
        assert!(!record.prefer_bytecode_unit);
        assert_eq!(record.method_kind(), Some(MethodKind::Iseq));
        assert_eq!(record.line_number, 11);
        assert_eq!(record.receiver, obj);
    }

    #[test]
    fn test_top_frame_without_entry_prefers_unit() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let top = rt.new_iseq(IseqSpec::top("main.raya", &[1, 2, 3])).unwrap();
        rt.push_frame(main(&rt), FrameSpec::top(top, 3)).unwrap();

        let frame = innermost(&rt);
        let record = record_for(&rt, &frame, classify(&rt, &frame).unwrap());

        assert!(record.is_interpreted);
        assert!(record.prefer_bytecode_unit);
        assert_eq!(record.method_entry, None);
        assert_eq!(record.method_kind_tag, METHOD_KIND_NONE);
        assert_eq!(record.line_number, 3);
    }

    #[test]
    fn test_native_frame_captured() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let cme = rt.define_method(foo, "native", MethodBody::Native).unwrap();
        let obj = rt.new_object(foo).unwrap();
        rt.push_frame(main(&rt), FrameSpec::method(obj, cme, 0)).unwrap();

        let frame = innermost(&rt);
        assert_eq!(frame.magic, FrameMagic::Cfunc);
        let record = record_for(&rt, &frame, classify(&rt, &frame).unwrap());

        assert!(!record.is_interpreted);
        assert_eq!(record.method_entry, Some(cme));
        assert_eq!(record.method_kind(), Some(MethodKind::Cfunc));
        assert_eq!(record.line_number, 0);
    }

    #[test]
    fn test_internal_frames_skipped() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let reader = rt.define_method(foo, "value", MethodBody::AttrReader).unwrap();
        let obj = rt.new_object(foo).unwrap();
        rt.push_frame(main(&rt), FrameSpec::method(obj, reader, 0)).unwrap();

        let frame = innermost(&rt);
        assert_eq!(classify(&rt, &frame), None);

        rt.push_frame(main(&rt), FrameSpec::ifunc(obj)).unwrap();
        let frame = innermost(&rt);
        assert_eq!(classify(&rt, &frame), None);
    }

    #[test]
    fn test_calc_lineno_steps_back_one_slot() {
        let rt = SimRuntime::new(HostVersion::Modern);
        // slot 0 → line 5, slots 1-2 → line 6, slot 3 → line 7
        let iseq = rt.new_iseq(IseqSpec::method("m", "m.raya", &[5, 6, 6, 7])).unwrap();
        let start = rt.iseq_layout(iseq).unwrap().encoded_start;

        // Executing slot 2 (last instruction of line 6): pc points at slot 3
        assert_eq!(calc_lineno(&rt, iseq, Some(start + 3)), 6);
        // Executing slot 3
        assert_eq!(calc_lineno(&rt, iseq, Some(start + 4)), 7);
        // pc at the very start: no step back below zero
        assert_eq!(calc_lineno(&rt, iseq, Some(start)), 5);
    }

    #[test]
    fn test_calc_lineno_without_pc() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let iseq = rt.new_iseq(IseqSpec::top("boot.raya", &[1])).unwrap();
        assert_eq!(calc_lineno(&rt, iseq, None), 0);
    }
}
