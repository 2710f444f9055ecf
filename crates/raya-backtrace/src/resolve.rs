//! Name resolution
//!
//! Turns the raw references of a [`FrameRecord`] into qualified method
//! names and source paths. Nothing is cached: every query reads the host
//! again, so results always reflect the references as they are after the
//! latest collection.
//!
//! # Naming rules
//!
//! ```text
//! instance method              Foo#bar
//! singleton method             Foo.bar
//! method on an object's own    #<Foo:0x7f3a10>.bar
//!   singleton class
//! top-level `def self.x`       Object$<main>.x
//! block / rescue / eval body   block in Foo#bar
//! refinement                   Foo$refinement@Bar#baz
//! script body                  <main>, <class:Foo>
//! ```

use crate::frame::{FrameRecord, FrameValue};
use crate::host::{ClassKind, HostRuntime, IseqKind, ObjRef};
use crate::walker::FrameWalker;

/// Placeholder owner path for singleton methods defined on the top-level self
pub const TOP_SELF_PATH: &str = "Object$<main>";

const REFINED_CLASS_IVAR: &str = "__refined_class__";
const DEFINED_AT_IVAR: &str = "__defined_at__";

/// Resolves names and paths of captured frames against a host
pub struct NameResolver<'a> {
    host: &'a dyn HostRuntime,
    walker: &'static dyn FrameWalker,
    top_self: ObjRef,
}

impl<'a> NameResolver<'a> {
    /// Create a resolver naming method entries the way `walker`'s tier does
    pub fn new(host: &'a dyn HostRuntime, walker: &'static dyn FrameWalker, top_self: ObjRef) -> Self {
        Self {
            host,
            walker,
            top_self,
        }
    }

    /// Qualified method name of a frame
    pub fn qualified_method_name(&self, record: &FrameRecord) -> Option<String> {
        if !record.is_interpreted {
            if record.prefer_native_name {
                return record.native_name.clone();
            }
            return self.method_entry_name(record.method_entry?);
        }

        if let Some(name) = record.method_entry.and_then(|cme| self.refinement_name(cme)) {
            return Some(name);
        }

        let iseq = record.bytecode_unit?;
        let location = self.host.iseq_location(iseq)?;

        if self.is_nested_body(iseq) {
            let Some(owner) = record.method_entry.and_then(|cme| self.method_entry_name(cme)) else {
                return Some(location.label);
            };
            return Some(match location.label.strip_suffix(location.base_label.as_str()) {
                Some(prefix) => format!("{prefix}{owner}"),
                None => location.label,
            });
        }

        if let Some(name) = record.method_entry.and_then(|cme| self.method_entry_name(cme)) {
            return Some(name);
        }

        Some(location.label)
    }

    /// Source path of an interpreted frame
    pub fn file_name(&self, record: &FrameRecord) -> Option<String> {
        if !record.is_interpreted {
            return None;
        }

        let iseq = match record.frame_value()? {
            FrameValue::BytecodeUnit { iseq, .. } => iseq,
            FrameValue::MethodEntry(cme) => self
                .host
                .method_entry(cme)
                .and_then(|entry| entry.iseq)
                .or(record.bytecode_unit)?,
        };

        self.host.iseq_location(iseq).map(|location| location.path)
    }

    /// Source line of an interpreted frame
    #[inline]
    pub fn line_number(&self, record: &FrameRecord) -> Option<u32> {
        record.line()
    }

    /// Reflective view of a frame
    #[inline]
    pub fn frame_value(&self, record: &FrameRecord) -> Option<FrameValue> {
        record.frame_value()
    }

    fn method_entry_name(&self, cme: ObjRef) -> Option<String> {
        self.walker
            .qualified_method_entry_name(self.host, cme, self.top_self)
    }

    fn is_nested_body(&self, iseq: ObjRef) -> bool {
        self.host.iseq_layout(iseq).is_some_and(|layout| {
            matches!(
                layout.kind,
                IseqKind::Block | IseqKind::Rescue | IseqKind::Ensure | IseqKind::Eval
            )
        })
    }

    /// `Refined$refinement@DefinedAt#name` when the entry was defined inside
    /// a refinement
    fn refinement_name(&self, cme: ObjRef) -> Option<String> {
        let entry = self.host.method_entry(cme)?;
        let module = self.host.class_of(entry.defined_class)?;
        if !self.host.class_layout(module)?.is_refinement {
            return None;
        }

        let refined_class = self
            .host
            .ivar_get(module, REFINED_CLASS_IVAR)
            .filter(|klass| !klass.is_nil())?;
        let defined_at = self
            .host
            .ivar_get(module, DEFINED_AT_IVAR)
            .unwrap_or(ObjRef::NIL);

        Some(format!(
            "{}$refinement@{}#{}",
            self.host.inspect(refined_class),
            self.host.inspect(defined_at),
            entry.called_id
        ))
    }
}

/// Compose `Owner#name` / `Owner.name` from a raw method entry
///
/// Used on hosts whose reflection primitive cannot name native frames.
/// Include classes resolve to their module; singleton classes resolve to the
/// object they are attached to. Owners without a constant path (anonymous
/// classes, refinements) are named by their inspected form.
pub(crate) fn compose_method_entry_name(
    host: &dyn HostRuntime,
    cme: ObjRef,
    top_self: ObjRef,
) -> Option<String> {
    let entry = host.method_entry(cme)?;
    let layout = host.class_layout(entry.defined_class);
    let singleton = layout.is_some_and(|layout| layout.kind == ClassKind::Singleton);

    let path = layout.and_then(|layout| match layout.kind {
        ClassKind::IClass => host
            .class_of(entry.defined_class)
            .map(|module| owner_path(host, module)),
        ClassKind::Singleton => {
            let attached = layout.attached?;
            Some(attached_path(host, attached, top_self))
        }
        ClassKind::Class | ClassKind::Module => Some(owner_path(host, entry.defined_class)),
    });

    Some(match path {
        Some(path) => format!("{path}{}{}", if singleton { "." } else { "#" }, entry.original_id),
        None => entry.original_id,
    })
}

fn owner_path(host: &dyn HostRuntime, klass: ObjRef) -> String {
    host.class_path(klass).unwrap_or_else(|| host.inspect(klass))
}

fn attached_path(host: &dyn HostRuntime, attached: ObjRef, top_self: ObjRef) -> String {
    // Singleton classes are class-like too
    let is_class_like = host.class_layout(attached).is_some_and(|layout| {
        matches!(
            layout.kind,
            ClassKind::Class | ClassKind::Module | ClassKind::Singleton
        )
    });
    if is_class_like {
        return owner_path(host, attached);
    }
    if attached == top_self {
        return TOP_SELF_PATH.to_string();
    }

    let class_name = host
        .real_class_of(attached)
        .and_then(|klass| host.class_path(klass))
        .unwrap_or_default();
    format!("#<{class_name}:{:#x}>", attached.as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::sim::{FrameSpec, HostVersion, IseqSpec, MethodBody, SimRuntime};
    use crate::walker::CapabilityTier;

    fn innermost_record(rt: &SimRuntime) -> FrameRecord {
        let ec = rt.current_execution_context();
        let frame = rt.control_frame(ec, 0).unwrap();
        let class = classify::classify(rt, &frame).unwrap();
        classify::record_for(rt, &frame, class)
    }

    fn resolver(rt: &SimRuntime, tier: CapabilityTier) -> NameResolver<'_> {
        NameResolver::new(rt, tier.walker(), rt.top_self())
    }

    #[test]
    fn test_instance_method_name_and_path() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let iseq = rt.new_iseq(IseqSpec::method("bar", "foo.raya", &[3, 4])).unwrap();
        let bar = rt.define_method(foo, "bar", MethodBody::Iseq(iseq)).unwrap();
        let obj = rt.new_object(foo).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(obj, bar, 4)).unwrap();

        let record = innermost_record(&rt);
        for tier in [CapabilityTier::ModernIntrospection, CapabilityTier::NativeFrameBackport] {
            let names = resolver(&rt, tier);
            assert_eq!(names.qualified_method_name(&record).as_deref(), Some("Foo#bar"));
            assert_eq!(names.file_name(&record).as_deref(), Some("foo.raya"));
            assert_eq!(names.line_number(&record), Some(4));
        }
    }

    #[test]
    fn test_singleton_method_uses_dot() {
        let rt = SimRuntime::new(HostVersion::Backport);
        let foo = rt.define_class("Foo", None).unwrap();
        let meta = rt.singleton_class(foo).unwrap();
        let build = rt.define_method(meta, "build", MethodBody::Native).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(foo, build, 0)).unwrap();

        let record = innermost_record(&rt);
        let names = resolver(&rt, CapabilityTier::NativeFrameBackport);
        assert_eq!(names.qualified_method_name(&record).as_deref(), Some("Foo.build"));
        assert_eq!(names.file_name(&record), None);
        assert_eq!(names.line_number(&record), None);
    }

    #[test]
    fn test_object_singleton_placeholder() {
        let rt = SimRuntime::new(HostVersion::Backport);
        let foo = rt.define_class("Foo", None).unwrap();
        let obj = rt.new_object(foo).unwrap();
        let own = rt.singleton_class(obj).unwrap();
        let cme = rt.define_method(own, "poke", MethodBody::Native).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(obj, cme, 0)).unwrap();

        let record = innermost_record(&rt);
        let name = resolver(&rt, CapabilityTier::NativeFrameBackport)
            .qualified_method_name(&record)
            .unwrap();
        assert_eq!(name, format!("#<Foo:{:#x}>.poke", obj.as_raw()));
    }

    #[test]
    fn test_top_self_singleton_placeholder() {
        let rt = SimRuntime::new(HostVersion::Backport);
        let main = rt.top_self();
        let own = rt.singleton_class(main).unwrap();
        let cme = rt.define_method(own, "helper", MethodBody::Native).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(main, cme, 0)).unwrap();

        let record = innermost_record(&rt);
        assert_eq!(
            resolver(&rt, CapabilityTier::NativeFrameBackport)
                .qualified_method_name(&record)
                .as_deref(),
            Some("Object$<main>.helper")
        );
    }

    #[test]
    fn test_module_method_through_include_class() {
        let rt = SimRuntime::new(HostVersion::Backport);
        let greet = rt.define_module("Greeting").unwrap();
        let cme = rt.define_method(greet, "hello", MethodBody::Native).unwrap();
        let person = rt.define_class("Person", None).unwrap();
        let included = rt.include_module(person, greet, cme).unwrap();
        let obj = rt.new_object(person).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(obj, included, 0)).unwrap();

        let record = innermost_record(&rt);
        assert_eq!(
            resolver(&rt, CapabilityTier::NativeFrameBackport)
                .qualified_method_name(&record)
                .as_deref(),
            Some("Greeting#hello")
        );
    }

    #[test]
    fn test_block_label_qualified_with_enclosing_method() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let body = rt.new_iseq(IseqSpec::method("each_pair", "foo.raya", &[20, 21])).unwrap();
        let cme = rt.define_method(foo, "each_pair", MethodBody::Iseq(body)).unwrap();
        let block = rt
            .new_iseq(IseqSpec::block("each_pair", "foo.raya", &[22, 23]))
            .unwrap();
        let obj = rt.new_object(foo).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::block(obj, block, Some(cme), 23)).unwrap();

        let record = innermost_record(&rt);
        let names = resolver(&rt, CapabilityTier::ModernIntrospection);
        assert_eq!(
            names.qualified_method_name(&record).as_deref(),
            Some("block in Foo#each_pair")
        );
        assert_eq!(names.line_number(&record), Some(23));
    }

    #[test]
    fn test_top_level_block_keeps_label() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let block = rt.new_iseq(IseqSpec::block("<main>", "main.raya", &[5])).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::block(rt.top_self(), block, None, 5))
            .unwrap();

        let record = innermost_record(&rt);
        assert_eq!(
            resolver(&rt, CapabilityTier::ModernIntrospection)
                .qualified_method_name(&record)
                .as_deref(),
            Some("block in <main>")
        );
    }

    #[test]
    fn test_refinement_name() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let string = rt.define_class("Text", None).unwrap();
        let outer = rt.define_module("Shouting").unwrap();
        let refinement = rt.define_refinement(outer, string).unwrap();
        let iseq = rt.new_iseq(IseqSpec::method("shout", "shout.raya", &[2])).unwrap();
        let cme = rt.define_method(refinement, "shout", MethodBody::Iseq(iseq)).unwrap();
        let obj = rt.new_object(string).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(obj, cme, 2)).unwrap();

        let record = innermost_record(&rt);
        let name = resolver(&rt, CapabilityTier::ModernIntrospection)
            .qualified_method_name(&record)
            .unwrap();
        assert!(name.contains("$refinement@"), "{name}");
        assert_eq!(name, "Text$refinement@Shouting#shout");
    }

    #[test]
    fn test_native_refinement_method_named_by_inspect() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let text = rt.define_class("Text", None).unwrap();
        let outer = rt.define_module("Shouting").unwrap();
        let refinement = rt.define_refinement(outer, text).unwrap();
        let cme = rt.define_method(refinement, "shout", MethodBody::Native).unwrap();
        let obj = rt.new_object(text).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(obj, cme, 0)).unwrap();

        let record = innermost_record(&rt);
        assert!(!record.is_interpreted);
        for tier in [CapabilityTier::ModernIntrospection, CapabilityTier::NativeFrameBackport] {
            assert_eq!(
                resolver(&rt, tier).qualified_method_name(&record).as_deref(),
                Some("#<refinement:Text@Shouting>#shout"),
                "{tier}"
            );
        }
    }

    #[test]
    fn test_singleton_of_singleton_uses_class_form() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let foo = rt.define_class("Foo", None).unwrap();
        let meta = rt.singleton_class(foo).unwrap();
        let meta_meta = rt.singleton_class(meta).unwrap();
        let cme = rt.define_method(meta_meta, "deep", MethodBody::Native).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::method(meta, cme, 0)).unwrap();

        let record = innermost_record(&rt);
        for tier in [CapabilityTier::ModernIntrospection, CapabilityTier::NativeFrameBackport] {
            assert_eq!(
                resolver(&rt, tier).qualified_method_name(&record).as_deref(),
                Some("#<Class:Foo>.deep"),
                "{tier}"
            );
        }
    }

    #[test]
    fn test_script_body_uses_label() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let top = rt.new_iseq(IseqSpec::top("main.raya", &[1])).unwrap();
        rt.push_frame(rt.main_thread(), FrameSpec::top(top, 1)).unwrap();

        let record = innermost_record(&rt);
        let names = resolver(&rt, CapabilityTier::ModernIntrospection);
        assert_eq!(names.qualified_method_name(&record).as_deref(), Some("<main>"));
        assert_eq!(names.file_name(&record).as_deref(), Some("main.raya"));
    }

    #[test]
    fn test_native_name_preferred_when_flagged() {
        let rt = SimRuntime::new(HostVersion::Legacy);
        let mut record = FrameRecord::blank(ObjRef::NIL);
        record.prefer_native_name = true;
        record.native_name = Some("sleep".to_string());

        let names = resolver(&rt, CapabilityTier::LegacyReflectionFallback);
        assert_eq!(names.qualified_method_name(&record).as_deref(), Some("sleep"));
        assert_eq!(names.file_name(&record), None);
        assert_eq!(names.frame_value(&record), None);
    }
}
