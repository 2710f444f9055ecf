//! Integration tests for capability tier selection and per-tier fidelity
//!
//! Tests cover:
//! - Tier detection per host version and forced tiers
//! - Options read from environment-style lookups
//! - Name differences between the modern and backport tiers
//! - Reduced fidelity of the legacy reflection fallback
//! - Internal error on an uncalculated location line

use raya_backtrace::frame::METHOD_KIND_UNKNOWN;
use raya_backtrace::sim::{FrameSpec, HostVersion, IseqSpec, MethodBody, SimRuntime};
use raya_backtrace::{
    Backtrace, BacktraceError, BacktraceOptions, Backtracer, CapabilityTier, HostRuntime, ObjRef,
};

// ===== Helpers =====

/// `<main>` -> `Job#run` -> `Kernel#sleep`
fn build_stack(rt: &SimRuntime) {
    let main = rt.main_thread();
    let top = rt.new_iseq(IseqSpec::top("main.raya", &[1, 2, 3])).unwrap();
    rt.push_frame(main, FrameSpec::top(top, 3)).unwrap();

    let job = rt.define_class("Job", None).unwrap();
    let obj = rt.new_object(job).unwrap();
    let run = rt.new_iseq(IseqSpec::method("run", "job.raya", &[7, 8, 9])).unwrap();
    let run = rt.define_method(job, "run", MethodBody::Iseq(run)).unwrap();
    rt.push_frame(main, FrameSpec::method(obj, run, 8)).unwrap();

    let kernel = rt.define_module("Kernel").unwrap();
    let sleep = rt.define_method(kernel, "sleep", MethodBody::Native).unwrap();
    rt.push_frame(main, FrameSpec::method(obj, sleep, 0)).unwrap();
}

fn names(tracer: &Backtracer<'_>, bt: &Backtrace) -> Vec<Option<String>> {
    (0..bt.frame_count())
        .map(|ix| tracer.frame_method_name(bt, ix))
        .collect()
}

fn lines(bt: &Backtrace) -> Vec<Option<u32>> {
    (0..bt.frame_count()).map(|ix| bt.frame_line_number(ix)).collect()
}

fn forced(rt: &SimRuntime, tier: CapabilityTier) -> Result<Backtracer<'_>, BacktraceError> {
    Backtracer::new(rt, BacktraceOptions::default().with_tier(tier))
}

// ===== Selection =====

#[test]
fn test_most_capable_tier_detected() {
    let expected = [
        (HostVersion::Modern, CapabilityTier::ModernIntrospection),
        (HostVersion::Backport, CapabilityTier::NativeFrameBackport),
        (HostVersion::Legacy, CapabilityTier::LegacyReflectionFallback),
    ];
    for (version, tier) in expected {
        let rt = SimRuntime::new(version);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
        assert_eq!(tracer.tier(), tier);

        build_stack(&rt);
        assert_eq!(tracer.capture().unwrap().tier(), tier);
    }
}

#[test]
fn test_forced_tiers() {
    let rt = SimRuntime::new(HostVersion::Modern);
    for tier in CapabilityTier::ALL {
        assert_eq!(forced(&rt, tier).unwrap().tier(), tier);
    }

    let legacy = SimRuntime::new(HostVersion::Legacy);
    for tier in [
        CapabilityTier::ModernIntrospection,
        CapabilityTier::NativeFrameBackport,
    ] {
        assert!(matches!(
            forced(&legacy, tier),
            Err(BacktraceError::UnsupportedTier(t)) if t == tier
        ));
    }
}

#[test]
fn test_options_from_lookup() {
    let options = BacktraceOptions::from_lookup(|name| match name {
        "RAYA_BACKTRACE_TIER" => Some("legacy".to_string()),
        "RAYA_BACKTRACE_MAX_FRAMES" => Some("2".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(options.tier, Some(CapabilityTier::LegacyReflectionFallback));
    assert_eq!(options.max_frames, 2);

    let rt = SimRuntime::new(HostVersion::Modern);
    build_stack(&rt);
    let tracer = Backtracer::new(&rt, options).unwrap();
    let bt = tracer.capture().unwrap();
    assert_eq!(bt.frame_count(), 2);
    assert_eq!(names(&tracer, &bt), vec![Some("sleep".to_string()), Some("run".to_string())]);

    let err = BacktraceOptions::from_lookup(|name| {
        (name == "RAYA_BACKTRACE_TIER").then(|| "quantum".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, BacktraceError::InvalidOption { .. }));
}

// ===== Naming across tiers =====

#[test]
fn test_modern_and_backport_agree_on_names() {
    let expected = vec![
        Some("Kernel#sleep".to_string()),
        Some("Job#run".to_string()),
        Some("<main>".to_string()),
    ];
    for version in [HostVersion::Modern, HostVersion::Backport] {
        let rt = SimRuntime::new(version);
        build_stack(&rt);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
        let bt = tracer.capture().unwrap();
        assert_eq!(names(&tracer, &bt), expected, "{version:?}");
        assert_eq!(lines(&bt), vec![None, Some(8), Some(3)], "{version:?}");
    }
}

#[test]
fn test_top_self_singleton_naming_per_tier() {
    let rt = SimRuntime::new(HostVersion::Modern);
    let main = rt.top_self();
    let own = rt.singleton_class(main).unwrap();
    let helper = rt.define_method(own, "helper", MethodBody::Native).unwrap();
    rt.push_frame(rt.main_thread(), FrameSpec::method(main, helper, 0)).unwrap();

    let modern = forced(&rt, CapabilityTier::ModernIntrospection).unwrap();
    let bt = modern.capture().unwrap();
    let name = modern.frame_method_name(&bt, 0).unwrap();
    assert!(name.ends_with(".helper"), "{name}");
    assert_ne!(name, "Object$<main>.helper");

    let backport = forced(&rt, CapabilityTier::NativeFrameBackport).unwrap();
    let bt = backport.capture().unwrap();
    assert_eq!(
        backport.frame_method_name(&bt, 0).as_deref(),
        Some("Object$<main>.helper")
    );

    let legacy = forced(&rt, CapabilityTier::LegacyReflectionFallback).unwrap();
    let bt = legacy.capture().unwrap();
    assert_eq!(legacy.frame_method_name(&bt, 0).as_deref(), Some("helper"));
}

// ===== Legacy fallback =====

#[test]
fn test_legacy_reduced_fidelity() {
    let rt = SimRuntime::new(HostVersion::Legacy);
    build_stack(&rt);
    let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
    let bt = tracer.capture().unwrap();

    assert_eq!(bt.frame_count(), 3);
    for record in bt.frames() {
        assert_eq!(record.receiver, ObjRef::NIL);
        assert_eq!(record.method_entry, None);
        assert_eq!(record.method_kind_tag, METHOD_KIND_UNKNOWN);
        assert_eq!(record.method_kind(), None);
    }

    let native = bt.frame(0);
    assert!(!native.is_interpreted);
    assert!(native.prefer_native_name);
    assert_eq!(native.native_name.as_deref(), Some("sleep"));
    assert_eq!(tracer.frame_value(&bt, 0), None);

    assert_eq!(
        names(&tracer, &bt),
        vec![
            Some("sleep".to_string()),
            Some("run".to_string()),
            Some("<main>".to_string()),
        ]
    );
    assert_eq!(lines(&bt), vec![None, Some(8), Some(3)]);
    assert_eq!(tracer.frame_file_name(&bt, 1).as_deref(), Some("job.raya"));
    assert_eq!(tracer.frame_file_name(&bt, 2).as_deref(), Some("main.raya"));
}

#[test]
fn test_legacy_limit_applies() {
    let rt = SimRuntime::new(HostVersion::Legacy);
    build_stack(&rt);
    let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();

    let bt = tracer.capture_with_limit(1).unwrap();
    assert_eq!(bt.frame_count(), 1);
    assert_eq!(bt.capacity(), 1);
    assert_eq!(tracer.frame_method_name(&bt, 0).as_deref(), Some("sleep"));
}

#[test]
fn test_legacy_uncalculated_line_is_internal_error() {
    let rt = SimRuntime::new(HostVersion::Legacy);
    build_stack(&rt);
    let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
    assert!(tracer.capture().is_ok());

    rt.inject_stale_location_lines(true);
    let err = tracer.capture().unwrap_err();
    assert!(matches!(err, BacktraceError::Internal(_)), "{err}");

    rt.inject_stale_location_lines(false);
    assert_eq!(tracer.capture().unwrap().frame_count(), 3);
}

#[test]
fn test_legacy_dead_thread_is_empty() {
    let rt = SimRuntime::new(HostVersion::Legacy);
    let worker = rt.spawn_thread();
    let job = rt.new_iseq(IseqSpec::top("worker.raya", &[1])).unwrap();
    rt.push_frame(worker, FrameSpec::top(job, 1)).unwrap();

    let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
    assert_eq!(tracer.capture_for_thread(worker).unwrap().frame_count(), 1);

    rt.kill_thread(worker).unwrap();
    assert!(tracer.capture_for_thread(worker).unwrap().is_empty());
    assert_eq!(rt.top_self(), tracer.top_self());
}
