//! Capture engine
//!
//! [`Backtracer`] binds a host runtime to the capability tier selected for
//! it and exposes the capture and query operations. Captures use a two-pass
//! walk: the first pass counts frames, the buffer is allocated to exactly
//! that size, and the second pass fills it.

use crate::backtrace::Backtrace;
use crate::config::BacktraceOptions;
use crate::frame::FrameValue;
use crate::gc::GcMarker;
use crate::host::{ExecutionContext, HostRuntime, ObjRef, ThreadRef};
use crate::resolve::NameResolver;
use crate::walker::{CapabilityTier, FrameWalker};
use crate::{BacktraceError, BacktraceResult};
use once_cell::sync::OnceCell;
use tracing::{debug, instrument, trace, warn};

/// Stack capture engine for one host runtime
pub struct Backtracer<'h> {
    host: &'h dyn HostRuntime,
    options: BacktraceOptions,
    walker: &'static dyn FrameWalker,
    movable_marking: bool,
    top_self: OnceCell<ObjRef>,
}

impl<'h> Backtracer<'h> {
    /// Create an engine for `host`, detecting the most capable tier unless
    /// `options` forces one
    pub fn new(host: &'h dyn HostRuntime, options: BacktraceOptions) -> BacktraceResult<Self> {
        let caps = host.capabilities();

        let tier = match options.tier {
            Some(tier) if tier.is_supported_by(&caps) => tier,
            Some(tier) => return Err(BacktraceError::UnsupportedTier(tier)),
            None => CapabilityTier::detect(&caps).ok_or(BacktraceError::UnsupportedHost)?,
        };

        // Moving a reference is only safe when the new location can be read back
        let movable_marking = caps.movable_marking && caps.location_update;

        debug!(
            %tier,
            forced = options.tier.is_some(),
            max_frames = options.max_frames,
            movable_marking,
            "selected capability tier"
        );

        Ok(Self {
            host,
            options,
            walker: tier.walker(),
            movable_marking,
            top_self: OnceCell::new(),
        })
    }

    /// Capability tier in use
    #[inline]
    pub fn tier(&self) -> CapabilityTier {
        self.walker.tier()
    }

    /// Options this engine was created with
    #[inline]
    pub fn options(&self) -> &BacktraceOptions {
        &self.options
    }

    /// Whether the host's collector may move objects a backtrace holds
    ///
    /// When `false`, owners must mark with [`Backtrace::gc_mark`] and never
    /// call [`Backtrace::gc_update_locations`].
    #[inline]
    pub fn supports_movable_marking(&self) -> bool {
        self.movable_marking
    }

    /// Mark `bt` the way the host's collector supports
    ///
    /// Movable marking when available, pinning otherwise. Returns whether
    /// references were marked movable; if so the owner must follow the
    /// compaction with [`Backtrace::gc_update_locations`].
    pub fn gc_mark(&self, bt: &Backtrace, marker: &mut dyn GcMarker) -> bool {
        if self.movable_marking {
            bt.gc_mark_movable(marker);
        } else {
            bt.gc_mark(marker);
        }
        self.movable_marking
    }

    /// The host's top-level `self`, read once on first use
    pub fn top_self(&self) -> ObjRef {
        *self.top_self.get_or_init(|| self.host.top_self())
    }

    /// Capture the calling thread's stack, up to `options.max_frames`
    pub fn capture(&self) -> BacktraceResult<Backtrace> {
        self.capture_with_limit(self.options.max_frames)
    }

    /// Capture the calling thread's stack, up to `limit` frames
    #[instrument(name = "backtrace::capture", level = "trace", skip(self))]
    pub fn capture_with_limit(&self, limit: usize) -> BacktraceResult<Backtrace> {
        let ec = self.host.current_execution_context();
        self.capture_context(ec, limit)
    }

    /// Capture another thread's stack, up to `options.max_frames`
    pub fn capture_for_thread(&self, thread: ThreadRef) -> BacktraceResult<Backtrace> {
        self.capture_for_thread_with_limit(thread, self.options.max_frames)
    }

    /// Capture another thread's stack, up to `limit` frames
    ///
    /// A thread that is not live gives an empty backtrace.
    #[instrument(name = "backtrace::capture_for_thread", level = "trace", skip(self))]
    pub fn capture_for_thread_with_limit(
        &self,
        thread: ThreadRef,
        limit: usize,
    ) -> BacktraceResult<Backtrace> {
        match self.host.thread_execution_context(thread) {
            Some(ec) => self.capture_context(ec, limit),
            None => {
                debug!(thread = thread.as_u64(), "thread is not live, returning empty backtrace");
                Ok(Backtrace::empty(self.tier()))
            }
        }
    }

    fn capture_context(&self, ec: ExecutionContext, limit: usize) -> BacktraceResult<Backtrace> {
        let count = self.walker.count_frames(self.host, ec, limit)?;

        let mut bt = Backtrace::with_capacity(count, self.tier());
        self.walker.fill_frames(self.host, ec, count, bt.frames_mut())?;

        if bt.frame_count() < count {
            warn!(
                counted = count,
                filled = bt.frame_count(),
                "stack changed between count and fill passes"
            );
        }
        trace!(frames = bt.frame_count(), bytes = bt.memory_size(), "captured backtrace");

        Ok(bt)
    }

    /// Name resolver bound to this engine's host and tier
    pub fn resolver(&self) -> NameResolver<'h> {
        NameResolver::new(self.host, self.walker, self.top_self())
    }

    /// Reflective view of frame `ix`
    ///
    /// # Panics
    ///
    /// If `ix >= bt.frame_count()`.
    pub fn frame_value(&self, bt: &Backtrace, ix: usize) -> Option<FrameValue> {
        bt.frame(ix).frame_value()
    }

    /// Qualified method name of frame `ix`
    ///
    /// # Panics
    ///
    /// If `ix >= bt.frame_count()`.
    pub fn frame_method_name(&self, bt: &Backtrace, ix: usize) -> Option<String> {
        self.resolver().qualified_method_name(bt.frame(ix))
    }

    /// Source path of frame `ix`; `None` for native frames
    ///
    /// # Panics
    ///
    /// If `ix >= bt.frame_count()`.
    pub fn frame_file_name(&self, bt: &Backtrace, ix: usize) -> Option<String> {
        self.resolver().file_name(bt.frame(ix))
    }
}

impl std::fmt::Debug for Backtracer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtracer")
            .field("tier", &self.tier())
            .field("movable_marking", &self.movable_marking)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FrameSpec, HostVersion, IseqSpec, MethodBody, SimRuntime};

    fn nested_calls(rt: &SimRuntime, depth: u32) {
        let foo = rt.define_class("Foo", None).unwrap();
        let obj = rt.new_object(foo).unwrap();
        for i in 0..depth {
            let name = format!("m{i}");
            let iseq = rt
                .new_iseq(IseqSpec::method(&name, "foo.raya", &[10 * i + 1, 10 * i + 2]))
                .unwrap();
            let cme = rt.define_method(foo, &name, MethodBody::Iseq(iseq)).unwrap();
            rt.push_frame(rt.main_thread(), FrameSpec::method(obj, cme, 10 * i + 2))
                .unwrap();
        }
    }

    #[test]
    fn test_detects_tier_per_host_version() {
        for (version, tier) in [
            (HostVersion::Modern, CapabilityTier::ModernIntrospection),
            (HostVersion::Backport, CapabilityTier::NativeFrameBackport),
            (HostVersion::Legacy, CapabilityTier::LegacyReflectionFallback),
        ] {
            let rt = SimRuntime::new(version);
            let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
            assert_eq!(tracer.tier(), tier);
        }
    }

    #[test]
    fn test_forced_tier_must_be_supported() {
        let rt = SimRuntime::new(HostVersion::Backport);
        let err = Backtracer::new(
            &rt,
            BacktraceOptions::default().with_tier(CapabilityTier::ModernIntrospection),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BacktraceError::UnsupportedTier(CapabilityTier::ModernIntrospection)
        ));

        let tracer = Backtracer::new(
            &rt,
            BacktraceOptions::default().with_tier(CapabilityTier::LegacyReflectionFallback),
        )
        .unwrap();
        assert_eq!(tracer.tier(), CapabilityTier::LegacyReflectionFallback);
    }

    #[test]
    fn test_capacity_matches_count() {
        let rt = SimRuntime::new(HostVersion::Modern);
        nested_calls(&rt, 5);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();

        let bt = tracer.capture().unwrap();
        assert_eq!(bt.frame_count(), 5);
        assert_eq!(bt.capacity(), 5);
        assert_eq!(tracer.frame_method_name(&bt, 0).as_deref(), Some("Foo#m4"));
        assert_eq!(bt.frame_line_number(0), Some(42));
    }

    #[test]
    fn test_limit_drops_outermost() {
        let rt = SimRuntime::new(HostVersion::Modern);
        nested_calls(&rt, 5);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default().with_max_frames(2)).unwrap();

        let bt = tracer.capture().unwrap();
        assert_eq!(bt.frame_count(), 2);
        assert_eq!(tracer.frame_method_name(&bt, 0).as_deref(), Some("Foo#m4"));
        assert_eq!(tracer.frame_method_name(&bt, 1).as_deref(), Some("Foo#m3"));

        assert_eq!(tracer.capture_with_limit(0).unwrap().frame_count(), 0);
    }

    #[test]
    fn test_top_self_read_once() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
        assert_eq!(tracer.top_self(), rt.top_self());
        assert_eq!(tracer.top_self(), tracer.top_self());
    }

    #[test]
    fn test_movable_marking_follows_capabilities() {
        for (version, movable) in [
            (HostVersion::Modern, true),
            (HostVersion::Backport, true),
            (HostVersion::Legacy, false),
        ] {
            let rt = SimRuntime::new(version);
            let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();
            assert_eq!(tracer.supports_movable_marking(), movable, "{version:?}");
        }
    }

    #[test]
    fn test_unknown_thread_gives_empty_backtrace() {
        let rt = SimRuntime::new(HostVersion::Modern);
        let tracer = Backtracer::new(&rt, BacktraceOptions::default()).unwrap();

        let bt = tracer.capture_for_thread(ThreadRef::from_u64(9999)).unwrap();
        assert_eq!(bt.frame_count(), 0);
        assert_eq!(bt.capacity(), 0);
    }
}
