//! Native-frame backport tier
//!
//! For hosts whose control frames are readable but whose reflection
//! primitive does not yet understand native method frames. The walk is the
//! same as the modern tier; names are composed from the raw method entry.

use super::internal::{count_control_frames, fill_control_frames};
use super::{CapabilityTier, FrameWalker};
use crate::frame::FrameRecord;
use crate::host::{ExecutionContext, HostRuntime, ObjRef};
use crate::resolve;
use crate::BacktraceResult;

/// Internal walk with engine-side method naming
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFrameBackport;

impl FrameWalker for NativeFrameBackport {
    fn tier(&self) -> CapabilityTier {
        CapabilityTier::NativeFrameBackport
    }

    fn count_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
    ) -> BacktraceResult<usize> {
        Ok(count_control_frames(host, ec, limit))
    }

    fn fill_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
        out: &mut Vec<FrameRecord>,
    ) -> BacktraceResult<()> {
        fill_control_frames(host, ec, limit, out);
        Ok(())
    }

    fn qualified_method_entry_name(
        &self,
        host: &dyn HostRuntime,
        cme: ObjRef,
        top_self: ObjRef,
    ) -> Option<String> {
        resolve::compose_method_entry_name(host, cme, top_self)
    }
}
