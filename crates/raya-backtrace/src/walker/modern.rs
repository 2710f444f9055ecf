//! Modern introspection tier

use super::internal::{count_control_frames, fill_control_frames};
use super::{CapabilityTier, FrameWalker};
use crate::frame::{FrameRecord, FrameValue};
use crate::host::{ExecutionContext, HostRuntime, ObjRef};
use crate::BacktraceResult;

/// Walks internal control frames and asks the host's own reflection
/// primitive to name method entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernIntrospection;

impl FrameWalker for ModernIntrospection {
    fn tier(&self) -> CapabilityTier {
        CapabilityTier::ModernIntrospection
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
        _top_self: ObjRef,
    ) -> Option<String> {
        host.profile_frame_qualified_method_name(&FrameValue::MethodEntry(cme))
    }
}
