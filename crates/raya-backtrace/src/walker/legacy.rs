//! Legacy reflection fallback tier
//!
//! Built on the host's public backtrace location objects. Each location's
//! payload is read directly, which gives the bytecode unit and line of
//! interpreted frames and the bare method name of native frames. Receivers
//! and method entries are not reachable this way.

use super::{CapabilityTier, FrameWalker};
use crate::frame::{FrameRecord, METHOD_KIND_UNKNOWN};
use crate::host::{ExecutionContext, HostRuntime, LazyLine, LocationPayload, ObjRef};
use crate::{BacktraceError, BacktraceResult};
use tracing::error;

/// Walk over public location objects
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyReflectionFallback;

impl LegacyReflectionFallback {
    fn locations(host: &dyn HostRuntime, ec: ExecutionContext) -> Vec<ObjRef> {
        host.backtrace_locations(ec).unwrap_or_default()
    }

    fn record_for(host: &dyn HostRuntime, location: ObjRef) -> BacktraceResult<FrameRecord> {
        let mut payload = Self::payload(host, location)?;

        // Line numbers are computed lazily by the public API; query it once
        // so the payload holds the calculated value.
        if let LocationPayload::Iseq { line: LazyLine::Pending, .. } = payload {
            host.location_lineno(location);
            payload = Self::payload(host, location)?;

            if let LocationPayload::Iseq { line: LazyLine::Pending, .. } = payload {
                error!(%location, "lineno query left the location uncalculated");
                return Err(BacktraceError::Internal(
                    "querying lineno did not turn the location into a calculated one".to_string(),
                ));
            }
        }

        let mut record = FrameRecord::blank(ObjRef::NIL);
        record.method_kind_tag = METHOD_KIND_UNKNOWN;

        match payload {
            LocationPayload::Iseq { iseq, line } => {
                record.is_interpreted = true;
                record.prefer_bytecode_unit = true;
                record.bytecode_unit = Some(iseq);
                record.line_number = match line {
                    LazyLine::Calculated(line) => line,
                    LazyLine::Pending => 0,
                };
            }
            LocationPayload::Cfunc { method_name } => {
                record.prefer_native_name = true;
                record.native_name = Some(method_name);
            }
        }

        Ok(record)
    }

    fn payload(host: &dyn HostRuntime, location: ObjRef) -> BacktraceResult<LocationPayload> {
        host.location_payload(location).ok_or_else(|| {
            error!(%location, "backtrace location has no readable payload");
            BacktraceError::Internal(format!("location {location} has no readable payload"))
        })
    }
}

impl FrameWalker for LegacyReflectionFallback {
    fn tier(&self) -> CapabilityTier {
        CapabilityTier::LegacyReflectionFallback
    }

    fn count_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
    ) -> BacktraceResult<usize> {
        Ok(Self::locations(host, ec).len().min(limit))
    }

    fn fill_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
        out: &mut Vec<FrameRecord>,
    ) -> BacktraceResult<()> {
        for location in Self::locations(host, ec).into_iter().take(limit) {
            out.push(Self::record_for(host, location)?);
        }
        Ok(())
    }

    fn qualified_method_entry_name(
        &self,
        _host: &dyn HostRuntime,
        _cme: ObjRef,
        _top_self: ObjRef,
    ) -> Option<String> {
        None
    }
}
