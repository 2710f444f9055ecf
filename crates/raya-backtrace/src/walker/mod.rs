//! Stack walker and capability tiers
//!
//! The walker fills a backtrace from one thread's frame chain. How much it
//! can see depends on what the host exposes, so the walk is implemented by
//! one of three interchangeable strategies, picked once per
//! [`Backtracer`](crate::Backtracer):
//!
//! | Tier | Frame source | Native names |
//! |------|--------------|--------------|
//! | `ModernIntrospection` | internal control frames | host reflection primitive |
//! | `NativeFrameBackport` | internal control frames | composed by the engine |
//! | `LegacyReflectionFallback` | public location objects | bare method name |
//!
//! The legacy tier never sees receivers or method entries; records it
//! produces carry strictly less information.

mod backport;
mod internal;
mod legacy;
mod modern;

pub use backport::NativeFrameBackport;
pub use legacy::LegacyReflectionFallback;
pub use modern::ModernIntrospection;

use crate::frame::FrameRecord;
use crate::host::{ExecutionContext, HostCapabilities, HostRuntime, ObjRef};
use crate::{BacktraceError, BacktraceResult};
use std::fmt;
use std::str::FromStr;

/// Capability tier of host access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityTier {
    /// Internal frames plus the host's native-frame reflection
    ModernIntrospection,
    /// Internal frames; native frame names composed by the engine
    NativeFrameBackport,
    /// Public backtrace location objects only
    LegacyReflectionFallback,
}

impl CapabilityTier {
    /// All tiers, most capable first
    pub const ALL: [CapabilityTier; 3] = [
        CapabilityTier::ModernIntrospection,
        CapabilityTier::NativeFrameBackport,
        CapabilityTier::LegacyReflectionFallback,
    ];

    /// Most capable tier the host supports
    pub fn detect(caps: &HostCapabilities) -> Option<CapabilityTier> {
        Self::ALL.into_iter().find(|tier| tier.is_supported_by(caps))
    }

    /// Whether the host exposes what this tier needs
    pub fn is_supported_by(self, caps: &HostCapabilities) -> bool {
        match self {
            CapabilityTier::ModernIntrospection => {
                caps.internal_frames && caps.native_frame_reflection
            }
            CapabilityTier::NativeFrameBackport => caps.internal_frames,
            CapabilityTier::LegacyReflectionFallback => caps.public_locations,
        }
    }

    /// Walk strategy implementing this tier
    pub fn walker(self) -> &'static dyn FrameWalker {
        match self {
            CapabilityTier::ModernIntrospection => &ModernIntrospection,
            CapabilityTier::NativeFrameBackport => &NativeFrameBackport,
            CapabilityTier::LegacyReflectionFallback => &LegacyReflectionFallback,
        }
    }

    /// Stable name, as accepted by [`FromStr`]
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityTier::ModernIntrospection => "modern",
            CapabilityTier::NativeFrameBackport => "backport",
            CapabilityTier::LegacyReflectionFallback => "legacy",
        }
    }
}

impl fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityTier {
    type Err = BacktraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modern" => Ok(CapabilityTier::ModernIntrospection),
            "backport" => Ok(CapabilityTier::NativeFrameBackport),
            "legacy" => Ok(CapabilityTier::LegacyReflectionFallback),
            _ => Err(BacktraceError::InvalidOption {
                name: crate::defaults::ENV_TIER,
                value: s.to_string(),
            }),
        }
    }
}

/// Walk contract shared by all capability tiers
///
/// `count_frames` and `fill_frames` must apply identical selection logic:
/// the buffer is sized from the first and written by the second.
pub trait FrameWalker: Send + Sync {
    /// Tier this strategy implements
    fn tier(&self) -> CapabilityTier;

    /// First pass: number of records a fill with the same `limit` produces
    fn count_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
    ) -> BacktraceResult<usize>;

    /// Second pass: append at most `limit` records, innermost first
    fn fill_frames(
        &self,
        host: &dyn HostRuntime,
        ec: ExecutionContext,
        limit: usize,
        out: &mut Vec<FrameRecord>,
    ) -> BacktraceResult<()>;

    /// Qualified name (`Owner#name` / `Owner.name`) for a method entry
    fn qualified_method_entry_name(
        &self,
        host: &dyn HostRuntime,
        cme: ObjRef,
        top_self: ObjRef,
    ) -> Option<String>;
}
