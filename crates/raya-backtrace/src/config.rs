//! Capture configuration

use crate::defaults::{DEFAULT_MAX_FRAMES, ENV_MAX_FRAMES, ENV_TIER};
use crate::walker::CapabilityTier;
use crate::{BacktraceError, BacktraceResult};

/// Options for a [`Backtracer`](crate::Backtracer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceOptions {
    /// Frame limit used by `capture()` and `capture_for_thread()`
    pub max_frames: usize,

    /// Force a capability tier instead of detecting the best one
    pub tier: Option<CapabilityTier>,
}

impl Default for BacktraceOptions {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            tier: None,
        }
    }
}

impl BacktraceOptions {
    /// Defaults overridden by `RAYA_BACKTRACE_TIER` and
    /// `RAYA_BACKTRACE_MAX_FRAMES`
    pub fn from_env() -> BacktraceResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed by environment
    /// variable name. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BacktraceResult<Self> {
        let mut options = Self::default();
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(tier) = get(ENV_TIER) {
            options.tier = Some(tier.parse()?);
        }

        if let Some(max_frames) = get(ENV_MAX_FRAMES) {
            options.max_frames = max_frames
                .trim()
                .parse()
                .map_err(|_| BacktraceError::InvalidOption {
                    name: ENV_MAX_FRAMES,
                    value: max_frames.clone(),
                })?;
        }

        Ok(options)
    }

    /// Set the frame limit
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Force a capability tier
    pub fn with_tier(mut self, tier: CapabilityTier) -> Self {
        self.tier = Some(tier);
        self
    }
}
