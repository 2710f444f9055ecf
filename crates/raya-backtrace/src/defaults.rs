//! Default constants for capture configuration.

/// Default maximum number of frames captured per backtrace.
///
/// Deeper stacks are truncated from the bottom (outermost frames dropped).
pub const DEFAULT_MAX_FRAMES: usize = 2000;

/// Number of dummy frames the walker skips explicitly at the bottom of every
/// control-frame chain. A second dummy frame, when present, carries neither a
/// bytecode unit nor a native method entry and is dropped by classification.
pub const BOTTOM_DUMMY_FRAMES: usize = 1;

/// Environment variable forcing a capability tier.
pub const ENV_TIER: &str = "RAYA_BACKTRACE_TIER";

/// Environment variable overriding [`DEFAULT_MAX_FRAMES`].
pub const ENV_MAX_FRAMES: &str = "RAYA_BACKTRACE_MAX_FRAMES";
