//! Raya Backtrace Engine
//!
//! This crate captures structured snapshots of a running interpreter's call
//! stack without going through the runtime's public reflection facilities:
//! - Stack walker over the runtime's internal control-frame chain
//! - Frame classifier (bytecode vs native frames, line numbers)
//! - Name resolver (qualified method names, refinements, singleton methods)
//! - GC integration (mark, movable mark, post-compaction location updates)
//!
//! All host internals are reached through the [`HostRuntime`] adapter. The
//! [`sim`] module provides a reference runtime implementing it.
//!
//! # Example
//!
//! ```rust,ignore
//! use raya_backtrace::{Backtracer, BacktraceOptions};
//! use raya_backtrace::sim::{SimRuntime, HostVersion};
//!
//! let rt = SimRuntime::new(HostVersion::Modern);
//! let tracer = Backtracer::new(&rt, BacktraceOptions::default())?;
//!
//! let bt = tracer.capture()?;
//! for ix in 0..bt.frame_count() {
//!     println!("{:?} {:?}", tracer.frame_method_name(&bt, ix), bt.frame_line_number(ix));
//! }
//! bt.free();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backtrace;
pub mod classify;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod frame;
pub mod gc;
pub mod host;
pub mod resolve;
pub mod sim;
pub mod walker;

pub use backtrace::Backtrace;
pub use config::BacktraceOptions;
pub use engine::Backtracer;
pub use frame::{FrameRecord, FrameValue};
pub use gc::GcMarker;
pub use host::{
    ControlFrame, ExecutionContext, FrameMagic, HostCapabilities, HostRuntime, IseqKind,
    MethodEntry, MethodKind, ObjRef, ThreadRef,
};
pub use resolve::NameResolver;
pub use walker::{CapabilityTier, FrameWalker};

/// Backtrace engine errors
#[derive(Debug, thiserror::Error)]
pub enum BacktraceError {
    /// The engine's view of the host layout diverged from the real one
    #[error("Internal error: {0}")]
    Internal(String),

    /// The host exposes no capability set the engine can walk with
    #[error("Host runtime exposes no supported capability tier")]
    UnsupportedHost,

    /// A forced tier needs capabilities the host does not have
    #[error("Capability tier {0} is not supported by this host runtime")]
    UnsupportedTier(CapabilityTier),

    /// Invalid configuration value
    #[error("Invalid value for {name}: {value:?}")]
    InvalidOption {
        /// Option (environment variable) name
        name: &'static str,
        /// Rejected value
        value: String,
    },
}

/// Backtrace engine result
pub type BacktraceResult<T> = Result<T, BacktraceError>;
