//! Capture buffer
//!
//! A [`Backtrace`] owns the frame records of one capture. It is allocated to
//! the exact frame count found by a first walk, filled by a second walk, and
//! never resized afterwards: the collector accounts for its size through
//! [`Backtrace::memory_size`], and the held references are rewritten in
//! place by the collector integration in [`crate::gc`].
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Backtrace header                    │
//! │   capacity, tier                    │
//! ├─────────────────────────────────────┤
//! │ FrameRecord 0 (innermost)           │
//! │ FrameRecord 1                       │
//! │ ...                                 │
//! │ FrameRecord count-1 (outermost)     │
//! │ (unused slots up to capacity)       │
//! └─────────────────────────────────────┘
//! ```

use crate::frame::FrameRecord;
use crate::walker::CapabilityTier;
use tracing::trace;

/// Captured stack of one thread, innermost frame first
#[derive(Debug)]
pub struct Backtrace {
    /// Frames allocated
    capacity: usize,

    /// Tier that produced the records
    tier: CapabilityTier,

    /// Filled records (`len() <= capacity`)
    frames: Vec<FrameRecord>,
}

impl Backtrace {
    /// Allocate an empty buffer for exactly `capacity` records
    pub(crate) fn with_capacity(capacity: usize, tier: CapabilityTier) -> Self {
        Self {
            capacity,
            tier,
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Empty buffer, returned for threads that are not live
    pub(crate) fn empty(tier: CapabilityTier) -> Self {
        Self::with_capacity(0, tier)
    }

    /// Record storage for the fill pass
    pub(crate) fn frames_mut(&mut self) -> &mut Vec<FrameRecord> {
        &mut self.frames
    }

    /// Number of records allocated
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records filled
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Check if no frames were captured
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Tier that produced the records
    #[inline]
    pub fn tier(&self) -> CapabilityTier {
        self.tier
    }

    /// Bytes to report to the collector's heap accounting
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.capacity * std::mem::size_of::<FrameRecord>()
    }

    /// All records, innermost first
    #[inline]
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    /// Record at `ix`
    ///
    /// # Panics
    ///
    /// `ix` must be below [`frame_count`](Self::frame_count); anything else is
    /// a caller bug.
    #[inline]
    pub fn frame(&self, ix: usize) -> &FrameRecord {
        &self.frames[ix]
    }

    /// Source line of the frame at `ix`; `None` for native frames
    #[inline]
    pub fn frame_line_number(&self, ix: usize) -> Option<u32> {
        self.frames[ix].line()
    }

    /// Release the buffer. Equivalent to dropping it.
    pub fn free(self) {
        trace!(frames = self.frames.len(), bytes = self.memory_size(), "freeing backtrace");
    }
}
