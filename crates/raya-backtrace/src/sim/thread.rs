//! Threads and control-frame chains of the reference runtime

use crate::host::{ControlFrame, FrameMagic, ObjRef, ThreadRef};

/// Dummy frames at the bottom of the main thread's chain
pub(crate) const MAIN_THREAD_DUMMIES: usize = 2;

/// Dummy frames at the bottom of a spawned thread's chain
pub(crate) const SPAWNED_THREAD_DUMMIES: usize = 1;

/// Thread liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Running or runnable
    Runnable,
    /// Kill requested; the thread is being torn down
    ToKill,
    /// Terminated
    Killed,
}

#[derive(Debug)]
pub(crate) struct SimThread {
    pub id: ThreadRef,
    pub status: ThreadStatus,
    /// Control frames, outermost (bottom dummy) first
    pub frames: Vec<ControlFrame>,
}

impl SimThread {
    pub fn new(id: ThreadRef, top_self: ObjRef, dummies: usize) -> Self {
        let dummy = ControlFrame {
            magic: FrameMagic::Dummy,
            receiver: top_self,
            iseq: None,
            pc: None,
            me_cref: None,
        };
        Self {
            id,
            status: ThreadStatus::Runnable,
            frames: vec![dummy; dummies],
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == ThreadStatus::Runnable
    }

    /// Frame at `depth`, 0 being the innermost
    pub fn frame_at_depth(&self, depth: usize) -> Option<&ControlFrame> {
        let ix = self.frames.len().checked_sub(depth + 1)?;
        self.frames.get(ix)
    }

    /// Frames innermost first, bottom dummy excluded
    pub fn frames_innermost_first(&self) -> impl Iterator<Item = &ControlFrame> {
        self.frames.iter().skip(1).rev()
    }

    /// Frames that sit above the dummy frames
    pub fn user_frame_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.magic != FrameMagic::Dummy)
            .count()
    }

    /// Every reference held by the chain
    pub fn frame_refs_mut(&mut self) -> impl Iterator<Item = &mut ObjRef> {
        self.frames.iter_mut().flat_map(|frame| {
            std::iter::once(&mut frame.receiver)
                .chain(frame.iseq.iter_mut())
                .chain(frame.me_cref.iter_mut())
        })
    }

    pub fn frame_refs(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.frames.iter().flat_map(|frame| {
            std::iter::once(frame.receiver)
                .chain(frame.iseq)
                .chain(frame.me_cref)
        })
    }
}
