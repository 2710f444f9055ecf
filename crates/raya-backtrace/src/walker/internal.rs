//! Control-frame chain traversal shared by the internal-access tiers

use crate::classify::{self, FrameClass};
use crate::defaults::BOTTOM_DUMMY_FRAMES;
use crate::frame::FrameRecord;
use crate::host::{ControlFrame, ExecutionContext, HostRuntime};

/// Visit classified frames from innermost outward, stopping after `limit`
/// captured frames or at the bottom dummy frame. Skipped frames do not count.
/// Returns the number of frames visited.
fn walk(
    host: &dyn HostRuntime,
    ec: ExecutionContext,
    limit: usize,
    mut visit: impl FnMut(&ControlFrame, FrameClass),
) -> usize {
    let end = host.control_frame_count(ec).saturating_sub(BOTTOM_DUMMY_FRAMES);
    let mut captured = 0;

    for depth in 0..end {
        if captured >= limit {
            break;
        }
        let Some(frame) = host.control_frame(ec, depth) else {
            break;
        };
        if let Some(class) = classify::classify(host, &frame) {
            visit(&frame, class);
            captured += 1;
        }
    }

    captured
}

pub(super) fn count_control_frames(
    host: &dyn HostRuntime,
    ec: ExecutionContext,
    limit: usize,
) -> usize {
    walk(host, ec, limit, |_, _| {})
}

pub(super) fn fill_control_frames(
    host: &dyn HostRuntime,
    ec: ExecutionContext,
    limit: usize,
    out: &mut Vec<FrameRecord>,
) {
    walk(host, ec, limit, |frame, class| {
        out.push(classify::record_for(host, frame, class));
    });
}
