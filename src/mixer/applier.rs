// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Applies a layout solution to a composite buffer.
//!
//! Stateless: every call fetches the per-region input frames (honoring the
//! cross-channel sync window) and scales each into its destination
//! rectangle. Z-order is the entry order, later regions paint over earlier
//! ones.

use crate::frame::scale::{self, PixelRect};
use crate::frame::VideoFrame;
use crate::layout::{LayoutSolution, Region};

use super::InputRegistry;

/// Paint one fully composed picture into `buffer`.
///
/// The caller is expected to have filled the background already.
pub(crate) fn compose(
    registry: &InputRegistry,
    buffer: &mut VideoFrame,
    layout: &LayoutSolution,
    crop: bool,
) {
    // Sync to the latest frame every participating channel can serve:
    //   queue 1 [t0 t1 t2 t3]
    //   queue 2 [t1 t2 t3 t4]
    //   queue 3 [t2 t3 t4 t5]
    // common range is [t2 t3], sync target is t3.
    let mut min_sync_timestamp = -1i64;
    let mut max_sync_timestamp = -1i64;
    for entry in layout {
        let Some(channel) = registry.channel(entry.input) else {
            continue;
        };
        if !channel.is_sync_enabled() {
            continue;
        }
        let (Some(front), Some(back)) = (channel.front(), channel.back()) else {
            continue;
        };

        if min_sync_timestamp == -1 || min_sync_timestamp < front.sync_timestamp {
            min_sync_timestamp = front.sync_timestamp;
        }
        if max_sync_timestamp == -1 || max_sync_timestamp > back.sync_timestamp {
            max_sync_timestamp = back.sync_timestamp;
        }
    }
    debug!("sync window [{min_sync_timestamp}, {max_sync_timestamp}]");

    // max == -1: no channel contributed, plain freshest-frame mode.
    // min > max: the window is empty, hold every channel's front and wait.
    // otherwise: align everyone on max.
    for entry in layout {
        let input_frame = if max_sync_timestamp == -1 {
            registry.input_frame(entry.input)
        } else if min_sync_timestamp > max_sync_timestamp {
            registry.sync_input_frame(entry.input, -1)
        } else {
            registry.sync_input_frame(entry.input, max_sync_timestamp)
        };

        let Some(input_frame) = input_frame else {
            continue;
        };

        place_region(buffer, &input_frame, &entry.region, crop);
    }
}

/// Scale one input picture into its region of the composite.
fn place_region(buffer: &mut VideoFrame, input: &VideoFrame, region: &Region, crop: bool) {
    let comp_w = buffer.width();
    let comp_h = buffer.height();
    let rect = region.area.rect;

    if rect.left.denominator == 0
        || rect.top.denominator == 0
        || rect.width.denominator == 0
        || rect.height.denominator == 0
    {
        warn!("degenerate region rect, skipping");
        return;
    }

    let mut dst_x = rect.left.of(comp_w).min(comp_w);
    let mut dst_y = rect.top.of(comp_h).min(comp_h);
    let dst_w = rect.width.of(comp_w).min(comp_w - dst_x);
    let dst_h = rect.height.of(comp_h).min(comp_h - dst_y);

    let in_w = input.width();
    let in_h = input.height();
    if dst_w == 0 || dst_h == 0 || in_w == 0 || in_h == 0 {
        return;
    }

    let src_x;
    let src_y;
    let src_w;
    let src_h;
    let cropped_dst_w;
    let cropped_dst_h;
    if crop {
        // centered source crop matching the destination aspect
        src_w = in_w.min((u64::from(dst_w) * u64::from(in_h) / u64::from(dst_h)) as u32);
        src_h = in_h.min((u64::from(dst_h) * u64::from(in_w) / u64::from(dst_w)) as u32);
        src_x = (in_w - src_w) / 2;
        src_y = (in_h - src_h) / 2;

        cropped_dst_w = dst_w;
        cropped_dst_h = dst_h;
    } else {
        // full source, letterboxed into the destination
        src_x = 0;
        src_y = 0;
        src_w = in_w;
        src_h = in_h;

        cropped_dst_w = dst_w.min((u64::from(in_w) * u64::from(dst_h) / u64::from(in_h)) as u32);
        cropped_dst_h = dst_h.min((u64::from(in_h) * u64::from(dst_w) / u64::from(in_w)) as u32);
    }

    dst_x += (dst_w - cropped_dst_w) / 2;
    dst_y += (dst_h - cropped_dst_h) / 2;

    // round down to even, 4:2:0 chroma siting
    let src_rect = PixelRect::new(src_x & !1, src_y & !1, src_w & !1, src_h & !1);
    let dst_rect = PixelRect::new(dst_x & !1, dst_y & !1, cropped_dst_w & !1, cropped_dst_h & !1);

    if src_rect.width == 0 || src_rect.height == 0 || dst_rect.width == 0 || dst_rect.height == 0 {
        return;
    }

    if let Err(error) = scale::scale(input, src_rect, buffer, dst_rect) {
        error!("unable to scale region {src_rect} -> {dst_rect}: {error}");
    }
}
