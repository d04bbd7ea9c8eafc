// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

/*!
    # Purpose

    The *compositor* crate is the soft (CPU based) video compositor of a
    multipoint conferencing unit. It continuously ingests decoded planar YUV
    frames from many independent publishers, arranges them according to a
    declarative layout solution and emits a stream of composite frames at one
    or more configurable output frame rates.

    - [Compositor]
      is the façade owning a fixed vector of input channels, the avatar
      cache and two [FrameGenerator]s tuned for disjoint fps bands.
    - [FrameGenerator]
      ticks at its band's maximum fps and fans each composite out to every
      subscriber whose fps divides the tick counter (sub-harmonic fan-out
      over the dyadic chain `min_fps, 2*min_fps, ..., max_fps`).

    # Inputs

    Each publisher slot is a queue of recent frames with an inter-stream
    synchronization discipline: frames carry an opaque monotonic sync
    timestamp, and the layout applier aligns all sync-enabled channels on
    the latest timestamp every one of them can serve. A channel that falls
    too far behind is degraded to freshest-frame mode. Slots without a live
    publisher fall back to a still image from the avatar cache.

    # Outputs

    Consumers implement [FrameSink] and are registered per
    `(width, height, fps)`. Delivery is synchronous from the generator's
    timer thread; frames are shared handles over pooled buffers that are
    recycled once every consumer lets go.

    # Frames

    [VideoFrame] carries planar YUV 4:2:0 pixels. [FramePool] bounds the
    backing memory of the hot loop: acquisition never blocks, and saturation
    drops frames rather than adding latency. The pixel primitives (rect
    fill, copy, box-filter scale) live in [frame::scale].

    # Overlays

    A [TextDrawer] hook runs over every finished composite before delivery;
    the glyph rendering itself is provided externally.
*/

#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod frame;
pub mod layout;
mod mixer;
pub mod overlays;

#[cfg(test)]
mod tests;

pub use frame::*;
pub use layout::*;
pub use mixer::*;
pub use overlays::*;
