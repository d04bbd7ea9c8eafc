// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Planar YUV 4:2:0 frames, the bounded buffer pool and shared frame handles.
//!
//! The compositing hot loop never allocates beyond pool acquisition: a
//! [`FramePool`] recycles [`VideoFrame`] backing stores, hands each one out
//! as an exclusively owned, writable [`PooledFrame`] and reclaims the planes
//! once the last [`FrameHandle`] clone is dropped. Callers that hit a
//! saturated pool must drop the frame; the pool never blocks.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::layout::Size;

pub mod scale;

/// 8 bit YCbCr fill color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YuvColor {
    pub y: u8,
    pub cb: u8,
    pub cr: u8,
}

impl YuvColor {
    /// Video range black.
    pub const BLACK: Self = Self {
        y: 16,
        cb: 128,
        cr: 128,
    };
}

/// Raw frame formats accepted on the media interfaces.
///
/// Only planar YUV 4:2:0 is handled; the decoding upstream guarantees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    I420,
}

/// Borrowed planar view over decoder owned storage.
///
/// `y`, `u` and `v` must each cover `stride * rows` bytes for their plane;
/// U and V are half-width and half-height.
#[derive(Clone, Copy)]
pub struct PlanarView<'a> {
    pub size: Size,
    pub stride_y: usize,
    pub stride_u: usize,
    pub stride_v: usize,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
}

impl std::fmt::Debug for PlanarView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanarView")
            .field("size", &self.size)
            .field("stride_y", &self.stride_y)
            .finish_non_exhaustive()
    }
}

/// Frame pushed by an upstream publisher.
#[derive(Debug)]
pub struct SourceFrame<'a> {
    pub format: FrameFormat,
    pub picture: PlanarView<'a>,
    /// 32 bit 90 kHz display timestamp.
    pub timestamp: u32,
    /// Whether this frame takes part in cross-channel alignment.
    pub sync_enabled: bool,
    /// Opaque monotonic sequence shared by publishers of one conference.
    pub sync_timestamp: i64,
}

/// Owned planar YUV 4:2:0 image.
///
/// Y is `stride_y * height` bytes, U and V are `stride * height / 2` bytes
/// at half the luma stride. Width and height are always even.
#[derive(Default)]
pub struct VideoFrame {
    size: Size,
    stride_y: usize,
    stride_u: usize,
    stride_v: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("size", &self.size)
            .field("stride_y", &self.stride_y)
            .finish_non_exhaustive()
    }
}

impl VideoFrame {
    /// Allocate a black frame of the given size.
    #[must_use]
    pub fn new(size: Size) -> Self {
        let mut frame = Self::default();
        frame.reset(size);
        frame
    }

    /// Build a frame from contiguous planes with strides `w`, `w/2`, `w/2`.
    ///
    /// Used for avatar stills decoded from raw files.
    #[must_use]
    pub fn from_planes(size: Size, y: Vec<u8>, u: Vec<u8>, v: Vec<u8>) -> Self {
        Self {
            size,
            stride_y: size.width as usize,
            stride_u: (size.width / 2) as usize,
            stride_v: (size.width / 2) as usize,
            y,
            u,
            v,
        }
    }

    /// Re-shape the backing store for the given size, reusing allocations.
    fn reset(&mut self, size: Size) {
        let stride_y = size.width as usize;
        let stride_c = (size.width / 2) as usize;
        let rows = size.height as usize;

        self.size = size;
        self.stride_y = stride_y;
        self.stride_u = stride_c;
        self.stride_v = stride_c;
        self.y.clear();
        self.y.resize(stride_y * rows, YuvColor::BLACK.y);
        self.u.clear();
        self.u.resize(stride_c * rows / 2, YuvColor::BLACK.cb);
        self.v.clear();
        self.v.resize(stride_c * rows / 2, YuvColor::BLACK.cr);
    }

    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    #[must_use]
    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    #[must_use]
    pub fn stride_u(&self) -> usize {
        self.stride_u
    }

    #[must_use]
    pub fn stride_v(&self) -> usize {
        self.stride_v
    }

    #[must_use]
    pub fn data_y(&self) -> &[u8] {
        &self.y
    }

    #[must_use]
    pub fn data_u(&self) -> &[u8] {
        &self.u
    }

    #[must_use]
    pub fn data_v(&self) -> &[u8] {
        &self.v
    }

    pub(crate) fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.y, &mut self.u, &mut self.v)
    }

    /// Borrow the frame as a planar view.
    #[must_use]
    pub fn view(&self) -> PlanarView<'_> {
        PlanarView {
            size: self.size,
            stride_y: self.stride_y,
            stride_u: self.stride_u,
            stride_v: self.stride_v,
            y: &self.y,
            u: &self.u,
            v: &self.v,
        }
    }
}

/// Shared read-only handle over a (possibly pooled) frame.
///
/// Cloning is cheap; the backing planes return to their pool once the last
/// clone is gone.
pub type FrameHandle = Arc<PooledFrame>;

/// A frame checked out of a [`FramePool`].
///
/// Exclusively owned and writable until frozen into a [`FrameHandle`] via
/// [`PooledFrame::freeze`]. On drop the planes go back to the owning pool's
/// free list; detached frames (avatars) simply free their memory.
#[derive(Debug)]
pub struct PooledFrame {
    frame: VideoFrame,
    pool: Weak<PoolShared>,
}

impl PooledFrame {
    /// Wrap a frame that is not backed by any pool.
    #[must_use]
    pub fn detached(frame: VideoFrame) -> Self {
        Self {
            frame,
            pool: Weak::new(),
        }
    }

    /// Give up exclusive access and share the frame.
    #[must_use]
    pub fn freeze(self) -> FrameHandle {
        Arc::new(self)
    }
}

impl std::ops::Deref for PooledFrame {
    type Target = VideoFrame;

    fn deref(&self) -> &VideoFrame {
        &self.frame
    }
}

impl std::ops::DerefMut for PooledFrame {
    fn deref_mut(&mut self) -> &mut VideoFrame {
        &mut self.frame
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.frame));
        }
    }
}

/// Bounded recycler of planar frame backing stores.
///
/// Never blocks: [`FramePool::acquire`] returns `None` once `capacity`
/// buffers are in flight. Freed buffers are re-shaped on demand, so one pool
/// can serve changing input resolutions.
#[derive(Debug)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

#[derive(Debug)]
struct PoolShared {
    capacity: usize,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<VideoFrame>,
    /// Total buffers built, in flight or free.
    allocated: usize,
}

impl FramePool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    /// Check a writable buffer of the given size out of the pool.
    ///
    /// Returns `None` when all buffers are in flight.
    #[must_use]
    pub fn acquire(&self, size: Size) -> Option<PooledFrame> {
        let mut state = self.shared.state.lock();

        let frame = if let Some(mut frame) = state.free.pop() {
            if frame.size() != size {
                frame.reset(size);
            }
            frame
        } else if state.allocated < self.shared.capacity {
            state.allocated += 1;
            VideoFrame::new(size)
        } else {
            return None;
        };

        Some(PooledFrame {
            frame,
            pool: Arc::downgrade(&self.shared),
        })
    }
}

impl PoolShared {
    fn release(&self, frame: VideoFrame) {
        self.state.lock().free.push(frame);
    }
}

/// Composite frame delivered to a registered output.
///
/// The buffer is shared; consumers that need it beyond the delivering tick
/// must copy. Consumers must not block the delivering thread.
#[derive(Clone, Debug)]
pub struct CompositeFrame {
    pub format: FrameFormat,
    pub buffer: FrameHandle,
    /// 90 kHz display timestamp derived from the wall clock.
    pub timestamp: u32,
    /// Wall clock milliseconds for the NTP field.
    pub ntp_time_ms: i64,
}

impl CompositeFrame {
    #[must_use]
    pub fn size(&self) -> Size {
        self.buffer.size()
    }
}
