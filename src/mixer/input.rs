// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-publisher frame queue with inter-stream synchronization discipline.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::frame::{scale, FrameHandle, FramePool, SourceFrame};

/// Queue depth per channel. A channel further behind than this has lost
/// sync and is degraded to freshest-frame mode.
const MAX_QUEUE_SIZE: usize = 5;

/// Frame held in a channel queue.
#[derive(Clone, Debug)]
pub(crate) struct QueuedFrame {
    pub(crate) buffer: FrameHandle,
    /// 90 kHz display timestamp of the original push.
    #[allow(dead_code)]
    pub(crate) timestamp: u32,
    pub(crate) sync_timestamp: i64,
}

#[derive(Debug)]
struct ChannelState {
    active: bool,
    /// Channel-level latch. Starts on, forced off when the queue overflows,
    /// never turned back on.
    sync_enabled: bool,
    /// Sync flag latched from the most recent pushed frame.
    frame_sync_enabled: bool,
    queue: VecDeque<QueuedFrame>,
}

/// FIFO of recent frames for one publisher slot.
///
/// Owns a private [`FramePool`] that decouples queued pictures from the
/// decoder owned storage handed in via [`InputChannel::push`].
#[derive(Debug)]
pub(crate) struct InputChannel {
    pool: FramePool,
    state: RwLock<ChannelState>,
}

impl InputChannel {
    pub(crate) fn new() -> Self {
        Self {
            pool: FramePool::new(MAX_QUEUE_SIZE),
            state: RwLock::new(ChannelState {
                active: false,
                sync_enabled: true,
                frame_sync_enabled: false,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Toggle activity. Going inactive empties the queue.
    pub(crate) fn set_active(&self, active: bool) {
        let mut state = self.state.write();
        state.active = active;
        if !active {
            state.queue.clear();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.read().active
    }

    /// Queue a copy of the given picture.
    ///
    /// Pushes into an inactive channel are ignored. The picture is copied
    /// into a pool buffer outside the channel lock, so concurrent peeks are
    /// not held up by the plane copy.
    pub(crate) fn push(&self, frame: &SourceFrame<'_>) {
        {
            let mut state = self.state.write();
            if !state.active {
                return;
            }

            if state.queue.len() == MAX_QUEUE_SIZE {
                // The input is too far behind to stay in sync, stop waiting
                // for it from now on.
                warn!("input frame queue is full ({MAX_QUEUE_SIZE}), disabling sync");
                state.queue.clear();
                state.sync_enabled = false;
            }
        }

        let Some(mut buffer) = self.pool.acquire(frame.picture.size) else {
            warn!("no free input buffer, dropping frame");
            return;
        };

        if let Err(error) = scale::copy(&frame.picture, &mut buffer) {
            error!("unable to copy input picture: {error}");
            return;
        }

        let mut state = self.state.write();
        if !state.active {
            return;
        }

        state.frame_sync_enabled = frame.sync_enabled;
        if !state.sync_enabled || !state.frame_sync_enabled {
            state.queue.clear();
        }

        state.queue.push_back(QueuedFrame {
            buffer: buffer.freeze(),
            timestamp: frame.timestamp,
            sync_timestamp: frame.sync_timestamp,
        });
    }

    /// Take the next frame for composition.
    ///
    /// Yields the oldest queued frame and drains it off the queue as long as
    /// a spare remains, so a stalling consumer stays at most one step behind
    /// while backlog shrinks.
    pub(crate) fn pop_frame(&self) -> Option<FrameHandle> {
        let mut state = self.state.write();
        if !state.active {
            return None;
        }

        let frame = state.queue.front()?.buffer.clone();
        if state.queue.len() > 1 {
            state.queue.pop_front();
        }

        Some(frame)
    }

    /// Peek at the oldest queued frame.
    pub(crate) fn front(&self) -> Option<QueuedFrame> {
        let state = self.state.read();
        if !state.active {
            return None;
        }
        state.queue.front().cloned()
    }

    /// Peek at the newest queued frame.
    pub(crate) fn back(&self) -> Option<QueuedFrame> {
        let state = self.state.read();
        if !state.active {
            return None;
        }
        state.queue.back().cloned()
    }

    /// Advance to the frame aligned with `sync_timestamp` and return it.
    ///
    /// Frames older than the target are dropped while a spare remains. A
    /// target of `-1` returns the front without advancing.
    pub(crate) fn get_sync(&self, sync_timestamp: i64) -> Option<FrameHandle> {
        let mut state = self.state.write();
        if !state.active {
            return None;
        }

        if sync_timestamp == -1 {
            return Some(state.queue.front()?.buffer.clone());
        }

        while state.queue.front()?.sync_timestamp < sync_timestamp && state.queue.len() > 1 {
            state.queue.pop_front();
        }

        let front = state.queue.front()?;
        trace!("sync frame {}", front.sync_timestamp);
        Some(front.buffer.clone())
    }

    /// Whether this channel takes part in cross-channel alignment.
    pub(crate) fn is_sync_enabled(&self) -> bool {
        let state = self.state.read();
        state.sync_enabled && state.frame_sync_enabled
    }

    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.state.read().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn sync_timestamps(&self) -> Vec<i64> {
        self.state
            .read()
            .queue
            .iter()
            .map(|frame| frame.sync_timestamp)
            .collect()
    }
}
