// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Still images shown for inactive inputs.
//!
//! Avatars are raw planar YUV 4:2:0 files whose dimensions ride in the file
//! name as `.<W>x<H>.` (for example `face.320x240.yuv`). Decoded stills are
//! cached by URL and shared across input slots pointing at the same file.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;

use crate::frame::{FrameHandle, PooledFrame, VideoFrame};
use crate::layout::Size;

#[derive(Debug, Default)]
struct AvatarState {
    /// input slot -> avatar URL
    urls: HashMap<usize, String>,
    /// URL -> decode result; a failed decode is cached too so the cold file
    /// system path is not retried every tick.
    frames: HashMap<String, Option<FrameHandle>>,
}

/// Cache of decoded avatar stills, keyed by URL through an index table.
#[derive(Debug, Default)]
pub(crate) struct AvatarCache {
    state: Mutex<AvatarState>,
}

impl AvatarCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Point an input slot at an avatar file.
    ///
    /// Replacing a slot's URL evicts the previously decoded still once no
    /// other slot references it.
    pub(crate) fn set_avatar(&self, index: usize, url: &str) -> bool {
        let mut state = self.state.lock();
        debug!("set_avatar({index}) = {url}");

        if let Some(old) = state.urls.insert(index, url.to_owned()) {
            if old != url && !state.urls.values().any(|u| *u == old) {
                state.frames.remove(&old);
            }
        }
        true
    }

    /// Drop an input slot's avatar mapping.
    pub(crate) fn unset_avatar(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        debug!("unset_avatar({index})");

        let Some(old) = state.urls.remove(&index) else {
            return true;
        };
        if !state.urls.values().any(|u| *u == old) {
            state.frames.remove(&old);
        }
        true
    }

    /// Fetch the still for an input slot, decoding it on first use.
    ///
    /// Returns `None` for unmapped slots and for files that cannot be
    /// decoded; the failure is logged, never raised.
    pub(crate) fn frame(&self, index: usize) -> Option<FrameHandle> {
        let mut state = self.state.lock();

        let Some(url) = state.urls.get(&index).cloned() else {
            warn!("no avatar set for input {index}");
            return None;
        };

        if let Some(cached) = state.frames.get(&url) {
            return cached.clone();
        }

        let frame = match load_image(&url) {
            Ok(frame) => Some(PooledFrame::detached(frame).freeze()),
            Err(error) => {
                warn!("unable to load avatar image '{url}': {error:#}");
                None
            }
        };
        state.frames.insert(url, frame.clone());
        frame
    }
}

/// Extract `W` and `H` from the `.<W>x<H>.` file name convention.
pub(crate) fn image_size(url: &str) -> Option<Size> {
    let begin = url.find('.')?;
    let x = begin + url[begin..].find('x')?;
    let end = x + url[x..].find('.')?;

    let width: u32 = url[begin + 1..x].parse().ok()?;
    let height: u32 = url[x + 1..end].parse().ok()?;

    trace!("image size in url '{url}': {width}x{height}");
    Some(Size { width, height })
}

fn load_image(url: &str) -> Result<VideoFrame> {
    let Some(size) = image_size(url) else {
        bail!("invalid image size in url");
    };
    if size.width == 0 || size.height == 0 || size.width % 2 != 0 || size.height % 2 != 0 {
        bail!("unusable image size {size}, need positive even dimensions");
    }

    let data = std::fs::read(url).context("unable to read file")?;

    let w = size.width as usize;
    let h = size.height as usize;
    let expected = (w * h * 3 + 1) / 2;
    if data.len() != expected {
        bail!(
            "invalid file size {got}, expected {expected} for {size}",
            got = data.len()
        );
    }

    let y = data[..w * h].to_vec();
    let u = data[w * h..w * h + w * h / 4].to_vec();
    let v = data[w * h + w * h / 4..].to_vec();

    Ok(VideoFrame::from_planes(size, y, u, v))
}

#[cfg(test)]
pub(crate) use image_size as parse_image_size;
