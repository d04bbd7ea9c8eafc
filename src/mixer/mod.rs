// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::sync::Arc;

use anyhow::{Context as _, Result};

pub(crate) mod applier;
pub(crate) mod avatar;
pub(crate) mod generator;
pub(crate) mod input;
mod sink;

pub use generator::{Clock, FrameGenerator, SystemClock};
pub use sink::FrameSink;

use avatar::AvatarCache;
use input::InputChannel;

use crate::frame::{FrameHandle, SourceFrame, YuvColor};
use crate::layout::{LayoutSolution, Size};

/// High fps band served by the first generator.
const HIGH_FPS_BAND: (u32, u32) = (60, 15);
/// Low fps band served by the second generator.
const LOW_FPS_BAND: (u32, u32) = (48, 6);

/// Input side shared between the façade and the frame generators.
///
/// Generators pull per-region frames through this narrow capability instead
/// of holding a reference back to the whole [`Compositor`].
#[derive(Debug)]
pub(crate) struct InputRegistry {
    channels: Vec<InputChannel>,
    avatars: AvatarCache,
}

impl InputRegistry {
    pub(crate) fn new(max_input: usize) -> Self {
        Self {
            channels: (0..max_input).map(|_| InputChannel::new()).collect(),
            avatars: AvatarCache::new(),
        }
    }

    pub(crate) fn channel(&self, index: usize) -> Option<&InputChannel> {
        self.channels.get(index)
    }

    pub(crate) fn avatars(&self) -> &AvatarCache {
        &self.avatars
    }

    /// Freshest frame of an active input, avatar still otherwise.
    pub(crate) fn input_frame(&self, index: usize) -> Option<FrameHandle> {
        let channel = self.channel(index)?;
        if channel.is_active() {
            channel.pop_frame()
        } else {
            self.avatars.frame(index)
        }
    }

    /// Frame of an input aligned with `sync_timestamp`.
    ///
    /// Inactive inputs yield their avatar, active but sync-disabled inputs
    /// their freshest frame.
    pub(crate) fn sync_input_frame(&self, index: usize, sync_timestamp: i64) -> Option<FrameHandle> {
        let channel = self.channel(index)?;
        if !channel.is_active() {
            return self.avatars.frame(index);
        }
        if !channel.is_sync_enabled() {
            return channel.pop_frame();
        }
        channel.get_sync(sync_timestamp)
    }
}

/// Soft video compositor for one conference.
///
/// Owns a fixed vector of input channels, the avatar cache and two frame
/// generators tuned for disjoint fps bands (60/30/15 and 48/24/12/6).
/// Outputs are routed to the first generator that supports the requested
/// shape.
#[derive(Debug)]
pub struct Compositor {
    // declared before the registry so generators stop first on drop
    generators: Vec<FrameGenerator>,
    registry: Arc<InputRegistry>,
    max_input: usize,
    root_size: Size,
}

impl Compositor {
    /// Create a compositor with `max_input` input slots over a fixed canvas.
    ///
    /// # Arguments
    ///
    /// - `max_input`: Number of input slots, fixed for the lifetime.
    /// - `root_size`: Composite canvas size, fixed for the lifetime.
    /// - `bg_color`: Background fill, fixed for the lifetime.
    /// - `crop`: Center-crop regions instead of letterboxing them.
    ///
    /// # Errors
    ///
    /// This can fail if a generator worker thread cannot be spawned.
    pub fn create(max_input: usize, root_size: Size, bg_color: YuvColor, crop: bool) -> Result<Self> {
        Self::create_with_clock(
            max_input,
            root_size,
            bg_color,
            crop,
            Arc::new(SystemClock),
        )
    }

    /// Like [`Compositor::create`] with an injected wall clock.
    ///
    /// # Errors
    ///
    /// This can fail if a generator worker thread cannot be spawned.
    pub fn create_with_clock(
        max_input: usize,
        root_size: Size,
        bg_color: YuvColor,
        crop: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!("create( {max_input}, {root_size}, crop: {crop} )");

        let registry = Arc::new(InputRegistry::new(max_input));

        let mut generators = Vec::with_capacity(2);
        for (max_fps, min_fps) in [HIGH_FPS_BAND, LOW_FPS_BAND] {
            generators.push(
                FrameGenerator::create(
                    registry.clone(),
                    root_size,
                    bg_color,
                    crop,
                    max_fps,
                    min_fps,
                    clock.clone(),
                )
                .with_context(|| format!("unable to create {max_fps}/{min_fps} generator"))?,
            );
        }

        Ok(Self {
            generators,
            registry,
            max_input,
            root_size,
        })
    }

    #[must_use]
    pub fn max_input(&self) -> usize {
        self.max_input
    }

    #[must_use]
    pub fn root_size(&self) -> Size {
        self.root_size
    }

    /// Mark an input slot as live. Frames can be pushed afterwards.
    pub fn activate_input(&self, input: usize) -> bool {
        let Some(channel) = self.registry.channel(input) else {
            warn!("activate_input({input}) outside 0..{}", self.max_input);
            return false;
        };
        channel.set_active(true);
        true
    }

    /// Mark an input slot as gone, emptying its queue.
    pub fn deactivate_input(&self, input: usize) {
        let Some(channel) = self.registry.channel(input) else {
            warn!("deactivate_input({input}) outside 0..{}", self.max_input);
            return;
        };
        channel.set_active(false);
    }

    /// Queue a decoded frame on an input slot.
    pub fn push_input(&self, input: usize, frame: &SourceFrame<'_>) {
        let Some(channel) = self.registry.channel(input) else {
            warn!("push_input({input}) outside 0..{}", self.max_input);
            return;
        };
        channel.push(frame);
    }

    /// Point an input slot at an avatar file.
    pub fn set_avatar(&self, input: usize, url: &str) -> bool {
        self.registry.avatars().set_avatar(input, url)
    }

    /// Drop an input slot's avatar.
    pub fn unset_avatar(&self, input: usize) -> bool {
        self.registry.avatars().unset_avatar(input)
    }

    /// Replace the layout on all generators.
    ///
    /// Entries referencing slots outside `0..max_input` are dropped with a
    /// warning. The swap becomes visible on each generator's next tick.
    pub fn update_layout_solution(&self, mut solution: LayoutSolution) {
        solution.retain(|entry| {
            if entry.input < self.max_input {
                true
            } else {
                warn!(
                    "dropping layout entry for input {input} outside 0..{max}",
                    input = entry.input,
                    max = self.max_input
                );
                false
            }
        });

        for generator in &self.generators {
            generator.update_layout_solution(solution.clone());
        }
    }

    /// Register a composite consumer.
    ///
    /// Routed to the first generator supporting `(width, height, fps)`.
    /// Returns `false` if no generator does.
    pub fn add_output(&self, width: u32, height: u32, fps: u32, sink: Arc<dyn FrameSink>) -> bool {
        debug!("add_output, {width}x{height}, fps({fps})");

        for generator in &self.generators {
            if generator.is_supported(width, height, fps) {
                return generator.add_output(width, height, fps, sink);
            }
        }

        error!("can not add_output, {width}x{height}, fps({fps})");
        false
    }

    /// Unregister a composite consumer.
    ///
    /// After this returns `true` the sink observes no further frames.
    pub fn remove_output(&self, sink: &Arc<dyn FrameSink>) -> bool {
        debug!("remove_output");

        for generator in &self.generators {
            if generator.remove_output(sink) {
                return true;
            }
        }

        error!("can not remove_output, sink not registered");
        false
    }

    /// Changing the canvas after construction is not supported.
    pub fn update_root_size(&self, root_size: Size) {
        warn!("not supported: update_root_size {root_size}");
    }

    /// Changing the background after construction is not supported.
    pub fn update_background_color(&self, bg_color: YuvColor) {
        warn!(
            "not supported: update_background_color YCbCr(0x{y:x}, 0x{cb:x}, 0x{cr:x})",
            y = bg_color.y,
            cb = bg_color.cb,
            cr = bg_color.cr
        );
    }

    /// Attach a text renderer to every generator, replacing the default
    /// no-op drawer. The glyph rendering library itself lives outside this
    /// crate.
    pub fn set_text_drawer<F>(&self, mut make_drawer: F)
    where
        F: FnMut() -> Box<dyn crate::overlays::TextDrawer>,
    {
        for generator in &self.generators {
            generator.set_text_drawer(make_drawer());
        }
    }

    /// Show a text overlay on every generated composite.
    pub fn draw_text(&self, spec: &str) {
        for generator in &self.generators {
            generator.draw_text(spec);
        }
    }

    /// Hide the text overlay.
    pub fn clear_text(&self) {
        for generator in &self.generators {
            generator.clear_text();
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Arc<InputRegistry> {
        &self.registry
    }
}
