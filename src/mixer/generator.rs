// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Periodic composite frame generation with sub-harmonic output fan-out.
//!
//! A [`FrameGenerator`] ticks at `max_fps` on a dedicated worker thread. On
//! each tick it paints at most one composite and delivers it to every output
//! whose fps divides the tick counter: outputs at `max_fps / k` sit in
//! bucket `k - 1` and receive every k-th frame. The supported fps values are
//! the dyadic chain `min_fps, 2*min_fps, ..., max_fps`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use parking_lot::Mutex;

use crate::frame::scale::{self, PixelRect};
use crate::frame::{CompositeFrame, FrameFormat, FramePool, YuvColor};
use crate::layout::{LayoutSolution, Size};
use crate::overlays::{NullTextDrawer, TextDrawer};

use super::applier;
use super::sink::FrameSink;
use super::InputRegistry;

/// Composite buffers in flight at once (pool bound).
const COMPOSITE_POOL_SIZE: usize = 30;

/// Injectable wall clock, so ticks can be stamped deterministically in tests.
pub trait Clock: Send + Sync + std::fmt::Debug + 'static {
    /// Milliseconds since the Unix epoch.
    fn time_ms(&self) -> i64;
}

/// Production clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as i64)
    }
}

/// One registered output.
#[derive(Clone, Debug)]
struct Output {
    width: u32,
    height: u32,
    fps: u32,
    sink: Arc<dyn FrameSink>,
}

/// State only ever touched with the tick lock held.
#[derive(Debug, Default)]
struct TickState {
    /// Cycles through `0..max_fps / min_fps`.
    counter: u32,
    /// The layout currently applied to pixels.
    layout: LayoutSolution,
}

#[derive(Debug)]
pub(crate) struct GeneratorCore {
    registry: Arc<InputRegistry>,
    clock: Arc<dyn Clock>,
    size: Size,
    bg_color: YuvColor,
    crop: bool,
    max_fps: u32,
    min_fps: u32,
    pool: FramePool,
    tick: Mutex<TickState>,
    /// Pending layout swap; `Some` doubles as the dirty flag.
    pending_layout: Mutex<Option<LayoutSolution>>,
    /// Output buckets, index `i` holds subscribers at `max_fps / (i + 1)`.
    outputs: Mutex<Vec<Vec<Output>>>,
    text_drawer: Mutex<Box<dyn TextDrawer>>,
}

impl GeneratorCore {
    pub(crate) fn new(
        registry: Arc<InputRegistry>,
        size: Size,
        bg_color: YuvColor,
        crop: bool,
        max_fps: u32,
        min_fps: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug_assert!(min_fps > 0 && max_fps > 0);
        debug!("supported fps max({max_fps}), min({min_fps})");

        // max_fps must sit on the dyadic chain above min_fps
        let mut fps = min_fps;
        while fps < max_fps {
            fps *= 2;
        }
        let max_fps = if fps == max_fps {
            max_fps
        } else {
            warn!(
                "invalid fps min({min_fps}), max({max_fps}) -> min({min_fps}), max({min_fps})"
            );
            min_fps
        };

        let buckets = (max_fps / min_fps) as usize;

        Self {
            registry,
            clock,
            size,
            bg_color,
            crop,
            max_fps,
            min_fps,
            pool: FramePool::new(COMPOSITE_POOL_SIZE),
            tick: Mutex::new(TickState::default()),
            pending_layout: Mutex::new(None),
            outputs: Mutex::new(vec![Vec::new(); buckets]),
            text_drawer: Mutex::new(Box::<NullTextDrawer>::default()),
        }
    }

    pub(crate) fn max_fps(&self) -> u32 {
        self.max_fps
    }

    /// Whether an output of this shape can be served.
    pub(crate) fn is_supported(&self, width: u32, height: u32, fps: u32) -> bool {
        if width != self.size.width || height != self.size.height {
            return false;
        }
        if fps < self.min_fps || fps > self.max_fps {
            return false;
        }

        let mut n = self.min_fps;
        while n <= self.max_fps {
            if n == fps {
                return true;
            }
            n *= 2;
        }
        false
    }

    /// Register an output. Rejects shapes [`Self::is_supported`] denies.
    pub(crate) fn add_output(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        sink: Arc<dyn FrameSink>,
    ) -> bool {
        if !self.is_supported(width, height, fps) {
            warn!("unsupported output {width}x{height}, fps({fps})");
            return false;
        }

        let index = (self.max_fps / fps - 1) as usize;
        self.outputs.lock()[index].push(Output {
            width,
            height,
            fps,
            sink,
        });
        true
    }

    /// Remove the first registration of `sink` across all buckets.
    ///
    /// Once this returns `true` the sink will not observe further frames.
    pub(crate) fn remove_output(&self, sink: &Arc<dyn FrameSink>) -> bool {
        let mut outputs = self.outputs.lock();
        for bucket in outputs.iter_mut() {
            if let Some(position) = bucket
                .iter()
                .position(|output| Arc::ptr_eq(&output.sink, sink))
            {
                bucket.remove(position);
                return true;
            }
        }
        false
    }

    pub(crate) fn has_outputs(&self) -> bool {
        self.outputs.lock().iter().any(|bucket| !bucket.is_empty())
    }

    /// Stash a new layout. Applied at the start of the next generated frame.
    pub(crate) fn update_layout_solution(&self, solution: LayoutSolution) {
        *self.pending_layout.lock() = Some(solution);
    }

    /// Attach a text renderer, replacing the default no-op drawer.
    pub(crate) fn set_text_drawer(&self, drawer: Box<dyn TextDrawer>) {
        *self.text_drawer.lock() = drawer;
    }

    pub(crate) fn draw_text(&self, spec: &str) {
        let mut drawer = self.text_drawer.lock();
        drawer.set_text(spec);
        drawer.enable(true);
    }

    pub(crate) fn clear_text(&self) {
        self.text_drawer.lock().enable(false);
    }

    /// One timer tick: compose if anyone is due, fan out, advance.
    pub(crate) fn on_tick(&self) {
        let mut tick = self.tick.lock();

        let has_due_output = {
            let outputs = self.outputs.lock();
            outputs
                .iter()
                .enumerate()
                .any(|(i, bucket)| tick.counter % (i as u32 + 1) == 0 && !bucket.is_empty())
        };

        if has_due_output {
            if let Some(frame) = self.generate_frame(&mut tick) {
                let outputs = self.outputs.lock();
                for (i, bucket) in outputs.iter().enumerate() {
                    if tick.counter % (i as u32 + 1) != 0 {
                        continue;
                    }
                    for output in bucket {
                        trace!(
                            "deliver frame({counter}), {width}x{height}, fps({fps}), timestamp({timestamp})",
                            counter = tick.counter,
                            width = output.width,
                            height = output.height,
                            fps = output.fps,
                            timestamp = frame.timestamp,
                        );
                        output.sink.on_frame(&frame);
                    }
                }
            }
        }

        tick.counter = (tick.counter + 1) % (self.max_fps / self.min_fps);
    }

    fn generate_frame(&self, tick: &mut TickState) -> Option<CompositeFrame> {
        self.reconfigure_if_needed(tick);

        let Some(mut buffer) = self.pool.acquire(self.size) else {
            error!("no free composite buffer, skipping tick");
            return None;
        };

        let canvas = PixelRect::new(0, 0, self.size.width, self.size.height);
        if let Err(error) = scale::fill_rect(&mut buffer, canvas, self.bg_color) {
            error!("background fill failed: {error}");
        }

        applier::compose(&self.registry, &mut buffer, &tick.layout, self.crop);

        self.text_drawer.lock().draw_frame(&mut buffer);

        let time_ms = self.clock.time_ms();
        Some(CompositeFrame {
            format: FrameFormat::I420,
            buffer: buffer.freeze(),
            timestamp: (time_ms.wrapping_mul(90)) as u32,
            ntp_time_ms: time_ms,
        })
    }

    fn reconfigure_if_needed(&self, tick: &mut TickState) {
        if let Some(layout) = self.pending_layout.lock().take() {
            tick.layout = layout;
            debug!("reconfigure, {} regions", tick.layout.len());
        }
    }
}

/// Periodic composite producer for one fps band.
#[derive(Debug)]
pub struct FrameGenerator {
    core: Arc<GeneratorCore>,
    stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl FrameGenerator {
    /// Create the generator and start its timer worker.
    ///
    /// # Errors
    ///
    /// This can fail if the worker thread cannot be spawned.
    pub(crate) fn create(
        registry: Arc<InputRegistry>,
        size: Size,
        bg_color: YuvColor,
        crop: bool,
        max_fps: u32,
        min_fps: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let core = Arc::new(GeneratorCore::new(
            registry, size, bg_color, crop, max_fps, min_fps, clock,
        ));

        let (stop, stop_receiver) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name(format!("frame-generator-{}fps", core.max_fps()))
            .spawn({
                let core = core.clone();
                move || run_ticker(&core, &stop_receiver)
            })
            .context("unable to spawn frame generator worker")?;

        Ok(Self {
            core,
            stop,
            worker: Some(worker),
        })
    }

    pub(crate) fn is_supported(&self, width: u32, height: u32, fps: u32) -> bool {
        self.core.is_supported(width, height, fps)
    }

    pub(crate) fn add_output(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        sink: Arc<dyn FrameSink>,
    ) -> bool {
        self.core.add_output(width, height, fps, sink)
    }

    pub(crate) fn remove_output(&self, sink: &Arc<dyn FrameSink>) -> bool {
        self.core.remove_output(sink)
    }

    pub(crate) fn update_layout_solution(&self, solution: LayoutSolution) {
        self.core.update_layout_solution(solution);
    }

    pub(crate) fn set_text_drawer(&self, drawer: Box<dyn TextDrawer>) {
        self.core.set_text_drawer(drawer);
    }

    pub(crate) fn draw_text(&self, spec: &str) {
        self.core.draw_text(spec);
    }

    pub(crate) fn clear_text(&self) {
        self.core.clear_text();
    }
}

/// Tick loop on the worker thread; the stop channel doubles as the timer.
fn run_ticker(core: &GeneratorCore, stop: &Receiver<()>) {
    let interval = Duration::from_nanos(1_000_000_000 / u64::from(core.max_fps()));
    let mut next = Instant::now() + interval;

    loop {
        let timeout = next.saturating_duration_since(Instant::now());
        match stop.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                core.on_tick();
                next += interval;

                // after a stall, realign instead of bursting missed ticks
                let now = Instant::now();
                if next < now {
                    next = now + interval;
                }
            }
        }
    }

    debug!("frame generator worker exited");
}

impl Drop for FrameGenerator {
    /// Stop the timer before releasing outputs and pool.
    fn drop(&mut self) {
        debug!("Dropping FrameGenerator...");

        let _ = self.stop.send(());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("frame generator worker panicked");
            }
        }

        if self.core.has_outputs() {
            warn!("outputs still registered at generator shutdown");
        }

        debug!("Exited FrameGenerator.");
    }
}
