// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

mod applier;
mod avatar;

pub mod testing {

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Once};

    use parking_lot::Mutex;

    use crate::frame::scale::{self, PixelRect};
    use crate::*;

    /// small canvas keeping the pixel loops cheap
    pub const CANVAS: Size = Size {
        width: 64,
        height: 36,
    };

    static INIT: Once = Once::new();

    /// initialize for testing
    pub fn init() {
        INIT.call_once(|| {
            env_logger::try_init().ok();
        });
    }

    /// flat gray at the given luma
    pub fn gray(y: u8) -> YuvColor {
        YuvColor { y, cb: 128, cr: 128 }
    }

    /// allocate a frame filled with one flat color
    pub fn solid_frame(size: Size, color: YuvColor) -> VideoFrame {
        let mut frame = VideoFrame::new(size);
        scale::fill_rect(
            &mut frame,
            PixelRect::new(0, 0, size.width, size.height),
            color,
        )
        .unwrap();
        frame
    }

    /// wrap a picture the way the decoding upstream hands it in
    pub fn source_frame<'a>(
        picture: &'a VideoFrame,
        timestamp: u32,
        sync_enabled: bool,
        sync_timestamp: i64,
    ) -> SourceFrame<'a> {
        SourceFrame {
            format: FrameFormat::I420,
            picture: picture.view(),
            timestamp,
            sync_enabled,
            sync_timestamp,
        }
    }

    /// luma sample at pixel (x, y)
    pub fn y_at(frame: &VideoFrame, x: u32, y: u32) -> u8 {
        frame.data_y()[y as usize * frame.stride_y() + x as usize]
    }

    static FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

    /// unique path in the temp dir carrying the `.WxH.` annotation
    pub fn avatar_path(size: Size) -> PathBuf {
        let n = FILE_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "compositor-avatar-{pid}-{n}.{size}.yuv",
            pid = std::process::id()
        ))
    }

    /// write a raw I420 avatar file with a flat luma plane
    pub fn write_avatar(size: Size, y_value: u8) -> PathBuf {
        let w = size.width as usize;
        let h = size.height as usize;

        let mut data = vec![y_value; w * h];
        data.resize(w * h + w * h / 2, 128);

        let path = avatar_path(size);
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Sink collecting every delivered frame.
    #[derive(Debug, Default)]
    pub struct CollectSink {
        frames: Mutex<Vec<CompositeFrame>>,
    }

    impl CollectSink {
        pub fn create() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn count(&self) -> usize {
            self.frames.lock().len()
        }

        pub fn last(&self) -> Option<CompositeFrame> {
            self.frames.lock().last().cloned()
        }
    }

    impl FrameSink for CollectSink {
        fn on_frame(&self, frame: &CompositeFrame) {
            self.frames.lock().push(frame.clone());
        }
    }

    /// Manually advanced wall clock.
    #[derive(Debug, Default)]
    pub struct TestClock {
        ms: Mutex<i64>,
    }

    impl TestClock {
        pub fn create() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set(&self, ms: i64) {
            *self.ms.lock() = ms;
        }

        pub fn advance(&self, ms: i64) {
            *self.ms.lock() += ms;
        }
    }

    impl Clock for TestClock {
        fn time_ms(&self) -> i64 {
            *self.ms.lock()
        }
    }

    /// wait the given amount of milliseconds
    pub fn wait_millis(milliseconds: u64) {
        std::thread::sleep(core::time::Duration::from_millis(milliseconds));
    }
}
