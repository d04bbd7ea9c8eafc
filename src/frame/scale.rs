// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Planar YUV 4:2:0 pixel primitives: rect fill, copy and box-filter scale.
//!
//! These are the only routines that touch pixels. All rectangle coordinates
//! must be even so the half-resolution chroma planes stay aligned; callers
//! are expected to round down (`& !1`) before calling in. Failures never
//! panic, they come back as [`ScaleError`] for the caller to log and skip.

use thiserror::Error;

use super::{PlanarView, VideoFrame, YuvColor};

/// Pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_even(&self) -> bool {
        (self.x | self.y | self.width | self.height) & 1 == 0
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

impl std::fmt::Display for PixelRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{},{}",
            self.width, self.height, self.x, self.y
        )
    }
}

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("empty rectangle {0}")]
    EmptyRect(PixelRect),
    #[error("odd geometry {0}, 4:2:0 needs even coordinates")]
    OddGeometry(PixelRect),
    #[error("rectangle {rect} outside picture {width}x{height}")]
    OutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },
    #[error("picture size mismatch, input {input} output {output}")]
    SizeMismatch {
        input: crate::layout::Size,
        output: crate::layout::Size,
    },
    #[error("plane too short, need {needed} bytes, got {got}")]
    ShortPlane { needed: usize, got: usize },
}

fn check_rect(rect: PixelRect, width: u32, height: u32) -> Result<(), ScaleError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(ScaleError::EmptyRect(rect));
    }
    if !rect.is_even() {
        return Err(ScaleError::OddGeometry(rect));
    }
    if !rect.fits(width, height) {
        return Err(ScaleError::OutOfBounds {
            rect,
            width,
            height,
        });
    }
    Ok(())
}

/// Fill a rectangle of the frame with a flat color.
pub fn fill_rect(
    frame: &mut VideoFrame,
    rect: PixelRect,
    color: YuvColor,
) -> Result<(), ScaleError> {
    check_rect(rect, frame.width(), frame.height())?;

    let stride_y = frame.stride_y();
    let stride_u = frame.stride_u();
    let stride_v = frame.stride_v();
    let (y, u, v) = frame.planes_mut();

    fill_plane(
        y,
        stride_y,
        rect.x as usize,
        rect.y as usize,
        rect.width as usize,
        rect.height as usize,
        color.y,
    );
    fill_plane(
        u,
        stride_u,
        rect.x as usize / 2,
        rect.y as usize / 2,
        rect.width as usize / 2,
        rect.height as usize / 2,
        color.cb,
    );
    fill_plane(
        v,
        stride_v,
        rect.x as usize / 2,
        rect.y as usize / 2,
        rect.width as usize / 2,
        rect.height as usize / 2,
        color.cr,
    );

    Ok(())
}

fn fill_plane(plane: &mut [u8], stride: usize, x: usize, y: usize, w: usize, h: usize, value: u8) {
    for row in y..y + h {
        plane[row * stride + x..row * stride + x + w].fill(value);
    }
}

/// Copy a full picture from a borrowed view into an equally sized frame.
pub fn copy(src: &PlanarView<'_>, dst: &mut VideoFrame) -> Result<(), ScaleError> {
    if src.size != dst.size() {
        return Err(ScaleError::SizeMismatch {
            input: src.size,
            output: dst.size(),
        });
    }

    let rows = src.size.height as usize;
    let cols = src.size.width as usize;
    check_plane(src.y, src.stride_y, cols, rows)?;
    check_plane(src.u, src.stride_u, cols / 2, rows / 2)?;
    check_plane(src.v, src.stride_v, cols / 2, rows / 2)?;

    let dst_stride_y = dst.stride_y();
    let dst_stride_u = dst.stride_u();
    let dst_stride_v = dst.stride_v();
    let (y, u, v) = dst.planes_mut();

    copy_plane(src.y, src.stride_y, y, dst_stride_y, cols, rows);
    copy_plane(src.u, src.stride_u, u, dst_stride_u, cols / 2, rows / 2);
    copy_plane(src.v, src.stride_v, v, dst_stride_v, cols / 2, rows / 2);

    Ok(())
}

fn check_plane(plane: &[u8], stride: usize, cols: usize, rows: usize) -> Result<(), ScaleError> {
    if stride < cols {
        return Err(ScaleError::ShortPlane {
            needed: cols,
            got: stride,
        });
    }
    // last row may be cut to the visible columns
    let needed = if rows == 0 { 0 } else { stride * (rows - 1) + cols };
    if plane.len() < needed {
        return Err(ScaleError::ShortPlane {
            needed,
            got: plane.len(),
        });
    }
    Ok(())
}

fn copy_plane(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    cols: usize,
    rows: usize,
) {
    for row in 0..rows {
        dst[row * dst_stride..row * dst_stride + cols]
            .copy_from_slice(&src[row * src_stride..row * src_stride + cols]);
    }
}

/// Scale a source rectangle into a destination rectangle, box filter.
///
/// Each destination pixel averages the source box it covers; boxes smaller
/// than one pixel (upscale) collapse to the nearest source pixel.
pub fn scale(
    src: &VideoFrame,
    src_rect: PixelRect,
    dst: &mut VideoFrame,
    dst_rect: PixelRect,
) -> Result<(), ScaleError> {
    check_rect(src_rect, src.width(), src.height())?;
    check_rect(dst_rect, dst.width(), dst.height())?;

    let src_stride_y = src.stride_y();
    let src_stride_u = src.stride_u();
    let src_stride_v = src.stride_v();
    let dst_stride_y = dst.stride_y();
    let dst_stride_u = dst.stride_u();
    let dst_stride_v = dst.stride_v();

    let half = |rect: PixelRect| PixelRect {
        x: rect.x / 2,
        y: rect.y / 2,
        width: rect.width / 2,
        height: rect.height / 2,
    };
    let src_c = half(src_rect);
    let dst_c = half(dst_rect);

    // planes_mut needs the source planes borrowed first
    let src_y = src.data_y();
    let src_u = src.data_u();
    let src_v = src.data_v();
    let (y, u, v) = dst.planes_mut();

    scale_plane(src_y, src_stride_y, src_rect, y, dst_stride_y, dst_rect);
    scale_plane(src_u, src_stride_u, src_c, u, dst_stride_u, dst_c);
    scale_plane(src_v, src_stride_v, src_c, v, dst_stride_v, dst_c);

    Ok(())
}

fn scale_plane(
    src: &[u8],
    src_stride: usize,
    src_rect: PixelRect,
    dst: &mut [u8],
    dst_stride: usize,
    dst_rect: PixelRect,
) {
    let sx = src_rect.x as usize;
    let sy = src_rect.y as usize;
    let sw = src_rect.width as usize;
    let sh = src_rect.height as usize;
    let dx = dst_rect.x as usize;
    let dy = dst_rect.y as usize;
    let dw = dst_rect.width as usize;
    let dh = dst_rect.height as usize;

    if dw == 0 || dh == 0 || sw == 0 || sh == 0 {
        return;
    }

    for out_row in 0..dh {
        let y0 = sy + out_row * sh / dh;
        let mut y1 = sy + (out_row + 1) * sh / dh;
        if y1 <= y0 {
            y1 = y0 + 1;
        }

        let dst_row = &mut dst[(dy + out_row) * dst_stride + dx..];
        for out_col in 0..dw {
            let x0 = sx + out_col * sw / dw;
            let mut x1 = sx + (out_col + 1) * sw / dw;
            if x1 <= x0 {
                x1 = x0 + 1;
            }

            let mut sum = 0u32;
            for row in y0..y1 {
                for col in x0..x1 {
                    sum += u32::from(src[row * src_stride + col]);
                }
            }
            let area = ((y1 - y0) * (x1 - x0)) as u32;
            dst_row[out_col] = ((sum + area / 2) / area) as u8;
        }
    }
}
