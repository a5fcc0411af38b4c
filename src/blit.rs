// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! CPU scaling and conversion into window buffers.
//!
//! Sampling positions are computed once per axis in 16.16 fixed point and
//! reduced to 8 bit weights, so the inner loop only does integer lerps.

use crate::{
    error::{Error, Result},
    format::{BufferLayout, Channels, Color, Family, PixelFormat},
    frame::PixelBuffer,
    geometry::Rect,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resampling filter used when the source and destination sizes differ.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleFilter {
    /// Nearest neighbour
    Nearest,
    /// Bilinear interpolation
    #[default]
    Bilinear,
}

impl fmt::Display for ScaleFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScaleFilter::Nearest => write!(f, "nearest"),
            ScaleFilter::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Checks that pixels in `from` can be written into a buffer of `to`.
///
/// Packed RGB and BGR formats convert freely between each other. Planar YUV
/// is only copied or scaled into planar YUV.
pub fn check_conversion(from: PixelFormat, to: PixelFormat) -> Result<()> {
    if !from.is_blittable() {
        return Err(Error::UnsupportedFormat(from));
    }
    if !to.is_blittable() {
        return Err(Error::UnsupportedFormat(to));
    }
    let packed = |f: PixelFormat| matches!(f.family(), Family::Rgb | Family::Bgr);
    if from == to || (packed(from) && packed(to)) {
        Ok(())
    } else {
        Err(Error::UnsupportedConversion { from, to })
    }
}

#[derive(Debug, Clone, Copy)]
struct Tap {
    i0: usize,
    i1: usize,
    /// Weight of `i1` out of 256
    w: u32,
}

fn taps(start: usize, src_len: usize, dst_len: usize, filter: ScaleFilter) -> Vec<Tap> {
    let last = src_len.saturating_sub(1);
    (0..dst_len)
        .map(|i| match filter {
            ScaleFilter::Nearest => {
                let s = ((2 * i + 1) * src_len) / (2 * dst_len);
                let i0 = start + s.min(last);
                Tap { i0, i1: i0, w: 0 }
            }
            ScaleFilter::Bilinear => {
                let centre = (((2 * i as u64 + 1) * src_len as u64) << 16) / (2 * dst_len as u64);
                let pos = centre.saturating_sub(1 << 15);
                let idx = (pos >> 16) as usize;
                Tap {
                    i0: start + idx.min(last),
                    i1: start + (idx + 1).min(last),
                    w: ((pos & 0xffff) >> 8) as u32,
                }
            }
        })
        .collect()
}

/// The four neighbours of one output pixel.
struct Sample<'a> {
    p00: &'a [u8],
    p01: &'a [u8],
    p10: &'a [u8],
    p11: &'a [u8],
    wx: u32,
    wy: u32,
}

impl Sample<'_> {
    #[inline]
    fn get(&self, c: usize) -> u8 {
        let (wx, wy) = (self.wx, self.wy);
        let top = self.p00[c] as u32 * (256 - wx) + self.p01[c] as u32 * wx;
        let bottom = self.p10[c] as u32 * (256 - wx) + self.p11[c] as u32 * wx;
        ((top * (256 - wy) + bottom * wy + (1 << 15)) >> 16) as u8
    }
}

/// One plane-local view used by [`resample`].
struct PlaneRef<'a> {
    data: &'a [u8],
    stride: usize,
    bpp: usize,
    rect: Rect,
}

struct PlaneMut<'a> {
    data: &'a mut [u8],
    stride: usize,
    bpp: usize,
    rect: Rect,
}

fn resample<F>(src: PlaneRef, dst: PlaneMut, filter: ScaleFilter, convert: F)
where
    F: Fn(&Sample, &mut [u8]),
{
    let (sw, sh) = src.rect.size();
    let (dw, dh) = dst.rect.size();
    if dw == 0 || dh == 0 || sw == 0 || sh == 0 {
        return;
    }
    let xs = taps(src.rect.x as usize, sw as usize, dw as usize, filter);
    let ys = taps(src.rect.y as usize, sh as usize, dh as usize, filter);
    let row_len = dw as usize * dst.bpp;

    for (dy, ty) in ys.iter().enumerate() {
        let row0 = &src.data[ty.i0 * src.stride..];
        let row1 = &src.data[ty.i1 * src.stride..];
        let start = (dst.rect.y as usize + dy) * dst.stride + dst.rect.x as usize * dst.bpp;
        let out = &mut dst.data[start..start + row_len];
        for (px, tx) in out.chunks_exact_mut(dst.bpp).zip(&xs) {
            let (a, b) = (tx.i0 * src.bpp, tx.i1 * src.bpp);
            let sample = Sample {
                p00: &row0[a..],
                p01: &row0[b..],
                p10: &row1[a..],
                p11: &row1[b..],
                wx: tx.w,
                wy: ty.w,
            };
            convert(&sample, px);
        }
    }
}

fn copy_rows(src: PlaneRef, dst: PlaneMut) {
    let len = src.rect.width as usize * src.bpp;
    for row in 0..src.rect.height as usize {
        let s = (src.rect.y as usize + row) * src.stride + src.rect.x as usize * src.bpp;
        let d = (dst.rect.y as usize + row) * dst.stride + dst.rect.x as usize * dst.bpp;
        dst.data[d..d + len].copy_from_slice(&src.data[s..s + len]);
    }
}

fn write_pixel(dc: Channels, px: &mut [u8], r: u8, g: u8, b: u8, a: u8) {
    px[dc.r] = r;
    px[dc.g] = g;
    px[dc.b] = b;
    match dc.a {
        Some(i) => px[i] = a,
        None if dc.bpp == 4 => px[3] = 0xff,
        None => {}
    }
}

/// Scale `src_rect` of `src` into `dst_rect` of a window buffer.
///
/// Callers validate the rectangles against both buffers and the formats
/// with [`check_conversion`] beforehand.
pub(crate) fn scale(
    src: &PixelBuffer,
    format: PixelFormat,
    src_rect: Rect,
    dst: &mut [u8],
    layout: &BufferLayout,
    dst_rect: Rect,
    filter: ScaleFilter,
) {
    let same_size = src_rect.size() == dst_rect.size();

    if let (Some(sc), Some(dc)) = (format.channels(), layout.format.channels()) {
        let src_plane = PlaneRef {
            data: src.data,
            stride: src.stride,
            bpp: sc.bpp,
            rect: src_rect,
        };
        let dst_plane = PlaneMut {
            data: dst,
            stride: layout.pitch,
            bpp: dc.bpp,
            rect: dst_rect,
        };
        // padding bytes are rewritten opaque, never copied
        let padded = dc.a.is_none() && dc.bpp == 4;
        if same_size && format == layout.format && !padded {
            copy_rows(src_plane, dst_plane);
            return;
        }
        resample(src_plane, dst_plane, filter, |s, px| {
            let a = sc.a.map_or(0xff, |i| s.get(i));
            write_pixel(dc, px, s.get(sc.r), s.get(sc.g), s.get(sc.b), a);
        });
        return;
    }

    // Planar YUV into planar YUV, one plane at a time.
    let luma = src.stride * src.height as usize;
    let chroma_stride = src.stride.div_ceil(2);
    let chroma = chroma_stride * src.height.div_ceil(2) as usize;
    let src_planes = [(0, src.stride), (luma, chroma_stride), (luma + chroma, chroma_stride)];

    for (index, (plane, (offset, stride))) in layout.planes().into_iter().zip(src_planes).enumerate() {
        let (sr, dr) = if index == 0 {
            (src_rect, dst_rect)
        } else {
            (chroma_rect(src_rect), chroma_rect(dst_rect))
        };
        let end = plane.offset + plane.pitch * plane.height as usize;
        let src_plane = PlaneRef {
            data: &src.data[offset..],
            stride,
            bpp: 1,
            rect: sr,
        };
        let dst_plane = PlaneMut {
            data: &mut dst[plane.offset..end],
            stride: plane.pitch,
            bpp: 1,
            rect: dr,
        };
        if sr.size() == dr.size() {
            copy_rows(src_plane, dst_plane);
        } else {
            resample(src_plane, dst_plane, filter, |s, px| px[0] = s.get(0));
        }
    }
}

/// Region of a 2x2 subsampled chroma plane covering `rect` of the luma plane.
fn chroma_rect(rect: Rect) -> Rect {
    let x = rect.x / 2;
    let y = rect.y / 2;
    let right = (rect.right() as i32 + 1) / 2;
    let bottom = (rect.bottom() as i32 + 1) / 2;
    Rect::new(x, y, right - x, bottom - y)
}

/// Fills `rect` of a window buffer with a solid colour.
pub(crate) fn fill(dst: &mut [u8], layout: &BufferLayout, rect: Rect, color: Color) {
    if let Some(dc) = layout.format.channels() {
        let len = rect.width as usize * dc.bpp;
        for row in rect.y as usize..rect.bottom() as usize {
            let start = row * layout.pitch + rect.x as usize * dc.bpp;
            for px in dst[start..start + len].chunks_exact_mut(dc.bpp) {
                write_pixel(dc, px, color.r, color.g, color.b, color.a);
            }
        }
        return;
    }

    let (y, u, v) = color.to_yuv();
    for (index, (plane, value)) in layout.planes().into_iter().zip([y, u, v]).enumerate() {
        let r = if index == 0 { rect } else { chroma_rect(rect) };
        for row in r.y as usize..r.bottom() as usize {
            let start = plane.offset + row * plane.pitch + r.x as usize;
            dst[start..start + r.width as usize].fill(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_taps_cover_source() {
        let t = taps(0, 4, 2, ScaleFilter::Nearest);
        assert_eq!((t[0].i0, t[1].i0), (1, 3));
        let t = taps(10, 2, 4, ScaleFilter::Nearest);
        assert_eq!(t.iter().map(|t| t.i0).collect::<Vec<_>>(), vec![10, 10, 11, 11]);
    }

    #[test]
    fn bilinear_identity_has_no_blend() {
        for t in taps(0, 8, 8, ScaleFilter::Bilinear) {
            assert_eq!(t.w, 0);
        }
    }

    #[test]
    fn chroma_rect_rounds_outwards() {
        assert_eq!(chroma_rect(Rect::new(1, 3, 4, 4)), Rect::new(0, 1, 3, 3));
        assert_eq!(chroma_rect(Rect::new(0, 0, 640, 480)), Rect::new(0, 0, 320, 240));
    }

    #[test]
    fn conversions() {
        assert!(check_conversion(PixelFormat::Bgra, PixelFormat::Rgb3).is_ok());
        assert!(check_conversion(PixelFormat::Yu12, PixelFormat::Yu12).is_ok());
        assert!(matches!(
            check_conversion(PixelFormat::Yu12, PixelFormat::Rgba),
            Err(Error::UnsupportedConversion { .. })
        ));
        assert!(matches!(
            check_conversion(PixelFormat::Yuyv, PixelFormat::Rgba),
            Err(Error::UnsupportedFormat(PixelFormat::Yuyv))
        ));
    }
}
