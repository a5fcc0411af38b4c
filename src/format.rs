// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Pixel formats understood by the overlay pipeline.
///
/// Formats are named after their V4L2 FourCC codes. The RGB, BGR and planar
/// YUV families can be blitted into a window; packed and semi-planar YUV
/// (`YUYV`, `NV12`) are recognised so camera buffers can be described, but
/// they need an external conversion before they can be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// RGB 24-bit (8 bits per channel, no alpha)
    Rgb3,
    /// RGBX 32-bit (8 bits per channel, unused padding byte)
    Rgbx,
    /// RGBA 32-bit (8 bits per channel, with alpha)
    Rgba,
    /// BGR 24-bit
    Bgr3,
    /// BGRA 32-bit
    Bgra,
    /// YUV 4:2:0 planar (I420), full resolution Y plane then U and V planes
    Yu12,
    /// YUYV 4:2:2 packed
    Yuyv,
    /// NV12 4:2:0 semi-planar
    Nv12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Rgb,
    Bgr,
    PlanarYuv,
    Other,
}

/// Byte positions of the colour channels inside one packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub r: usize,
    pub g: usize,
    pub b: usize,
    pub a: Option<usize>,
    pub bpp: usize,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::Rgb3,
        PixelFormat::Rgbx,
        PixelFormat::Rgba,
        PixelFormat::Bgr3,
        PixelFormat::Bgra,
        PixelFormat::Yu12,
        PixelFormat::Yuyv,
        PixelFormat::Nv12,
    ];

    pub const fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Rgb3 => *b"RGB3",
            PixelFormat::Rgbx => *b"RGBX",
            PixelFormat::Rgba => *b"RGBA",
            PixelFormat::Bgr3 => *b"BGR3",
            PixelFormat::Bgra => *b"BGRA",
            PixelFormat::Yu12 => *b"YU12",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Nv12 => *b"NV12",
        }
    }

    pub fn from_fourcc(code: [u8; 4]) -> Option<Self> {
        PixelFormat::ALL.into_iter().find(|f| f.fourcc() == code)
    }

    pub const fn family(self) -> Family {
        match self {
            PixelFormat::Rgb3 | PixelFormat::Rgbx | PixelFormat::Rgba => Family::Rgb,
            PixelFormat::Bgr3 | PixelFormat::Bgra => Family::Bgr,
            PixelFormat::Yu12 => Family::PlanarYuv,
            PixelFormat::Yuyv | PixelFormat::Nv12 => Family::Other,
        }
    }

    pub const fn is_blittable(self) -> bool {
        !matches!(self.family(), Family::Other)
    }

    /// Channel layout of the packed RGB/BGR formats.
    pub const fn channels(self) -> Option<Channels> {
        let (r, g, b, a, bpp) = match self {
            PixelFormat::Rgb3 => (0, 1, 2, None, 3),
            PixelFormat::Rgbx => (0, 1, 2, None, 4),
            PixelFormat::Rgba => (0, 1, 2, Some(3), 4),
            PixelFormat::Bgr3 => (2, 1, 0, None, 3),
            PixelFormat::Bgra => (2, 1, 0, Some(3), 4),
            _ => return None,
        };
        Some(Channels { r, g, b, a, bpp })
    }

    /// Tightly packed row length in bytes of the first plane.
    pub const fn row_stride(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            PixelFormat::Rgb3 | PixelFormat::Bgr3 => 3 * width,
            PixelFormat::Rgbx | PixelFormat::Rgba | PixelFormat::Bgra => 4 * width,
            PixelFormat::Yuyv => 2 * width,
            PixelFormat::Yu12 | PixelFormat::Nv12 => width,
        }
    }

    /// Bytes needed for a `height` row image whose first plane has `stride`
    /// bytes per row. Chroma planes of YUV formats follow contiguously.
    pub const fn image_size(self, stride: usize, height: u32) -> usize {
        let height = height as usize;
        let chroma_rows = height.div_ceil(2);
        match self {
            PixelFormat::Yu12 => stride * height + 2 * stride.div_ceil(2) * chroma_rows,
            PixelFormat::Nv12 => stride * height + stride * chroma_rows,
            _ => stride * height,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let code = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let code: [u8; 4] = upper
            .as_bytes()
            .try_into()
            .map_err(|_| format!("pixel format must be a four character code: {s}"))?;
        PixelFormat::from_fourcc(code).ok_or_else(|| format!("unknown pixel format {s}"))
    }
}

/// Memory layout of a window buffer.
///
/// The firmware wants 32 byte aligned pitches and, for planar YUV, a luma
/// plane whose height is a multiple of 16 with the chroma planes directly
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub plane_height: u32,
}

/// One plane of a [`BufferLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plane {
    pub offset: usize,
    pub pitch: usize,
    pub width: u32,
    pub height: u32,
}

const fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl BufferLayout {
    pub const fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let (pitch, plane_height) = match format {
            PixelFormat::Yu12 => (align_up(width as usize, 32), align_up(height as usize, 16) as u32),
            _ => (align_up(format.row_stride(width), 32), height),
        };
        Self {
            format,
            width,
            height,
            pitch,
            plane_height,
        }
    }

    pub fn size(&self) -> usize {
        self.planes()
            .last()
            .map_or(0, |p| p.offset + p.pitch * p.height as usize)
    }

    pub fn planes(&self) -> Vec<Plane> {
        match self.format {
            PixelFormat::Yu12 => {
                let luma = self.pitch * self.plane_height as usize;
                let chroma_pitch = self.pitch / 2;
                let chroma_rows = self.plane_height / 2;
                let chroma = chroma_pitch * chroma_rows as usize;
                vec![
                    Plane {
                        offset: 0,
                        pitch: self.pitch,
                        width: self.width,
                        height: self.plane_height,
                    },
                    Plane {
                        offset: luma,
                        pitch: chroma_pitch,
                        width: self.width.div_ceil(2),
                        height: chroma_rows,
                    },
                    Plane {
                        offset: luma + chroma,
                        pitch: chroma_pitch,
                        width: self.width.div_ceil(2),
                        height: chroma_rows,
                    },
                ]
            }
            _ => vec![Plane {
                offset: 0,
                pitch: self.pitch,
                width: self.width,
                height: self.height,
            }],
        }
    }
}

/// Solid colour used by `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

const fn opaque() -> u8 {
    255
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// BT.601 limited range conversion.
    pub fn to_yuv(self) -> (u8, u8, u8) {
        let (r, g, b) = (self.r as i32, self.g as i32, self.b as i32);
        let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
        let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
        let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
        (
            y.clamp(0, 255) as u8,
            u.clamp(0, 255) as u8,
            v.clamp(0, 255) as u8,
        )
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parses `#rrggbb` or `#rrggbbaa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(format!("expected #rrggbb or #rrggbbaa, got {s}"));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("invalid colour {s}: {e}"))
        };
        Ok(Color {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }
}
