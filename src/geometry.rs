// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::firmware::ResourceHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rectangle in pixels, laid out like the firmware's `VC_RECT_T`.
///
/// Used both for regions of a source buffer and for destinations on a layer.
/// Negative sizes are representable so that values coming from configuration
/// can be rejected with a proper error instead of wrapping.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: i32,
    /// Y coordinate of top-left corner
    pub y: i32,
    /// Width of the rectangle in pixels
    pub width: i32,
    /// Height of the rectangle in pixels
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `width` x `height`.
    pub const fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub const fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub const fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub const fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// True when `other` lies entirely inside `self`.
    pub const fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x as i64 || bottom <= y as i64 {
            return None;
        }
        Some(Rect::new(x, y, (right - x as i64) as i32, (bottom - y as i64) as i32))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width.max(0) as u32, self.height.max(0) as u32)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// How the firmware derives per-pixel opacity of an element.
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMode {
    /// Use the alpha channel of the source pixels.
    FromSource = 0,
    /// Apply `opacity` to every pixel.
    #[default]
    FixedAllPixels = 1,
    /// Apply `opacity` to every pixel whose source alpha is non zero.
    FixedNonZero = 2,
}

/// Compositing transparency of a window. Converted to the firmware's
/// `VC_DISPMANX_ALPHA_T` when the element is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaSpec {
    pub mode: AlphaMode,
    pub opacity: u8,
    pub mask: Option<ResourceHandle>,
}

impl Default for AlphaSpec {
    fn default() -> Self {
        AlphaSpec::opaque()
    }
}

impl AlphaSpec {
    pub const fn opaque() -> Self {
        Self {
            mode: AlphaMode::FixedAllPixels,
            opacity: 255,
            mask: None,
        }
    }

    pub const fn with_opacity(opacity: u8) -> Self {
        Self {
            mode: AlphaMode::FixedAllPixels,
            opacity,
            mask: None,
        }
    }

    pub const fn blend_enabled(&self) -> bool {
        !matches!(self.mode, AlphaMode::FixedAllPixels) || self.opacity < 255
    }
}
