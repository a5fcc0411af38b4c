// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::edid::DetailedTiming;
use std::fmt;

/// Pixel format the display pipeline scans out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Invalid,
    #[default]
    Rgb888,
    Rgb565,
}

/// Orientation the firmware applies to the whole display.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
}

/// A video mode, either advertised through EDID or reported by the firmware
/// for an open display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    /// Vertical refresh rounded to the nearest Hz, 0 when unknown
    pub refresh_hz: u32,
    pub interlaced: bool,
    pub input_format: InputFormat,
    pub transform: Transform,
    /// Full timing when the mode came from a detailed timing descriptor
    pub timing: Option<DetailedTiming>,
}

impl DisplayMode {
    pub const fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            refresh_hz,
            interlaced: false,
            input_format: InputFormat::Rgb888,
            transform: Transform::None,
            timing: None,
        }
    }

    pub const fn interlaced(mut self, interlaced: bool) -> Self {
        self.interlaced = interlaced;
        self
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if self.interlaced {
            write!(f, "i")?;
        }
        if self.refresh_hz > 0 {
            write!(f, "@{}", self.refresh_hz)?;
        }
        Ok(())
    }
}
