// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EDID decoding.
//!
//! Only the 128 byte base block is interpreted. Extension blocks are
//! checksum-verified but otherwise ignored, so alternate preferred modes
//! advertised through CEA extensions are not considered.

use crate::{
    error::{Error, Result},
    mode::{DisplayMode, InputFormat, Transform},
};
use std::{fs, path::Path};
use tracing::{debug, warn};

pub const BLOCK_SIZE: usize = 128;

const HEADER: [u8; 8] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
const DESCRIPTOR_OFFSETS: [usize; 4] = [54, 72, 90, 108];
const ESTABLISHED_OFFSET: usize = 35;
const STANDARD_OFFSET: usize = 38;

/// Established timings bitmask, bytes 35 to 37, most significant bit first.
const ESTABLISHED_TIMINGS: [(u32, u32, u32, bool); 17] = [
    (720, 400, 70, false),
    (720, 400, 88, false),
    (640, 480, 60, false),
    (640, 480, 67, false),
    (640, 480, 72, false),
    (640, 480, 75, false),
    (800, 600, 56, false),
    (800, 600, 60, false),
    (800, 600, 72, false),
    (800, 600, 75, false),
    (832, 624, 75, false),
    (1024, 768, 87, true),
    (1024, 768, 60, false),
    (1024, 768, 70, false),
    (1024, 768, 75, false),
    (1280, 1024, 75, false),
    (1152, 870, 75, false),
];

/// Decoded detailed timing descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailedTiming {
    /// Pixel clock in kHz
    pub pixel_clock_khz: u32,
    pub h_active: u32,
    pub h_blank: u32,
    pub h_sync_offset: u32,
    pub h_sync_width: u32,
    pub v_active: u32,
    pub v_blank: u32,
    pub v_sync_offset: u32,
    pub v_sync_width: u32,
    pub width_mm: u32,
    pub height_mm: u32,
    pub interlaced: bool,
}

impl DetailedTiming {
    /// Decodes an 18 byte descriptor, returning `None` for display
    /// descriptors (monitor name, range limits, ...) and empty timings.
    pub fn decode(d: &[u8]) -> Option<Self> {
        if d.len() < 18 {
            return None;
        }
        let clock = u16::from_le_bytes([d[0], d[1]]) as u32;
        if clock == 0 {
            return None;
        }
        let hi = |byte: u8, shift: u32| ((byte as u32) >> shift) & 0x0f;
        let timing = DetailedTiming {
            pixel_clock_khz: clock * 10,
            h_active: d[2] as u32 | hi(d[4], 4) << 8,
            h_blank: d[3] as u32 | hi(d[4], 0) << 8,
            v_active: d[5] as u32 | hi(d[7], 4) << 8,
            v_blank: d[6] as u32 | hi(d[7], 0) << 8,
            h_sync_offset: d[8] as u32 | ((d[11] as u32 >> 6) & 0x03) << 8,
            h_sync_width: d[9] as u32 | ((d[11] as u32 >> 4) & 0x03) << 8,
            v_sync_offset: (d[10] as u32 >> 4) | ((d[11] as u32 >> 2) & 0x03) << 4,
            v_sync_width: (d[10] as u32 & 0x0f) | (d[11] as u32 & 0x03) << 4,
            width_mm: d[12] as u32 | hi(d[14], 4) << 8,
            height_mm: d[13] as u32 | hi(d[14], 0) << 8,
            interlaced: d[17] & 0x80 != 0,
        };
        if timing.h_active == 0 || timing.v_active == 0 {
            return None;
        }
        Some(timing)
    }

    /// Lines in a full frame. Interlaced descriptors count active lines
    /// per field.
    pub fn frame_height(&self) -> u32 {
        if self.interlaced {
            self.v_active.saturating_mul(2)
        } else {
            self.v_active
        }
    }

    /// Vertical refresh in millihertz, the field rate for interlaced
    /// timings.
    pub fn refresh_mhz(&self) -> u32 {
        let h_total = self.h_active as u64 + self.h_blank as u64;
        let mut v_total = self.v_active as u64 + self.v_blank as u64;
        let mut clock_mhz = self.pixel_clock_khz as u64 * 1_000_000;
        if self.interlaced {
            // two fields of v_total lines plus the half line between them
            v_total = 2 * v_total + 1;
            clock_mhz *= 2;
        }
        if h_total == 0 || v_total == 0 {
            return 0;
        }
        u32::try_from(clock_mhz / (h_total * v_total)).unwrap_or(u32::MAX)
    }
}

/// A checksum-verified EDID dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edid {
    bytes: Vec<u8>,
}

impl Edid {
    /// Validates the block structure of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdid`] if the length is not a positive multiple
    /// of 128 or any block fails its checksum.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidEdid(format!(
                "length {} is not a positive multiple of {BLOCK_SIZE}",
                bytes.len()
            )));
        }
        for (index, block) in bytes.chunks_exact(BLOCK_SIZE).enumerate() {
            let sum = block.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            if sum != 0 {
                return Err(Error::InvalidEdid(format!(
                    "block {index} checksum mismatch (sum {sum:#04x})"
                )));
            }
        }
        if bytes[..HEADER.len()] != HEADER {
            warn!("EDID base block has an unexpected header {:02x?}", &bytes[..8]);
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::parse(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn base(&self) -> &[u8] {
        &self.bytes[..BLOCK_SIZE]
    }

    pub fn block_count(&self) -> usize {
        self.bytes.len() / BLOCK_SIZE
    }

    /// Three letter PNP manufacturer id.
    pub fn manufacturer(&self) -> String {
        let id = u16::from_be_bytes([self.base()[8], self.base()[9]]);
        [(id >> 10) & 0x1f, (id >> 5) & 0x1f, id & 0x1f]
            .iter()
            .map(|&c| match c {
                1..=26 => (b'A' + c as u8 - 1) as char,
                _ => '?',
            })
            .collect()
    }

    pub fn product_code(&self) -> u16 {
        u16::from_le_bytes([self.base()[10], self.base()[11]])
    }

    /// EDID structure version as `(version, revision)`.
    pub fn version(&self) -> (u8, u8) {
        (self.base()[18], self.base()[19])
    }

    /// The detailed timing in the first descriptor slot, if that slot holds
    /// a timing rather than a display descriptor.
    pub fn preferred_timing(&self) -> Option<DetailedTiming> {
        let offset = DESCRIPTOR_OFFSETS[0];
        DetailedTiming::decode(&self.base()[offset..offset + 18])
    }

    /// Every detailed timing found in the four descriptor slots.
    pub fn detailed_timings(&self) -> Vec<DetailedTiming> {
        DESCRIPTOR_OFFSETS
            .iter()
            .filter_map(|&offset| DetailedTiming::decode(&self.base()[offset..offset + 18]))
            .collect()
    }

    /// Modes flagged in the established timings bitmask.
    pub fn established_modes(&self) -> Vec<DisplayMode> {
        let bits = &self.base()[ESTABLISHED_OFFSET..ESTABLISHED_OFFSET + 3];
        ESTABLISHED_TIMINGS
            .iter()
            .enumerate()
            .filter(|(index, _)| bits[index / 8] & (0x80 >> (index % 8)) != 0)
            .map(|(_, &(width, height, refresh, interlaced))| {
                DisplayMode::new(width, height, refresh).interlaced(interlaced)
            })
            .collect()
    }

    /// Modes listed in the eight standard timing slots.
    pub fn standard_modes(&self) -> Vec<DisplayMode> {
        let (_, revision) = self.version();
        self.base()[STANDARD_OFFSET..STANDARD_OFFSET + 16]
            .chunks_exact(2)
            .filter(|pair| !(pair[0] == 0x01 && pair[1] == 0x01) && pair[0] != 0x00)
            .map(|pair| {
                let width = (pair[0] as u32 + 31) * 8;
                let height = match pair[1] >> 6 {
                    // 16:10 since EDID 1.3, 1:1 before
                    0 if revision >= 3 => width * 10 / 16,
                    0 => width,
                    1 => width * 3 / 4,
                    2 => width * 4 / 5,
                    _ => width * 9 / 16,
                };
                DisplayMode::new(width, height, (pair[1] & 0x3f) as u32 + 60)
            })
            .collect()
    }

    /// The display's preferred mode.
    ///
    /// The first detailed timing descriptor wins. Without one, the highest
    /// resolution established timing is used, then the highest resolution
    /// standard timing, and finally 640x480@60 which every EDID compliant
    /// display must accept.
    pub fn preferred_mode(&self) -> DisplayMode {
        if let Some(timing) = self.preferred_timing() {
            return DisplayMode::from(timing);
        }
        let best = |modes: Vec<DisplayMode>| {
            modes.into_iter().max_by_key(|m| {
                (
                    m.width as u64 * m.height as u64,
                    !m.interlaced,
                    m.refresh_hz,
                )
            })
        };
        if let Some(mode) = best(self.established_modes()) {
            debug!("EDID has no detailed timing, using established timing {mode}");
            return mode;
        }
        if let Some(mode) = best(self.standard_modes()) {
            debug!("EDID has no detailed or established timing, using standard timing {mode}");
            return mode;
        }
        warn!("EDID advertises no usable timing, assuming 640x480@60");
        DisplayMode::new(640, 480, 60)
    }
}

/// Parses `bytes` and returns the preferred mode.
pub fn parse(bytes: &[u8]) -> Result<DisplayMode> {
    Ok(Edid::parse(bytes)?.preferred_mode())
}

impl From<DetailedTiming> for DisplayMode {
    fn from(timing: DetailedTiming) -> Self {
        DisplayMode {
            width: timing.h_active,
            height: timing.frame_height(),
            refresh_hz: timing.refresh_mhz().saturating_add(500) / 1000,
            interlaced: timing.interlaced,
            input_format: InputFormat::Rgb888,
            transform: Transform::None,
            timing: Some(timing),
        }
    }
}
