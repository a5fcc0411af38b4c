// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{Error, Result},
    format::PixelFormat,
    geometry::Rect,
};
use std::time::Instant;

/// Borrowed view of pixel memory handed to [`crate::Window::blit`].
///
/// `stride` is the byte length of one row of the first plane. Planar YUV
/// chroma planes follow the luma plane with half the stride.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

impl<'a> PixelBuffer<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride,
        }
    }

    /// Tightly packed buffer of `format`.
    pub fn packed(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self::new(data, width, height, format.row_stride(width))
    }

    pub fn rect(&self) -> Rect {
        Rect::sized(self.width, self.height)
    }

    /// Checks that the buffer holds a full image of `format`.
    pub fn validate(&self, format: PixelFormat) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::geometry(format!(
                "empty {}x{} source buffer",
                self.width, self.height
            )));
        }
        let min_stride = format.row_stride(self.width);
        if self.stride < min_stride {
            return Err(Error::geometry(format!(
                "stride {} shorter than a {format} row of {} pixels ({min_stride} bytes)",
                self.stride, self.width
            )));
        }
        let needed = format.image_size(self.stride, self.height);
        if self.data.len() < needed {
            return Err(Error::geometry(format!(
                "{} bytes for a {}x{} {format} image needing {needed}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

/// One captured image.
///
/// Frames carry a sequence number assigned by the capture task, starting at
/// 1 and increasing by one per captured frame, so gaps seen by the consumer
/// are frames replaced before they were presented.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    sequence: u64,
    captured: Instant,
}

impl Frame {
    /// Tightly packed frame.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        Self::with_stride(data, width, height, format.row_stride(width), format)
    }

    pub fn with_stride(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self> {
        PixelBuffer::new(&data, width, height, stride).validate(format)?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
            sequence: 0,
            captured: Instant::now(),
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the frame was taken from the camera.
    pub fn captured(&self) -> Instant {
        self.captured
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn buffer(&self) -> PixelBuffer<'_> {
        PixelBuffer::new(&self.data, self.width, self.height, self.stride)
    }

    pub fn rect(&self) -> Rect {
        Rect::sized(self.width, self.height)
    }
}
