// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! V4L2 camera source backed by VideoStream.

use crate::{
    capture::CameraSource,
    error::{CameraError, Error, Result},
    format::PixelFormat,
    frame::Frame,
};
use dma_buf::DmaBuf;
use std::{error::Error as StdError, path::Path};
use tracing::{info, warn};
use videostream::{
    camera::{create_camera, CameraReader, Mirror},
    fourcc::FourCC,
};

/// Copies the mapped buffer out so the V4L2 buffer can be requeued.
fn copy_pixels(pixels: &[u8], _: Option<()>) -> Result<Vec<u8>, Box<dyn StdError>> {
    Ok(pixels.to_vec())
}

/// A V4L2 capture device.
///
/// Must stay on the thread that opened it; create it inside the closure
/// given to [`crate::capture::CaptureTask::spawn`].
pub struct V4l2Camera {
    reader: CameraReader,
    device: String,
    format: PixelFormat,
}

impl V4l2Camera {
    /// Opens and starts `device` at the requested size and format.
    ///
    /// The driver may pick a different size; frames carry whatever it
    /// delivers.
    pub fn open(
        device: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
        mirror: Mirror,
    ) -> Result<Self> {
        let disconnected = |e: &dyn std::fmt::Display| {
            Error::Camera(CameraError::Disconnected(format!("{device}: {e}")))
        };
        let cam = create_camera()
            .with_device(device)
            .with_resolution(width as i32, height as i32)
            .with_format(FourCC(format.fourcc()))
            .with_mirror(mirror)
            .open()
            .map_err(|e| disconnected(&e))?;
        cam.start().map_err(|e| disconnected(&e))?;

        if cam.width() != width as i32 || cam.height() != height as i32 {
            warn!(
                "camera {device} requested {width}x{height} but driver chose {}x{}",
                cam.width(),
                cam.height()
            );
        }
        info!("camera {device} streaming {}x{} {format}", cam.width(), cam.height());

        Ok(Self {
            reader: cam,
            device: device.to_string(),
            format,
        })
    }

    /// A failed read on a node that no longer exists means the device is gone.
    fn classify(&self, detail: String) -> CameraError {
        if Path::new(&self.device).exists() {
            CameraError::Transient(detail)
        } else {
            CameraError::Disconnected(detail)
        }
    }
}

impl CameraSource for V4l2Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let buf = self
            .reader
            .read()
            .map_err(|e| self.classify(e.to_string()))?;
        let format = PixelFormat::from_fourcc(buf.format().0).unwrap_or(self.format);
        let fd = buf
            .fd()
            .try_clone_to_owned()
            .map_err(|e| CameraError::Transient(e.to_string()))?;
        let pixels = DmaBuf::from(fd)
            .memory_map()
            .map_err(|e| CameraError::Transient(e.to_string()))?
            .read(copy_pixels, None)
            .map_err(|e| CameraError::Transient(e.to_string()))?;
        Frame::new(pixels, buf.width() as u32, buf.height() as u32, format)
            .map_err(|e| CameraError::Transient(e.to_string()))
    }
}
