// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::format::PixelFormat;
use std::io;
use thiserror::Error;

/// Coarse classification of every [`Error`].
///
/// Resource, geometry and format errors are raised synchronously by the
/// failing call. Device errors come from the camera or the firmware and are
/// escalated to the pipeline supervisor. State errors mean the resource was
/// already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resource,
    Geometry,
    Format,
    Device,
    State,
}

/// Failures reported by a camera source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The read did not complete within the camera's own timeout.
    #[error("camera read timed out")]
    Timeout,

    /// A single read failed; the device is still usable.
    #[error("camera read failed: {0}")]
    Transient(String),

    /// The device is gone or wedged; further reads are pointless.
    #[error("camera disconnected: {0}")]
    Disconnected(String),
}

impl CameraError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CameraError::Disconnected(_))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid EDID: {0}")]
    InvalidEdid(String),

    #[error("display {display_num} unavailable: {reason}")]
    DisplayUnavailable { display_num: u32, reason: String },

    #[error("no free overlay layer for layer {layer} on display {display_num}")]
    LayerExhausted { display_num: u32, layer: i32 },

    #[error("layer {layer} is not exposed by the firmware (available: {available:?})")]
    InvalidLayer { layer: i32, available: Vec<i32> },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid scale: {0}")]
    InvalidScale(String),

    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("no conversion from {from} to {to}")]
    UnsupportedConversion { from: PixelFormat, to: PixelFormat },

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("camera failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: CameraError },

    #[error("firmware call {call} failed: {detail}")]
    Firmware { call: &'static str, detail: String },

    #[error("window closed")]
    WindowClosed,

    #[error("display closed")]
    DisplayClosed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DisplayUnavailable { .. }
            | Error::LayerExhausted { .. }
            | Error::InvalidLayer { .. } => ErrorKind::Resource,
            Error::InvalidGeometry(_) | Error::InvalidScale(_) => ErrorKind::Geometry,
            Error::InvalidEdid(_)
            | Error::UnsupportedFormat(_)
            | Error::UnsupportedConversion { .. }
            | Error::Json(_) => ErrorKind::Format,
            Error::Camera(_)
            | Error::RetriesExhausted { .. }
            | Error::Firmware { .. }
            | Error::Io(_) => ErrorKind::Device,
            Error::WindowClosed | Error::DisplayClosed => ErrorKind::State,
        }
    }

    pub(crate) fn firmware(call: &'static str, detail: impl Into<String>) -> Self {
        Error::Firmware {
            call,
            detail: detail.into(),
        }
    }

    pub(crate) fn geometry(detail: impl Into<String>) -> Self {
        Error::InvalidGeometry(detail.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
