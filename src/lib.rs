// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Display Library
//!
//! This library shows a live camera feed on a hardware overlay layer of a
//! display driven by the VideoCore dispmanx firmware or by DRM/KMS planes. It covers the whole
//! path from the monitor's EDID to a double-buffered window updated once per
//! camera frame.
//!
//! ## Features
//!
//! - **EDID Parsing**: Validate EDID blocks and find the monitor's preferred
//!   mode.
//! - **Display Management**: Open displays, query their native mode and
//!   follow mode changes.
//! - **Overlay Windows**: Double-buffered windows on firmware layers with
//!   nearest/bilinear scaling and RGB/BGR channel conversion.
//! - **Frame Placement**: Centre, offset, crop and scale frames onto the
//!   display.
//! - **Capture**: A cancellable capture task that always hands the newest
//!   frame to the presenter, dropping frames it could not keep up with.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_display::{
//!     firmware::memory::MemoryFirmware, Compositor, CompositorConfig, Display, DisplayMode,
//!     Frame, PixelFormat,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let firmware = MemoryFirmware::new().with_display(0, DisplayMode::new(800, 600, 60), vec![1]);
//! let display = Display::open(Arc::new(firmware), 0)?;
//! let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
//!
//! let frame = Frame::new(vec![0; 640 * 480 * 3], 640, 480, PixelFormat::Rgb3)?;
//! let placement = compositor.update(&frame)?;
//! assert_eq!((placement.dst.x, placement.dst.y), (80, 60));
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Raspberry Pi**: `libbcm_host.so` for the dispmanx firmware backend,
//!   or `libdrm.so.2` and the `vc4` KMS driver for the DRM backend (the
//!   in-memory backend runs anywhere)
//! - **Linux**: V4L2 camera with DMA buffer export for [`camera`]
//!
//! ## Safety
//!
//! `unsafe` code is confined to the dispmanx and DRM backends, which call
//! into dynamically loaded system libraries.

pub mod blit;
pub mod camera;
pub mod capture;
pub mod compositor;
pub mod display;
pub mod edid;
pub mod error;
pub mod firmware;
pub mod format;
pub mod frame;
pub mod geometry;
pub mod mode;
pub mod pipeline;
pub mod window;

pub use compositor::{Compositor, CompositorConfig, Placement, Scale};
pub use display::Display;
pub use edid::Edid;
pub use error::{Error, ErrorKind, Result};
pub use format::{Color, PixelFormat};
pub use frame::{Frame, PixelBuffer};
pub use geometry::Rect;
pub use mode::DisplayMode;
pub use window::{Window, WindowOptions};
