// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_display::{
    blit::ScaleFilter,
    capture::RetryPolicy,
    compositor::{CompositorConfig, Offset, Scale},
    error::Result,
    firmware::Backend,
    format::{Color, PixelFormat},
    geometry::Rect,
};
use std::{path::PathBuf, time::Duration};
use videostream::camera::Mirror;

/// Camera image mirroring options.
///
/// Determines how the camera image should be flipped before it is shown.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum MirrorSetting {
    /// No mirroring
    None,
    /// Flip horizontally (left-right)
    Horizontal,
    /// Flip vertically (top-bottom)
    Vertical,
    /// Flip both horizontally and vertically (180-degree rotation)
    Both,
}

impl From<MirrorSetting> for Mirror {
    fn from(mirror: MirrorSetting) -> Self {
        match mirror {
            MirrorSetting::None => Mirror::None,
            MirrorSetting::Horizontal => Mirror::Horizontal,
            MirrorSetting::Vertical => Mirror::Vertical,
            MirrorSetting::Both => Mirror::Both,
        }
    }
}

/// Command-line arguments for EdgeFirst Display.
///
/// Every option can also be given through the environment variable named
/// next to it.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-display --camera /dev/video0 --scale auto --layer 2
///
/// # Via environment variables
/// export CAMERA=/dev/video0
/// export SCALE=auto
/// edgefirst-display
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "CAMERA", default_value = "/dev/video0")]
    pub camera: String,

    /// Camera capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Camera pixel format as a FourCC (RGB3, BGR3, RGBA, BGRA, RGBX, YU12)
    #[arg(long, env = "CAMERA_FORMAT", default_value = "RGB3")]
    pub camera_format: PixelFormat,

    /// Camera image mirroring setting
    #[arg(long, env = "MIRROR", default_value = "none", value_enum)]
    pub mirror: MirrorSetting,

    /// Display number to present on
    #[arg(short, long, env = "DISPLAY_NUM", default_value = "0")]
    pub display: u32,

    /// Overlay layer (z-order) of the camera window
    #[arg(short, long, env = "LAYER", default_value = "1")]
    pub layer: i32,

    /// Overlay layers the firmware exposes for windows (the drm backend
    /// uses the planes' zpos instead)
    #[arg(
        long,
        env = "LAYERS",
        default_value = "1 2 3 4",
        value_delimiter = ' ',
        num_args = 1..
    )]
    pub layers: Vec<i32>,

    /// Render size in pixels (width height), defaults to the monitor's
    /// preferred mode when scaling automatically
    #[arg(long, env = "PREFERRED_SIZE", value_delimiter = ' ', num_args = 2)]
    pub preferred_size: Option<Vec<u32>>,

    /// Scaling: none, auto, or a factor such as 1.5
    #[arg(long, env = "SCALE", default_value = "none")]
    pub scale: Scale,

    /// Offset of the image from the display centre in pixels (height width)
    #[arg(
        long,
        env = "OFFSET",
        default_value = "0 0",
        value_delimiter = ' ',
        num_args = 2,
        allow_negative_numbers = true
    )]
    pub offset: Vec<i32>,

    /// Region of the camera image to show (x y width height)
    #[arg(long, env = "CROP", value_delimiter = ' ', num_args = 4)]
    pub crop: Option<Vec<i32>>,

    /// Scaling filter
    #[arg(long, env = "FILTER", default_value = "bilinear", value_enum)]
    pub filter: ScaleFilter,

    /// Background colour around the image (#rrggbb)
    #[arg(long, env = "BACKGROUND", default_value = "#000000")]
    pub background: Color,

    /// JSON layout file overriding the layout options, re-read on SIGHUP
    #[arg(long, env = "LAYOUT")]
    pub layout: Option<PathBuf>,

    /// Read the monitor EDID from this file instead of the firmware
    #[arg(long, env = "EDID")]
    pub edid: Option<PathBuf>,

    /// Native display backend
    #[arg(long, env = "BACKEND", default_value = "auto", value_enum)]
    pub backend: Backend,

    /// Board firmware type used to pick the backend automatically
    /// (raspberrypi-buster or raspberrypi-bullseye)
    #[arg(long, env = "ACTCAST_FIRMWARE_TYPE")]
    pub firmware_type: Option<String>,

    /// DRM driver to open with the drm backend
    #[arg(long, env = "DRM_DRIVER", default_value = "vc4")]
    pub drm_driver: String,

    /// Present on an in-memory display of this size (width height) instead
    /// of the firmware
    #[arg(long, env = "VIRTUAL_DISPLAY", value_delimiter = ' ', num_args = 2)]
    pub virtual_display: Option<Vec<u32>>,

    /// Consecutive camera read failures tolerated before giving up
    #[arg(long, env = "RETRIES", default_value = "5")]
    pub retries: u32,

    /// Delay between camera read retries in milliseconds
    #[arg(long, env = "RETRY_DELAY", default_value = "100")]
    pub retry_delay: u64,

    /// Enable verbose debug logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retries,
            backoff: Duration::from_millis(self.retry_delay),
        }
    }

    /// Compositor configuration from the command line, or from the layout
    /// file when one is given. `preferred` fills in the render size for
    /// automatic scaling when none was set.
    pub fn compositor_config(&self, preferred: Option<(u32, u32)>) -> Result<CompositorConfig> {
        let mut config = match &self.layout {
            Some(path) => CompositorConfig::from_json_file(path)?,
            None => CompositorConfig {
                preferred_size: self.preferred_size.as_ref().map(|s| (s[0], s[1])),
                scale: self.scale,
                offset: Offset {
                    h: self.offset[0],
                    w: self.offset[1],
                },
                crop: self
                    .crop
                    .as_ref()
                    .map(|c| Rect::new(c[0], c[1], c[2], c[3])),
                layer: self.layer,
                format: self.camera_format,
                filter: self.filter,
                background: self.background,
                ..Default::default()
            },
        };
        if config.preferred_size.is_none() && config.scale == Scale::Auto {
            config.preferred_size = preferred;
        }
        config.validate()?;
        Ok(config)
    }
}
