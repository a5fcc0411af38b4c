// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Placement of camera frames on the display.
//!
//! The compositor owns one full-screen window and, for every frame, works
//! out which part of the frame to show ([`Placement::src`]) and where it goes
//! ([`Placement::dst`]):
//!
//! 1. The source is the whole frame, or the configured crop intersected
//!    with it.
//! 2. The render size is the preferred size when one is set, else the source
//!    size. A [`Scale::Factor`] multiplies it; [`Scale::Auto`] fits the source
//!    aspect ratio into the preferred size (or the display) instead.
//! 3. The render rectangle is centred on the display, moved by the configured
//!    offset and shifted back inside the display.
//!
//! A render size larger than the display is clamped to the display and the
//! source is cropped by the same proportion, keeping the image unsquashed.

use crate::{
    blit::ScaleFilter,
    display::{Display, DisplayShared},
    error::{Error, Result},
    format::{Color, PixelFormat},
    frame::Frame,
    geometry::{AlphaSpec, Rect},
    window::{Window, WindowCloser, WindowOptions},
};
use serde::{Deserialize, Serialize};
use std::{fmt, fs::File, io::BufReader, path::Path, str::FromStr, sync::Arc};
use tracing::{debug, error, info, instrument, warn};

/// How the render size is derived from the source size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Show the source at the preferred size, or 1:1 without one
    #[default]
    None,
    /// Multiply the render size
    Factor(f64),
    /// Fit into the preferred size (or the display) keeping aspect ratio
    Auto,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scale::None => write!(f, "none"),
            Scale::Factor(factor) => write!(f, "{factor}"),
            Scale::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Scale::None),
            "auto" => Ok(Scale::Auto),
            factor => factor
                .parse::<f64>()
                .map(Scale::Factor)
                .map_err(|e| format!("scale must be none, auto or a number: {e}")),
        }
    }
}

/// Displacement of the render rectangle from the display centre.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Vertical, positive moves down
    pub h: i32,
    /// Horizontal, positive moves right
    pub w: i32,
}

/// Layout and window settings of a [`Compositor`].
///
/// Immutable once handed over; replace it with [`Compositor::reconfigure`].
/// Missing fields in a JSON layout take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub preferred_size: Option<(u32, u32)>,
    pub scale: Scale,
    pub offset: Offset,
    pub crop: Option<Rect>,
    pub layer: i32,
    pub format: PixelFormat,
    pub filter: ScaleFilter,
    pub background: Color,
    pub opacity: u8,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            preferred_size: None,
            scale: Scale::None,
            offset: Offset::default(),
            crop: None,
            layer: 1,
            format: PixelFormat::Rgb3,
            filter: ScaleFilter::Bilinear,
            background: Color::BLACK,
            opacity: 255,
        }
    }
}

impl CompositorConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some((w, h)) = self.preferred_size {
            if w == 0 || h == 0 {
                return Err(Error::InvalidScale(format!("preferred size {w}x{h} is empty")));
            }
            if w > MAX_RENDER || h > MAX_RENDER {
                return Err(Error::InvalidScale(format!("preferred size {w}x{h} is too large")));
            }
        }
        if let Scale::Factor(factor) = self.scale {
            if !factor.is_finite() || factor <= 0.0 || factor > MAX_RENDER as f64 {
                return Err(Error::InvalidScale(format!("scale factor {factor}")));
            }
        }
        if let Some(crop) = self.crop {
            if crop.is_degenerate() {
                return Err(Error::geometry(format!("crop {crop} is empty")));
            }
        }
        if !self.format.is_blittable() {
            return Err(Error::UnsupportedFormat(self.format));
        }
        Ok(())
    }

    /// Reads a JSON layout file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: CompositorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    fn window_options(&self) -> WindowOptions {
        WindowOptions {
            format: self.format,
            filter: self.filter,
            alpha: AlphaSpec::with_opacity(self.opacity),
            background: self.background,
        }
    }
}

/// Largest render width or height, the range of a [`Rect`] coordinate.
const MAX_RENDER: u32 = i32::MAX as u32;

/// Where a frame lands: `src` of the frame is scaled into `dst` of the
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub src: Rect,
    pub dst: Rect,
}

/// Computes the placement of a `frame` sized image for `config` on a
/// `display` sized output.
pub fn layout(frame: (u32, u32), config: &CompositorConfig, display: (u32, u32)) -> Result<Placement> {
    let full = Rect::sized(frame.0, frame.1);
    if full.is_degenerate() {
        return Err(Error::geometry(format!("empty {}x{} frame", frame.0, frame.1)));
    }
    if display.0 == 0 || display.1 == 0 {
        return Err(Error::geometry(format!(
            "display size {}x{} unknown",
            display.0, display.1
        )));
    }
    let src = match config.crop {
        Some(crop) => crop.intersect(&full).ok_or_else(|| {
            Error::geometry(format!("crop {crop} outside {full} frame"))
        })?,
        None => full,
    };

    let (sw, sh) = (src.width as i64, src.height as i64);
    let (mut rw, mut rh) = config
        .preferred_size
        .map_or((sw, sh), |(w, h)| (w as i64, h as i64));
    match config.scale {
        Scale::None => {}
        Scale::Factor(factor) => {
            rw = (rw as f64 * factor).round() as i64;
            rh = (rh as f64 * factor).round() as i64;
        }
        Scale::Auto => {
            let (bw, bh) = config.preferred_size.unwrap_or(display);
            let (bw, bh) = (bw as i128, bh as i128);
            let (sw, sh) = (sw as i128, sh as i128);
            let (w, h) = if bw * sh <= bh * sw {
                (bw, sh * bw / sw)
            } else {
                (sw * bh / sh, bh)
            };
            rw = w.min(i64::MAX as i128) as i64;
            rh = h.min(i64::MAX as i128) as i64;
        }
    }
    if rw <= 0 || rh <= 0 {
        return Err(Error::InvalidScale(format!("render size {rw}x{rh} is empty")));
    }
    if rw > MAX_RENDER as i64 || rh > MAX_RENDER as i64 {
        return Err(Error::InvalidScale(format!("render size {rw}x{rh} is too large")));
    }

    let (dw, dh) = (display.0 as i64, display.1 as i64);
    let x = (dw - rw) / 2 + config.offset.w as i64;
    let y = (dh - rh) / 2 + config.offset.h as i64;
    let horizontal = fit_axis(x, rw, dw, src.x as i64, sw);
    let vertical = fit_axis(y, rh, dh, src.y as i64, sh);

    Ok(Placement {
        src: Rect::new(
            horizontal.src_pos as i32,
            vertical.src_pos as i32,
            horizontal.src_len as i32,
            vertical.src_len as i32,
        ),
        dst: Rect::new(
            horizontal.pos as i32,
            vertical.pos as i32,
            horizontal.len as i32,
            vertical.len as i32,
        ),
    })
}

struct Axis {
    pos: i64,
    len: i64,
    src_pos: i64,
    src_len: i64,
}

/// Shifts `[pos, pos + len)` inside `[0, bound)`. When it cannot fit, keeps
/// the part that lands on the display and the matching part of the source.
fn fit_axis(pos: i64, len: i64, bound: i64, src_pos: i64, src_len: i64) -> Axis {
    if len <= bound {
        return Axis {
            pos: pos.clamp(0, bound - len),
            len,
            src_pos,
            src_len,
        };
    }
    let hidden = -pos.clamp(bound - len, 0);
    let (wide_hidden, wide_len, wide_src) = (hidden as i128, len as i128, src_len as i128);
    let start = (wide_hidden * wide_src / wide_len) as i64;
    let end = ((wide_hidden + bound as i128) * wide_src + wide_len - 1) / wide_len;
    let end = (end as i64).min(src_len);
    Axis {
        pos: 0,
        len: bound,
        src_pos: src_pos + start,
        src_len: (end - start).max(1),
    }
}

fn open_window(display: &Arc<DisplayShared>, config: &CompositorConfig, size: (u32, u32)) -> Result<Window> {
    Window::open(display, Rect::sized(size.0, size.1), config.layer, config.window_options())
}

/// Presents frames on a display according to a [`CompositorConfig`].
pub struct Compositor {
    display: Arc<DisplayShared>,
    window: Window,
    config: CompositorConfig,
    display_size: (u32, u32),
    last_dst: Option<Rect>,
    needs_clear: bool,
    /// Why the window could not be restored after a failed reopen.
    lost: Option<String>,
}

impl Compositor {
    /// Opens a full-screen window on `display` for `config`.
    pub fn new(display: &Display, config: CompositorConfig) -> Result<Self> {
        config.validate()?;
        let display_size = display.size()?;
        let window = open_window(display.shared(), &config, display_size)?;
        let display_num = display.display_num();
        info!(
            "compositor on display {} {}x{} scale {}",
            display_num,
            display_size.0,
            display_size.1,
            config.scale
        );
        Ok(Self {
            display: display.shared().clone(),
            window,
            config,
            display_size,
            last_dst: None,
            needs_clear: true,
            lost: None,
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Native size of the display being composited onto.
    pub fn size(&self) -> (u32, u32) {
        self.display_size
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Placement `update` would use for `frame`.
    pub fn layout(&self, frame: &Frame) -> Result<Placement> {
        layout(frame.size(), &self.config, self.display_size)
    }

    /// Draws `frame` and makes it visible on the next vertical blank.
    ///
    /// Fails with a device error while the window is lost after a failed
    /// reopen.
    #[instrument(skip_all, fields(sequence = frame.sequence()))]
    pub fn update(&mut self, frame: &Frame) -> Result<Placement> {
        if let Some(reason) = &self.lost {
            return Err(Error::firmware("window_open", reason.clone()));
        }
        let placement = self.layout(frame)?;
        if self.needs_clear || self.last_dst != Some(placement.dst) {
            self.window.clear(self.config.background)?;
            self.needs_clear = false;
        }
        self.window.blit(
            &frame.buffer(),
            placement.src,
            placement.dst,
            frame.format(),
        )?;
        self.last_dst = Some(placement.dst);
        self.window.swap_layer()?;
        Ok(placement)
    }

    /// Replaces the configuration.
    ///
    /// The new configuration is validated first; on error the old one stays
    /// in effect. A new layer moves the window, a new format or opacity
    /// reopens it.
    pub fn reconfigure(&mut self, config: CompositorConfig) -> Result<()> {
        config.validate()?;
        if config.format != self.config.format
            || config.opacity != self.config.opacity
            || self.lost.is_some()
        {
            self.reopen(&config, self.display_size)?;
        } else if config.layer != self.config.layer {
            self.window.set_layer(config.layer)?;
        }
        self.window.set_filter(config.filter);
        info!("compositor reconfigured: {config:?}");
        self.config = config;
        self.needs_clear = true;
        Ok(())
    }

    /// Re-reads the display mode and follows a resolution change.
    ///
    /// Also retries a window lost to an earlier failed reopen. Returns
    /// whether the window was rebuilt.
    pub fn sync_display_mode(&mut self) -> Result<bool> {
        let mode = self.display.refresh_mode()?;
        if mode.size() == self.display_size && self.lost.is_none() {
            return Ok(false);
        }
        let config = self.config.clone();
        self.reopen(&config, mode.size())?;
        Ok(true)
    }

    /// Replaces the window with one for `config` covering `size`, the
    /// display's current size.
    ///
    /// On failure the old configuration is restored at `size`. When that
    /// fails too the window is lost and `update` reports it until a later
    /// reopen succeeds.
    fn reopen(&mut self, config: &CompositorConfig, size: (u32, u32)) -> Result<()> {
        // The old window gives up its layer before the new one claims it.
        self.window.close();
        self.last_dst = None;
        self.needs_clear = true;
        let err = match open_window(&self.display, config, size) {
            Ok(window) => {
                debug!("compositor window reopened at {}x{}", size.0, size.1);
                self.window = window;
                self.display_size = size;
                self.lost = None;
                return Ok(());
            }
            Err(e) => e,
        };
        warn!("reopening compositor window failed: {err}");
        self.display_size = size;
        match open_window(&self.display, &self.config, size) {
            Ok(window) => {
                info!("compositor window restored at {}x{}", size.0, size.1);
                self.window = window;
                self.lost = None;
            }
            Err(restore) => {
                error!("restoring compositor window failed: {restore}");
                self.lost = Some(format!("reopen failed with {err}, restore with {restore}"));
            }
        }
        Err(err)
    }

    /// Handle that closes the compositor's window from another thread.
    pub fn closer(&self) -> WindowCloser {
        self.window.closer()
    }

    pub fn close(&mut self) {
        self.window.close();
    }
}
