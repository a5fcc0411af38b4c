// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Double-buffered overlay windows.
//!
//! A window owns one firmware element on a claimed layer and two pixel
//! resources. The element always shows the front resource. Drawing goes to a
//! CPU canvas; [`Window::swap_layer`] uploads the canvas into the back
//! resource and points the element at it in a single update, after which the
//! two resources trade roles.

use crate::{
    blit::{self, ScaleFilter},
    display::{DisplayShared, LayerClaim},
    error::{Error, Result},
    firmware::{Element, ElementSpec, Resource, Update},
    format::{BufferLayout, Color, PixelFormat},
    frame::PixelBuffer,
    geometry::{AlphaSpec, Rect},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use tracing::{debug, info, instrument};

/// Options for [`crate::Display::open_window_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    pub format: PixelFormat,
    pub filter: ScaleFilter,
    pub alpha: AlphaSpec,
    /// Initial contents of both buffers
    pub background: Color,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            format: PixelFormat::Rgb3,
            filter: ScaleFilter::Bilinear,
            alpha: AlphaSpec::opaque(),
            background: Color::BLACK,
        }
    }
}

// Field order is drop order: the element goes before its resources, the
// layer is released last.
struct WindowHw {
    element: Element,
    front: Resource,
    back: Resource,
    layer: LayerClaim,
}

/// Part of a window reachable from other threads.
pub(crate) struct WindowShared {
    closed: AtomicBool,
    hw: Mutex<Option<WindowHw>>,
}

impl WindowShared {
    fn lock(&self) -> MutexGuard<'_, Option<WindowHw>> {
        self.hw.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let hw = self.lock().take();
        if let Some(hw) = hw {
            let layer = hw.layer.layer();
            drop(hw);
            debug!("window on layer {layer} closed");
        }
    }
}

/// A rectangular overlay on one layer of a [`crate::Display`].
///
/// Owned by one thread; use [`Window::closer`] to close it from another.
pub struct Window {
    shared: Arc<WindowShared>,
    display: Arc<DisplayShared>,
    rect: Rect,
    layout: BufferLayout,
    canvas: Vec<u8>,
    filter: ScaleFilter,
    alpha: AlphaSpec,
    layer: i32,
    dirty: bool,
    swaps: u64,
}

impl Window {
    pub(crate) fn open(
        display: &Arc<DisplayShared>,
        rect: Rect,
        layer: i32,
        options: WindowOptions,
    ) -> Result<Self> {
        if !options.format.is_blittable() {
            return Err(Error::UnsupportedFormat(options.format));
        }
        let (shared, layout, canvas) = display.with_open(|id, mode| {
            let bounds = Rect::sized(mode.width, mode.height);
            if rect.is_degenerate() || !bounds.contains(&rect) {
                return Err(Error::geometry(format!(
                    "window {rect} does not fit display {} ({bounds})",
                    display.display_num
                )));
            }

            let claim = display.claim_layer(layer)?;
            let (width, height) = rect.size();
            let layout = BufferLayout::new(options.format, width, height);
            let mut canvas = vec![0; layout.size()];
            blit::fill(&mut canvas, &layout, Rect::sized(width, height), options.background);

            let front = Resource::new(display.firmware.clone(), layout)?;
            front.write(&canvas)?;
            let back = Resource::new(display.firmware.clone(), layout)?;
            back.write(&canvas)?;
            let element = Element::add(
                display.firmware.clone(),
                &ElementSpec {
                    display: id,
                    layer,
                    dst: rect,
                    resource: front.handle(),
                    src: Rect::sized(width, height),
                    alpha: options.alpha,
                },
            )?;

            let shared = Arc::new(WindowShared {
                closed: AtomicBool::new(false),
                hw: Mutex::new(Some(WindowHw {
                    element,
                    front,
                    back,
                    layer: claim,
                })),
            });
            display.register(Arc::downgrade(&shared));
            Ok((shared, layout, canvas))
        })?;

        let display_num = display.display_num;
        info!(
            "window {rect} {} opened on display {display_num} layer {layer}",
            options.format
        );
        Ok(Self {
            shared,
            display: display.clone(),
            rect,
            layout,
            canvas,
            filter: options.filter,
            alpha: options.alpha,
            layer,
            dirty: false,
            swaps: 0,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.is_closed() {
            Err(Error::WindowClosed)
        } else {
            Ok(())
        }
    }

    /// Destination on the display.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn size(&self) -> (u32, u32) {
        (self.layout.width, self.layout.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    pub fn filter(&self) -> ScaleFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: ScaleFilter) {
        self.filter = filter;
    }

    pub fn alpha(&self) -> AlphaSpec {
        self.alpha
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn display_num(&self) -> u32 {
        self.display.display_num
    }

    pub fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Number of swaps that reached the display.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    /// Copies `src_rect` of `src` into `dst_rect` of the back buffer,
    /// scaling with the window's filter when the sizes differ.
    #[instrument(skip_all, level = "trace")]
    pub fn blit(
        &mut self,
        src: &PixelBuffer,
        src_rect: Rect,
        dst_rect: Rect,
        format: PixelFormat,
    ) -> Result<()> {
        self.ensure_open()?;
        blit::check_conversion(format, self.layout.format)?;
        src.validate(format)?;
        if src_rect.is_degenerate() || !src.rect().contains(&src_rect) {
            return Err(Error::geometry(format!(
                "source {src_rect} outside {}x{} buffer",
                src.width, src.height
            )));
        }
        let canvas_rect = Rect::sized(self.layout.width, self.layout.height);
        if dst_rect.is_degenerate() || !canvas_rect.contains(&dst_rect) {
            return Err(Error::geometry(format!(
                "destination {dst_rect} outside {canvas_rect} window"
            )));
        }

        blit::scale(
            src,
            format,
            src_rect,
            &mut self.canvas,
            &self.layout,
            dst_rect,
            self.filter,
        );
        self.dirty = true;
        // A close that raced the copy wins.
        self.ensure_open()
    }

    /// Fills the whole back buffer with `color`.
    pub fn clear(&mut self, color: Color) -> Result<()> {
        self.ensure_open()?;
        let all = Rect::sized(self.layout.width, self.layout.height);
        blit::fill(&mut self.canvas, &self.layout, all, color);
        self.dirty = true;
        Ok(())
    }

    /// Moves the window to another layer without touching its buffers.
    pub fn set_layer(&mut self, layer: i32) -> Result<()> {
        self.ensure_open()?;
        if layer == self.layer {
            return Ok(());
        }
        let mut hw = self.shared.lock();
        let hw = hw.as_mut().ok_or(Error::WindowClosed)?;
        let claim = self.display.claim_layer(layer)?;
        let mut update = Update::start(self.display.firmware.as_ref())?;
        update.change_layer(hw.element.handle(), layer)?;
        update.submit()?;
        // Dropping the old claim gives its slot back.
        hw.layer = claim;
        debug!("window {} moved from layer {} to {layer}", self.rect, self.layer);
        self.layer = layer;
        Ok(())
    }

    /// Makes everything drawn since the last swap visible.
    ///
    /// Waits for the vertical blank. Without any blit or clear since the
    /// last swap nothing is submitted and the visible buffer stays.
    #[instrument(skip_all, level = "trace")]
    pub fn swap_layer(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.dirty {
            return Ok(());
        }
        let mut guard = self.shared.lock();
        let hw = guard.as_mut().ok_or(Error::WindowClosed)?;
        hw.back.write(&self.canvas)?;
        let mut update = Update::start(self.display.firmware.as_ref())?;
        update.change_source(hw.element.handle(), hw.back.handle())?;
        update.submit()?;
        std::mem::swap(&mut hw.front, &mut hw.back);
        self.dirty = false;
        self.swaps += 1;
        Ok(())
    }

    /// [`Window::blit`] followed by [`Window::swap_layer`].
    pub fn update(
        &mut self,
        src: &PixelBuffer,
        src_rect: Rect,
        dst_rect: Rect,
        format: PixelFormat,
    ) -> Result<()> {
        self.blit(src, src_rect, dst_rect, format)?;
        self.swap_layer()
    }

    /// Releases the layer and both buffers. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.shared.close();
    }

    /// Handle that closes this window from any thread.
    pub fn closer(&self) -> WindowCloser {
        WindowCloser {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Closes a [`Window`] from a thread other than its owner.
///
/// Blits and swaps in flight on the owning thread then fail with
/// [`Error::WindowClosed`].
#[derive(Clone)]
pub struct WindowCloser {
    shared: Arc<WindowShared>,
}

impl WindowCloser {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}
