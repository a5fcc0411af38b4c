// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    edid::Edid,
    error::{Error, Result},
    firmware::{DisplayId, Firmware},
    geometry::Rect,
    mode::DisplayMode,
    window::{Window, WindowOptions, WindowShared},
};
use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, Weak},
};
use tracing::{debug, info, warn};

struct OpenDisplay {
    id: DisplayId,
    mode: DisplayMode,
}

struct LayerPool {
    slots: Vec<i32>,
    claimed: BTreeSet<i32>,
}

/// State shared between a [`Display`], its closers and its windows.
pub(crate) struct DisplayShared {
    pub(crate) firmware: Arc<dyn Firmware>,
    pub(crate) display_num: u32,
    open: Mutex<Option<OpenDisplay>>,
    layers: Mutex<LayerPool>,
    windows: Mutex<Vec<Weak<WindowShared>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl DisplayShared {
    /// Firmware handle and mode of the display, failing once it is closed.
    pub(crate) fn current(&self) -> Result<(DisplayId, DisplayMode)> {
        lock(&self.open)
            .as_ref()
            .map(|o| (o.id, o.mode))
            .ok_or(Error::DisplayClosed)
    }

    /// Runs `f` with the display held open.
    ///
    /// A concurrent [`DisplayCloser::close`] waits for `f`, so a window
    /// registered inside it is always seen and closed by that close.
    pub(crate) fn with_open<T>(
        &self,
        f: impl FnOnce(DisplayId, DisplayMode) -> Result<T>,
    ) -> Result<T> {
        let open = lock(&self.open);
        let open = open.as_ref().ok_or(Error::DisplayClosed)?;
        f(open.id, open.mode)
    }

    pub(crate) fn refresh_mode(&self) -> Result<DisplayMode> {
        let mut open = lock(&self.open);
        let open = open.as_mut().ok_or(Error::DisplayClosed)?;
        let mode = self.firmware.display_mode(open.id)?;
        if mode != open.mode {
            info!(
                "display {} mode changed {} -> {mode}",
                self.display_num, open.mode
            );
            open.mode = mode;
        }
        Ok(mode)
    }

    pub(crate) fn is_open(&self) -> bool {
        lock(&self.open).is_some()
    }

    /// Reserves overlay layer `layer`.
    pub(crate) fn claim_layer(self: &Arc<Self>, layer: i32) -> Result<LayerClaim> {
        let mut pool = lock(&self.layers);
        let free = pool
            .slots
            .iter()
            .filter(|slot| !pool.claimed.contains(slot))
            .count();
        if free == 0 || pool.claimed.contains(&layer) {
            return Err(Error::LayerExhausted {
                display_num: self.display_num,
                layer,
            });
        }
        if !pool.slots.contains(&layer) {
            return Err(Error::InvalidLayer {
                layer,
                available: pool.slots.clone(),
            });
        }
        pool.claimed.insert(layer);
        debug!("display {} layer {layer} claimed", self.display_num);
        Ok(LayerClaim {
            display: self.clone(),
            layer,
        })
    }

    pub(crate) fn register(&self, window: Weak<WindowShared>) {
        let mut windows = lock(&self.windows);
        windows.retain(|w| w.strong_count() > 0);
        windows.push(window);
    }

    fn close(&self) {
        // Held until the firmware display is gone; windows opening now
        // either registered already or will find the display closed.
        let mut open = lock(&self.open);
        let windows: Vec<Arc<WindowShared>> = lock(&self.windows)
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();
        if !windows.is_empty() {
            debug!(
                "closing {} window(s) left open on display {}",
                windows.len(),
                self.display_num
            );
        }
        for window in windows {
            window.close();
        }
        if let Some(open) = open.take() {
            match self.firmware.close_display(open.id) {
                Ok(()) => info!("display {} closed", self.display_num),
                Err(e) => warn!("closing display {} failed: {e}", self.display_num),
            }
        }
    }
}

impl Drop for DisplayShared {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reservation of one overlay layer, returned to the pool on drop.
pub(crate) struct LayerClaim {
    display: Arc<DisplayShared>,
    layer: i32,
}

impl LayerClaim {
    pub(crate) fn layer(&self) -> i32 {
        self.layer
    }
}

impl Drop for LayerClaim {
    fn drop(&mut self) {
        lock(&self.display.layers).claimed.remove(&self.layer);
        let display_num = self.display.display_num;
        debug!("display {display_num} layer {} released", self.layer);
    }
}

/// An opened physical output.
///
/// At most one `Display` exists per display number. Dropping or closing it
/// closes every window still open on it.
///
/// # Example
///
/// ```no_run
/// use edgefirst_display::{firmware::memory::MemoryFirmware, Display, DisplayMode};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let firmware = MemoryFirmware::new().with_display(0, DisplayMode::new(800, 600, 60), vec![1]);
/// let display = Display::open(Arc::new(firmware), 0)?;
/// assert_eq!(display.size()?, (800, 600));
/// # Ok(())
/// # }
/// ```
pub struct Display {
    shared: Arc<DisplayShared>,
}

impl Display {
    /// Opens display `display_num`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisplayUnavailable`] if the firmware has no such
    /// output or it is already open. If the mode query fails after the
    /// firmware opened the display, the display is closed again before the
    /// error is returned.
    pub fn open(firmware: Arc<dyn Firmware>, display_num: u32) -> Result<Self> {
        let id = firmware.open_display(display_num)?;
        let mode = match firmware.display_mode(id) {
            Ok(mode) => mode,
            Err(e) => {
                if let Err(close) = firmware.close_display(id) {
                    warn!("closing display {display_num} after failed mode query: {close}");
                }
                return Err(e);
            }
        };
        let slots = firmware.layer_slots(display_num);
        info!(
            "display {display_num} opened on {} firmware: {mode} layers {slots:?}",
            firmware.name()
        );
        Ok(Self {
            shared: Arc::new(DisplayShared {
                firmware,
                display_num,
                open: Mutex::new(Some(OpenDisplay { id, mode })),
                layers: Mutex::new(LayerPool {
                    slots,
                    claimed: BTreeSet::new(),
                }),
                windows: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn display_num(&self) -> u32 {
        self.shared.display_num
    }

    pub fn firmware(&self) -> &Arc<dyn Firmware> {
        &self.shared.firmware
    }

    /// Current mode as last reported by the firmware.
    pub fn info(&self) -> Result<DisplayMode> {
        self.shared.current().map(|(_, mode)| mode)
    }

    /// Native resolution as `(width, height)`.
    pub fn size(&self) -> Result<(u32, u32)> {
        self.info().map(|mode| mode.size())
    }

    /// Re-queries the firmware after a mode change.
    pub fn refresh_mode(&self) -> Result<DisplayMode> {
        self.shared.refresh_mode()
    }

    /// EDID of the attached monitor, as read through the firmware.
    pub fn edid(&self) -> Result<Edid> {
        let bytes = self.shared.firmware.read_edid(self.shared.display_num)?;
        Edid::parse(&bytes)
    }

    /// Layer slots exposed by the firmware for this display.
    pub fn layer_slots(&self) -> Vec<i32> {
        lock(&self.shared.layers).slots.clone()
    }

    /// Layer slots not held by any window.
    pub fn free_layers(&self) -> Vec<i32> {
        let pool = lock(&self.shared.layers);
        pool.slots
            .iter()
            .copied()
            .filter(|slot| !pool.claimed.contains(slot))
            .collect()
    }

    /// Opens a window with default options, see [`Window`].
    pub fn open_window(&self, rect: Rect, layer: i32) -> Result<Window> {
        Window::open(&self.shared, rect, layer, WindowOptions::default())
    }

    pub fn open_window_with(&self, rect: Rect, layer: i32, options: WindowOptions) -> Result<Window> {
        Window::open(&self.shared, rect, layer, options)
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Closes the display and every window on it. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.shared.close();
    }

    /// Handle that can close this display from another thread.
    pub fn closer(&self) -> DisplayCloser {
        DisplayCloser {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<DisplayShared> {
        &self.shared
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Closes a [`Display`] from a thread other than its owner.
#[derive(Clone)]
pub struct DisplayCloser {
    shared: Weak<DisplayShared>,
}

impl DisplayCloser {
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.close();
        }
    }
}
