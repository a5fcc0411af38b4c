// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The native display service.
//!
//! [`Firmware`] mirrors the dispmanx model: displays are opened by number,
//! pixel resources are allocated and written from the CPU, and elements
//! (resource + destination + layer + alpha) are added, changed and removed
//! inside update transactions that the firmware applies atomically on the
//! next vertical blank.
//!
//! Raw handles are wrapped in owning types ([`Resource`], [`Element`],
//! [`Update`]) that release the firmware object when dropped, so every early
//! return during acquisition gives back what was already taken.
//!
//! [`dispmanx`] drives the VideoCore firmware compositor, [`drm`] the KMS
//! planes of boards running the full KMS driver, and [`memory`] keeps
//! everything in process for tests and virtual displays.

pub mod dispmanx;
pub mod drm;
pub mod libdrm;
pub mod memory;

use crate::{
    error::{Error, Result},
    format::BufferLayout,
    geometry::{AlphaSpec, Rect},
    mode::DisplayMode,
};
use std::{fmt, sync::Arc};
use tracing::warn;

/// Native display stack driving the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Pick from the board's firmware type
    Auto,
    /// VideoCore dispmanx (legacy firmware graphics)
    Dispmanx,
    /// DRM/KMS planes (full KMS driver)
    Drm,
}

impl Backend {
    /// Backend for a board firmware type.
    ///
    /// Buster images (and boards that do not say) keep the firmware
    /// compositor, bullseye images run full KMS.
    pub fn for_firmware_type(firmware_type: Option<&str>) -> Result<Backend> {
        match firmware_type {
            None | Some("raspberrypi-buster") => Ok(Backend::Dispmanx),
            Some("raspberrypi-bullseye") => Ok(Backend::Drm),
            Some(other) => Err(Error::DisplayUnavailable {
                display_num: 0,
                reason: format!("firmware type {other} is not supported"),
            }),
        }
    }

    /// Resolves [`Backend::Auto`] from `firmware_type`.
    pub fn resolve(self, firmware_type: Option<&str>) -> Result<Backend> {
        match self {
            Backend::Auto => Backend::for_firmware_type(firmware_type),
            chosen => Ok(chosen),
        }
    }
}

/// Firmware handle of an opened display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u32);

/// Firmware handle of a pixel resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u32);

/// Firmware handle of an element on a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u32);

/// Firmware handle of a pending update transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateHandle(pub u32);

/// Everything the firmware needs to place a resource on a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSpec {
    pub display: DisplayId,
    pub layer: i32,
    pub dst: Rect,
    pub resource: ResourceHandle,
    pub src: Rect,
    pub alpha: AlphaSpec,
}

/// Native display/firmware service.
///
/// Implementations must reject a second `open_display` for a display number
/// that is still open, so that at most one [`crate::Display`] exists per
/// physical output.
pub trait Firmware: Send + Sync {
    fn name(&self) -> &'static str;

    fn open_display(&self, display_num: u32) -> Result<DisplayId>;
    fn display_mode(&self, display: DisplayId) -> Result<DisplayMode>;
    fn close_display(&self, display: DisplayId) -> Result<()>;

    /// Overlay layers (z-order values) available for windows on a display.
    fn layer_slots(&self, display_num: u32) -> Vec<i32>;

    /// Raw EDID of the monitor attached to a display.
    fn read_edid(&self, display_num: u32) -> Result<Vec<u8>>;

    fn create_resource(&self, layout: &BufferLayout) -> Result<ResourceHandle>;
    fn write_resource(
        &self,
        resource: ResourceHandle,
        layout: &BufferLayout,
        data: &[u8],
    ) -> Result<()>;
    fn delete_resource(&self, resource: ResourceHandle) -> Result<()>;

    fn update_start(&self) -> Result<UpdateHandle>;
    fn element_add(&self, update: UpdateHandle, element: &ElementSpec) -> Result<ElementHandle>;
    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()>;
    fn element_change_layer(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        layer: i32,
    ) -> Result<()>;
    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()>;

    /// Applies the update and waits for the vertical blank that shows it.
    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()>;
}

impl fmt::Debug for dyn Firmware {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Firmware({})", self.name())
    }
}

/// An update transaction.
///
/// Dispmanx has no way to abandon an update, so dropping an unsubmitted
/// update still submits it; the changes queued so far become visible
/// together.
pub struct Update<'a> {
    firmware: &'a dyn Firmware,
    handle: Option<UpdateHandle>,
}

impl<'a> Update<'a> {
    pub fn start(firmware: &'a dyn Firmware) -> Result<Self> {
        let handle = firmware.update_start()?;
        Ok(Self {
            firmware,
            handle: Some(handle),
        })
    }

    fn handle(&self) -> UpdateHandle {
        // Only `submit` takes the handle and it consumes `self`.
        self.handle.unwrap_or(UpdateHandle(0))
    }

    pub fn add(&mut self, element: &ElementSpec) -> Result<ElementHandle> {
        self.firmware.element_add(self.handle(), element)
    }

    pub fn change_source(&mut self, element: ElementHandle, resource: ResourceHandle) -> Result<()> {
        self.firmware
            .element_change_source(self.handle(), element, resource)
    }

    pub fn change_layer(&mut self, element: ElementHandle, layer: i32) -> Result<()> {
        self.firmware
            .element_change_layer(self.handle(), element, layer)
    }

    pub fn remove(&mut self, element: ElementHandle) -> Result<()> {
        self.firmware.element_remove(self.handle(), element)
    }

    pub fn submit(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.firmware.update_submit_sync(handle),
            None => Ok(()),
        }
    }
}

impl Drop for Update<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.firmware.update_submit_sync(handle) {
                warn!("submitting abandoned update failed: {e}");
            }
        }
    }
}

/// An owned pixel resource, deleted on drop.
pub struct Resource {
    firmware: Arc<dyn Firmware>,
    handle: ResourceHandle,
    layout: BufferLayout,
}

impl Resource {
    pub fn new(firmware: Arc<dyn Firmware>, layout: BufferLayout) -> Result<Self> {
        let handle = firmware.create_resource(&layout)?;
        Ok(Self {
            firmware,
            handle,
            layout,
        })
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.firmware.write_resource(self.handle, &self.layout, data)
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        if let Err(e) = self.firmware.delete_resource(self.handle) {
            warn!("failed to delete resource {:?}: {e}", self.handle);
        }
    }
}

/// An owned element, removed from its display on drop.
pub struct Element {
    firmware: Arc<dyn Firmware>,
    handle: ElementHandle,
}

impl Element {
    /// Adds `spec` to the display and waits until it is visible.
    pub fn add(firmware: Arc<dyn Firmware>, spec: &ElementSpec) -> Result<Self> {
        let mut update = Update::start(firmware.as_ref())?;
        let handle = update.add(spec)?;
        let element = Self {
            firmware: firmware.clone(),
            handle,
        };
        update.submit()?;
        Ok(element)
    }

    pub fn handle(&self) -> ElementHandle {
        self.handle
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        let removed = Update::start(self.firmware.as_ref()).and_then(|mut update| {
            update.remove(self.handle)?;
            update.submit()
        });
        if let Err(e) = removed {
            warn!("failed to remove element {:?}: {e}", self.handle);
        }
    }
}
