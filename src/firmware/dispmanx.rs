// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{DisplayId, ElementHandle, ElementSpec, Firmware, ResourceHandle, UpdateHandle};
use crate::{
    edid::BLOCK_SIZE,
    error::{Error, Result},
    format::{BufferLayout, PixelFormat},
    geometry::{AlphaMode, Rect},
    mode::{DisplayMode, InputFormat, Transform},
};
use dispmanx_sys::{
    bcm_host, vc_rect, vc_rect_fixed, DISPMANX_FLAGS_ALPHA_FIXED_ALL_PIXELS,
    DISPMANX_FLAGS_ALPHA_FIXED_NON_ZERO, DISPMANX_FLAGS_ALPHA_FROM_SOURCE, DISPMANX_MODEINFO_T,
    DISPMANX_NO_HANDLE, DISPMANX_NO_ROTATE, DISPMANX_PROTECTION_NONE, DISPMANX_SUCCESS,
    VC_DISPMANX_ALPHA_T, VC_IMAGE_ARGB8888, VC_IMAGE_BGR888, VC_IMAGE_RGB888, VC_IMAGE_RGBA32,
    VC_IMAGE_TYPE_T, VC_IMAGE_YUV420, VC_RECT_T,
};
use std::{
    collections::HashSet,
    ptr::null_mut,
    sync::Mutex,
};
use tracing::{debug, info};

/// Default library name of the VideoCore userland.
pub const LIBBCM_HOST: &str = "libbcm_host.so";

/// Update priority passed to `vc_dispmanx_update_start`.
const UPDATE_PRIORITY: i32 = 10;

/// Firmware backed by the VideoCore dispmanx API.
pub struct DispmanxFirmware {
    lib: bcm_host,
    layers: Vec<i32>,
    claimed: Mutex<HashSet<u32>>,
}

impl DispmanxFirmware {
    /// Loads `libbcm_host` and initialises the VideoCore host interface.
    ///
    /// `layers` lists the z-order values windows may use. Dispmanx accepts
    /// any 32 bit layer, so the set of overlay slots is a deployment choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded or lacks one of the
    /// required entry points.
    pub fn new(library: &str, layers: Vec<i32>) -> Result<Self> {
        let lib = unsafe { bcm_host::new(library) }
            .map_err(|e| Error::firmware("dlopen", format!("{library}: {e}")))?;
        let required = [
            ("bcm_host_init", lib.bcm_host_init.is_ok()),
            ("vc_dispmanx_display_open", lib.vc_dispmanx_display_open.is_ok()),
            ("vc_dispmanx_display_close", lib.vc_dispmanx_display_close.is_ok()),
            (
                "vc_dispmanx_display_get_info",
                lib.vc_dispmanx_display_get_info.is_ok(),
            ),
            (
                "vc_dispmanx_resource_create",
                lib.vc_dispmanx_resource_create.is_ok(),
            ),
            (
                "vc_dispmanx_resource_write_data",
                lib.vc_dispmanx_resource_write_data.is_ok(),
            ),
            (
                "vc_dispmanx_resource_delete",
                lib.vc_dispmanx_resource_delete.is_ok(),
            ),
            ("vc_dispmanx_update_start", lib.vc_dispmanx_update_start.is_ok()),
            ("vc_dispmanx_element_add", lib.vc_dispmanx_element_add.is_ok()),
            (
                "vc_dispmanx_element_change_source",
                lib.vc_dispmanx_element_change_source.is_ok(),
            ),
            (
                "vc_dispmanx_element_change_layer",
                lib.vc_dispmanx_element_change_layer.is_ok(),
            ),
            ("vc_dispmanx_element_remove", lib.vc_dispmanx_element_remove.is_ok()),
            (
                "vc_dispmanx_update_submit_sync",
                lib.vc_dispmanx_update_submit_sync.is_ok(),
            ),
        ];
        if let Some((name, _)) = required.iter().find(|(_, found)| !found) {
            return Err(Error::firmware("dlsym", format!("{library} lacks {name}")));
        }
        unsafe { lib.bcm_host_init() };
        info!("dispmanx initialised from {library} with layers {layers:?}");
        Ok(Self {
            lib,
            layers,
            claimed: Mutex::new(HashSet::new()),
        })
    }

    fn check(call: &'static str, ret: i32) -> Result<()> {
        if ret != DISPMANX_SUCCESS {
            return Err(Error::firmware(call, format!("returned {ret}")));
        }
        Ok(())
    }

    fn claimed(&self) -> std::sync::MutexGuard<'_, HashSet<u32>> {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DispmanxFirmware {
    fn drop(&mut self) {
        if self.lib.bcm_host_deinit.is_ok() {
            unsafe { self.lib.bcm_host_deinit() };
            debug!("dispmanx deinitialised");
        }
    }
}

fn image_type(format: PixelFormat) -> Result<VC_IMAGE_TYPE_T> {
    match format {
        PixelFormat::Rgb3 => Ok(VC_IMAGE_RGB888),
        PixelFormat::Bgr3 => Ok(VC_IMAGE_BGR888),
        // RGBX padding is always written as 0xff, so it reads as opaque alpha
        PixelFormat::Rgba | PixelFormat::Rgbx => Ok(VC_IMAGE_RGBA32),
        // little endian ARGB words are B, G, R, A in memory
        PixelFormat::Bgra => Ok(VC_IMAGE_ARGB8888),
        PixelFormat::Yu12 => Ok(VC_IMAGE_YUV420),
        other => Err(Error::UnsupportedFormat(other)),
    }
}

impl From<Rect> for VC_RECT_T {
    fn from(r: Rect) -> Self {
        vc_rect(r.x, r.y, r.width, r.height)
    }
}

fn transform(raw: u32) -> Transform {
    match raw & 0x3 {
        1 => Transform::Rotate90,
        2 => Transform::Rotate180,
        3 => Transform::Rotate270,
        _ if raw & dispmanx_sys::DISPMANX_FLIP_HRIZ != 0 => Transform::FlipHorizontal,
        _ if raw & dispmanx_sys::DISPMANX_FLIP_VERT != 0 => Transform::FlipVertical,
        _ => Transform::None,
    }
}

impl Firmware for DispmanxFirmware {
    fn name(&self) -> &'static str {
        "dispmanx"
    }

    fn open_display(&self, display_num: u32) -> Result<DisplayId> {
        let mut claimed = self.claimed();
        if claimed.contains(&display_num) {
            return Err(Error::DisplayUnavailable {
                display_num,
                reason: "already claimed".to_string(),
            });
        }
        let handle = unsafe { self.lib.vc_dispmanx_display_open(display_num) };
        if handle == DISPMANX_NO_HANDLE {
            return Err(Error::DisplayUnavailable {
                display_num,
                reason: "vc_dispmanx_display_open failed".to_string(),
            });
        }
        claimed.insert(display_num);
        Ok(DisplayId(handle))
    }

    fn display_mode(&self, display: DisplayId) -> Result<DisplayMode> {
        let mut info = DISPMANX_MODEINFO_T::default();
        Self::check("vc_dispmanx_display_get_info", unsafe {
            self.lib.vc_dispmanx_display_get_info(display.0, &mut info)
        })?;
        let mut mode = DisplayMode::new(info.width.max(0) as u32, info.height.max(0) as u32, 0);
        mode.input_format = match info.input_format {
            dispmanx_sys::DISPLAY_INPUT_FORMAT_RGB888 => InputFormat::Rgb888,
            dispmanx_sys::DISPLAY_INPUT_FORMAT_RGB565 => InputFormat::Rgb565,
            _ => InputFormat::Invalid,
        };
        mode.transform = transform(info.transform);
        Ok(mode)
    }

    fn close_display(&self, display: DisplayId) -> Result<()> {
        let mut info = DISPMANX_MODEINFO_T::default();
        let num = match unsafe { self.lib.vc_dispmanx_display_get_info(display.0, &mut info) } {
            DISPMANX_SUCCESS => Some(info.display_num),
            _ => None,
        };
        Self::check("vc_dispmanx_display_close", unsafe {
            self.lib.vc_dispmanx_display_close(display.0)
        })?;
        let mut claimed = self.claimed();
        match num {
            Some(num) => {
                claimed.remove(&num);
            }
            // Single output boards only ever claim one display.
            None if claimed.len() == 1 => claimed.clear(),
            None => {}
        }
        Ok(())
    }

    fn layer_slots(&self, _display_num: u32) -> Vec<i32> {
        self.layers.clone()
    }

    fn read_edid(&self, display_num: u32) -> Result<Vec<u8>> {
        if display_num != 0 {
            return Err(Error::firmware(
                "vc_tv_hdmi_ddc_read",
                format!("HDMI DDC only reaches display 0, not {display_num}"),
            ));
        }
        if self.lib.vc_tv_hdmi_ddc_read.is_err() {
            return Err(Error::firmware("vc_tv_hdmi_ddc_read", "symbol not found"));
        }
        let mut edid = vec![0u8; BLOCK_SIZE];
        let read = |offset: usize, buf: &mut [u8]| -> Result<()> {
            let ret = unsafe {
                self.lib
                    .vc_tv_hdmi_ddc_read(offset as u32, buf.len() as u32, buf.as_mut_ptr())
            };
            if ret < buf.len() as i32 {
                return Err(Error::firmware(
                    "vc_tv_hdmi_ddc_read",
                    format!("read {ret} of {} bytes at {offset}", buf.len()),
                ));
            }
            Ok(())
        };
        read(0, &mut edid)?;
        // byte 126 of the base block counts the extension blocks
        let extensions = edid[126] as usize;
        edid.resize(BLOCK_SIZE * (1 + extensions), 0);
        for block in 1..=extensions {
            let offset = block * BLOCK_SIZE;
            read(offset, &mut edid[offset..offset + BLOCK_SIZE])?;
        }
        Ok(edid)
    }

    fn create_resource(&self, layout: &BufferLayout) -> Result<ResourceHandle> {
        let kind = image_type(layout.format)?;
        let mut native = 0u32;
        let handle = unsafe {
            self.lib
                .vc_dispmanx_resource_create(kind, layout.width, layout.height, &mut native)
        };
        if handle == DISPMANX_NO_HANDLE {
            return Err(Error::firmware(
                "vc_dispmanx_resource_create",
                format!("{}x{} {}", layout.width, layout.height, layout.format),
            ));
        }
        Ok(ResourceHandle(handle))
    }

    fn write_resource(
        &self,
        resource: ResourceHandle,
        layout: &BufferLayout,
        data: &[u8],
    ) -> Result<()> {
        if data.len() < layout.size() {
            return Err(Error::firmware(
                "vc_dispmanx_resource_write_data",
                format!("{} bytes is short of {}", data.len(), layout.size()),
            ));
        }
        let kind = image_type(layout.format)?;
        let rect: VC_RECT_T = Rect::sized(layout.width, layout.height).into();
        // The firmware only reads from src_address despite the mutable
        // pointer in its prototype.
        Self::check("vc_dispmanx_resource_write_data", unsafe {
            self.lib.vc_dispmanx_resource_write_data(
                resource.0,
                kind,
                layout.pitch as i32,
                data.as_ptr() as *mut _,
                &rect,
            )
        })
    }

    fn delete_resource(&self, resource: ResourceHandle) -> Result<()> {
        Self::check("vc_dispmanx_resource_delete", unsafe {
            self.lib.vc_dispmanx_resource_delete(resource.0)
        })
    }

    fn update_start(&self) -> Result<UpdateHandle> {
        let handle = unsafe { self.lib.vc_dispmanx_update_start(UPDATE_PRIORITY) };
        if handle == DISPMANX_NO_HANDLE {
            return Err(Error::firmware("vc_dispmanx_update_start", "no handle"));
        }
        Ok(UpdateHandle(handle))
    }

    fn element_add(&self, update: UpdateHandle, element: &ElementSpec) -> Result<ElementHandle> {
        let dst: VC_RECT_T = element.dst.into();
        let src = vc_rect_fixed(
            element.src.x,
            element.src.y,
            element.src.width,
            element.src.height,
        );
        let mut alpha = VC_DISPMANX_ALPHA_T {
            flags: match element.alpha.mode {
                AlphaMode::FromSource => DISPMANX_FLAGS_ALPHA_FROM_SOURCE,
                AlphaMode::FixedAllPixels => DISPMANX_FLAGS_ALPHA_FIXED_ALL_PIXELS,
                AlphaMode::FixedNonZero => DISPMANX_FLAGS_ALPHA_FIXED_NON_ZERO,
            },
            opacity: element.alpha.opacity as u32,
            mask: element.alpha.mask.map_or(DISPMANX_NO_HANDLE, |m| m.0),
        };
        let handle = unsafe {
            self.lib.vc_dispmanx_element_add(
                update.0,
                element.display.0,
                element.layer,
                &dst,
                element.resource.0,
                &src,
                DISPMANX_PROTECTION_NONE,
                &mut alpha,
                null_mut(),
                DISPMANX_NO_ROTATE,
            )
        };
        if handle == DISPMANX_NO_HANDLE {
            return Err(Error::firmware(
                "vc_dispmanx_element_add",
                format!("layer {} at {}", element.layer, element.dst),
            ));
        }
        Ok(ElementHandle(handle))
    }

    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()> {
        Self::check("vc_dispmanx_element_change_source", unsafe {
            self.lib
                .vc_dispmanx_element_change_source(update.0, element.0, resource.0)
        })
    }

    fn element_change_layer(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        layer: i32,
    ) -> Result<()> {
        Self::check("vc_dispmanx_element_change_layer", unsafe {
            self.lib
                .vc_dispmanx_element_change_layer(update.0, element.0, layer)
        })
    }

    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()> {
        Self::check("vc_dispmanx_element_remove", unsafe {
            self.lib.vc_dispmanx_element_remove(update.0, element.0)
        })
    }

    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()> {
        Self::check("vc_dispmanx_update_submit_sync", unsafe {
            self.lib.vc_dispmanx_update_submit_sync(update.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_window_format_has_an_image_type() {
        for format in PixelFormat::ALL.into_iter().filter(|f| f.is_blittable()) {
            assert!(image_type(format).is_ok(), "{format} has no image type");
        }
        assert!(image_type(PixelFormat::Nv12).is_err());
    }
}
