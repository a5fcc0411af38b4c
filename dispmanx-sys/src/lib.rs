// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Low-level FFI bindings for the VideoCore IV dispmanx display manager.
//!
//! The bindings are resolved at run time from `libbcm_host.so` so that the
//! crate builds and links on hosts without the Raspberry Pi userland
//! libraries. Only the subset of `vc_dispmanx.h` and `vc_tvservice.h` needed
//! to drive overlay elements is exposed.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use libc::{c_int, c_void};

pub type DISPMANX_DISPLAY_HANDLE_T = u32;
pub type DISPMANX_UPDATE_HANDLE_T = u32;
pub type DISPMANX_ELEMENT_HANDLE_T = u32;
pub type DISPMANX_RESOURCE_HANDLE_T = u32;
pub type DISPMANX_PROTECTION_T = u32;
pub type DISPMANX_TRANSFORM_T = u32;
pub type DISPMANX_FLAGS_ALPHA_T = u32;
pub type DISPLAY_INPUT_FORMAT_T = u32;
pub type VC_IMAGE_TYPE_T = u32;

pub const DISPMANX_NO_HANDLE: u32 = 0;
pub const DISPMANX_SUCCESS: c_int = 0;
pub const DISPMANX_PROTECTION_NONE: DISPMANX_PROTECTION_T = 0;

pub const DISPMANX_NO_ROTATE: DISPMANX_TRANSFORM_T = 0;
pub const DISPMANX_ROTATE_90: DISPMANX_TRANSFORM_T = 1;
pub const DISPMANX_ROTATE_180: DISPMANX_TRANSFORM_T = 2;
pub const DISPMANX_ROTATE_270: DISPMANX_TRANSFORM_T = 3;
pub const DISPMANX_FLIP_HRIZ: DISPMANX_TRANSFORM_T = 1 << 16;
pub const DISPMANX_FLIP_VERT: DISPMANX_TRANSFORM_T = 1 << 17;

pub const DISPMANX_FLAGS_ALPHA_FROM_SOURCE: DISPMANX_FLAGS_ALPHA_T = 0;
pub const DISPMANX_FLAGS_ALPHA_FIXED_ALL_PIXELS: DISPMANX_FLAGS_ALPHA_T = 1;
pub const DISPMANX_FLAGS_ALPHA_FIXED_NON_ZERO: DISPMANX_FLAGS_ALPHA_T = 2;

pub const DISPLAY_INPUT_FORMAT_INVALID: DISPLAY_INPUT_FORMAT_T = 0;
pub const DISPLAY_INPUT_FORMAT_RGB888: DISPLAY_INPUT_FORMAT_T = 1;
pub const DISPLAY_INPUT_FORMAT_RGB565: DISPLAY_INPUT_FORMAT_T = 2;

pub const VC_IMAGE_YUV420: VC_IMAGE_TYPE_T = 3;
pub const VC_IMAGE_RGB888: VC_IMAGE_TYPE_T = 5;
pub const VC_IMAGE_RGBA32: VC_IMAGE_TYPE_T = 15;
pub const VC_IMAGE_BGR888: VC_IMAGE_TYPE_T = 31;
pub const VC_IMAGE_ARGB8888: VC_IMAGE_TYPE_T = 43;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VC_RECT_T {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VC_DISPMANX_ALPHA_T {
    pub flags: DISPMANX_FLAGS_ALPHA_T,
    pub opacity: u32,
    pub mask: DISPMANX_RESOURCE_HANDLE_T,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct DISPMANX_MODEINFO_T {
    pub width: i32,
    pub height: i32,
    pub transform: DISPMANX_TRANSFORM_T,
    pub input_format: DISPLAY_INPUT_FORMAT_T,
    pub display_num: u32,
}

/// Opaque clamp descriptor, only ever passed as a null pointer.
#[repr(C)]
pub struct DISPMANX_CLAMP_T {
    _private: [u8; 0],
}

pub struct bcm_host {
    __library: ::libloading::Library,
    pub bcm_host_init: Result<unsafe extern "C" fn(), ::libloading::Error>,
    pub bcm_host_deinit: Result<unsafe extern "C" fn(), ::libloading::Error>,
    pub vc_dispmanx_display_open:
        Result<unsafe extern "C" fn(device: u32) -> DISPMANX_DISPLAY_HANDLE_T, ::libloading::Error>,
    pub vc_dispmanx_display_close:
        Result<unsafe extern "C" fn(display: DISPMANX_DISPLAY_HANDLE_T) -> c_int, ::libloading::Error>,
    pub vc_dispmanx_display_get_info: Result<
        unsafe extern "C" fn(
            display: DISPMANX_DISPLAY_HANDLE_T,
            pinfo: *mut DISPMANX_MODEINFO_T,
        ) -> c_int,
        ::libloading::Error,
    >,
    pub vc_dispmanx_resource_create: Result<
        unsafe extern "C" fn(
            type_: VC_IMAGE_TYPE_T,
            width: u32,
            height: u32,
            native_image_handle: *mut u32,
        ) -> DISPMANX_RESOURCE_HANDLE_T,
        ::libloading::Error,
    >,
    pub vc_dispmanx_resource_write_data: Result<
        unsafe extern "C" fn(
            res: DISPMANX_RESOURCE_HANDLE_T,
            src_type: VC_IMAGE_TYPE_T,
            src_pitch: c_int,
            src_address: *mut c_void,
            rect: *const VC_RECT_T,
        ) -> c_int,
        ::libloading::Error,
    >,
    pub vc_dispmanx_resource_delete:
        Result<unsafe extern "C" fn(res: DISPMANX_RESOURCE_HANDLE_T) -> c_int, ::libloading::Error>,
    pub vc_dispmanx_update_start:
        Result<unsafe extern "C" fn(priority: i32) -> DISPMANX_UPDATE_HANDLE_T, ::libloading::Error>,
    pub vc_dispmanx_element_add: Result<
        unsafe extern "C" fn(
            update: DISPMANX_UPDATE_HANDLE_T,
            display: DISPMANX_DISPLAY_HANDLE_T,
            layer: i32,
            dest_rect: *const VC_RECT_T,
            src: DISPMANX_RESOURCE_HANDLE_T,
            src_rect: *const VC_RECT_T,
            protection: DISPMANX_PROTECTION_T,
            alpha: *mut VC_DISPMANX_ALPHA_T,
            clamp: *mut DISPMANX_CLAMP_T,
            transform: DISPMANX_TRANSFORM_T,
        ) -> DISPMANX_ELEMENT_HANDLE_T,
        ::libloading::Error,
    >,
    pub vc_dispmanx_element_change_source: Result<
        unsafe extern "C" fn(
            update: DISPMANX_UPDATE_HANDLE_T,
            element: DISPMANX_ELEMENT_HANDLE_T,
            src: DISPMANX_RESOURCE_HANDLE_T,
        ) -> c_int,
        ::libloading::Error,
    >,
    pub vc_dispmanx_element_change_layer: Result<
        unsafe extern "C" fn(
            update: DISPMANX_UPDATE_HANDLE_T,
            element: DISPMANX_ELEMENT_HANDLE_T,
            layer: i32,
        ) -> c_int,
        ::libloading::Error,
    >,
    pub vc_dispmanx_element_remove: Result<
        unsafe extern "C" fn(
            update: DISPMANX_UPDATE_HANDLE_T,
            element: DISPMANX_ELEMENT_HANDLE_T,
        ) -> c_int,
        ::libloading::Error,
    >,
    pub vc_dispmanx_update_submit_sync:
        Result<unsafe extern "C" fn(update: DISPMANX_UPDATE_HANDLE_T) -> c_int, ::libloading::Error>,
    pub vc_tv_hdmi_ddc_read: Result<
        unsafe extern "C" fn(offset: u32, length: u32, buffer: *mut u8) -> c_int,
        ::libloading::Error,
    >,
}

impl bcm_host {
    /// Loads the dispmanx entry points from the named shared library.
    ///
    /// # Safety
    ///
    /// Loading a shared library runs its initialisers. The caller must make
    /// sure `path` names the genuine VideoCore `libbcm_host`.
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr>,
    {
        let library = ::libloading::Library::new(path)?;
        Self::from_library(library)
    }

    /// # Safety
    ///
    /// See [`bcm_host::new`].
    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        let bcm_host_init = __library.get(b"bcm_host_init\0").map(|sym| *sym);
        let bcm_host_deinit = __library.get(b"bcm_host_deinit\0").map(|sym| *sym);
        let vc_dispmanx_display_open = __library
            .get(b"vc_dispmanx_display_open\0")
            .map(|sym| *sym);
        let vc_dispmanx_display_close = __library
            .get(b"vc_dispmanx_display_close\0")
            .map(|sym| *sym);
        let vc_dispmanx_display_get_info = __library
            .get(b"vc_dispmanx_display_get_info\0")
            .map(|sym| *sym);
        let vc_dispmanx_resource_create = __library
            .get(b"vc_dispmanx_resource_create\0")
            .map(|sym| *sym);
        let vc_dispmanx_resource_write_data = __library
            .get(b"vc_dispmanx_resource_write_data\0")
            .map(|sym| *sym);
        let vc_dispmanx_resource_delete = __library
            .get(b"vc_dispmanx_resource_delete\0")
            .map(|sym| *sym);
        let vc_dispmanx_update_start = __library
            .get(b"vc_dispmanx_update_start\0")
            .map(|sym| *sym);
        let vc_dispmanx_element_add = __library
            .get(b"vc_dispmanx_element_add\0")
            .map(|sym| *sym);
        let vc_dispmanx_element_change_source = __library
            .get(b"vc_dispmanx_element_change_source\0")
            .map(|sym| *sym);
        let vc_dispmanx_element_change_layer = __library
            .get(b"vc_dispmanx_element_change_layer\0")
            .map(|sym| *sym);
        let vc_dispmanx_element_remove = __library
            .get(b"vc_dispmanx_element_remove\0")
            .map(|sym| *sym);
        let vc_dispmanx_update_submit_sync = __library
            .get(b"vc_dispmanx_update_submit_sync\0")
            .map(|sym| *sym);
        let vc_tv_hdmi_ddc_read = __library.get(b"vc_tv_hdmi_ddc_read\0").map(|sym| *sym);
        Ok(bcm_host {
            __library,
            bcm_host_init,
            bcm_host_deinit,
            vc_dispmanx_display_open,
            vc_dispmanx_display_close,
            vc_dispmanx_display_get_info,
            vc_dispmanx_resource_create,
            vc_dispmanx_resource_write_data,
            vc_dispmanx_resource_delete,
            vc_dispmanx_update_start,
            vc_dispmanx_element_add,
            vc_dispmanx_element_change_source,
            vc_dispmanx_element_change_layer,
            vc_dispmanx_element_remove,
            vc_dispmanx_update_submit_sync,
            vc_tv_hdmi_ddc_read,
        })
    }

    pub unsafe fn bcm_host_init(&self) {
        (self
            .bcm_host_init
            .as_ref()
            .expect("Expected function, got error."))()
    }

    pub unsafe fn bcm_host_deinit(&self) {
        (self
            .bcm_host_deinit
            .as_ref()
            .expect("Expected function, got error."))()
    }

    pub unsafe fn vc_dispmanx_display_open(&self, device: u32) -> DISPMANX_DISPLAY_HANDLE_T {
        (self
            .vc_dispmanx_display_open
            .as_ref()
            .expect("Expected function, got error."))(device)
    }

    pub unsafe fn vc_dispmanx_display_close(&self, display: DISPMANX_DISPLAY_HANDLE_T) -> c_int {
        (self
            .vc_dispmanx_display_close
            .as_ref()
            .expect("Expected function, got error."))(display)
    }

    pub unsafe fn vc_dispmanx_display_get_info(
        &self,
        display: DISPMANX_DISPLAY_HANDLE_T,
        pinfo: *mut DISPMANX_MODEINFO_T,
    ) -> c_int {
        (self
            .vc_dispmanx_display_get_info
            .as_ref()
            .expect("Expected function, got error."))(display, pinfo)
    }

    pub unsafe fn vc_dispmanx_resource_create(
        &self,
        type_: VC_IMAGE_TYPE_T,
        width: u32,
        height: u32,
        native_image_handle: *mut u32,
    ) -> DISPMANX_RESOURCE_HANDLE_T {
        (self
            .vc_dispmanx_resource_create
            .as_ref()
            .expect("Expected function, got error."))(
            type_, width, height, native_image_handle
        )
    }

    pub unsafe fn vc_dispmanx_resource_write_data(
        &self,
        res: DISPMANX_RESOURCE_HANDLE_T,
        src_type: VC_IMAGE_TYPE_T,
        src_pitch: c_int,
        src_address: *mut c_void,
        rect: *const VC_RECT_T,
    ) -> c_int {
        (self
            .vc_dispmanx_resource_write_data
            .as_ref()
            .expect("Expected function, got error."))(
            res, src_type, src_pitch, src_address, rect
        )
    }

    pub unsafe fn vc_dispmanx_resource_delete(&self, res: DISPMANX_RESOURCE_HANDLE_T) -> c_int {
        (self
            .vc_dispmanx_resource_delete
            .as_ref()
            .expect("Expected function, got error."))(res)
    }

    pub unsafe fn vc_dispmanx_update_start(&self, priority: i32) -> DISPMANX_UPDATE_HANDLE_T {
        (self
            .vc_dispmanx_update_start
            .as_ref()
            .expect("Expected function, got error."))(priority)
    }

    #[allow(clippy::too_many_arguments)]
    pub unsafe fn vc_dispmanx_element_add(
        &self,
        update: DISPMANX_UPDATE_HANDLE_T,
        display: DISPMANX_DISPLAY_HANDLE_T,
        layer: i32,
        dest_rect: *const VC_RECT_T,
        src: DISPMANX_RESOURCE_HANDLE_T,
        src_rect: *const VC_RECT_T,
        protection: DISPMANX_PROTECTION_T,
        alpha: *mut VC_DISPMANX_ALPHA_T,
        clamp: *mut DISPMANX_CLAMP_T,
        transform: DISPMANX_TRANSFORM_T,
    ) -> DISPMANX_ELEMENT_HANDLE_T {
        (self
            .vc_dispmanx_element_add
            .as_ref()
            .expect("Expected function, got error."))(
            update, display, layer, dest_rect, src, src_rect, protection, alpha, clamp,
            transform,
        )
    }

    pub unsafe fn vc_dispmanx_element_change_source(
        &self,
        update: DISPMANX_UPDATE_HANDLE_T,
        element: DISPMANX_ELEMENT_HANDLE_T,
        src: DISPMANX_RESOURCE_HANDLE_T,
    ) -> c_int {
        (self
            .vc_dispmanx_element_change_source
            .as_ref()
            .expect("Expected function, got error."))(update, element, src)
    }

    pub unsafe fn vc_dispmanx_element_change_layer(
        &self,
        update: DISPMANX_UPDATE_HANDLE_T,
        element: DISPMANX_ELEMENT_HANDLE_T,
        layer: i32,
    ) -> c_int {
        (self
            .vc_dispmanx_element_change_layer
            .as_ref()
            .expect("Expected function, got error."))(update, element, layer)
    }

    pub unsafe fn vc_dispmanx_element_remove(
        &self,
        update: DISPMANX_UPDATE_HANDLE_T,
        element: DISPMANX_ELEMENT_HANDLE_T,
    ) -> c_int {
        (self
            .vc_dispmanx_element_remove
            .as_ref()
            .expect("Expected function, got error."))(update, element)
    }

    pub unsafe fn vc_dispmanx_update_submit_sync(&self, update: DISPMANX_UPDATE_HANDLE_T) -> c_int {
        (self
            .vc_dispmanx_update_submit_sync
            .as_ref()
            .expect("Expected function, got error."))(update)
    }

    pub unsafe fn vc_tv_hdmi_ddc_read(&self, offset: u32, length: u32, buffer: *mut u8) -> c_int {
        (self
            .vc_tv_hdmi_ddc_read
            .as_ref()
            .expect("Expected function, got error."))(offset, length, buffer)
    }
}

/// Fills a `VC_RECT_T`, equivalent to `vc_dispmanx_rect_set`.
pub const fn vc_rect(x: i32, y: i32, width: i32, height: i32) -> VC_RECT_T {
    VC_RECT_T {
        x,
        y,
        width,
        height,
    }
}

/// Source rectangles passed to `vc_dispmanx_element_add` are in 16.16 fixed
/// point.
pub const fn vc_rect_fixed(x: i32, y: i32, width: i32, height: i32) -> VC_RECT_T {
    VC_RECT_T {
        x: x << 16,
        y: y << 16,
        width: width << 16,
        height: height << 16,
    }
}
