// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Run-time bindings for the subset of `xf86drm.h` and `xf86drmMode.h` the
//! KMS backend uses.
//!
//! `libdrm` is opened with `dlopen` so the crate builds on hosts without it.

#![allow(non_camel_case_types, non_snake_case)]

use libc::{c_char, c_int, c_uint, c_ulong, c_void};
use libloading::Library;

pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0_c0c0;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeee_eeee;

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;
pub const DRM_MODE_CONNECTED: c_uint = 1;
pub const DRM_MODE_FLAG_INTERLACE: u32 = 1 << 4;

pub const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong = 0xc020_64b2;
pub const DRM_IOCTL_MODE_MAP_DUMB: c_ulong = 0xc010_64b3;
pub const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong = 0xc004_64b4;

pub const DRM_PROP_NAME_LEN: usize = 32;
pub const DRM_DISPLAY_MODE_LEN: usize = 32;

/// Builds a little endian DRM FourCC.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Memory order R, G, B.
pub const DRM_FORMAT_BGR888: u32 = fourcc(b"BG24");
/// Memory order B, G, R.
pub const DRM_FORMAT_RGB888: u32 = fourcc(b"RG24");
/// Memory order R, G, B, A.
pub const DRM_FORMAT_ABGR8888: u32 = fourcc(b"AB24");
/// Memory order R, G, B, X.
pub const DRM_FORMAT_XBGR8888: u32 = fourcc(b"XB24");
/// Memory order B, G, R, A.
pub const DRM_FORMAT_ARGB8888: u32 = fourcc(b"AR24");
/// Three planes, Y then U then V.
pub const DRM_FORMAT_YUV420: u32 = fourcc(b"YU12");

#[repr(C)]
pub struct drmModeRes {
    pub count_fbs: c_int,
    pub fbs: *mut u32,
    pub count_crtcs: c_int,
    pub crtcs: *mut u32,
    pub count_connectors: c_int,
    pub connectors: *mut u32,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct drmModeModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [c_char; DRM_DISPLAY_MODE_LEN],
}

#[repr(C)]
pub struct drmModeConnector {
    pub connector_id: u32,
    pub encoder_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: c_uint,
    pub mmWidth: u32,
    pub mmHeight: u32,
    pub subpixel: c_uint,
    pub count_modes: c_int,
    pub modes: *mut drmModeModeInfo,
    pub count_props: c_int,
    pub props: *mut u32,
    pub prop_values: *mut u64,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
}

#[repr(C)]
pub struct drmModeEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
pub struct drmModeCrtc {
    pub crtc_id: u32,
    pub buffer_id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub mode_valid: c_int,
    pub mode: drmModeModeInfo,
    pub gamma_size: c_int,
}

#[repr(C)]
pub struct drmModePlaneRes {
    pub count_planes: u32,
    pub planes: *mut u32,
}

#[repr(C)]
pub struct drmModePlane {
    pub count_formats: u32,
    pub formats: *mut u32,
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub crtc_x: u32,
    pub crtc_y: u32,
    pub x: u32,
    pub y: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
}

#[repr(C)]
pub struct drmModeObjectProperties {
    pub count_props: u32,
    pub props: *mut u32,
    pub prop_values: *mut u64,
}

#[repr(C)]
pub struct drmModePropertyRes {
    pub prop_id: u32,
    pub flags: u32,
    pub name: [c_char; DRM_PROP_NAME_LEN],
    pub count_values: c_int,
    pub values: *mut u64,
    pub count_enums: c_int,
    pub enums: *mut c_void,
    pub count_blobs: c_int,
    pub blob_ids: *mut u32,
}

#[repr(C)]
pub struct drmModePropertyBlobRes {
    pub id: u32,
    pub length: u32,
    pub data: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct drm_mode_destroy_dumb {
    pub handle: u32,
}

macro_rules! symbols {
    ($($name:ident: fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        /// Entry points resolved from `libdrm`.
        pub struct Libdrm {
            _library: Library,
            $(pub $name: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
        }

        impl Libdrm {
            /// Opens `path` and resolves every entry point.
            ///
            /// # Safety
            ///
            /// `path` must name a `libdrm` build matching the prototypes
            /// above; running its initialisers is up to the caller.
            pub unsafe fn new(path: &str) -> Result<Self, libloading::Error> {
                let library = Library::new(path)?;
                $(
                    let $name = *library.get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                        concat!(stringify!($name), "\0").as_bytes(),
                    )?;
                )*
                Ok(Self { _library: library, $($name,)* })
            }
        }
    };
}

symbols! {
    drmOpen: fn(*const c_char, *const c_char) -> c_int;
    drmClose: fn(c_int) -> c_int;
    drmGetCap: fn(c_int, u64, *mut u64) -> c_int;
    drmIoctl: fn(c_int, c_ulong, *mut c_void) -> c_int;
    drmModeGetResources: fn(c_int) -> *mut drmModeRes;
    drmModeFreeResources: fn(*mut drmModeRes);
    drmModeGetConnector: fn(c_int, u32) -> *mut drmModeConnector;
    drmModeFreeConnector: fn(*mut drmModeConnector);
    drmModeGetEncoder: fn(c_int, u32) -> *mut drmModeEncoder;
    drmModeFreeEncoder: fn(*mut drmModeEncoder);
    drmModeGetCrtc: fn(c_int, u32) -> *mut drmModeCrtc;
    drmModeFreeCrtc: fn(*mut drmModeCrtc);
    drmModeGetPlaneResources: fn(c_int) -> *mut drmModePlaneRes;
    drmModeFreePlaneResources: fn(*mut drmModePlaneRes);
    drmModeGetPlane: fn(c_int, u32) -> *mut drmModePlane;
    drmModeFreePlane: fn(*mut drmModePlane);
    drmModeSetPlane: fn(c_int, u32, u32, u32, u32, i32, i32, u32, u32, u32, u32, u32, u32) -> c_int;
    drmModeAddFB2: fn(c_int, u32, u32, u32, *const u32, *const u32, *const u32, *mut u32, u32) -> c_int;
    drmModeRmFB: fn(c_int, u32) -> c_int;
    drmModeObjectGetProperties: fn(c_int, u32, u32) -> *mut drmModeObjectProperties;
    drmModeFreeObjectProperties: fn(*mut drmModeObjectProperties);
    drmModeGetProperty: fn(c_int, u32) -> *mut drmModePropertyRes;
    drmModeFreeProperty: fn(*mut drmModePropertyRes);
    drmModeObjectSetProperty: fn(c_int, u32, u32, u32, u64) -> c_int;
    drmModeGetPropertyBlob: fn(c_int, u32) -> *mut drmModePropertyBlobRes;
    drmModeFreePropertyBlob: fn(*mut drmModePropertyBlobRes);
}

/// `count` elements at `ptr`, empty for a null pointer.
///
/// # Safety
///
/// A non-null `ptr` must point at `count` initialised elements that outlive
/// the returned slice.
pub unsafe fn array<'a, T>(ptr: *const T, count: impl TryInto<usize>) -> &'a [T] {
    let count = count.try_into().unwrap_or(0);
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count)
    }
}

/// Property name as bytes up to the first NUL.
pub fn prop_name(name: &[c_char; DRM_PROP_NAME_LEN]) -> &[u8] {
    // SAFETY: c_char and u8 have the same size and alignment.
    let bytes = unsafe { &*(name as *const [c_char; DRM_PROP_NAME_LEN] as *const [u8; DRM_PROP_NAME_LEN]) };
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_codes_match_drm_fourcc_h() {
        assert_eq!(DRM_FORMAT_BGR888, 0x3432_4742);
        assert_eq!(DRM_FORMAT_RGB888, 0x3432_4752);
        assert_eq!(DRM_FORMAT_ARGB8888, 0x3432_5241);
        assert_eq!(DRM_FORMAT_ABGR8888, 0x3432_4241);
        assert_eq!(DRM_FORMAT_YUV420, 0x3231_5559);
    }

    #[test]
    fn property_names_stop_at_nul() {
        let mut name = [0 as c_char; DRM_PROP_NAME_LEN];
        for (slot, byte) in name.iter_mut().zip(b"zpos") {
            *slot = *byte as c_char;
        }
        assert_eq!(prop_name(&name), b"zpos");
    }

    #[test]
    fn ioctl_structs_have_kernel_sizes() {
        // the size is encoded in bits 16..30 of the ioctl number
        let size = |ioctl: c_ulong| ((ioctl >> 16) & 0x3fff) as usize;
        assert_eq!(size(DRM_IOCTL_MODE_CREATE_DUMB), std::mem::size_of::<drm_mode_create_dumb>());
        assert_eq!(size(DRM_IOCTL_MODE_MAP_DUMB), std::mem::size_of::<drm_mode_map_dumb>());
        assert_eq!(size(DRM_IOCTL_MODE_DESTROY_DUMB), std::mem::size_of::<drm_mode_destroy_dumb>());
    }
}
