// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Firmware backed by DRM/KMS, for boards running the full KMS `vc4`
//! driver where dispmanx is gone.
//!
//! Resources are dumb buffers wrapped in framebuffers, mapped for CPU
//! writes. Every hardware plane attached to the connected CRTC is an
//! overlay slot whose layer is the plane's `zpos`. Element changes are
//! queued per update and applied with `drmModeSetPlane` on submit.

use super::{
    libdrm::{self, array, prop_name, Libdrm},
    DisplayId, ElementHandle, ElementSpec, Firmware, ResourceHandle, UpdateHandle,
};
use crate::{
    error::{Error, Result},
    format::{BufferLayout, Plane, PixelFormat},
    geometry::{AlphaMode, Rect},
    mode::DisplayMode,
};
use libc::c_int;
use std::{
    collections::HashMap,
    ffi::CString,
    ptr::null,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

/// Default library name of libdrm.
pub const LIBDRM: &str = "libdrm.so.2";

/// Kernel driver opened by default.
pub const VC4_DRIVER: &str = "vc4";

/// A hardware plane usable for windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSlot {
    pub id: u32,
    pub zpos: i32,
    /// `alpha` property id, when the plane supports plane-wide alpha.
    pub alpha: Option<u32>,
    pub in_use: bool,
}

/// Index of the free plane whose `zpos` is `layer`.
pub fn pick_plane(planes: &[PlaneSlot], layer: i32) -> Result<usize> {
    planes
        .iter()
        .position(|p| !p.in_use && p.zpos == layer)
        .ok_or_else(|| Error::InvalidLayer {
            layer,
            available: free_layers(planes),
        })
}

/// Sorted `zpos` values of the free planes.
pub fn free_layers(planes: &[PlaneSlot]) -> Vec<i32> {
    let mut layers: Vec<i32> = planes.iter().filter(|p| !p.in_use).map(|p| p.zpos).collect();
    layers.sort_unstable();
    layers
}

/// DRM FourCC holding `format` with the same byte order in memory.
pub fn drm_format(format: PixelFormat) -> Result<u32> {
    match format {
        PixelFormat::Rgb3 => Ok(libdrm::DRM_FORMAT_BGR888),
        PixelFormat::Bgr3 => Ok(libdrm::DRM_FORMAT_RGB888),
        PixelFormat::Rgba => Ok(libdrm::DRM_FORMAT_ABGR8888),
        PixelFormat::Rgbx => Ok(libdrm::DRM_FORMAT_XBGR8888),
        PixelFormat::Bgra => Ok(libdrm::DRM_FORMAT_ARGB8888),
        PixelFormat::Yu12 => Ok(libdrm::DRM_FORMAT_YUV420),
        other => Err(Error::UnsupportedFormat(other)),
    }
}

/// Geometry of the dumb buffer backing `layout`: width, rows and bits per
/// pixel.
pub fn dumb_geometry(layout: &BufferLayout) -> (u32, u32, u32) {
    match layout.format {
        // luma rows followed by two chroma planes of half the rows at half
        // the pitch
        PixelFormat::Yu12 => (
            layout.width,
            layout.plane_height + layout.plane_height / 2,
            8,
        ),
        format => (layout.width, layout.height, format.row_stride(1) as u32 * 8),
    }
}

/// Planes of `layout` inside a dumb buffer whose pitch is `pitch`.
pub fn dumb_planes(layout: &BufferLayout, pitch: usize) -> Vec<Plane> {
    let rebased = BufferLayout { pitch, ..*layout };
    rebased.planes()
}

/// Copies every plane of `src`, laid out as `layout`, into `dst` laid out
/// as `dst_planes`.
pub fn copy_planes(src: &[u8], layout: &BufferLayout, dst: &mut [u8], dst_planes: &[Plane]) {
    for (from, to) in layout.planes().iter().zip(dst_planes) {
        let len = from.pitch.min(to.pitch);
        for row in 0..from.height.min(to.height) as usize {
            let s = from.offset + row * from.pitch;
            let d = to.offset + row * to.pitch;
            if s + len > src.len() || d + len > dst.len() {
                return;
            }
            dst[d..d + len].copy_from_slice(&src[s..s + len]);
        }
    }
}

/// Mode reported by a CRTC.
pub fn crtc_mode(info: &libdrm::drmModeModeInfo) -> DisplayMode {
    DisplayMode::new(info.hdisplay as u32, info.vdisplay as u32, info.vrefresh)
        .interlaced(info.flags & libdrm::DRM_MODE_FLAG_INTERLACE != 0)
}

struct Device {
    fd: c_int,
    connector: u32,
    crtc: u32,
    planes: Vec<PlaneSlot>,
}

struct DumbBuffer {
    handle: u32,
    fb: u32,
    map: *mut u8,
    size: usize,
    planes: Vec<Plane>,
}

// The mapping is only touched with the state lock held.
unsafe impl Send for DumbBuffer {}

#[derive(Debug, Clone, Copy)]
struct PlaneElement {
    plane: usize,
    dst: Rect,
    src: Rect,
    resource: u32,
    alpha: Option<u16>,
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Show(u32),
    Hide(usize),
}

#[derive(Default)]
struct State {
    device: Option<Device>,
    buffers: HashMap<u32, DumbBuffer>,
    elements: HashMap<u32, PlaneElement>,
    updates: HashMap<u32, Vec<Change>>,
    next_handle: u32,
}

impl State {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn device(&self) -> Result<&Device> {
        self.device.as_ref().ok_or(Error::DisplayClosed)
    }
}

/// Firmware backed by DRM/KMS through libdrm.
pub struct DrmFirmware {
    lib: Libdrm,
    driver: CString,
    state: Mutex<State>,
}

impl DrmFirmware {
    /// Loads `library` and prepares to drive the DRM device of `driver`.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded or lacks one of the
    /// required entry points.
    pub fn new(library: &str, driver: &str) -> Result<Self> {
        let lib = unsafe { Libdrm::new(library) }
            .map_err(|e| Error::firmware("dlopen", format!("{library}: {e}")))?;
        let driver = CString::new(driver)
            .map_err(|_| Error::firmware("drmOpen", format!("bad driver name {driver:?}")))?;
        info!("libdrm loaded from {library} for driver {driver:?}");
        Ok(Self {
            lib,
            driver,
            state: Mutex::new(State::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(call: &'static str, ret: c_int) -> Result<()> {
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            return Err(Error::firmware(call, format!("returned {ret}: {err}")));
        }
        Ok(())
    }

    /// Value of each named property of a DRM object.
    fn properties(&self, fd: c_int, object: u32, kind: u32) -> Vec<(Vec<u8>, u32, u64)> {
        let mut found = Vec::new();
        unsafe {
            let props = (self.lib.drmModeObjectGetProperties)(fd, object, kind);
            if props.is_null() {
                return found;
            }
            let ids = array((*props).props, (*props).count_props);
            let values = array((*props).prop_values, (*props).count_props);
            for (id, value) in ids.iter().zip(values) {
                let prop = (self.lib.drmModeGetProperty)(fd, *id);
                if prop.is_null() {
                    continue;
                }
                found.push((prop_name(&(*prop).name).to_vec(), *id, *value));
                (self.lib.drmModeFreeProperty)(prop);
            }
            (self.lib.drmModeFreeObjectProperties)(props);
        }
        found
    }

    /// First connected connector and the CRTC its encoder drives, with the
    /// CRTC's index in the resource list.
    fn find_output(&self, fd: c_int) -> Result<(u32, u32, usize)> {
        unsafe {
            let res = (self.lib.drmModeGetResources)(fd);
            if res.is_null() {
                return Err(Error::firmware("drmModeGetResources", "no resources"));
            }
            let connectors = array((*res).connectors, (*res).count_connectors).to_vec();
            let crtcs = array((*res).crtcs, (*res).count_crtcs).to_vec();
            (self.lib.drmModeFreeResources)(res);

            for id in connectors {
                let conn = (self.lib.drmModeGetConnector)(fd, id);
                if conn.is_null() {
                    continue;
                }
                let (connected, encoder_id) =
                    ((*conn).connection == libdrm::DRM_MODE_CONNECTED, (*conn).encoder_id);
                (self.lib.drmModeFreeConnector)(conn);
                if !connected || encoder_id == 0 {
                    continue;
                }
                let encoder = (self.lib.drmModeGetEncoder)(fd, encoder_id);
                if encoder.is_null() {
                    continue;
                }
                let crtc = (*encoder).crtc_id;
                (self.lib.drmModeFreeEncoder)(encoder);
                if let Some(index) = crtcs.iter().position(|c| *c == crtc) {
                    return Ok((id, crtc, index));
                }
            }
        }
        Err(Error::firmware("drmModeGetConnector", "no connected output"))
    }

    /// Planes that can scan out on CRTC `crtc_index` and carry a `zpos`.
    fn collect_planes(&self, fd: c_int, crtc_index: usize) -> Vec<PlaneSlot> {
        let mut raw = Vec::new();
        unsafe {
            let res = (self.lib.drmModeGetPlaneResources)(fd);
            if res.is_null() {
                return Vec::new();
            }
            for id in array((*res).planes, (*res).count_planes) {
                let plane = (self.lib.drmModeGetPlane)(fd, *id);
                if plane.is_null() {
                    continue;
                }
                raw.push(((*plane).plane_id, (*plane).crtc_id, (*plane).possible_crtcs));
                (self.lib.drmModeFreePlane)(plane);
            }
            (self.lib.drmModeFreePlaneResources)(res);
        }

        let mut planes = Vec::new();
        for (id, crtc, possible) in raw {
            if possible & (1 << crtc_index) == 0 {
                continue;
            }
            let props = self.properties(fd, id, libdrm::DRM_MODE_OBJECT_PLANE);
            let Some(zpos) = props.iter().find(|p| p.0 == b"zpos").map(|p| p.2 as i32) else {
                debug!("plane {id} has no zpos, skipped");
                continue;
            };
            planes.push(PlaneSlot {
                id,
                zpos,
                alpha: props.iter().find(|p| p.0 == b"alpha").map(|p| p.1),
                // the console's primary plane stays where it is
                in_use: crtc != 0,
            });
        }
        planes
    }

    fn set_plane(&self, device: &Device, plane: &PlaneSlot, element: Option<(&PlaneElement, u32)>) -> Result<()> {
        let ret = match element {
            Some((e, fb)) => {
                if let (Some(prop), Some(alpha)) = (plane.alpha, e.alpha) {
                    let ret = unsafe {
                        (self.lib.drmModeObjectSetProperty)(
                            device.fd,
                            plane.id,
                            libdrm::DRM_MODE_OBJECT_PLANE,
                            prop,
                            alpha as u64,
                        )
                    };
                    if ret != 0 {
                        warn!("plane {} alpha not set: {ret}", plane.id);
                    }
                }
                unsafe {
                    (self.lib.drmModeSetPlane)(
                        device.fd,
                        plane.id,
                        device.crtc,
                        fb,
                        0,
                        e.dst.x,
                        e.dst.y,
                        e.dst.width as u32,
                        e.dst.height as u32,
                        // 16.16 fixed point source
                        (e.src.x as u32) << 16,
                        (e.src.y as u32) << 16,
                        (e.src.width as u32) << 16,
                        (e.src.height as u32) << 16,
                    )
                }
            }
            None => unsafe {
                (self.lib.drmModeSetPlane)(device.fd, plane.id, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0)
            },
        };
        Self::check("drmModeSetPlane", ret)
    }

    fn destroy_buffer(&self, fd: c_int, buffer: DumbBuffer) -> Result<()> {
        unsafe {
            libc::munmap(buffer.map.cast(), buffer.size);
            Self::check("drmModeRmFB", (self.lib.drmModeRmFB)(fd, buffer.fb))?;
            let mut destroy = libdrm::drm_mode_destroy_dumb {
                handle: buffer.handle,
            };
            Self::check(
                "DRM_IOCTL_MODE_DESTROY_DUMB",
                (self.lib.drmIoctl)(
                    fd,
                    libdrm::DRM_IOCTL_MODE_DESTROY_DUMB,
                    (&mut destroy as *mut libdrm::drm_mode_destroy_dumb).cast(),
                ),
            )
        }
    }
}

impl Firmware for DrmFirmware {
    fn name(&self) -> &'static str {
        "drm"
    }

    fn open_display(&self, display_num: u32) -> Result<DisplayId> {
        let unavailable = |reason: String| Error::DisplayUnavailable {
            display_num,
            reason,
        };
        if display_num != 0 {
            return Err(unavailable("the DRM backend drives display 0 only".to_string()));
        }
        let mut state = self.lock();
        if state.device.is_some() {
            return Err(unavailable("already claimed".to_string()));
        }
        let fd = unsafe { (self.lib.drmOpen)(self.driver.as_ptr(), null()) };
        if fd < 0 {
            return Err(unavailable(format!("drmOpen({:?}) failed", self.driver)));
        }
        let mut dumb = 0u64;
        if unsafe { (self.lib.drmGetCap)(fd, libdrm::DRM_CAP_DUMB_BUFFER, &mut dumb) } < 0 || dumb == 0 {
            unsafe { (self.lib.drmClose)(fd) };
            return Err(unavailable("no dumb buffer support".to_string()));
        }
        let (connector, crtc, crtc_index) = match self.find_output(fd) {
            Ok(output) => output,
            Err(e) => {
                unsafe { (self.lib.drmClose)(fd) };
                return Err(unavailable(e.to_string()));
            }
        };
        let planes = self.collect_planes(fd, crtc_index);
        info!(
            "DRM connector {connector} on CRTC {crtc}, overlay layers {:?}",
            free_layers(&planes)
        );
        state.device = Some(Device {
            fd,
            connector,
            crtc,
            planes,
        });
        Ok(DisplayId(crtc))
    }

    fn display_mode(&self, _display: DisplayId) -> Result<DisplayMode> {
        let state = self.lock();
        let device = state.device()?;
        unsafe {
            let crtc = (self.lib.drmModeGetCrtc)(device.fd, device.crtc);
            if crtc.is_null() {
                return Err(Error::firmware("drmModeGetCrtc", format!("CRTC {}", device.crtc)));
            }
            let mode = ((*crtc).mode_valid != 0).then(|| crtc_mode(&(*crtc).mode));
            (self.lib.drmModeFreeCrtc)(crtc);
            mode.ok_or_else(|| Error::firmware("drmModeGetCrtc", "CRTC has no mode"))
        }
    }

    fn close_display(&self, _display: DisplayId) -> Result<()> {
        let mut state = self.lock();
        let Some(device) = state.device.take() else {
            return Ok(());
        };
        for (_, element) in state.elements.drain() {
            if let Err(e) = self.set_plane(&device, &device.planes[element.plane], None) {
                warn!("disabling plane on close failed: {e}");
            }
        }
        state.updates.clear();
        for (_, buffer) in state.buffers.drain() {
            if let Err(e) = self.destroy_buffer(device.fd, buffer) {
                warn!("releasing buffer on close failed: {e}");
            }
        }
        Self::check("drmClose", unsafe { (self.lib.drmClose)(device.fd) })
    }

    fn layer_slots(&self, _display_num: u32) -> Vec<i32> {
        self.lock()
            .device
            .as_ref()
            .map(|d| free_layers(&d.planes))
            .unwrap_or_default()
    }

    fn read_edid(&self, display_num: u32) -> Result<Vec<u8>> {
        let state = self.lock();
        let device = state.device.as_ref().ok_or_else(|| {
            Error::firmware("drmModeGetPropertyBlob", format!("display {display_num} not open"))
        })?;
        let props = self.properties(device.fd, device.connector, libdrm::DRM_MODE_OBJECT_CONNECTOR);
        let blob_id = props
            .iter()
            .find(|p| p.0 == b"EDID")
            .map(|p| p.2 as u32)
            .filter(|id| *id != 0)
            .ok_or_else(|| Error::firmware("drmModeGetPropertyBlob", "connector has no EDID"))?;
        unsafe {
            let blob = (self.lib.drmModeGetPropertyBlob)(device.fd, blob_id);
            if blob.is_null() {
                return Err(Error::firmware("drmModeGetPropertyBlob", format!("blob {blob_id}")));
            }
            let edid = array((*blob).data as *const u8, (*blob).length).to_vec();
            (self.lib.drmModeFreePropertyBlob)(blob);
            Ok(edid)
        }
    }

    fn create_resource(&self, layout: &BufferLayout) -> Result<ResourceHandle> {
        let format = drm_format(layout.format)?;
        let mut state = self.lock();
        let fd = state.device()?.fd;
        let (width, height, bpp) = dumb_geometry(layout);
        let mut create = libdrm::drm_mode_create_dumb {
            width,
            height,
            bpp,
            ..Default::default()
        };
        Self::check("DRM_IOCTL_MODE_CREATE_DUMB", unsafe {
            (self.lib.drmIoctl)(
                fd,
                libdrm::DRM_IOCTL_MODE_CREATE_DUMB,
                (&mut create as *mut libdrm::drm_mode_create_dumb).cast(),
            )
        })?;
        let planes = dumb_planes(layout, create.pitch as usize);
        let mut buffer = DumbBuffer {
            handle: create.handle,
            fb: 0,
            map: std::ptr::null_mut(),
            size: create.size as usize,
            planes,
        };

        let mut handles = [0u32; 4];
        let mut pitches = [0u32; 4];
        let mut offsets = [0u32; 4];
        for (i, plane) in buffer.planes.iter().enumerate().take(4) {
            handles[i] = create.handle;
            pitches[i] = plane.pitch as u32;
            offsets[i] = plane.offset as u32;
        }
        let added = Self::check("drmModeAddFB2", unsafe {
            (self.lib.drmModeAddFB2)(
                fd,
                layout.width,
                layout.height,
                format,
                handles.as_ptr(),
                pitches.as_ptr(),
                offsets.as_ptr(),
                &mut buffer.fb,
                0,
            )
        });
        let mapped = added.and_then(|()| {
            let mut map = libdrm::drm_mode_map_dumb {
                handle: create.handle,
                ..Default::default()
            };
            Self::check("DRM_IOCTL_MODE_MAP_DUMB", unsafe {
                (self.lib.drmIoctl)(
                    fd,
                    libdrm::DRM_IOCTL_MODE_MAP_DUMB,
                    (&mut map as *mut libdrm::drm_mode_map_dumb).cast(),
                )
            })?;
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    buffer.size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    map.offset as libc::off_t,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(Error::firmware("mmap", std::io::Error::last_os_error().to_string()));
            }
            buffer.map = ptr.cast();
            Ok(())
        });
        if let Err(e) = mapped {
            let mut destroy = libdrm::drm_mode_destroy_dumb {
                handle: create.handle,
            };
            unsafe {
                if buffer.fb != 0 {
                    (self.lib.drmModeRmFB)(fd, buffer.fb);
                }
                (self.lib.drmIoctl)(
                    fd,
                    libdrm::DRM_IOCTL_MODE_DESTROY_DUMB,
                    (&mut destroy as *mut libdrm::drm_mode_destroy_dumb).cast(),
                );
            }
            return Err(e);
        }

        let handle = state.handle();
        debug!(
            "dumb buffer {handle} {}x{} {} pitch {}",
            layout.width, layout.height, layout.format, create.pitch
        );
        state.buffers.insert(handle, buffer);
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
                "write_resource",
                format!("{} bytes is short of {}", data.len(), layout.size()),
            ));
        }
        let mut state = self.lock();
        let buffer = state
            .buffers
            .get_mut(&resource.0)
            .ok_or_else(|| Error::firmware("write_resource", format!("no buffer {}", resource.0)))?;
        let dst = unsafe { std::slice::from_raw_parts_mut(buffer.map, buffer.size) };
        copy_planes(data, layout, dst, &buffer.planes);
        Ok(())
    }

    fn delete_resource(&self, resource: ResourceHandle) -> Result<()> {
        let mut state = self.lock();
        let Some(buffer) = state.buffers.remove(&resource.0) else {
            // already released by close_display
            return Ok(());
        };
        let fd = state.device()?.fd;
        self.destroy_buffer(fd, buffer)
    }

    fn update_start(&self) -> Result<UpdateHandle> {
        let mut state = self.lock();
        state.device()?;
        let handle = state.handle();
        state.updates.insert(handle, Vec::new());
        Ok(UpdateHandle(handle))
    }

    fn element_add(&self, update: UpdateHandle, element: &ElementSpec) -> Result<ElementHandle> {
        let mut state = self.lock();
        if !state.buffers.contains_key(&element.resource.0) {
            return Err(Error::firmware(
                "element_add",
                format!("no buffer {}", element.resource.0),
            ));
        }
        let device = state.device.as_mut().ok_or(Error::DisplayClosed)?;
        let plane = pick_plane(&device.planes, element.layer)?;
        device.planes[plane].in_use = true;
        let alpha = match element.alpha.mode {
            AlphaMode::FromSource => None,
            AlphaMode::FixedAllPixels | AlphaMode::FixedNonZero => {
                Some(element.alpha.opacity as u16 * 257)
            }
        };
        let handle = state.handle();
        state.elements.insert(
            handle,
            PlaneElement {
                plane,
                dst: element.dst,
                src: element.src,
                resource: element.resource.0,
                alpha,
            },
        );
        queue(&mut state, update, Change::Show(handle))?;
        Ok(ElementHandle(handle))
    }

    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()> {
        let mut state = self.lock();
        let shown = state
            .elements
            .get_mut(&element.0)
            .ok_or_else(|| Error::firmware("element_change_source", format!("no element {}", element.0)))?;
        shown.resource = resource.0;
        queue(&mut state, update, Change::Show(element.0))
    }

    fn element_change_layer(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        layer: i32,
    ) -> Result<()> {
        let mut state = self.lock();
        let old = state
            .elements
            .get(&element.0)
            .map(|e| e.plane)
            .ok_or_else(|| Error::firmware("element_change_layer", format!("no element {}", element.0)))?;
        let device = state.device.as_mut().ok_or(Error::DisplayClosed)?;
        if device.planes[old].zpos == layer {
            return Ok(());
        }
        let plane = pick_plane(&device.planes, layer)?;
        device.planes[plane].in_use = true;
        device.planes[old].in_use = false;
        if let Some(e) = state.elements.get_mut(&element.0) {
            e.plane = plane;
        }
        queue(&mut state, update, Change::Hide(old))?;
        queue(&mut state, update, Change::Show(element.0))
    }

    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()> {
        let mut state = self.lock();
        let Some(removed) = state.elements.remove(&element.0) else {
            return Ok(());
        };
        if let Some(device) = state.device.as_mut() {
            device.planes[removed.plane].in_use = false;
        }
        queue(&mut state, update, Change::Hide(removed.plane))
    }

    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()> {
        let mut state = self.lock();
        let changes = state
            .updates
            .remove(&update.0)
            .ok_or_else(|| Error::firmware("update_submit_sync", format!("no update {}", update.0)))?;
        let device = state.device()?;
        for change in changes {
            match change {
                Change::Show(element) => {
                    // removed again later in the same update
                    let Some(e) = state.elements.get(&element) else {
                        continue;
                    };
                    let fb = state
                        .buffers
                        .get(&e.resource)
                        .map(|b| b.fb)
                        .ok_or_else(|| Error::firmware("drmModeSetPlane", format!("no buffer {}", e.resource)))?;
                    self.set_plane(device, &device.planes[e.plane], Some((e, fb)))?;
                }
                Change::Hide(plane) => {
                    // taken over by another element in the same update
                    if device.planes[plane].in_use {
                        continue;
                    }
                    self.set_plane(device, &device.planes[plane], None)?;
                }
            }
        }
        Ok(())
    }
}

fn queue(state: &mut State, update: UpdateHandle, change: Change) -> Result<()> {
    state
        .updates
        .get_mut(&update.0)
        .map(|changes| changes.push(change))
        .ok_or_else(|| Error::firmware("update", format!("no update {}", update.0)))
}

impl Drop for DrmFirmware {
    fn drop(&mut self) {
        let device = self.lock().device.as_ref().map(|d| DisplayId(d.crtc));
        if let Some(id) = device {
            if let Err(e) = self.close_display(id) {
                warn!("closing DRM device failed: {e}");
            }
        }
    }
}
