// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Virtual display backend.
//!
//! Keeps resources and elements in process memory and applies updates the
//! way the firmware does: nothing queued in an update is visible until the
//! update is submitted. Used for headless runs, tests and benchmarks; the
//! inspection methods expose what would be on screen.

use super::{
    DisplayId, ElementHandle, ElementSpec, Firmware, ResourceHandle, UpdateHandle,
};
use crate::{
    error::{Error, Result},
    format::BufferLayout,
    mode::DisplayMode,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};
use tracing::debug;

/// What is shown for one element after the last submitted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub element: ElementHandle,
    pub spec: ElementSpec,
}

struct VirtualDisplay {
    mode: DisplayMode,
    layers: Vec<i32>,
    edid: Option<Vec<u8>>,
    open: Option<DisplayId>,
}

struct StoredResource {
    layout: BufferLayout,
    data: Vec<u8>,
}

enum Op {
    Add(ElementHandle, ElementSpec),
    ChangeSource(ElementHandle, ResourceHandle),
    ChangeLayer(ElementHandle, i32),
    Remove(ElementHandle),
}

#[derive(Default)]
struct State {
    next_handle: u32,
    displays: BTreeMap<u32, VirtualDisplay>,
    open: HashMap<DisplayId, u32>,
    resources: HashMap<ResourceHandle, StoredResource>,
    elements: HashMap<ElementHandle, ElementSpec>,
    pending: HashMap<UpdateHandle, Vec<Op>>,
    submits: u64,
    faults: HashSet<&'static str>,
}

impl State {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn fault(&mut self, call: &'static str) -> Result<()> {
        if self.faults.remove(call) {
            return Err(Error::firmware(call, "injected fault"));
        }
        Ok(())
    }

    fn queue(&mut self, call: &'static str, update: UpdateHandle, op: Op) -> Result<()> {
        self.pending
            .get_mut(&update)
            .ok_or_else(|| Error::firmware(call, format!("no such update {update:?}")))?
            .push(op);
        Ok(())
    }

    fn element_known(&self, element: ElementHandle) -> bool {
        self.elements.contains_key(&element)
            || self.pending.values().flatten().any(|op| match op {
                Op::Add(handle, _) => *handle == element,
                _ => false,
            })
    }
}

/// In-memory implementation of [`Firmware`].
pub struct MemoryFirmware {
    state: Mutex<State>,
}

impl Default for MemoryFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFirmware {
    /// Creates a firmware without any display attached.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Attaches display `display_num` running `mode` with the given overlay
    /// layer slots.
    pub fn with_display(self, display_num: u32, mode: DisplayMode, layers: Vec<i32>) -> Self {
        self.lock().displays.insert(
            display_num,
            VirtualDisplay {
                mode,
                layers,
                edid: None,
                open: None,
            },
        );
        self
    }

    /// Sets the EDID reported for a display.
    pub fn with_edid(self, display_num: u32, edid: Vec<u8>) -> Self {
        if let Some(display) = self.lock().displays.get_mut(&display_num) {
            display.edid = Some(edid);
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the state consistent enough
        // for inspection; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next call to `call` (a `Firmware` method name) fail.
    pub fn fail_next(&self, call: &'static str) {
        self.lock().faults.insert(call);
    }

    /// Changes the mode of a display, as a hotplug would.
    pub fn set_mode(&self, display_num: u32, mode: DisplayMode) {
        if let Some(display) = self.lock().displays.get_mut(&display_num) {
            display.mode = mode;
        }
    }

    /// Elements visible on a display, bottom layer first.
    pub fn scanout(&self, display_num: u32) -> Vec<ElementSnapshot> {
        let state = self.lock();
        let mut visible: Vec<ElementSnapshot> = state
            .elements
            .iter()
            .filter(|(_, spec)| state.open.get(&spec.display) == Some(&display_num))
            .map(|(element, spec)| ElementSnapshot {
                element: *element,
                spec: *spec,
            })
            .collect();
        visible.sort_by_key(|s| (s.spec.layer, s.element));
        visible
    }

    /// Contents of a resource.
    pub fn resource_data(&self, resource: ResourceHandle) -> Option<Vec<u8>> {
        self.lock().resources.get(&resource).map(|r| r.data.clone())
    }

    /// Contents of the resource an element currently shows.
    pub fn element_data(&self, element: ElementHandle) -> Option<Vec<u8>> {
        let state = self.lock();
        let spec = state.elements.get(&element)?;
        state.resources.get(&spec.resource).map(|r| r.data.clone())
    }

    pub fn live_resources(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn live_elements(&self) -> usize {
        self.lock().elements.len()
    }

    pub fn open_displays(&self) -> usize {
        self.lock().open.len()
    }

    /// Number of updates applied so far.
    pub fn submit_count(&self) -> u64 {
        self.lock().submits
    }
}

impl Firmware for MemoryFirmware {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_display(&self, display_num: u32) -> Result<DisplayId> {
        let mut state = self.lock();
        state.fault("open_display")?;
        let id = DisplayId(state.handle());
        let display = state
            .displays
            .get_mut(&display_num)
            .ok_or_else(|| Error::DisplayUnavailable {
                display_num,
                reason: "no such output".to_string(),
            })?;
        if display.open.is_some() {
            return Err(Error::DisplayUnavailable {
                display_num,
                reason: "already claimed".to_string(),
            });
        }
        display.open = Some(id);
        state.open.insert(id, display_num);
        debug!("virtual display {display_num} opened as {id:?}");
        Ok(id)
    }

    fn display_mode(&self, display: DisplayId) -> Result<DisplayMode> {
        let mut state = self.lock();
        state.fault("display_mode")?;
        let num = state
            .open
            .get(&display)
            .copied()
            .ok_or_else(|| Error::firmware("display_mode", format!("no such display {display:?}")))?;
        state
            .displays
            .get(&num)
            .map(|d| d.mode)
            .ok_or_else(|| Error::firmware("display_mode", "display detached"))
    }

    fn close_display(&self, display: DisplayId) -> Result<()> {
        let mut state = self.lock();
        state.fault("close_display")?;
        let num = state
            .open
            .remove(&display)
            .ok_or_else(|| Error::firmware("close_display", format!("no such display {display:?}")))?;
        if let Some(d) = state.displays.get_mut(&num) {
            d.open = None;
        }
        Ok(())
    }

    fn layer_slots(&self, display_num: u32) -> Vec<i32> {
        self.lock()
            .displays
            .get(&display_num)
            .map(|d| d.layers.clone())
            .unwrap_or_default()
    }

    fn read_edid(&self, display_num: u32) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.fault("read_edid")?;
        state
            .displays
            .get(&display_num)
            .and_then(|d| d.edid.clone())
            .ok_or_else(|| Error::firmware("read_edid", format!("no EDID for display {display_num}")))
    }

    fn create_resource(&self, layout: &BufferLayout) -> Result<ResourceHandle> {
        let mut state = self.lock();
        state.fault("create_resource")?;
        let handle = ResourceHandle(state.handle());
        state.resources.insert(
            handle,
            StoredResource {
                layout: *layout,
                data: vec![0; layout.size()],
            },
        );
        Ok(handle)
    }

    fn write_resource(
        &self,
        resource: ResourceHandle,
        layout: &BufferLayout,
        data: &[u8],
    ) -> Result<()> {
        let mut state = self.lock();
        state.fault("write_resource")?;
        let stored = state.resources.get_mut(&resource).ok_or_else(|| {
            Error::firmware("write_resource", format!("no such resource {resource:?}"))
        })?;
        if stored.layout != *layout || data.len() < stored.data.len() {
            return Err(Error::firmware(
                "write_resource",
                format!("{} bytes do not match resource layout {layout:?}", data.len()),
            ));
        }
        let len = stored.data.len();
        stored.data.copy_from_slice(&data[..len]);
        Ok(())
    }

    fn delete_resource(&self, resource: ResourceHandle) -> Result<()> {
        let mut state = self.lock();
        state.fault("delete_resource")?;
        state.resources.remove(&resource).map(|_| ()).ok_or_else(|| {
            Error::firmware("delete_resource", format!("no such resource {resource:?}"))
        })
    }

    fn update_start(&self) -> Result<UpdateHandle> {
        let mut state = self.lock();
        state.fault("update_start")?;
        let handle = UpdateHandle(state.handle());
        state.pending.insert(handle, Vec::new());
        Ok(handle)
    }

    fn element_add(&self, update: UpdateHandle, element: &ElementSpec) -> Result<ElementHandle> {
        let mut state = self.lock();
        state.fault("element_add")?;
        if !state.open.contains_key(&element.display) {
            return Err(Error::firmware("element_add", "display not open"));
        }
        if !state.resources.contains_key(&element.resource) {
            return Err(Error::firmware("element_add", "no such resource"));
        }
        let handle = ElementHandle(state.handle());
        state.queue("element_add", update, Op::Add(handle, *element))?;
        Ok(handle)
    }

    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()> {
        let mut state = self.lock();
        state.fault("element_change_source")?;
        if !state.element_known(element) || !state.resources.contains_key(&resource) {
            return Err(Error::firmware(
                "element_change_source",
                format!("unknown element {element:?} or resource {resource:?}"),
            ));
        }
        state.queue(
            "element_change_source",
            update,
            Op::ChangeSource(element, resource),
        )
    }

    fn element_change_layer(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        layer: i32,
    ) -> Result<()> {
        let mut state = self.lock();
        state.fault("element_change_layer")?;
        if !state.element_known(element) {
            return Err(Error::firmware(
                "element_change_layer",
                format!("unknown element {element:?}"),
            ));
        }
        state.queue("element_change_layer", update, Op::ChangeLayer(element, layer))
    }

    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()> {
        let mut state = self.lock();
        state.fault("element_remove")?;
        if !state.element_known(element) {
            return Err(Error::firmware(
                "element_remove",
                format!("unknown element {element:?}"),
            ));
        }
        state.queue("element_remove", update, Op::Remove(element))
    }

    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()> {
        let mut state = self.lock();
        let ops = state
            .pending
            .remove(&update)
            .ok_or_else(|| Error::firmware("update_submit_sync", format!("no such update {update:?}")))?;
        // A failed submit drops the queued changes, like the firmware does.
        state.fault("update_submit_sync")?;
        for op in ops {
            match op {
                Op::Add(handle, spec) => {
                    state.elements.insert(handle, spec);
                }
                Op::ChangeSource(handle, resource) => {
                    if let Some(spec) = state.elements.get_mut(&handle) {
                        spec.resource = resource;
                    }
                }
                Op::ChangeLayer(handle, layer) => {
                    if let Some(spec) = state.elements.get_mut(&handle) {
                        spec.layer = layer;
                    }
                }
                Op::Remove(handle) => {
                    state.elements.remove(&handle);
                }
            }
        }
        state.submits += 1;
        Ok(())
    }
}
