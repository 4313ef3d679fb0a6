//! vkguard validation layer
//!
//! [`ValidationLayer`] wraps a [`DeviceDispatch`] and mirrors the device-level
//! Vulkan entry points. Each call is checked against the device's shadow
//! state, forwarded to the driver unless a report asked to skip it, and
//! recorded once the driver accepted it. A skipped call returns
//! `VK_ERROR_VALIDATION_FAILED_EXT` without reaching the driver.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::{CheckConfig, DebugReport, DeviceState};

pub mod command;
pub mod descriptor;
pub mod device;
pub mod dispatch;
pub mod image;
pub mod instance;
pub mod memory;
pub mod null_driver;
pub mod pipeline;
pub mod renderpass;
pub mod sync;

pub use dispatch::{AshDispatch, DeviceDispatch};
pub use instance::ValidationInstance;
pub use null_driver::NullDriver;

/// Returned in place of the driver's result when validation skipped a call.
pub const SKIPPED: vk::Result = vk::Result::ERROR_VALIDATION_FAILED_EXT;

pub struct ValidationLayer<D: DeviceDispatch> {
    dispatch: D,
    state: DeviceState,
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    pub fn new(dispatch: D, report: Arc<DebugReport>, checks: CheckConfig) -> Self {
        let device = dispatch.handle().as_raw();
        Self {
            dispatch,
            state: DeviceState::new(device, report, checks),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    pub fn handle(&self) -> vk::Device {
        self.dispatch.handle()
    }

    /// Inspect a driver result, latching device loss into the shadow state.
    fn track<T>(&self, result: VkResult<T>) -> VkResult<T> {
        if let Err(vk::Result::ERROR_DEVICE_LOST) = result {
            self.state.mark_device_lost();
        }
        result
    }
}

// ── Helpers ─────────────────────────────────────────────────

/// View a `(pointer, count)` pair from a Vulkan struct as a slice.
///
/// A null pointer or zero count yields an empty slice.
pub(crate) unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        // SAFETY: the caller passes a pointer/count pair from a valid Vulkan struct
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }
    }
}

pub(crate) fn raw_handles<H: Handle + Copy>(handles: &[H]) -> Vec<u64> {
    handles.iter().map(|h| h.as_raw()).collect()
}
