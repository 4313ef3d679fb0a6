//! Device-level entry points: queues, idle waits, and teardown.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use tracing::info;

use crate::dispatch::DeviceDispatch;
use crate::{ValidationLayer, SKIPPED};

impl<D: DeviceDispatch> ValidationLayer<D> {
    /// # Safety
    /// `family` and `index` must name a queue created with the device.
    pub unsafe fn get_device_queue(&self, family: u32, index: u32) -> vk::Queue {
        let queue = unsafe { self.dispatch.get_device_queue(family, index) };
        self.state.record_queue(queue.as_raw(), family);
        queue
    }

    /// # Safety
    /// The wrapped device must be valid.
    pub unsafe fn device_wait_idle(&self) -> VkResult<()> {
        if self.state.validate_device_wait_idle() {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.device_wait_idle() })?;
        self.state.record_device_wait_idle();
        Ok(())
    }

    /// Report every object the application never destroyed, then destroy the
    /// device.
    ///
    /// # Safety
    /// No other call may be in progress on the device.
    pub unsafe fn destroy_device(self) {
        self.state.report_leaks();
        let stats = self.state.debug_report().stats();
        info!(
            "destroying device: {} error(s), {} warning(s) reported",
            stats.errors, stats.warnings
        );
        unsafe { self.dispatch.destroy_device() }
    }
}
