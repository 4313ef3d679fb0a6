//! Queue submission, fence, semaphore, and event entry points.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::state::submit::SubmitBatch;
use vkguard_protocol::ObjectHandle;

use crate::dispatch::DeviceDispatch;
use crate::{raw_handles, raw_slice, ValidationLayer, SKIPPED};

unsafe fn submit_batch(info: &vk::SubmitInfo<'_>) -> SubmitBatch {
    unsafe {
        SubmitBatch {
            wait_semaphores: raw_handles(raw_slice(
                info.p_wait_semaphores,
                info.wait_semaphore_count,
            )),
            command_buffers: raw_handles(raw_slice(
                info.p_command_buffers,
                info.command_buffer_count,
            )),
            signal_semaphores: raw_handles(raw_slice(
                info.p_signal_semaphores,
                info.signal_semaphore_count,
            )),
        }
    }
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── Queue ───────────────────────────────────────────────────

    /// # Safety
    /// Every submit info must be valid and reference objects of the wrapped
    /// device.
    pub unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let batches: Vec<SubmitBatch> = submits.iter().map(|s| unsafe { submit_batch(s) }).collect();
        let _claim = self.state.claim(ObjectHandle::of(queue));
        if self
            .state
            .validate_queue_submit(queue.as_raw(), &batches, fence.as_raw())
        {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.queue_submit(queue, submits, fence) })?;
        self.state
            .record_queue_submit(queue.as_raw(), &batches, fence.as_raw());
        Ok(())
    }

    /// # Safety
    /// `queue` must have been retrieved from the wrapped device.
    pub unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        let _claim = self.state.claim(ObjectHandle::of(queue));
        if self.state.validate_queue_wait_idle(queue.as_raw()) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.queue_wait_idle(queue) })?;
        self.state.record_queue_wait_idle(queue.as_raw());
        Ok(())
    }

    // ── Fence ───────────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkFenceCreateInfo`.
    pub unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let fence = self.track(unsafe { self.dispatch.create_fence(info) })?;
        self.state.record_create_fence(
            fence.as_raw(),
            info.flags.contains(vk::FenceCreateFlags::SIGNALED),
        );
        Ok(fence)
    }

    /// # Safety
    /// `fence` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_fence(&self, fence: vk::Fence) {
        if fence == vk::Fence::null() {
            return;
        }
        if self.state.destroy_fence(fence.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_fence(fence) }
    }

    /// Waits on the driver, then retires the submissions the fences prove
    /// complete. A timeout is returned as `Err(TIMEOUT)`.
    ///
    /// # Safety
    /// Every fence must belong to the wrapped device.
    pub unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        wait_all: bool,
        timeout: u64,
    ) -> VkResult<()> {
        let raw = raw_handles(fences);
        if self.state.validate_wait_for_fences(&raw) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.wait_for_fences(fences, wait_all, timeout) })?;
        self.state.record_wait_for_fences(&raw, wait_all);
        Ok(())
    }

    /// # Safety
    /// `fence` must belong to the wrapped device.
    pub unsafe fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        if self.state.validate_get_fence_status(fence.as_raw()) {
            return Err(SKIPPED);
        }
        let signaled = self.track(unsafe { self.dispatch.get_fence_status(fence) })?;
        if signaled {
            self.state.record_fence_signaled(fence.as_raw());
        }
        Ok(signaled)
    }

    /// # Safety
    /// Every fence must belong to the wrapped device.
    pub unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let raw = raw_handles(fences);
        if self.state.validate_reset_fences(&raw) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.reset_fences(fences) })?;
        self.state.record_reset_fences(&raw);
        Ok(())
    }

    // ── Semaphore ───────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkSemaphoreCreateInfo`.
    pub unsafe fn create_semaphore(
        &self,
        info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore> {
        let semaphore = self.track(unsafe { self.dispatch.create_semaphore(info) })?;
        self.state.record_create_semaphore(semaphore.as_raw());
        Ok(semaphore)
    }

    /// # Safety
    /// `semaphore` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if semaphore == vk::Semaphore::null() {
            return;
        }
        if self.state.destroy_semaphore(semaphore.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_semaphore(semaphore) }
    }

    // ── Event ───────────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkEventCreateInfo`.
    pub unsafe fn create_event(&self, info: &vk::EventCreateInfo<'_>) -> VkResult<vk::Event> {
        let event = self.track(unsafe { self.dispatch.create_event(info) })?;
        self.state.record_create_event(event.as_raw());
        Ok(event)
    }

    /// # Safety
    /// `event` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_event(&self, event: vk::Event) {
        if event == vk::Event::null() {
            return;
        }
        if self.state.destroy_event(event.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_event(event) }
    }

    /// # Safety
    /// `event` must belong to the wrapped device.
    pub unsafe fn set_event(&self, event: vk::Event) -> VkResult<()> {
        if self.state.validate_host_event(event.as_raw(), "vkSetEvent") {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.set_event(event) })?;
        self.state.record_host_event(event.as_raw(), true);
        Ok(())
    }

    /// # Safety
    /// `event` must belong to the wrapped device.
    pub unsafe fn reset_event(&self, event: vk::Event) -> VkResult<()> {
        if self.state.validate_host_event(event.as_raw(), "vkResetEvent") {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.reset_event(event) })?;
        self.state.record_host_event(event.as_raw(), false);
        Ok(())
    }

    /// # Safety
    /// `event` must belong to the wrapped device.
    pub unsafe fn get_event_status(&self, event: vk::Event) -> VkResult<bool> {
        if self.state.validate_host_event(event.as_raw(), "vkGetEventStatus") {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.get_event_status(event) })
    }
}
