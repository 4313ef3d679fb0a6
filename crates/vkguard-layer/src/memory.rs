//! Device memory and buffer entry points.

use std::ffi::c_void;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::dispatch::DeviceDispatch;
use crate::{ValidationLayer, SKIPPED};

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── vkAllocateMemory ────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkMemoryAllocateInfo` for the wrapped device.
    pub unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        let memory = self.track(unsafe { self.dispatch.allocate_memory(info) })?;
        self.state.record_allocate_memory(memory.as_raw(), info);
        Ok(memory)
    }

    /// # Safety
    /// `memory` must be null or have been allocated from the wrapped device.
    pub unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        if memory == vk::DeviceMemory::null() {
            return;
        }
        if self.state.free_memory(memory.as_raw()) {
            return;
        }
        unsafe { self.dispatch.free_memory(memory) }
    }

    // ── vkMapMemory ─────────────────────────────────────────────

    /// # Safety
    /// `memory` must have been allocated from the wrapped device.
    pub unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void> {
        if self.state.validate_map_memory(memory.as_raw(), offset, size) {
            return Err(SKIPPED);
        }
        let ptr = self.track(unsafe { self.dispatch.map_memory(memory, offset, size, flags) })?;
        self.state.record_map_memory(memory.as_raw(), offset, size);
        Ok(ptr)
    }

    /// # Safety
    /// `memory` must have been allocated from the wrapped device.
    pub unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        if self.state.unmap_memory(memory.as_raw()) {
            return;
        }
        unsafe { self.dispatch.unmap_memory(memory) }
    }

    // ── Memory binding ──────────────────────────────────────────

    /// # Safety
    /// Both handles must belong to the wrapped device.
    pub unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        if self
            .state
            .validate_bind_buffer_memory(buffer.as_raw(), memory.as_raw(), offset)
        {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.bind_buffer_memory(buffer, memory, offset) })?;
        self.state
            .record_bind_buffer_memory(buffer.as_raw(), memory.as_raw(), offset);
        Ok(())
    }

    /// # Safety
    /// Both handles must belong to the wrapped device.
    pub unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        if self
            .state
            .validate_bind_image_memory(image.as_raw(), memory.as_raw(), offset)
        {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.bind_image_memory(image, memory, offset) })?;
        self.state
            .record_bind_image_memory(image.as_raw(), memory.as_raw(), offset);
        Ok(())
    }

    // ── Buffers ─────────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkBufferCreateInfo`.
    pub unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let buffer = self.track(unsafe { self.dispatch.create_buffer(info) })?;
        self.state.record_create_buffer(buffer.as_raw(), info);
        Ok(buffer)
    }

    /// # Safety
    /// `buffer` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        if buffer == vk::Buffer::null() {
            return;
        }
        if self.state.destroy_buffer(buffer.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_buffer(buffer) }
    }
}
