//! In-process driver that accepts every call.
//!
//! Hands out unique handles, completes submitted work immediately, backs
//! mapped memory with host allocations and records the name of every call it
//! receives. A lost device can be injected to exercise error paths.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::dispatch::DeviceDispatch;

const FIRST_HANDLE: u64 = 0x1000;

#[derive(Default)]
struct NullState {
    calls: Vec<&'static str>,
    allocations: HashMap<u64, u64>,
    mapped: HashMap<u64, Vec<u8>>,
    fences: HashMap<u64, bool>,
    events: HashMap<u64, bool>,
    queues: HashMap<(u32, u32), u64>,
}

pub struct NullDriver {
    device: u64,
    next_handle: AtomicU64,
    device_lost: AtomicBool,
    state: Mutex<NullState>,
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDriver {
    pub fn new() -> Self {
        Self {
            device: FIRST_HANDLE,
            next_handle: AtomicU64::new(FIRST_HANDLE + 1),
            device_lost: AtomicBool::new(false),
            state: Mutex::new(NullState::default()),
        }
    }

    /// Make every later submit and wait fail with `ERROR_DEVICE_LOST`.
    pub fn lose_device(&self) {
        self.device_lost.store(true, Ordering::Release);
    }

    /// Names of the calls that reached the driver, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// How many times `name` reached the driver.
    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == name).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn log(&self, name: &'static str) {
        self.state.lock().calls.push(name);
    }

    fn next<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn create<H: Handle>(&self, name: &'static str) -> VkResult<H> {
        self.log(name);
        Ok(self.next())
    }

    fn create_many<H: Handle>(&self, name: &'static str, count: usize) -> VkResult<Vec<H>> {
        self.log(name);
        Ok((0..count).map(|_| self.next()).collect())
    }

    fn check_lost(&self) -> VkResult<()> {
        if self.device_lost.load(Ordering::Acquire) {
            Err(vk::Result::ERROR_DEVICE_LOST)
        } else {
            Ok(())
        }
    }
}

impl DeviceDispatch for NullDriver {
    fn handle(&self) -> vk::Device {
        vk::Device::from_raw(self.device)
    }

    unsafe fn destroy_device(&self) {
        self.log("vkDestroyDevice");
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.create("vkAllocateMemory")?;
        self.state
            .lock()
            .allocations
            .insert(memory.as_raw(), info.allocation_size);
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        state.calls.push("vkFreeMemory");
        state.allocations.remove(&memory.as_raw());
        state.mapped.remove(&memory.as_raw());
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        _size: vk::DeviceSize,
        _flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void> {
        let mut state = self.state.lock();
        state.calls.push("vkMapMemory");
        let Some(&size) = state.allocations.get(&memory.as_raw()) else {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        };
        if offset >= size {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        let backing = state
            .mapped
            .entry(memory.as_raw())
            .or_insert_with(|| vec![0; size as usize]);
        Ok(backing[offset as usize..].as_mut_ptr().cast())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        state.calls.push("vkUnmapMemory");
        state.mapped.remove(&memory.as_raw());
    }

    unsafe fn bind_buffer_memory(&self, _: vk::Buffer, _: vk::DeviceMemory, _: vk::DeviceSize) -> VkResult<()> {
        self.log("vkBindBufferMemory");
        Ok(())
    }

    unsafe fn bind_image_memory(&self, _: vk::Image, _: vk::DeviceMemory, _: vk::DeviceSize) -> VkResult<()> {
        self.log("vkBindImageMemory");
        Ok(())
    }

    unsafe fn create_buffer(&self, _: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        self.create("vkCreateBuffer")
    }

    unsafe fn destroy_buffer(&self, _: vk::Buffer) {
        self.log("vkDestroyBuffer");
    }

    unsafe fn create_image(&self, _: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.create("vkCreateImage")
    }

    unsafe fn destroy_image(&self, _: vk::Image) {
        self.log("vkDestroyImage");
    }

    unsafe fn create_image_view(&self, _: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        self.create("vkCreateImageView")
    }

    unsafe fn destroy_image_view(&self, _: vk::ImageView) {
        self.log("vkDestroyImageView");
    }

    unsafe fn create_shader_module(&self, _: &vk::ShaderModuleCreateInfo<'_>) -> VkResult<vk::ShaderModule> {
        self.create("vkCreateShaderModule")
    }

    unsafe fn destroy_shader_module(&self, _: vk::ShaderModule) {
        self.log("vkDestroyShaderModule");
    }

    unsafe fn create_pipeline_layout(&self, _: &vk::PipelineLayoutCreateInfo<'_>) -> VkResult<vk::PipelineLayout> {
        self.create("vkCreatePipelineLayout")
    }

    unsafe fn destroy_pipeline_layout(&self, _: vk::PipelineLayout) {
        self.log("vkDestroyPipelineLayout");
    }

    unsafe fn create_graphics_pipelines(
        &self,
        _: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        self.create_many("vkCreateGraphicsPipelines", infos.len())
    }

    unsafe fn create_compute_pipelines(
        &self,
        _: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        self.create_many("vkCreateComputePipelines", infos.len())
    }

    unsafe fn destroy_pipeline(&self, _: vk::Pipeline) {
        self.log("vkDestroyPipeline");
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        _: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.create("vkCreateDescriptorSetLayout")
    }

    unsafe fn destroy_descriptor_set_layout(&self, _: vk::DescriptorSetLayout) {
        self.log("vkDestroyDescriptorSetLayout");
    }

    unsafe fn create_descriptor_pool(&self, _: &vk::DescriptorPoolCreateInfo<'_>) -> VkResult<vk::DescriptorPool> {
        self.create("vkCreateDescriptorPool")
    }

    unsafe fn destroy_descriptor_pool(&self, _: vk::DescriptorPool) {
        self.log("vkDestroyDescriptorPool");
    }

    unsafe fn reset_descriptor_pool(&self, _: vk::DescriptorPool, _: vk::DescriptorPoolResetFlags) -> VkResult<()> {
        self.log("vkResetDescriptorPool");
        Ok(())
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.create_many("vkAllocateDescriptorSets", info.descriptor_set_count as usize)
    }

    unsafe fn free_descriptor_sets(&self, _: vk::DescriptorPool, _: &[vk::DescriptorSet]) -> VkResult<()> {
        self.log("vkFreeDescriptorSets");
        Ok(())
    }

    unsafe fn update_descriptor_sets(&self, _: &[vk::WriteDescriptorSet<'_>], _: &[vk::CopyDescriptorSet<'_>]) {
        self.log("vkUpdateDescriptorSets");
    }

    unsafe fn create_render_pass(&self, _: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        self.create("vkCreateRenderPass")
    }

    unsafe fn destroy_render_pass(&self, _: vk::RenderPass) {
        self.log("vkDestroyRenderPass");
    }

    unsafe fn create_framebuffer(&self, _: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        self.create("vkCreateFramebuffer")
    }

    unsafe fn destroy_framebuffer(&self, _: vk::Framebuffer) {
        self.log("vkDestroyFramebuffer");
    }

    unsafe fn create_command_pool(&self, _: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        self.create("vkCreateCommandPool")
    }

    unsafe fn destroy_command_pool(&self, _: vk::CommandPool) {
        self.log("vkDestroyCommandPool");
    }

    unsafe fn reset_command_pool(&self, _: vk::CommandPool, _: vk::CommandPoolResetFlags) -> VkResult<()> {
        self.log("vkResetCommandPool");
        Ok(())
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.create_many("vkAllocateCommandBuffers", info.command_buffer_count as usize)
    }

    unsafe fn free_command_buffers(&self, _: vk::CommandPool, _: &[vk::CommandBuffer]) {
        self.log("vkFreeCommandBuffers");
    }

    unsafe fn begin_command_buffer(&self, _: vk::CommandBuffer, _: &vk::CommandBufferBeginInfo<'_>) -> VkResult<()> {
        self.log("vkBeginCommandBuffer");
        Ok(())
    }

    unsafe fn end_command_buffer(&self, _: vk::CommandBuffer) -> VkResult<()> {
        self.log("vkEndCommandBuffer");
        Ok(())
    }

    unsafe fn reset_command_buffer(&self, _: vk::CommandBuffer, _: vk::CommandBufferResetFlags) -> VkResult<()> {
        self.log("vkResetCommandBuffer");
        Ok(())
    }

    unsafe fn cmd_bind_pipeline(&self, _: vk::CommandBuffer, _: vk::PipelineBindPoint, _: vk::Pipeline) {
        self.log("vkCmdBindPipeline");
    }

    unsafe fn cmd_set_viewport(&self, _: vk::CommandBuffer, _: u32, _: &[vk::Viewport]) {
        self.log("vkCmdSetViewport");
    }

    unsafe fn cmd_set_scissor(&self, _: vk::CommandBuffer, _: u32, _: &[vk::Rect2D]) {
        self.log("vkCmdSetScissor");
    }

    unsafe fn cmd_set_line_width(&self, _: vk::CommandBuffer, _: f32) {
        self.log("vkCmdSetLineWidth");
    }

    unsafe fn cmd_set_depth_bias(&self, _: vk::CommandBuffer, _: f32, _: f32, _: f32) {
        self.log("vkCmdSetDepthBias");
    }

    unsafe fn cmd_set_blend_constants(&self, _: vk::CommandBuffer, _: &[f32; 4]) {
        self.log("vkCmdSetBlendConstants");
    }

    unsafe fn cmd_set_depth_bounds(&self, _: vk::CommandBuffer, _: f32, _: f32) {
        self.log("vkCmdSetDepthBounds");
    }

    unsafe fn cmd_set_stencil_compare_mask(&self, _: vk::CommandBuffer, _: vk::StencilFaceFlags, _: u32) {
        self.log("vkCmdSetStencilCompareMask");
    }

    unsafe fn cmd_set_stencil_write_mask(&self, _: vk::CommandBuffer, _: vk::StencilFaceFlags, _: u32) {
        self.log("vkCmdSetStencilWriteMask");
    }

    unsafe fn cmd_set_stencil_reference(&self, _: vk::CommandBuffer, _: vk::StencilFaceFlags, _: u32) {
        self.log("vkCmdSetStencilReference");
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        _: vk::CommandBuffer,
        _: vk::PipelineBindPoint,
        _: vk::PipelineLayout,
        _: u32,
        _: &[vk::DescriptorSet],
        _: &[u32],
    ) {
        self.log("vkCmdBindDescriptorSets");
    }

    unsafe fn cmd_bind_index_buffer(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize, _: vk::IndexType) {
        self.log("vkCmdBindIndexBuffer");
    }

    unsafe fn cmd_bind_vertex_buffers(&self, _: vk::CommandBuffer, _: u32, _: &[vk::Buffer], _: &[vk::DeviceSize]) {
        self.log("vkCmdBindVertexBuffers");
    }

    unsafe fn cmd_draw(&self, _: vk::CommandBuffer, _: u32, _: u32, _: u32, _: u32) {
        self.log("vkCmdDraw");
    }

    unsafe fn cmd_draw_indexed(&self, _: vk::CommandBuffer, _: u32, _: u32, _: u32, _: i32, _: u32) {
        self.log("vkCmdDrawIndexed");
    }

    unsafe fn cmd_draw_indirect(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize, _: u32, _: u32) {
        self.log("vkCmdDrawIndirect");
    }

    unsafe fn cmd_draw_indexed_indirect(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize, _: u32, _: u32) {
        self.log("vkCmdDrawIndexedIndirect");
    }

    unsafe fn cmd_dispatch(&self, _: vk::CommandBuffer, _: u32, _: u32, _: u32) {
        self.log("vkCmdDispatch");
    }

    unsafe fn cmd_dispatch_indirect(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize) {
        self.log("vkCmdDispatchIndirect");
    }

    unsafe fn cmd_copy_buffer(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::Buffer, _: &[vk::BufferCopy]) {
        self.log("vkCmdCopyBuffer");
    }

    unsafe fn cmd_copy_image(
        &self,
        _: vk::CommandBuffer,
        _: vk::Image,
        _: vk::ImageLayout,
        _: vk::Image,
        _: vk::ImageLayout,
        _: &[vk::ImageCopy],
    ) {
        self.log("vkCmdCopyImage");
    }

    unsafe fn cmd_blit_image(
        &self,
        _: vk::CommandBuffer,
        _: vk::Image,
        _: vk::ImageLayout,
        _: vk::Image,
        _: vk::ImageLayout,
        _: &[vk::ImageBlit],
        _: vk::Filter,
    ) {
        self.log("vkCmdBlitImage");
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        _: vk::CommandBuffer,
        _: vk::Buffer,
        _: vk::Image,
        _: vk::ImageLayout,
        _: &[vk::BufferImageCopy],
    ) {
        self.log("vkCmdCopyBufferToImage");
    }

    unsafe fn cmd_copy_image_to_buffer(
        &self,
        _: vk::CommandBuffer,
        _: vk::Image,
        _: vk::ImageLayout,
        _: vk::Buffer,
        _: &[vk::BufferImageCopy],
    ) {
        self.log("vkCmdCopyImageToBuffer");
    }

    unsafe fn cmd_update_buffer(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize, _: &[u8]) {
        self.log("vkCmdUpdateBuffer");
    }

    unsafe fn cmd_fill_buffer(&self, _: vk::CommandBuffer, _: vk::Buffer, _: vk::DeviceSize, _: vk::DeviceSize, _: u32) {
        self.log("vkCmdFillBuffer");
    }

    unsafe fn cmd_clear_color_image(
        &self,
        _: vk::CommandBuffer,
        _: vk::Image,
        _: vk::ImageLayout,
        _: &vk::ClearColorValue,
        _: &[vk::ImageSubresourceRange],
    ) {
        self.log("vkCmdClearColorImage");
    }

    unsafe fn cmd_set_event(&self, _: vk::CommandBuffer, _: vk::Event, _: vk::PipelineStageFlags) {
        self.log("vkCmdSetEvent");
    }

    unsafe fn cmd_reset_event(&self, _: vk::CommandBuffer, _: vk::Event, _: vk::PipelineStageFlags) {
        self.log("vkCmdResetEvent");
    }

    unsafe fn cmd_wait_events(
        &self,
        _: vk::CommandBuffer,
        _: &[vk::Event],
        _: vk::PipelineStageFlags,
        _: vk::PipelineStageFlags,
        _: &[vk::MemoryBarrier<'_>],
        _: &[vk::BufferMemoryBarrier<'_>],
        _: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.log("vkCmdWaitEvents");
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        _: vk::CommandBuffer,
        _: vk::PipelineStageFlags,
        _: vk::PipelineStageFlags,
        _: vk::DependencyFlags,
        _: &[vk::MemoryBarrier<'_>],
        _: &[vk::BufferMemoryBarrier<'_>],
        _: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.log("vkCmdPipelineBarrier");
    }

    unsafe fn cmd_begin_render_pass(&self, _: vk::CommandBuffer, _: &vk::RenderPassBeginInfo<'_>, _: vk::SubpassContents) {
        self.log("vkCmdBeginRenderPass");
    }

    unsafe fn cmd_next_subpass(&self, _: vk::CommandBuffer, _: vk::SubpassContents) {
        self.log("vkCmdNextSubpass");
    }

    unsafe fn cmd_end_render_pass(&self, _: vk::CommandBuffer) {
        self.log("vkCmdEndRenderPass");
    }

    unsafe fn cmd_execute_commands(&self, _: vk::CommandBuffer, _: &[vk::CommandBuffer]) {
        self.log("vkCmdExecuteCommands");
    }

    unsafe fn get_device_queue(&self, family: u32, index: u32) -> vk::Queue {
        let mut state = self.state.lock();
        state.calls.push("vkGetDeviceQueue");
        let raw = *state
            .queues
            .entry((family, index))
            .or_insert_with(|| self.next_handle.fetch_add(1, Ordering::Relaxed));
        vk::Queue::from_raw(raw)
    }

    unsafe fn queue_submit(&self, _: vk::Queue, _: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> VkResult<()> {
        self.log("vkQueueSubmit");
        self.check_lost()?;
        if fence != vk::Fence::null() {
            self.state.lock().fences.insert(fence.as_raw(), true);
        }
        Ok(())
    }

    unsafe fn queue_wait_idle(&self, _: vk::Queue) -> VkResult<()> {
        self.log("vkQueueWaitIdle");
        self.check_lost()
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.log("vkDeviceWaitIdle");
        self.check_lost()
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.create("vkCreateFence")?;
        let signaled = info.flags.contains(vk::FenceCreateFlags::SIGNALED);
        self.state.lock().fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.calls.push("vkDestroyFence");
        state.fences.remove(&fence.as_raw());
    }

    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, _timeout: u64) -> VkResult<()> {
        self.log("vkWaitForFences");
        self.check_lost()?;
        let state = self.state.lock();
        let signaled = |f: &vk::Fence| state.fences.get(&f.as_raw()).copied().unwrap_or(false);
        let done = if wait_all {
            fences.iter().all(signaled)
        } else {
            fences.iter().any(signaled)
        };
        if done {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    unsafe fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        self.log("vkGetFenceStatus");
        self.check_lost()?;
        Ok(self
            .state
            .lock()
            .fences
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false))
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push("vkResetFences");
        for fence in fences {
            state.fences.insert(fence.as_raw(), false);
        }
        Ok(())
    }

    unsafe fn create_semaphore(&self, _: &vk::SemaphoreCreateInfo<'_>) -> VkResult<vk::Semaphore> {
        self.create("vkCreateSemaphore")
    }

    unsafe fn destroy_semaphore(&self, _: vk::Semaphore) {
        self.log("vkDestroySemaphore");
    }

    unsafe fn create_event(&self, _: &vk::EventCreateInfo<'_>) -> VkResult<vk::Event> {
        let event: vk::Event = self.create("vkCreateEvent")?;
        self.state.lock().events.insert(event.as_raw(), false);
        Ok(event)
    }

    unsafe fn destroy_event(&self, event: vk::Event) {
        let mut state = self.state.lock();
        state.calls.push("vkDestroyEvent");
        state.events.remove(&event.as_raw());
    }

    unsafe fn set_event(&self, event: vk::Event) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push("vkSetEvent");
        state.events.insert(event.as_raw(), true);
        Ok(())
    }

    unsafe fn reset_event(&self, event: vk::Event) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push("vkResetEvent");
        state.events.insert(event.as_raw(), false);
        Ok(())
    }

    unsafe fn get_event_status(&self, event: vk::Event) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.calls.push("vkGetEventStatus");
        Ok(state.events.get(&event.as_raw()).copied().unwrap_or(false))
    }
}
