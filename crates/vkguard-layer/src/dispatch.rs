//! The next link in the device call chain.
//!
//! [`DeviceDispatch`] has one method per intercepted device-level call, with
//! `ash::Device` signatures minus allocation callbacks. [`AshDispatch`]
//! forwards to a real driver; the null driver in [`crate::null_driver`]
//! stands in for one in tests.

use std::ffi::c_void;

use ash::prelude::VkResult;
use ash::vk;

/// Device-level Vulkan entry points below the layer.
///
/// # Safety
/// Every method has the preconditions of the Vulkan command it forwards.
#[allow(clippy::too_many_arguments)]
pub trait DeviceDispatch: Send + Sync {
    fn handle(&self) -> vk::Device;

    unsafe fn destroy_device(&self);

    // ── Memory ──────────────────────────────────────────────
    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory>;
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    // ── Buffers and images ──────────────────────────────────
    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);
    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;
    unsafe fn destroy_image(&self, image: vk::Image);
    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    // ── Shaders and pipelines ───────────────────────────────
    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);
    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    unsafe fn create_graphics_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>>;
    unsafe fn create_compute_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // ── Descriptors ─────────────────────────────────────────
    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool>;
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    unsafe fn reset_descriptor_pool(
        &self,
        pool: vk::DescriptorPool,
        flags: vk::DescriptorPoolResetFlags,
    ) -> VkResult<()>;
    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    unsafe fn free_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> VkResult<()>;
    unsafe fn update_descriptor_sets(
        &self,
        writes: &[vk::WriteDescriptorSet<'_>],
        copies: &[vk::CopyDescriptorSet<'_>],
    );

    // ── Render passes ───────────────────────────────────────
    unsafe fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    unsafe fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // ── Command pools and buffers ───────────────────────────
    unsafe fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool);
    unsafe fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()>;
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, cbs: &[vk::CommandBuffer]);
    unsafe fn begin_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cb: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn reset_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        flags: vk::CommandBufferResetFlags,
    ) -> VkResult<()>;

    // ── Recorded commands ───────────────────────────────────
    unsafe fn cmd_bind_pipeline(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    unsafe fn cmd_set_viewport(&self, cb: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]);
    unsafe fn cmd_set_scissor(&self, cb: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]);
    unsafe fn cmd_set_line_width(&self, cb: vk::CommandBuffer, width: f32);
    unsafe fn cmd_set_depth_bias(&self, cb: vk::CommandBuffer, constant: f32, clamp: f32, slope: f32);
    unsafe fn cmd_set_blend_constants(&self, cb: vk::CommandBuffer, constants: &[f32; 4]);
    unsafe fn cmd_set_depth_bounds(&self, cb: vk::CommandBuffer, min: f32, max: f32);
    unsafe fn cmd_set_stencil_compare_mask(
        &self,
        cb: vk::CommandBuffer,
        face: vk::StencilFaceFlags,
        mask: u32,
    );
    unsafe fn cmd_set_stencil_write_mask(&self, cb: vk::CommandBuffer, face: vk::StencilFaceFlags, mask: u32);
    unsafe fn cmd_set_stencil_reference(
        &self,
        cb: vk::CommandBuffer,
        face: vk::StencilFaceFlags,
        reference: u32,
    );
    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    unsafe fn cmd_draw(&self, cb: vk::CommandBuffer, vertices: u32, instances: u32, first_vertex: u32, first_instance: u32);
    unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        indices: u32,
        instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    unsafe fn cmd_draw_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );
    unsafe fn cmd_draw_indexed_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );
    unsafe fn cmd_dispatch(&self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32);
    unsafe fn cmd_dispatch_indirect(&self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize);
    unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    unsafe fn cmd_copy_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );
    unsafe fn cmd_blit_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    unsafe fn cmd_copy_image_to_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    );
    unsafe fn cmd_update_buffer(&self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]);
    unsafe fn cmd_fill_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    );
    unsafe fn cmd_clear_color_image(
        &self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    );
    unsafe fn cmd_set_event(&self, cb: vk::CommandBuffer, event: vk::Event, stages: vk::PipelineStageFlags);
    unsafe fn cmd_reset_event(&self, cb: vk::CommandBuffer, event: vk::Event, stages: vk::PipelineStageFlags);
    unsafe fn cmd_wait_events(
        &self,
        cb: vk::CommandBuffer,
        events: &[vk::Event],
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
    unsafe fn cmd_pipeline_barrier(
        &self,
        cb: vk::CommandBuffer,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
    unsafe fn cmd_begin_render_pass(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    );
    unsafe fn cmd_next_subpass(&self, cb: vk::CommandBuffer, contents: vk::SubpassContents);
    unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer);
    unsafe fn cmd_execute_commands(&self, cb: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]);

    // ── Queues and synchronization ──────────────────────────
    unsafe fn get_device_queue(&self, family: u32, index: u32) -> vk::Queue;
    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()>;
    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
    unsafe fn device_wait_idle(&self) -> VkResult<()>;
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout: u64) -> VkResult<()>;
    unsafe fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool>;
    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;
    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo<'_>) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    unsafe fn create_event(&self, info: &vk::EventCreateInfo<'_>) -> VkResult<vk::Event>;
    unsafe fn destroy_event(&self, event: vk::Event);
    unsafe fn set_event(&self, event: vk::Event) -> VkResult<()>;
    unsafe fn reset_event(&self, event: vk::Event) -> VkResult<()>;
    unsafe fn get_event_status(&self, event: vk::Event) -> VkResult<bool>;
}

/// Forwards every call to a real `ash::Device`.
pub struct AshDispatch {
    device: ash::Device,
}

impl AshDispatch {
    pub fn new(device: ash::Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

fn first_error<T>(result: Result<Vec<T>, (Vec<T>, vk::Result)>) -> VkResult<Vec<T>> {
    result.map_err(|(_, e)| e)
}

impl DeviceDispatch for AshDispatch {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    unsafe fn destroy_device(&self) {
        self.device.destroy_device(None)
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        self.device.allocate_memory(info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.device.free_memory(memory, None)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void> {
        self.device.map_memory(memory, offset, size, flags)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.device.unmap_memory(memory)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_buffer_memory(buffer, memory, offset)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_image_memory(image, memory, offset)
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        self.device.create_buffer(info, None)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.device.destroy_buffer(buffer, None)
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.device.create_image(info, None)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.device.destroy_image(image, None)
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None)
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        self.device.create_shader_module(info, None)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.device.destroy_shader_module(module, None)
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        self.device.create_pipeline_layout(info, None)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.device.destroy_pipeline_layout(layout, None)
    }

    unsafe fn create_graphics_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        first_error(self.device.create_graphics_pipelines(cache, infos, None))
    }

    unsafe fn create_compute_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        first_error(self.device.create_compute_pipelines(cache, infos, None))
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.destroy_pipeline(pipeline, None)
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.device.create_descriptor_set_layout(info, None)
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.device.destroy_descriptor_set_layout(layout, None)
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        self.device.create_descriptor_pool(info, None)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.device.destroy_descriptor_pool(pool, None)
    }

    unsafe fn reset_descriptor_pool(
        &self,
        pool: vk::DescriptorPool,
        flags: vk::DescriptorPoolResetFlags,
    ) -> VkResult<()> {
        self.device.reset_descriptor_pool(pool, flags)
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.device.allocate_descriptor_sets(info)
    }

    unsafe fn free_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> VkResult<()> {
        self.device.free_descriptor_sets(pool, sets)
    }

    unsafe fn update_descriptor_sets(
        &self,
        writes: &[vk::WriteDescriptorSet<'_>],
        copies: &[vk::CopyDescriptorSet<'_>],
    ) {
        self.device.update_descriptor_sets(writes, copies)
    }

    unsafe fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        self.device.create_render_pass(info, None)
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.device.destroy_render_pass(render_pass, None)
    }

    unsafe fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        self.device.create_framebuffer(info, None)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.device.destroy_framebuffer(framebuffer, None)
    }

    unsafe fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        self.device.create_command_pool(info, None)
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.device.destroy_command_pool(pool, None)
    }

    unsafe fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()> {
        self.device.reset_command_pool(pool, flags)
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(info)
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, cbs: &[vk::CommandBuffer]) {
        self.device.free_command_buffers(pool, cbs)
    }

    unsafe fn begin_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        self.device.begin_command_buffer(cb, info)
    }

    unsafe fn end_command_buffer(&self, cb: vk::CommandBuffer) -> VkResult<()> {
        self.device.end_command_buffer(cb)
    }

    unsafe fn reset_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        flags: vk::CommandBufferResetFlags,
    ) -> VkResult<()> {
        self.device.reset_command_buffer(cb, flags)
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.device.cmd_bind_pipeline(cb, bind_point, pipeline)
    }

    unsafe fn cmd_set_viewport(&self, cb: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]) {
        self.device.cmd_set_viewport(cb, first, viewports)
    }

    unsafe fn cmd_set_scissor(&self, cb: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]) {
        self.device.cmd_set_scissor(cb, first, scissors)
    }

    unsafe fn cmd_set_line_width(&self, cb: vk::CommandBuffer, width: f32) {
        self.device.cmd_set_line_width(cb, width)
    }

    unsafe fn cmd_set_depth_bias(&self, cb: vk::CommandBuffer, constant: f32, clamp: f32, slope: f32) {
        self.device.cmd_set_depth_bias(cb, constant, clamp, slope)
    }

    unsafe fn cmd_set_blend_constants(&self, cb: vk::CommandBuffer, constants: &[f32; 4]) {
        self.device.cmd_set_blend_constants(cb, constants)
    }

    unsafe fn cmd_set_depth_bounds(&self, cb: vk::CommandBuffer, min: f32, max: f32) {
        self.device.cmd_set_depth_bounds(cb, min, max)
    }

    unsafe fn cmd_set_stencil_compare_mask(
        &self,
        cb: vk::CommandBuffer,
        face: vk::StencilFaceFlags,
        mask: u32,
    ) {
        self.device.cmd_set_stencil_compare_mask(cb, face, mask)
    }

    unsafe fn cmd_set_stencil_write_mask(&self, cb: vk::CommandBuffer, face: vk::StencilFaceFlags, mask: u32) {
        self.device.cmd_set_stencil_write_mask(cb, face, mask)
    }

    unsafe fn cmd_set_stencil_reference(
        &self,
        cb: vk::CommandBuffer,
        face: vk::StencilFaceFlags,
        reference: u32,
    ) {
        self.device.cmd_set_stencil_reference(cb, face, reference)
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.device
            .cmd_bind_descriptor_sets(cb, bind_point, layout, first_set, sets, dynamic_offsets)
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.device.cmd_bind_index_buffer(cb, buffer, offset, index_type)
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.device
            .cmd_bind_vertex_buffers(cb, first_binding, buffers, offsets)
    }

    unsafe fn cmd_draw(&self, cb: vk::CommandBuffer, vertices: u32, instances: u32, first_vertex: u32, first_instance: u32) {
        self.device
            .cmd_draw(cb, vertices, instances, first_vertex, first_instance)
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        indices: u32,
        instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.device.cmd_draw_indexed(
            cb,
            indices,
            instances,
            first_index,
            vertex_offset,
            first_instance,
        )
    }

    unsafe fn cmd_draw_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.device
            .cmd_draw_indirect(cb, buffer, offset, draw_count, stride)
    }

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.device
            .cmd_draw_indexed_indirect(cb, buffer, offset, draw_count, stride)
    }

    unsafe fn cmd_dispatch(&self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.device.cmd_dispatch(cb, x, y, z)
    }

    unsafe fn cmd_dispatch_indirect(&self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize) {
        self.device.cmd_dispatch_indirect(cb, buffer, offset)
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.device.cmd_copy_buffer(cb, src, dst, regions)
    }

    unsafe fn cmd_copy_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        self.device
            .cmd_copy_image(cb, src, src_layout, dst, dst_layout, regions)
    }

    unsafe fn cmd_blit_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.device
            .cmd_blit_image(cb, src, src_layout, dst, dst_layout, regions, filter)
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device
            .cmd_copy_buffer_to_image(cb, src, dst, dst_layout, regions)
    }

    unsafe fn cmd_copy_image_to_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device
            .cmd_copy_image_to_buffer(cb, src, src_layout, dst, regions)
    }

    unsafe fn cmd_update_buffer(&self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        self.device.cmd_update_buffer(cb, buffer, offset, data)
    }

    unsafe fn cmd_fill_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    ) {
        self.device.cmd_fill_buffer(cb, buffer, offset, size, data)
    }

    unsafe fn cmd_clear_color_image(
        &self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.device
            .cmd_clear_color_image(cb, image, layout, color, ranges)
    }

    unsafe fn cmd_set_event(&self, cb: vk::CommandBuffer, event: vk::Event, stages: vk::PipelineStageFlags) {
        self.device.cmd_set_event(cb, event, stages)
    }

    unsafe fn cmd_reset_event(&self, cb: vk::CommandBuffer, event: vk::Event, stages: vk::PipelineStageFlags) {
        self.device.cmd_reset_event(cb, event, stages)
    }

    unsafe fn cmd_wait_events(
        &self,
        cb: vk::CommandBuffer,
        events: &[vk::Event],
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.device.cmd_wait_events(
            cb,
            events,
            src_stages,
            dst_stages,
            memory_barriers,
            buffer_barriers,
            image_barriers,
        )
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cb: vk::CommandBuffer,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.device.cmd_pipeline_barrier(
            cb,
            src_stages,
            dst_stages,
            dependency_flags,
            memory_barriers,
            buffer_barriers,
            image_barriers,
        )
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        self.device.cmd_begin_render_pass(cb, info, contents)
    }

    unsafe fn cmd_next_subpass(&self, cb: vk::CommandBuffer, contents: vk::SubpassContents) {
        self.device.cmd_next_subpass(cb, contents)
    }

    unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer) {
        self.device.cmd_end_render_pass(cb)
    }

    unsafe fn cmd_execute_commands(&self, cb: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        self.device.cmd_execute_commands(cb, secondaries)
    }

    unsafe fn get_device_queue(&self, family: u32, index: u32) -> vk::Queue {
        self.device.get_device_queue(family, index)
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.device.queue_submit(queue, submits, fence)
    }

    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        self.device.queue_wait_idle(queue)
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.device.device_wait_idle()
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        self.device.create_fence(info, None)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.device.destroy_fence(fence, None)
    }

    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout: u64) -> VkResult<()> {
        self.device.wait_for_fences(fences, wait_all, timeout)
    }

    unsafe fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        self.device.get_fence_status(fence)
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        self.device.reset_fences(fences)
    }

    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo<'_>) -> VkResult<vk::Semaphore> {
        self.device.create_semaphore(info, None)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.device.destroy_semaphore(semaphore, None)
    }

    unsafe fn create_event(&self, info: &vk::EventCreateInfo<'_>) -> VkResult<vk::Event> {
        self.device.create_event(info, None)
    }

    unsafe fn destroy_event(&self, event: vk::Event) {
        self.device.destroy_event(event, None)
    }

    unsafe fn set_event(&self, event: vk::Event) -> VkResult<()> {
        self.device.set_event(event)
    }

    unsafe fn reset_event(&self, event: vk::Event) -> VkResult<()> {
        self.device.reset_event(event)
    }

    unsafe fn get_event_status(&self, event: vk::Event) -> VkResult<bool> {
        self.device.get_event_status(event)
    }
}
