//! Command pool, command buffer, and `vkCmd*` entry points.
//!
//! Recorded commands are `void` in Vulkan: a skipped command is simply not
//! forwarded. Every entry point claims the command buffer for the calling
//! thread while it runs.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::state::command_buffer::{
    BeginInfo, CbStatusFlags, ImageBarrier, InheritanceInfo,
};
use vkguard_protocol::{CmdType, ObjectHandle};

use crate::dispatch::DeviceDispatch;
use crate::{raw_handles, ValidationLayer, SKIPPED};

fn tracked_barriers(barriers: &[vk::ImageMemoryBarrier<'_>]) -> Vec<ImageBarrier> {
    barriers
        .iter()
        .map(|b| ImageBarrier {
            image: b.image.as_raw(),
            old_layout: b.old_layout,
            new_layout: b.new_layout,
        })
        .collect()
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── Command pools ───────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkCommandPoolCreateInfo`.
    pub unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        let pool = self.track(unsafe { self.dispatch.create_command_pool(info) })?;
        self.state.record_create_command_pool(pool.as_raw(), info);
        Ok(pool)
    }

    /// # Safety
    /// `pool` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        if pool == vk::CommandPool::null() {
            return;
        }
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self.state.destroy_command_pool(pool.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_command_pool(pool) }
    }

    /// # Safety
    /// `pool` must have been created from the wrapped device.
    pub unsafe fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()> {
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self.state.validate_reset_command_pool(pool.as_raw()) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.reset_command_pool(pool, flags) })?;
        self.state.record_reset_command_pool(pool.as_raw());
        Ok(())
    }

    // ── Command buffer lifecycle ────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkCommandBufferAllocateInfo`.
    pub unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let _claim = self.state.claim(ObjectHandle::of(info.command_pool));
        let cbs = self.track(unsafe { self.dispatch.allocate_command_buffers(info) })?;
        self.state.record_allocate_command_buffers(
            info.command_pool.as_raw(),
            info.level,
            &raw_handles(&cbs),
        );
        Ok(cbs)
    }

    /// # Safety
    /// `pool` and every command buffer must belong to the wrapped device.
    pub unsafe fn free_command_buffers(&self, pool: vk::CommandPool, cbs: &[vk::CommandBuffer]) {
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self
            .state
            .free_command_buffers(pool.as_raw(), &raw_handles(cbs))
        {
            return;
        }
        unsafe { self.dispatch.free_command_buffers(pool, cbs) }
    }

    /// # Safety
    /// `info` and its inheritance info, if any, must be valid.
    pub unsafe fn begin_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        let inheritance = unsafe { info.p_inheritance_info.as_ref() }.map(|i| InheritanceInfo {
            render_pass: i.render_pass.as_raw(),
            subpass: i.subpass,
            framebuffer: i.framebuffer.as_raw(),
        });
        let begin = BeginInfo {
            flags: info.flags,
            inheritance,
        };

        let _claim = self.state.claim(ObjectHandle::of(cb));
        if self.state.validate_begin_command_buffer(cb.as_raw(), &begin) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.begin_command_buffer(cb, info) })?;
        self.state.record_begin_command_buffer(cb.as_raw(), &begin);
        Ok(())
    }

    /// # Safety
    /// `cb` must have been allocated from the wrapped device.
    pub unsafe fn end_command_buffer(&self, cb: vk::CommandBuffer) -> VkResult<()> {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if self.state.validate_end_command_buffer(cb.as_raw()) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.end_command_buffer(cb) })?;
        self.state.record_end_command_buffer(cb.as_raw());
        Ok(())
    }

    /// # Safety
    /// `cb` must have been allocated from the wrapped device.
    pub unsafe fn reset_command_buffer(
        &self,
        cb: vk::CommandBuffer,
        flags: vk::CommandBufferResetFlags,
    ) -> VkResult<()> {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if self.state.validate_reset_command_buffer(cb.as_raw()) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.reset_command_buffer(cb, flags) })?;
        self.state.record_reset_command_buffer(cb.as_raw());
        Ok(())
    }

    // ── Pipeline and dynamic state ──────────────────────────────

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_bind_pipeline(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_bind_pipeline(cb.as_raw(), bind_point, pipeline.as_raw())
        {
            unsafe { self.dispatch.cmd_bind_pipeline(cb, bind_point, pipeline) }
        }
    }

    /// Record a `vkCmdSet*` call. Returns whether to forward it.
    fn set_dynamic(&self, cb: vk::CommandBuffer, cmd: CmdType, state: CbStatusFlags) -> bool {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        !self.state.cmd_set_dynamic_state(cb.as_raw(), cmd, state)
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_viewport(&self, cb: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]) {
        if self.set_dynamic(cb, CmdType::SetViewport, CbStatusFlags::VIEWPORT_SET) {
            unsafe { self.dispatch.cmd_set_viewport(cb, first, viewports) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_scissor(&self, cb: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]) {
        if self.set_dynamic(cb, CmdType::SetScissor, CbStatusFlags::SCISSOR_SET) {
            unsafe { self.dispatch.cmd_set_scissor(cb, first, scissors) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_line_width(&self, cb: vk::CommandBuffer, width: f32) {
        if self.set_dynamic(cb, CmdType::SetLineWidth, CbStatusFlags::LINE_WIDTH_SET) {
            unsafe { self.dispatch.cmd_set_line_width(cb, width) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_depth_bias(&self, cb: vk::CommandBuffer, constant: f32, clamp: f32, slope: f32) {
        if self.set_dynamic(cb, CmdType::SetDepthBias, CbStatusFlags::DEPTH_BIAS_SET) {
            unsafe { self.dispatch.cmd_set_depth_bias(cb, constant, clamp, slope) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_blend_constants(&self, cb: vk::CommandBuffer, constants: &[f32; 4]) {
        if self.set_dynamic(cb, CmdType::SetBlendConstants, CbStatusFlags::BLEND_CONSTANTS_SET) {
            unsafe { self.dispatch.cmd_set_blend_constants(cb, constants) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_depth_bounds(&self, cb: vk::CommandBuffer, min: f32, max: f32) {
        if self.set_dynamic(cb, CmdType::SetDepthBounds, CbStatusFlags::DEPTH_BOUNDS_SET) {
            unsafe { self.dispatch.cmd_set_depth_bounds(cb, min, max) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_stencil_compare_mask(&self, cb: vk::CommandBuffer, face: vk::StencilFaceFlags, mask: u32) {
        if self.set_dynamic(cb, CmdType::SetStencilCompareMask, CbStatusFlags::STENCIL_READ_MASK_SET) {
            unsafe { self.dispatch.cmd_set_stencil_compare_mask(cb, face, mask) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_stencil_write_mask(&self, cb: vk::CommandBuffer, face: vk::StencilFaceFlags, mask: u32) {
        if self.set_dynamic(cb, CmdType::SetStencilWriteMask, CbStatusFlags::STENCIL_WRITE_MASK_SET) {
            unsafe { self.dispatch.cmd_set_stencil_write_mask(cb, face, mask) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_set_stencil_reference(&self, cb: vk::CommandBuffer, face: vk::StencilFaceFlags, reference: u32) {
        if self.set_dynamic(cb, CmdType::SetStencilReference, CbStatusFlags::STENCIL_REFERENCE_SET) {
            unsafe { self.dispatch.cmd_set_stencil_reference(cb, face, reference) }
        }
    }

    // ── Resource binding ────────────────────────────────────────

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_bind_descriptor_sets(
        &self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_bind_descriptor_sets(
            cb.as_raw(),
            bind_point,
            layout.as_raw(),
            first_set,
            &raw_handles(sets),
            dynamic_offsets.len() as u32,
        ) {
            unsafe {
                self.dispatch
                    .cmd_bind_descriptor_sets(cb, bind_point, layout, first_set, sets, dynamic_offsets)
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_bind_index_buffer(cb.as_raw(), buffer.as_raw()) {
            unsafe { self.dispatch.cmd_bind_index_buffer(cb, buffer, offset, index_type) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_bind_vertex_buffers(
        &self,
        cb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_bind_vertex_buffers(cb.as_raw(), &raw_handles(buffers))
        {
            unsafe {
                self.dispatch
                    .cmd_bind_vertex_buffers(cb, first_binding, buffers, offsets)
            }
        }
    }

    // ── Draw and dispatch ───────────────────────────────────────

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_draw(
        &self,
        cb: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_draw(cb.as_raw(), CmdType::Draw) {
            unsafe {
                self.dispatch
                    .cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance)
            }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_draw(cb.as_raw(), CmdType::DrawIndexed) {
            unsafe {
                self.dispatch.cmd_draw_indexed(
                    cb,
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                )
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_draw_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_draw_indirect(cb.as_raw(), CmdType::DrawIndirect, buffer.as_raw())
        {
            unsafe { self.dispatch.cmd_draw_indirect(cb, buffer, offset, draw_count, stride) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_draw_indexed_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_draw_indirect(cb.as_raw(), CmdType::DrawIndexedIndirect, buffer.as_raw())
        {
            unsafe {
                self.dispatch
                    .cmd_draw_indexed_indirect(cb, buffer, offset, draw_count, stride)
            }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_dispatch(&self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_dispatch(cb.as_raw()) {
            unsafe { self.dispatch.cmd_dispatch(cb, x, y, z) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_dispatch_indirect(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_dispatch_indirect(cb.as_raw(), buffer.as_raw()) {
            unsafe { self.dispatch.cmd_dispatch_indirect(cb, buffer, offset) }
        }
    }

    // ── Transfers ───────────────────────────────────────────────

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_copy_buffer(cb.as_raw(), src.as_raw(), dst.as_raw(), regions)
        {
            unsafe { self.dispatch.cmd_copy_buffer(cb, src, dst, regions) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_copy_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_copy_image(
            cb.as_raw(),
            CmdType::CopyImage,
            src.as_raw(),
            src_layout,
            dst.as_raw(),
            dst_layout,
        ) {
            unsafe {
                self.dispatch
                    .cmd_copy_image(cb, src, src_layout, dst, dst_layout, regions)
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn cmd_blit_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_copy_image(
            cb.as_raw(),
            CmdType::BlitImage,
            src.as_raw(),
            src_layout,
            dst.as_raw(),
            dst_layout,
        ) {
            unsafe {
                self.dispatch
                    .cmd_blit_image(cb, src, src_layout, dst, dst_layout, regions, filter)
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_copy_buffer_to_image(
            cb.as_raw(),
            buffer.as_raw(),
            image.as_raw(),
            layout,
            regions,
        ) {
            unsafe {
                self.dispatch
                    .cmd_copy_buffer_to_image(cb, buffer, image, layout, regions)
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_copy_image_to_buffer(
        &self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_copy_image_to_buffer(
            cb.as_raw(),
            image.as_raw(),
            layout,
            buffer.as_raw(),
            regions,
        ) {
            unsafe {
                self.dispatch
                    .cmd_copy_image_to_buffer(cb, image, layout, buffer, regions)
            }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_update_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_update_buffer(
            cb.as_raw(),
            buffer.as_raw(),
            offset,
            data.len() as u64,
        ) {
            unsafe { self.dispatch.cmd_update_buffer(cb, buffer, offset, data) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_fill_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_fill_buffer(cb.as_raw(), buffer.as_raw(), offset, size)
        {
            unsafe { self.dispatch.cmd_fill_buffer(cb, buffer, offset, size, data) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_clear_color_image(
        &self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_clear_color_image(cb.as_raw(), image.as_raw(), layout)
        {
            unsafe {
                self.dispatch
                    .cmd_clear_color_image(cb, image, layout, color, ranges)
            }
        }
    }

    // ── Synchronization ─────────────────────────────────────────

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_set_event(
        &self,
        cb: vk::CommandBuffer,
        event: vk::Event,
        stage: vk::PipelineStageFlags,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_event(cb.as_raw(), CmdType::SetEvent, event.as_raw())
        {
            unsafe { self.dispatch.cmd_set_event(cb, event, stage) }
        }
    }

    /// # Safety
    /// Handles must belong to the wrapped device.
    pub unsafe fn cmd_reset_event(
        &self,
        cb: vk::CommandBuffer,
        event: vk::Event,
        stage: vk::PipelineStageFlags,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_event(cb.as_raw(), CmdType::ResetEvent, event.as_raw())
        {
            unsafe { self.dispatch.cmd_reset_event(cb, event, stage) }
        }
    }

    /// # Safety
    /// Handles and barriers must be valid for the wrapped device.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn cmd_wait_events(
        &self,
        cb: vk::CommandBuffer,
        events: &[vk::Event],
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_wait_events(
            cb.as_raw(),
            &raw_handles(events),
            &tracked_barriers(image_barriers),
        ) {
            unsafe {
                self.dispatch.cmd_wait_events(
                    cb,
                    events,
                    src_stage,
                    dst_stage,
                    memory_barriers,
                    buffer_barriers,
                    image_barriers,
                )
            }
        }
    }

    /// # Safety
    /// Barriers must be valid for the wrapped device.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn cmd_pipeline_barrier(
        &self,
        cb: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_pipeline_barrier(cb.as_raw(), &tracked_barriers(image_barriers))
        {
            unsafe {
                self.dispatch.cmd_pipeline_barrier(
                    cb,
                    src_stage,
                    dst_stage,
                    dependency_flags,
                    memory_barriers,
                    buffer_barriers,
                    image_barriers,
                )
            }
        }
    }

    // ── Render pass instances ───────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkRenderPassBeginInfo`.
    pub unsafe fn cmd_begin_render_pass(
        &self,
        cb: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_begin_render_pass(
            cb.as_raw(),
            info.render_pass.as_raw(),
            info.framebuffer.as_raw(),
            contents,
        ) {
            unsafe { self.dispatch.cmd_begin_render_pass(cb, info, contents) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_next_subpass(&self, cb: vk::CommandBuffer, contents: vk::SubpassContents) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_next_subpass(cb.as_raw(), contents) {
            unsafe { self.dispatch.cmd_next_subpass(cb, contents) }
        }
    }

    /// # Safety
    /// `cb` must be a valid command buffer of the wrapped device.
    pub unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self.state.cmd_end_render_pass(cb.as_raw()) {
            unsafe { self.dispatch.cmd_end_render_pass(cb) }
        }
    }

    /// # Safety
    /// Every command buffer must belong to the wrapped device.
    pub unsafe fn cmd_execute_commands(
        &self,
        cb: vk::CommandBuffer,
        secondaries: &[vk::CommandBuffer],
    ) {
        let _claim = self.state.claim(ObjectHandle::of(cb));
        if !self
            .state
            .cmd_execute_commands(cb.as_raw(), &raw_handles(secondaries))
        {
            unsafe { self.dispatch.cmd_execute_commands(cb, secondaries) }
        }
    }
}
