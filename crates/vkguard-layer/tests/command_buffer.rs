//! Integration test: command buffer lifecycle and recording checks
//!
//! Drives the validation layer over the null driver through begin, record,
//! end, reset and submit, and checks the codes raised for misuse.
//!
//! Run with: cargo test -p vkguard-layer --test command_buffer

mod common;

use ash::vk::{self, Handle};
use common::*;
use vkguard_core::config::DebugAction;
use vkguard_core::state::command_buffer::CbState;
use vkguard_core::VkGuardConfig;
use vkguard_layer::SKIPPED;
use vkguard_protocol::{DrawStateError, MemTrackError};

fn break_config() -> VkGuardConfig {
    let mut config = VkGuardConfig::default();
    config.report.actions.push(DebugAction::Break);
    config
}

fn cb_state(h: &Harness, cb: vk::CommandBuffer) -> Option<CbState> {
    h.layer.state().command_buffer_state(cb.as_raw())
}

fn in_flight(h: &Harness, cb: vk::CommandBuffer) -> Option<u32> {
    h.layer
        .state()
        .command_buffers
        .with(cb.as_raw(), |r| r.in_flight)
}

/// A primary command buffer recording inside a render pass with `pipeline`
/// bound.
fn recording_with_pipeline(h: &Harness, dynamic: &[vk::DynamicState]) -> vk::CommandBuffer {
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let layout = h.pipeline_layout(&[]);
    let pipeline = h.graphics_pipeline(layout, rp, dynamic);
    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline)
    };
    cb
}

#[test]
fn test_begin_end_lifecycle() {
    let h = make_harness();
    let cb = h.primary();
    assert_eq!(cb_state(&h, cb), Some(CbState::New));

    h.begin(cb);
    assert_eq!(cb_state(&h, cb), Some(CbState::Recording));

    h.end(cb);
    assert_eq!(cb_state(&h, cb), Some(CbState::Recorded));
    h.assert_clean();
    assert_eq!(h.driver().call_count("vkEndCommandBuffer"), 1);
}

#[test]
fn test_end_without_begin() {
    let h = make_harness();
    let cb = h.primary();
    let _ = unsafe { h.layer.end_command_buffer(cb) };
    assert!(h.has(DrawStateError::NoBeginCommandBuffer));
}

#[test]
fn test_end_without_begin_skipped_on_break() {
    let h = make_harness_with(break_config());
    let cb = h.primary();
    let result = unsafe { h.layer.end_command_buffer(cb) };
    assert_eq!(result, Err(SKIPPED));
    assert!(h.has(DrawStateError::NoBeginCommandBuffer));
    assert_eq!(h.driver().call_count("vkEndCommandBuffer"), 0);
    assert_eq!(cb_state(&h, cb), Some(CbState::New));
}

#[test]
fn test_begin_while_recording() {
    let h = make_harness();
    let cb = h.primary();
    h.begin(cb);
    let info = vk::CommandBufferBeginInfo::default();
    let _ = unsafe { h.layer.begin_command_buffer(cb, &info) };
    assert!(h.has(DrawStateError::BeginCbInvalidState));
}

#[test]
fn test_secondary_without_inheritance() {
    let h = make_harness();
    let pool = h.command_pool(vk::CommandPoolCreateFlags::empty());
    let secondary = h.command_buffer(pool, vk::CommandBufferLevel::SECONDARY);
    let info = vk::CommandBufferBeginInfo::default();
    let _ = unsafe { h.layer.begin_command_buffer(secondary, &info) };
    assert!(h.has(DrawStateError::BeginCbInvalidState));
}

#[test]
fn test_command_outside_recording() {
    let h = make_harness();
    let cb = h.recorded();
    unsafe { h.layer.cmd_dispatch(cb, 1, 1, 1) };
    assert!(h.has(DrawStateError::NoBeginCommandBuffer));
    // Reported but still forwarded without the break action
    assert_eq!(h.driver().call_count("vkCmdDispatch"), 1);
}

#[test]
fn test_command_outside_recording_skipped_on_break() {
    let h = make_harness_with(break_config());
    let cb = h.recorded();
    unsafe { h.layer.cmd_dispatch(cb, 1, 1, 1) };
    assert!(h.has(DrawStateError::NoBeginCommandBuffer));
    assert_eq!(h.driver().call_count("vkCmdDispatch"), 0);
}

#[test]
fn test_draw_outside_render_pass() {
    let h = make_harness();
    let cb = h.primary();
    h.begin(cb);
    unsafe { h.layer.cmd_draw(cb, 3, 1, 0, 0) };
    assert!(h.has(DrawStateError::NoActiveRenderpass));
    assert!(h.has(DrawStateError::NoPipelineBound));
}

#[test]
fn test_copy_inside_render_pass() {
    let h = make_harness();
    let (src, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_SRC);
    let (dst, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size: 64,
    };
    unsafe { h.layer.cmd_copy_buffer(cb, src, dst, &[region]) };
    assert!(h.has(DrawStateError::InvalidRenderpassCmd));
}

#[test]
fn test_end_inside_render_pass() {
    let h = make_harness();
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    let _ = unsafe { h.layer.end_command_buffer(cb) };
    assert!(h.has(DrawStateError::InvalidRenderpassCmd));
}

#[test]
fn test_draw_requires_dynamic_viewport() {
    let h = make_harness();
    let cb = recording_with_pipeline(&h, &[vk::DynamicState::VIEWPORT]);
    h.assert_clean();

    unsafe { h.layer.cmd_draw(cb, 3, 1, 0, 0) };
    assert!(h.has(DrawStateError::ViewportNotBound));
    assert!(!h.has(DrawStateError::ScissorNotBound));

    h.clear();
    let viewport = vk::Viewport {
        width: 16.0,
        height: 16.0,
        max_depth: 1.0,
        ..Default::default()
    };
    unsafe {
        h.layer.cmd_set_viewport(cb, 0, &[viewport]);
        h.layer.cmd_draw(cb, 3, 1, 0, 0);
    }
    h.assert_clean();
}

#[test]
fn test_draw_requires_every_dynamic_stencil_state() {
    let h = make_harness();
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let layout = h.pipeline_layout(&[]);
    let module = h.shader_module(vkguard_core::spirv::EXECUTION_MODEL_VERTEX, "main");
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"main")];
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default().stencil_test_enable(true);
    let dynamic = [
        vk::DynamicState::STENCIL_COMPARE_MASK,
        vk::DynamicState::STENCIL_WRITE_MASK,
        vk::DynamicState::STENCIL_REFERENCE,
    ];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic);
    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .depth_stencil_state(&depth_stencil)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(rp)
        .subpass(0);
    let pipeline = unsafe {
        h.layer
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info])
    }
    .expect("create graphics pipeline")[0];

    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
        h.layer
            .cmd_set_stencil_compare_mask(cb, vk::StencilFaceFlags::FRONT_AND_BACK, 0xff);
        h.layer
            .cmd_set_stencil_write_mask(cb, vk::StencilFaceFlags::FRONT_AND_BACK, 0xff);
        h.layer.cmd_draw(cb, 3, 1, 0, 0);
    }
    assert!(h.has(DrawStateError::StencilNotBound));

    h.clear();
    unsafe {
        h.layer
            .cmd_set_stencil_reference(cb, vk::StencilFaceFlags::FRONT_AND_BACK, 1);
        h.layer.cmd_draw(cb, 3, 1, 0, 0);
    }
    h.assert_clean();
}

#[test]
fn test_static_state_needs_no_command() {
    let h = make_harness();
    let cb = recording_with_pipeline(&h, &[]);
    unsafe { h.layer.cmd_draw(cb, 3, 1, 0, 0) };
    h.assert_clean();
    assert_eq!(h.driver().call_count("vkCmdDraw"), 1);
}

#[test]
fn test_indexed_draw_without_index_buffer() {
    let h = make_harness();
    let cb = recording_with_pipeline(&h, &[]);
    unsafe { h.layer.cmd_draw_indexed(cb, 3, 1, 0, 0, 0) };
    assert!(h.has(DrawStateError::IndexBufferNotBound));

    h.clear();
    let (index, _) = h.bound_buffer(64, vk::BufferUsageFlags::INDEX_BUFFER);
    unsafe {
        h.layer
            .cmd_bind_index_buffer(cb, index, 0, vk::IndexType::UINT16);
        h.layer.cmd_draw_indexed(cb, 3, 1, 0, 0, 0);
    }
    h.assert_clean();
}

#[test]
fn test_buffer_usage_and_binding() {
    let h = make_harness();
    let cb = recording_with_pipeline(&h, &[]);

    // Created without VERTEX_BUFFER usage
    let (wrong_usage, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_SRC);
    unsafe { h.layer.cmd_bind_vertex_buffers(cb, 0, &[wrong_usage], &[0]) };
    assert!(h.has(MemTrackError::InvalidUsageFlag));

    h.clear();
    let unbound = h.buffer(64, vk::BufferUsageFlags::VERTEX_BUFFER);
    unsafe { h.layer.cmd_bind_vertex_buffers(cb, 0, &[unbound], &[0]) };
    assert!(h.has(MemTrackError::ObjectNotBound));
}

#[test]
fn test_descriptor_set_required_by_pipeline() {
    let h = make_harness();
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX);
    let set_layout = h.set_layout(&[binding]);
    let layout = h.pipeline_layout(&[set_layout]);
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let pipeline = h.graphics_pipeline(layout, rp, &[]);

    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
        h.layer.cmd_draw(cb, 3, 1, 0, 0);
    }
    assert!(h.has(DrawStateError::DescriptorSetNotBound));
}

#[test]
fn test_copy_out_of_bounds() {
    let h = make_harness();
    let (src, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_SRC);
    let (dst, _) = h.bound_buffer(32, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary();
    h.begin(cb);
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 16,
        size: 32,
    };
    unsafe { h.layer.cmd_copy_buffer(cb, src, dst, &[region]) };
    assert!(h.has(DrawStateError::CopyOutOfBounds));
}

#[test]
fn test_destroyed_buffer_invalidates_recording() {
    let h = make_harness();
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary();
    h.begin(cb);
    unsafe { h.layer.cmd_fill_buffer(cb, buffer, 0, 64, 0) };
    h.end(cb);
    h.assert_clean();

    unsafe { h.layer.destroy_buffer(buffer) };
    assert_eq!(cb_state(&h, cb), Some(CbState::Invalid));

    let _ = h.submit(h.queue(), &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::InvalidCommandBuffer));
}

#[test]
fn test_submit_unfinished_recording() {
    let h = make_harness();
    let cb = h.primary();
    h.begin(cb);
    let _ = h.submit(h.queue(), &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::NoEndCommandBuffer));
}

#[test]
fn test_reset_in_flight_keeps_record() {
    let h = make_harness_with(break_config());
    let cb = h.recorded();
    h.submit(h.queue(), &[cb], vk::Fence::null())
        .expect("submit");

    let result = unsafe {
        h.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
    };
    assert_eq!(result, Err(SKIPPED));
    assert!(h.has(DrawStateError::ResetCbWhileInFlight));
    assert_eq!(cb_state(&h, cb), Some(CbState::Recorded));
    assert_eq!(h.driver().call_count("vkResetCommandBuffer"), 0);
}

#[test]
fn test_reset_in_flight_forwarded_then_retired() {
    let h = make_harness();
    let queue = h.queue();
    let cb = h.recorded();
    h.submit(queue, &[cb], vk::Fence::null()).expect("submit");

    unsafe {
        h.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
    }
    .expect("reset is forwarded");
    assert!(h.has(DrawStateError::ResetCbWhileInFlight));
    assert_eq!(cb_state(&h, cb), Some(CbState::New));
    assert_eq!(in_flight(&h, cb), Some(1));

    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");
    assert_eq!(in_flight(&h, cb), Some(0));
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 0);

    h.clear();
    h.begin(cb);
    h.end(cb);
    h.submit(queue, &[cb], vk::Fence::null()).expect("resubmit");
    h.assert_clean();
}

#[test]
fn test_reset_after_completion() {
    let h = make_harness();
    let cb = h.recorded();
    let queue = h.queue();
    h.submit(queue, &[cb], vk::Fence::null()).expect("submit");
    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");

    unsafe {
        h.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
    }
    .expect("reset");
    h.assert_clean();
    assert_eq!(cb_state(&h, cb), Some(CbState::New));
}

#[test]
fn test_reset_requires_pool_flag() {
    let h = make_harness();
    let pool = h.command_pool(vk::CommandPoolCreateFlags::empty());
    let cb = h.command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    h.begin(cb);
    h.end(cb);
    let _ = unsafe {
        h.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
    };
    assert!(h.has(DrawStateError::InvalidCommandBufferReset));
}

#[test]
fn test_one_time_submit_twice() {
    let h = make_harness();
    let queue = h.queue();
    let cb = h.primary();
    h.begin_with(cb, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    h.end(cb);

    h.submit(queue, &[cb], vk::Fence::null()).expect("submit");
    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");
    h.assert_clean();

    let _ = h.submit(queue, &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::CommandBufferSingleSubmitViolation));
    assert!(!h.has(DrawStateError::InvalidCbSimultaneousUse));
}

#[test]
fn test_resubmit_without_simultaneous_use() {
    let h = make_harness();
    let queue = h.queue();
    let cb = h.recorded();
    h.submit(queue, &[cb], vk::Fence::null()).expect("submit");
    let _ = h.submit(queue, &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::InvalidCbSimultaneousUse));

    h.clear();
    let simultaneous = h.primary();
    h.begin_with(simultaneous, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
    h.end(simultaneous);
    h.submit(queue, &[simultaneous], vk::Fence::null()).expect("submit");
    h.submit(queue, &[simultaneous], vk::Fence::null()).expect("submit");
    h.assert_clean();
}

#[test]
fn test_execute_unrecorded_secondary() {
    let h = make_harness();
    let pool = h.command_pool(vk::CommandPoolCreateFlags::empty());
    let secondary = h.command_buffer(pool, vk::CommandBufferLevel::SECONDARY);
    let cb = h.primary();
    h.begin(cb);
    unsafe { h.layer.cmd_execute_commands(cb, &[secondary]) };
    assert!(h.has(DrawStateError::InvalidSecondaryCommandBuffer));
}

#[test]
fn test_subpass_index_checks() {
    let h = make_harness();
    let rp = h.render_pass(2);
    let fb = h.framebuffer(rp);
    let cb = h.primary();
    h.begin(cb);

    h.begin_render_pass(cb, rp, fb);
    unsafe { h.layer.cmd_end_render_pass(cb) };
    assert!(h.has(DrawStateError::InvalidSubpassIndex));

    h.clear();
    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer.cmd_next_subpass(cb, vk::SubpassContents::INLINE);
        h.layer.cmd_end_render_pass(cb);
    }
    h.assert_clean();

    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer.cmd_next_subpass(cb, vk::SubpassContents::INLINE);
        h.layer.cmd_next_subpass(cb, vk::SubpassContents::INLINE);
    }
    assert!(h.has(DrawStateError::InvalidSubpassIndex));
}

#[test]
fn test_free_command_buffers_returns_to_registry() {
    let h = make_harness();
    let pool = h.command_pool(vk::CommandPoolCreateFlags::empty());
    let cb = h.command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    unsafe { h.layer.free_command_buffers(pool, &[cb]) };
    assert_eq!(cb_state(&h, cb), None);
    h.assert_clean();
}
