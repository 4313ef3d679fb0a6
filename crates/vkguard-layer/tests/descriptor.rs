//! Integration test: descriptor pools, sets and updates
//!
//! Run with: cargo test -p vkguard-layer --test descriptor

mod common;

use ash::vk::{self, Handle};
use common::*;
use vkguard_core::state::command_buffer::CbState;
use vkguard_protocol::{DrawStateError, MemTrackError, ReportFlags, ValidationCode};

fn uniform_binding(binding: u32, count: u32) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(count)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
}

fn make_pool(h: &Harness, flags: vk::DescriptorPoolCreateFlags, max_sets: u32) -> vk::DescriptorPool {
    let sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 4,
    }];
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(flags)
        .max_sets(max_sets)
        .pool_sizes(&sizes);
    unsafe { h.layer.create_descriptor_pool(&info) }.expect("create descriptor pool")
}

fn allocate(
    h: &Harness,
    pool: vk::DescriptorPool,
    layouts: &[vk::DescriptorSetLayout],
) -> ash::prelude::VkResult<Vec<vk::DescriptorSet>> {
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(layouts);
    unsafe { h.layer.allocate_descriptor_sets(&info) }
}

fn write_buffer(h: &Harness, set: vk::DescriptorSet, binding: u32, element: u32, buffers: &[vk::Buffer]) {
    let infos: Vec<vk::DescriptorBufferInfo> = buffers
        .iter()
        .map(|&buffer| vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        })
        .collect();
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(element)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&infos);
    unsafe { h.layer.update_descriptor_sets(&[write], &[]) };
}

#[test]
fn test_allocate_and_update() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 2);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    assert_eq!(h.layer.state().descriptor_set_updated(set.as_raw()), Some(false));

    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    write_buffer(&h, set, 0, 0, &[buffer]);
    assert_eq!(h.layer.state().descriptor_set_updated(set.as_raw()), Some(true));
    h.assert_clean();
}

#[test]
fn test_pool_exhausted() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    allocate(&h, pool, &[layout]).expect("allocate");
    h.assert_clean();

    let _ = allocate(&h, pool, &[layout]);
    assert!(h.has(DrawStateError::DescriptorPoolEmpty));
}

#[test]
fn test_pool_out_of_descriptors() {
    let h = make_harness();
    // Five uniform buffers, the pool holds four
    let layout = h.set_layout(&[uniform_binding(0, 5)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 4);
    let _ = allocate(&h, pool, &[layout]);
    assert!(h.has(DrawStateError::DescriptorPoolEmpty));
}

#[test]
fn test_free_requires_free_flag() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 2);
    let sets = allocate(&h, pool, &[layout]).expect("allocate");
    let _ = unsafe { h.layer.free_descriptor_sets(pool, &sets) };
    assert!(h.has(DrawStateError::CantFreeFromNonFreePool));
}

#[test]
fn test_free_returns_capacity() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 1);
    let sets = allocate(&h, pool, &[layout]).expect("allocate");
    unsafe { h.layer.free_descriptor_sets(pool, &sets) }.expect("free");
    allocate(&h, pool, &[layout]).expect("allocate again");
    h.assert_clean();
}

#[test]
fn test_reset_pool_returns_capacity() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let sets = allocate(&h, pool, &[layout]).expect("allocate");
    unsafe {
        h.layer
            .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
    }
    .expect("reset");
    assert_eq!(h.layer.state().descriptor_set_updated(sets[0].as_raw()), None);
    allocate(&h, pool, &[layout]).expect("allocate again");
    h.assert_clean();
}

#[test]
fn test_update_type_mismatch() {
    let h = make_harness();
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX);
    let layout = h.set_layout(&[binding]);
    let sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: 1,
    }];
    let info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&sizes);
    let pool = unsafe { h.layer.create_descriptor_pool(&info) }.expect("pool");
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];

    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    write_buffer(&h, set, 0, 0, &[buffer]);
    assert!(h.has(DrawStateError::DescriptorTypeMismatch));
    assert_eq!(h.driver().call_count("vkUpdateDescriptorSets"), 1);
}

#[test]
fn test_update_out_of_bounds() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 2)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    let (a, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let (b, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

    write_buffer(&h, set, 0, 1, &[a, b]);
    assert!(h.has(DrawStateError::DescriptorUpdateOutOfBounds));

    h.clear();
    write_buffer(&h, set, 0, 0, &[a, b]);
    h.assert_clean();
}

#[test]
fn test_update_spills_into_next_binding() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1), uniform_binding(1, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    let (a, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let (b, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

    write_buffer(&h, set, 0, 0, &[a, b]);
    h.assert_clean();
}

#[test]
fn test_update_missing_binding() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

    write_buffer(&h, set, 3, 0, &[buffer]);
    assert!(h.has(DrawStateError::InvalidUpdateIndex));
}

#[test]
fn test_update_unknown_set_and_buffer() {
    let h = make_harness();
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    write_buffer(&h, vk::DescriptorSet::from_raw(0x5e7), 0, 0, &[buffer]);
    assert!(h.has(DrawStateError::InvalidSet));

    h.clear();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    write_buffer(&h, set, 0, 0, &[vk::Buffer::from_raw(0xb0f)]);
    assert!(h.has(MemTrackError::InvalidObject));
}

#[test]
fn test_update_of_bound_set_invalidates_command_buffer() {
    let h = make_harness();
    let set_layout = h.set_layout(&[uniform_binding(0, 1)]);
    let layout = h.pipeline_layout(&[set_layout]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[set_layout]).expect("allocate")[0];
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    write_buffer(&h, set, 0, 0, &[buffer]);

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[],
        )
    };
    h.end(cb);
    h.assert_clean();

    write_buffer(&h, set, 0, 0, &[buffer]);
    assert_eq!(
        h.layer.state().command_buffer_state(cb.as_raw()),
        Some(CbState::Invalid)
    );
}

#[test]
fn test_bind_incompatible_set() {
    let h = make_harness();
    let expected = h.set_layout(&[uniform_binding(0, 1)]);
    let other = h.set_layout(&[uniform_binding(0, 2)]);
    let layout = h.pipeline_layout(&[expected]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[other]).expect("allocate")[0];

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[],
        )
    };
    assert!(h.has(DrawStateError::PipelineLayoutsIncompatible));
}

#[test]
fn test_destroy_pool_in_flight() {
    let h = make_harness();
    let set_layout = h.set_layout(&[uniform_binding(0, 1)]);
    let layout = h.pipeline_layout(&[set_layout]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[set_layout]).expect("allocate")[0];

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[],
        )
    };
    h.end(cb);
    h.submit(h.queue(), &[cb], vk::Fence::null()).expect("submit");

    unsafe { h.layer.destroy_descriptor_pool(pool) };
    assert!(h.has(DrawStateError::ObjectInuse));
}

#[test]
fn test_rejected_update_skipped_on_break() {
    let mut config = vkguard_core::VkGuardConfig::default();
    config
        .report
        .actions
        .push(vkguard_core::config::DebugAction::Break);
    let h = make_harness_with(config);
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

    write_buffer(&h, set, 0, 1, &[buffer]);
    assert!(h.has(DrawStateError::DescriptorUpdateOutOfBounds));
    assert_eq!(h.layer.state().descriptor_set_updated(set.as_raw()), Some(false));
    assert_eq!(h.driver().call_count("vkUpdateDescriptorSets"), 0);
}

#[test]
fn test_update_element_at_end_of_range() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 1)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[layout]).expect("allocate")[0];
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

    write_buffer(&h, set, 0, u32::MAX, &[buffer]);
    assert!(h.has(DrawStateError::DescriptorUpdateOutOfBounds));
}

#[test]
fn test_copy_count_out_of_range() {
    let h = make_harness();
    let layout = h.set_layout(&[uniform_binding(0, 2)]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 2);
    let sets = allocate(&h, pool, &[layout, layout]).expect("allocate");

    let copy = vk::CopyDescriptorSet::default()
        .src_set(sets[0])
        .src_binding(0)
        .src_array_element(1)
        .dst_set(sets[1])
        .dst_binding(0)
        .dst_array_element(1)
        .descriptor_count(u32::MAX);
    unsafe { h.layer.update_descriptor_sets(&[], &[copy]) };
    assert!(h.has(DrawStateError::DescriptorUpdateOutOfBounds));
}

#[test]
fn test_draw_with_set_never_updated() {
    let h = make_harness();
    let set_layout = h.set_layout(&[uniform_binding(0, 1)]);
    let layout = h.pipeline_layout(&[set_layout]);
    let pool = make_pool(&h, vk::DescriptorPoolCreateFlags::empty(), 1);
    let set = allocate(&h, pool, &[set_layout]).expect("allocate")[0];
    let rp = h.render_pass(1);
    let fb = h.framebuffer(rp);
    let pipeline = h.graphics_pipeline(layout, rp, &[]);

    let cb = h.primary();
    h.begin(cb);
    h.begin_render_pass(cb, rp, fb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[],
        );
    }
    h.assert_clean();

    unsafe { h.layer.cmd_draw(cb, 3, 1, 0, 0) };
    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].code,
        ValidationCode::from(DrawStateError::DescriptorSetNotUpdated)
    );
    assert!(reports[0].flags.contains(ReportFlags::WARNING));
}

#[test]
fn test_dynamic_offset_count() {
    let h = make_harness();
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
        .descriptor_count(2)
        .stage_flags(vk::ShaderStageFlags::VERTEX);
    let set_layout = h.set_layout(&[binding]);
    let layout = h.pipeline_layout(&[set_layout]);
    let sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        descriptor_count: 2,
    }];
    let info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&sizes);
    let pool = unsafe { h.layer.create_descriptor_pool(&info) }.expect("create descriptor pool");
    let set = allocate(&h, pool, &[set_layout]).expect("allocate")[0];

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[0],
        )
    };
    assert!(h.has(DrawStateError::InvalidDynamicOffsetCount));

    h.clear();
    unsafe {
        h.layer.cmd_bind_descriptor_sets(
            cb,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            0,
            &[set],
            &[0, 256],
        )
    };
    h.assert_clean();
}
