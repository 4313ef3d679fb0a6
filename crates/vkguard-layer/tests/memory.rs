//! Integration test: device memory tracking
//!
//! Allocation, binding, mapping and freeing through the validation layer,
//! including the reference counting that guards frees of memory still in
//! use.
//!
//! Run with: cargo test -p vkguard-layer --test memory

mod common;

use ash::vk::{self, Handle};
use common::*;
use vkguard_protocol::{DrawStateError, MemTrackError, ObjectHandle, ReportFlags, ValidationCode};

#[test]
fn test_bind_and_free_clean() {
    let h = make_harness();
    let (buffer, memory) = h.bound_buffer(256, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let binding = h
        .layer
        .state()
        .bound_memory(ObjectHandle::of(buffer))
        .expect("binding");
    assert_eq!(binding.memory, memory.as_raw());
    assert_eq!(binding.offset, 0);

    unsafe {
        h.layer.destroy_buffer(buffer);
        h.layer.free_memory(memory);
    }
    h.assert_clean();
    assert_eq!(h.driver().call_count("vkFreeMemory"), 1);
}

#[test]
fn test_free_memory_with_bound_buffer() {
    let h = make_harness();
    let (buffer, memory) = h.bound_buffer(256, vk::BufferUsageFlags::UNIFORM_BUFFER);
    unsafe { h.layer.free_memory(memory) };

    assert!(h.has(MemTrackError::FreedMemRef));
    // The free still went through, so the buffer has lost its binding
    assert_eq!(h.driver().call_count("vkFreeMemory"), 1);
    assert!(h
        .layer
        .state()
        .bound_memory(ObjectHandle::of(buffer))
        .is_none());
}

#[test]
fn test_free_unknown_memory() {
    let h = make_harness();
    unsafe { h.layer.free_memory(vk::DeviceMemory::from_raw(0xdead)) };
    assert!(h.has(MemTrackError::InvalidMemObj));
}

#[test]
fn test_rebind_buffer() {
    let h = make_harness();
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let other = h.memory(64);
    let _ = unsafe { h.layer.bind_buffer_memory(buffer, other, 0) };
    assert!(h.has(MemTrackError::RebindObject));
}

#[test]
fn test_rebind_keeps_first_binding() {
    let h = make_harness();
    let (buffer, first) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let second = h.memory(64);
    let _ = unsafe { h.layer.bind_buffer_memory(buffer, second, 0) };
    assert!(h.has(MemTrackError::RebindObject));

    let binding = h
        .layer
        .state()
        .bound_memory(ObjectHandle::of(buffer))
        .expect("binding");
    assert_eq!(binding.memory, first.as_raw());
    h.clear();

    // Neither allocation may be left holding a stale reference
    unsafe {
        h.layer.destroy_buffer(buffer);
        h.layer.free_memory(first);
        h.layer.free_memory(second);
    }
    h.assert_clean();
}

#[test]
fn test_free_rejected_rebind_target_keeps_binding() {
    let h = make_harness();
    let (buffer, first) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let second = h.memory(64);
    let _ = unsafe { h.layer.bind_buffer_memory(buffer, second, 0) };
    h.clear();

    unsafe { h.layer.free_memory(second) };
    h.assert_clean();
    let binding = h
        .layer
        .state()
        .bound_memory(ObjectHandle::of(buffer))
        .expect("binding");
    assert_eq!(binding.memory, first.as_raw());
}

#[test]
fn test_bind_past_end_of_allocation() {
    let h = make_harness();
    let buffer = h.buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let memory = h.memory(96);
    let _ = unsafe { h.layer.bind_buffer_memory(buffer, memory, 64) };
    assert!(h.has(MemTrackError::InvalidMemRegion));
}

#[test]
fn test_bind_unknown_memory() {
    let h = make_harness();
    let buffer = h.buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let _ = unsafe {
        h.layer
            .bind_buffer_memory(buffer, vk::DeviceMemory::from_raw(0xbad), 0)
    };
    assert!(h.has(MemTrackError::InvalidMemObj));
}

#[test]
fn test_linear_and_optimal_aliasing_warns() {
    let h = make_harness();
    let memory = h.memory(1024);
    let buffer = h.buffer(512, vk::BufferUsageFlags::TRANSFER_SRC);
    let image = h.image(vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);

    unsafe { h.layer.bind_buffer_memory(buffer, memory, 0) }.expect("bind buffer");
    unsafe { h.layer.bind_image_memory(image, memory, 0) }.expect("bind image");

    let reports = h.reports();
    let aliasing: Vec<_> = reports
        .iter()
        .filter(|r| r.code == ValidationCode::from(MemTrackError::InvalidAliasing))
        .collect();
    assert_eq!(aliasing.len(), 1);
    assert!(aliasing[0].flags.contains(ReportFlags::WARNING));
    assert_eq!(h.errors(), 0);
}

#[test]
fn test_disjoint_ranges_do_not_alias() {
    let h = make_harness();
    let memory = h.memory(4096);
    let buffer = h.buffer(256, vk::BufferUsageFlags::TRANSFER_SRC);
    let image = h.image(vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
    unsafe { h.layer.bind_buffer_memory(buffer, memory, 0) }.expect("bind buffer");
    unsafe { h.layer.bind_image_memory(image, memory, 2048) }.expect("bind image");
    h.assert_clean();
}

#[test]
fn test_map_write_unmap() {
    let h = make_harness();
    let memory = h.memory(64);
    let ptr = unsafe {
        h.layer
            .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
    }
    .expect("map");
    assert!(!ptr.is_null());
    assert_eq!(h.layer.state().mapped_range(memory.as_raw()), Some((0, 64)));

    let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), 64) };
    bytes[0] = 0xab;
    bytes[63] = 0xcd;

    unsafe { h.layer.unmap_memory(memory) };
    assert_eq!(h.layer.state().mapped_range(memory.as_raw()), None);
    h.assert_clean();
}

#[test]
fn test_double_map() {
    let h = make_harness();
    let memory = h.memory(64);
    unsafe { h.layer.map_memory(memory, 0, 32, vk::MemoryMapFlags::empty()) }.expect("map");
    let _ = unsafe { h.layer.map_memory(memory, 0, 32, vk::MemoryMapFlags::empty()) };
    assert!(h.has(MemTrackError::InvalidMap));
}

#[test]
fn test_map_out_of_range() {
    let h = make_harness();
    let memory = h.memory(64);
    let _ = unsafe { h.layer.map_memory(memory, 64, 16, vk::MemoryMapFlags::empty()) };
    assert!(h.has(MemTrackError::InvalidMap));

    h.clear();
    let _ = unsafe { h.layer.map_memory(memory, 32, 64, vk::MemoryMapFlags::empty()) };
    assert!(h.has(MemTrackError::InvalidMap));

    h.clear();
    let _ = unsafe { h.layer.map_memory(memory, 0, 0, vk::MemoryMapFlags::empty()) };
    assert!(h.has(MemTrackError::InvalidMap));
}

#[test]
fn test_unmap_unmapped() {
    let h = make_harness();
    let memory = h.memory(64);
    unsafe { h.layer.unmap_memory(memory) };
    assert!(h.has(MemTrackError::InvalidMap));
}

#[test]
fn test_destroy_buffer_in_flight() {
    let h = make_harness();
    let (buffer, _) = h.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary();
    h.begin(cb);
    unsafe { h.layer.cmd_fill_buffer(cb, buffer, 0, 64, 0) };
    h.end(cb);
    h.submit(h.queue(), &[cb], vk::Fence::null()).expect("submit");

    unsafe { h.layer.destroy_buffer(buffer) };
    assert!(h.has(DrawStateError::ObjectInuse));
}

#[test]
fn test_leaks_reported_at_teardown() {
    let h = make_harness();
    let (_buffer, _memory) = h.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    h.layer.state().report_leaks();

    assert!(h.has(MemTrackError::MemoryLeak));
    assert!(h.has(MemTrackError::ObjectLeak));
    assert!(h
        .reports()
        .iter()
        .all(|r| r.flags.contains(ReportFlags::WARNING)));
}
