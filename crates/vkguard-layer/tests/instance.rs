//! Integration test: instance setup and the debug report callback chain
//!
//! Run with: cargo test -p vkguard-layer --test instance

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ash::vk::{self, Handle};
use vkguard_layer::{NullDriver, ValidationInstance};
use vkguard_protocol::{MemTrackError, ReportFlags, ReportMessage, ValidationCode};

fn make_counter(
    instance: &ValidationInstance,
    flags: ReportFlags,
) -> (vkguard_core::CallbackId, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let id = instance.create_debug_report_callback(
        flags,
        Arc::new(move |msg: &ReportMessage| {
            assert_eq!(msg.code, ValidationCode::from(MemTrackError::InvalidMemObj));
            sink.fetch_add(1, Ordering::SeqCst);
            false
        }),
    );
    (id, hits)
}

#[test]
fn test_from_env_without_config_file() {
    let instance = ValidationInstance::from_env().expect("instance");
    assert!(instance.config().checks.memory);
    assert_eq!(instance.debug_report().callback_count(), 0);
}

#[test]
fn test_callback_receives_device_reports() {
    let instance = ValidationInstance::new(vkguard_core::VkGuardConfig::default()).expect("instance");
    let (_, errors) = make_counter(&instance, ReportFlags::ERROR);
    let (_, warnings) = make_counter(&instance, ReportFlags::WARNING);

    let layer = instance.wrap_device(NullDriver::new());
    let _ = unsafe {
        layer.map_memory(
            vk::DeviceMemory::from_raw(0xdead),
            0,
            64,
            vk::MemoryMapFlags::empty(),
        )
    };

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(warnings.load(Ordering::SeqCst), 0);
    assert_eq!(instance.debug_report().stats().errors, 1);
}

#[test]
fn test_destroyed_callback_is_silent() {
    let instance = ValidationInstance::new(vkguard_core::VkGuardConfig::default()).expect("instance");
    let (id, hits) = make_counter(&instance, ReportFlags::ERROR);
    assert!(instance.destroy_debug_report_callback(id));
    assert!(!instance.destroy_debug_report_callback(id));

    let layer = instance.wrap_device(NullDriver::new());
    let _ = unsafe {
        layer.map_memory(
            vk::DeviceMemory::from_raw(0xdead),
            0,
            64,
            vk::MemoryMapFlags::empty(),
        )
    };
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_devices_share_the_instance_callbacks() {
    let instance = ValidationInstance::new(vkguard_core::VkGuardConfig::default()).expect("instance");
    let (_, hits) = make_counter(&instance, ReportFlags::ERROR);

    let first = instance.wrap_device(NullDriver::new());
    let second = instance.wrap_device(NullDriver::new());
    for layer in [&first, &second] {
        let _ = unsafe {
            layer.map_memory(
                vk::DeviceMemory::from_raw(0xdead),
                0,
                64,
                vk::MemoryMapFlags::empty(),
            )
        };
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
