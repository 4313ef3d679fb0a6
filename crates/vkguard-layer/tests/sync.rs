//! Integration test: queue submission and synchronization
//!
//! Fence state across submit, wait and reset; semaphore signal and wait
//! pairing; events; retirement of submissions; device loss.
//!
//! Run with: cargo test -p vkguard-layer --test sync

mod common;

use ash::vk::{self, Handle};
use common::*;
use vkguard_core::state::submit::{FenceState, SemaphoreState};
use vkguard_protocol::{DrawStateError, MemTrackError, ReportFlags, ValidationCode};

fn fence_state(h: &Harness, fence: vk::Fence) -> Option<FenceState> {
    h.layer.state().fence_state(fence.as_raw())
}

#[test]
fn test_fence_submit_wait_retires() {
    let h = make_harness();
    let queue = h.queue();
    let fence = h.fence(false);
    let cb = h.recorded();

    h.submit(queue, &[cb], fence).expect("submit");
    assert!(matches!(fence_state(&h, fence), Some(FenceState::InFlight { .. })));
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 1);

    unsafe { h.layer.wait_for_fences(&[fence], true, u64::MAX) }.expect("wait");
    assert_eq!(fence_state(&h, fence), Some(FenceState::Signaled));
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 0);

    // The command buffer is no longer in flight and may be reset
    unsafe {
        h.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
    }
    .expect("reset");
    h.assert_clean();
}

#[test]
fn test_wait_retires_earlier_submissions() {
    let h = make_harness();
    let queue = h.queue();
    let fence = h.fence(false);
    let first = h.recorded();
    let second = h.recorded();

    h.submit(queue, &[first], vk::Fence::null()).expect("submit");
    h.submit(queue, &[second], fence).expect("submit");
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 2);

    unsafe { h.layer.wait_for_fences(&[fence], true, u64::MAX) }.expect("wait");
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 0);
}

#[test]
fn test_fence_status_retires() {
    let h = make_harness();
    let queue = h.queue();
    let fence = h.fence(false);
    h.submit(queue, &[h.recorded()], fence).expect("submit");

    let signaled = unsafe { h.layer.get_fence_status(fence) }.expect("status");
    assert!(signaled);
    assert_eq!(fence_state(&h, fence), Some(FenceState::Signaled));
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 0);
}

#[test]
fn test_wait_any_of_many_retires_nothing() {
    let h = make_harness();
    let queue = h.queue();
    let a = h.fence(false);
    let b = h.fence(false);
    h.submit(queue, &[h.recorded()], a).expect("submit");
    h.submit(queue, &[h.recorded()], b).expect("submit");

    unsafe { h.layer.wait_for_fences(&[a, b], false, u64::MAX) }.expect("wait");
    assert_eq!(h.layer.state().pending_submissions(queue.as_raw()), 2);
    assert!(matches!(fence_state(&h, a), Some(FenceState::InFlight { .. })));
}

#[test]
fn test_submit_with_signaled_fence() {
    let h = make_harness();
    let fence = h.fence(true);
    let _ = h.submit(h.queue(), &[h.recorded()], fence);
    assert!(h.has(MemTrackError::InvalidFenceState));
}

#[test]
fn test_reset_fence_in_flight() {
    let h = make_harness();
    let fence = h.fence(false);
    h.submit(h.queue(), &[h.recorded()], fence).expect("submit");
    let _ = unsafe { h.layer.reset_fences(&[fence]) };
    assert!(h.has(MemTrackError::InvalidFenceState));
}

#[test]
fn test_reset_signaled_fence_is_clean() {
    let h = make_harness();
    let fence = h.fence(true);
    unsafe { h.layer.reset_fences(&[fence]) }.expect("reset");
    assert_eq!(fence_state(&h, fence), Some(FenceState::Unsignaled));
    h.assert_clean();
}

#[test]
fn test_wait_on_unsubmitted_fence_warns() {
    let h = make_harness();
    let fence = h.fence(false);
    let result = unsafe { h.layer.wait_for_fences(&[fence], true, 0) };
    assert_eq!(result, Err(vk::Result::TIMEOUT));

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].code,
        ValidationCode::from(MemTrackError::InvalidFenceState)
    );
    assert!(reports[0].flags.contains(ReportFlags::WARNING));
}

#[test]
fn test_destroy_fence_in_flight() {
    let h = make_harness();
    let fence = h.fence(false);
    h.submit(h.queue(), &[h.recorded()], fence).expect("submit");
    unsafe { h.layer.destroy_fence(fence) };
    assert!(h.has(DrawStateError::ObjectInuse));
}

#[test]
fn test_semaphore_signal_then_wait() {
    let h = make_harness();
    let queue = h.queue();
    let semaphore = h.semaphore();

    let signal = [semaphore];
    let submit = vk::SubmitInfo::default().signal_semaphores(&signal);
    unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) }.expect("signal");
    assert_eq!(
        h.layer.state().semaphore_state(semaphore.as_raw()),
        Some(SemaphoreState::Signalled)
    );

    let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&signal)
        .wait_dst_stage_mask(&stages);
    unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) }.expect("wait");
    assert_eq!(
        h.layer.state().semaphore_state(semaphore.as_raw()),
        Some(SemaphoreState::Wait)
    );

    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");
    assert_eq!(
        h.layer.state().semaphore_state(semaphore.as_raw()),
        Some(SemaphoreState::Unset)
    );
    h.assert_clean();
}

#[test]
fn test_destroy_semaphore_with_pending_signal() {
    let h = make_harness();
    let queue = h.queue();
    let semaphore = h.semaphore();
    let signal = [semaphore];
    let submit = vk::SubmitInfo::default().signal_semaphores(&signal);
    unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) }.expect("signal");

    unsafe { h.layer.destroy_semaphore(semaphore) };
    assert!(h.has(DrawStateError::ObjectInuse));
}

#[test]
fn test_destroy_semaphore_after_signal_retired() {
    let h = make_harness();
    let queue = h.queue();
    let semaphore = h.semaphore();
    let signal = [semaphore];
    let submit = vk::SubmitInfo::default().signal_semaphores(&signal);
    unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) }.expect("signal");
    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");
    assert_eq!(
        h.layer.state().semaphore_state(semaphore.as_raw()),
        Some(SemaphoreState::Signalled)
    );

    unsafe { h.layer.destroy_semaphore(semaphore) };
    h.assert_clean();
    assert_eq!(h.driver().call_count("vkDestroySemaphore"), 1);
}

#[test]
fn test_semaphore_signalled_twice() {
    let h = make_harness();
    let queue = h.queue();
    let semaphore = h.semaphore();
    let signal = [semaphore];
    let submit = vk::SubmitInfo::default().signal_semaphores(&signal);

    unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) }.expect("signal");
    let _ = unsafe { h.layer.queue_submit(queue, &[submit], vk::Fence::null()) };
    assert!(h.has(DrawStateError::QueueForwardProgress));
}

#[test]
fn test_wait_on_unsignalled_semaphore() {
    let h = make_harness();
    let semaphore = h.semaphore();
    let wait = [semaphore];
    let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&wait)
        .wait_dst_stage_mask(&stages);
    let _ = unsafe { h.layer.queue_submit(h.queue(), &[submit], vk::Fence::null()) };
    assert!(h.has(DrawStateError::QueueForwardProgress));
}

#[test]
fn test_signal_and_wait_in_one_submit() {
    let h = make_harness();
    let semaphore = h.semaphore();
    let handles = [semaphore];
    let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
    let batches = [
        vk::SubmitInfo::default().signal_semaphores(&handles),
        vk::SubmitInfo::default()
            .wait_semaphores(&handles)
            .wait_dst_stage_mask(&stages),
    ];
    unsafe { h.layer.queue_submit(h.queue(), &batches, vk::Fence::null()) }.expect("submit");
    h.assert_clean();
}

#[test]
fn test_queue_family_mismatch() {
    let h = make_harness();
    let info = vk::CommandPoolCreateInfo::default().queue_family_index(1);
    let pool = unsafe { h.layer.create_command_pool(&info) }.expect("pool");
    let cb = h.command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    h.begin(cb);
    h.end(cb);

    let _ = h.submit(h.queue(), &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::InvalidQueueFamily));
}

#[test]
fn test_wait_event_never_set() {
    let h = make_harness();
    let event = unsafe { h.layer.create_event(&vk::EventCreateInfo::default()) }.expect("event");
    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_wait_events(
            cb,
            &[event],
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &[],
            &[],
            &[],
        )
    };
    h.end(cb);
    h.assert_clean();

    let _ = h.submit(h.queue(), &[cb], vk::Fence::null());
    assert!(h.has(DrawStateError::InvalidEvent));
}

#[test]
fn test_wait_event_set_by_host() {
    let h = make_harness();
    let event = unsafe { h.layer.create_event(&vk::EventCreateInfo::default()) }.expect("event");
    unsafe { h.layer.set_event(event) }.expect("set event");
    assert_eq!(h.layer.state().event_signaled(event.as_raw()), Some(true));
    assert!(unsafe { h.layer.get_event_status(event) }.expect("status"));

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_wait_events(
            cb,
            &[event],
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &[],
            &[],
            &[],
        )
    };
    h.end(cb);
    h.submit(h.queue(), &[cb], vk::Fence::null()).expect("submit");
    h.assert_clean();
}

#[test]
fn test_device_lost() {
    let h = make_harness();
    let queue = h.queue();
    let first = h.recorded();
    let second = h.recorded();
    h.driver().lose_device();

    let result = h.submit(queue, &[first], vk::Fence::null());
    assert_eq!(result, Err(vk::Result::ERROR_DEVICE_LOST));
    assert!(h.layer.state().is_device_lost());
    h.assert_clean();

    let result = h.submit(queue, &[second], vk::Fence::null());
    assert_eq!(result, Err(vk::Result::ERROR_DEVICE_LOST));
    assert!(h.has(DrawStateError::DeviceLost));

    h.clear();
    let _ = unsafe { h.layer.device_wait_idle() };
    assert!(h.has(DrawStateError::DeviceLost));
}

#[test]
fn test_device_wait_idle_retires_all_queues() {
    let h = make_harness();
    let first = h.queue();
    let second = unsafe { h.layer.get_device_queue(0, 1) };
    h.submit(first, &[h.recorded()], vk::Fence::null()).expect("submit");
    h.submit(second, &[h.recorded()], vk::Fence::null()).expect("submit");

    unsafe { h.layer.device_wait_idle() }.expect("wait idle");
    assert_eq!(h.layer.state().pending_submissions(first.as_raw()), 0);
    assert_eq!(h.layer.state().pending_submissions(second.as_raw()), 0);
}
