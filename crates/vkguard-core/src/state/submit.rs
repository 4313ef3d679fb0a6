//! Queues, fences, semaphores and events.
//!
//! Every `vkQueueSubmit` call becomes one [`Submission`] with a device-wide
//! sequence id. Submissions stay pending on their queue until something the
//! host observes proves they completed (a fence wait or status query, a
//! queue or device idle wait, or a wait on a semaphore they signalled), at
//! which point they are retired and their in-use counts released.

use std::collections::{HashMap, VecDeque};

use ash::vk;
use tracing::{debug, warn};
use vkguard_protocol::{DrawStateError, MemTrackError, ObjectHandle};

use super::command_buffer::{CbState, EventOp};
use super::DeviceState;
use crate::error::CoreError;
use crate::registry::Tracked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Unsignaled,
    Signaled,
    InFlight { queue: u64, seq: u64 },
}

#[derive(Debug, Clone)]
pub struct FenceRecord {
    pub state: FenceState,
}

impl Tracked for FenceRecord {
    fn ref_count(&self) -> u32 {
        matches!(self.state, FenceState::InFlight { .. }) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreState {
    Unset,
    Signalled,
    Wait,
}

#[derive(Debug, Clone)]
pub struct SemaphoreRecord {
    pub state: SemaphoreState,
    /// Queue and sequence id of the pending signal
    pub signaler: Option<(u64, u64)>,
}

impl Tracked for SemaphoreRecord {
    /// In use while a pending submission waits on it or has yet to signal it.
    fn ref_count(&self) -> u32 {
        (self.state == SemaphoreState::Wait || self.signaler.is_some()) as u32
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventRecord {
    pub signaled: bool,
    pub in_use: u32,
}

impl Tracked for EventRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

/// One `vkQueueSubmit` call that has not been retired.
#[derive(Debug, Clone)]
pub struct Submission {
    pub seq: u64,
    /// Submitted buffers plus the secondaries they execute
    pub command_buffers: Vec<u64>,
    pub referenced: Vec<ObjectHandle>,
    pub waits: Vec<u64>,
    /// Submissions that signalled the semaphores waited on
    pub wait_signalers: Vec<(u64, u64)>,
    pub signals: Vec<u64>,
    pub fence: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct QueueRecord {
    pub family_index: u32,
    pub submissions: VecDeque<Submission>,
    /// Highest retired sequence id
    pub completed: u64,
}

impl QueueRecord {
    pub fn new(family_index: u32) -> Self {
        Self {
            family_index,
            submissions: VecDeque::new(),
            completed: 0,
        }
    }

    pub fn in_flight_command_buffers(&self) -> usize {
        self.submissions.iter().map(|s| s.command_buffers.len()).sum()
    }
}

/// One `VkSubmitInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitBatch {
    pub wait_semaphores: Vec<u64>,
    pub command_buffers: Vec<u64>,
    pub signal_semaphores: Vec<u64>,
}

/// Running state while a submit call is validated batch by batch.
#[derive(Default)]
struct SubmitScratch {
    semaphores: HashMap<u64, SemaphoreState>,
    events: HashMap<u64, bool>,
    layouts: HashMap<u64, vk::ImageLayout>,
    submitted: HashMap<u64, u32>,
}

// ── Queue ───────────────────────────────────────────────────

impl DeviceState {
    /// Track a queue returned by `vkGetDeviceQueue`. Repeated calls for the
    /// same queue are no-ops.
    pub fn record_queue(&self, queue: u64, family_index: u32) {
        if !self.queues.contains(queue) {
            debug!("tracking VkQueue 0x{:x} of family {}", queue, family_index);
            self.queues.register(queue, QueueRecord::new(family_index));
        }
    }

    fn report_device_lost(&self, api: &str) -> bool {
        if !self.is_device_lost() {
            return false;
        }
        self.error(
            self.device(),
            DrawStateError::DeviceLost,
            format!("{}: the device has been lost", api),
        )
    }

    pub fn validate_queue_submit(&self, queue: u64, batches: &[SubmitBatch], fence: u64) -> bool {
        let api = "vkQueueSubmit";
        if self.report_device_lost(api) {
            return true;
        }
        let Some(family) = self.queues.with(queue, |q| q.family_index) else {
            return self.unknown_object(self.queues.handle(queue), api);
        };

        let mut skip = false;
        if fence != 0 {
            let handle = self.fences.handle(fence);
            match self.fences.with(fence, |f| f.state) {
                None => skip |= self.unknown_object(handle, api),
                Some(FenceState::Signaled) => {
                    skip |= self.error(
                        handle,
                        MemTrackError::InvalidFenceState,
                        format!("{}: {} is already signaled; reset it before submitting", api, handle),
                    );
                }
                Some(FenceState::InFlight { .. }) => {
                    skip |= self.error(
                        handle,
                        MemTrackError::InvalidFenceState,
                        format!("{}: {} is already in flight", api, handle),
                    );
                }
                Some(FenceState::Unsignaled) => {}
            }
        }

        let mut scratch = SubmitScratch::default();
        for batch in batches {
            for &semaphore in &batch.wait_semaphores {
                skip |= self.validate_semaphore_op(&mut scratch, semaphore, false);
            }
            for &cb in &batch.command_buffers {
                skip |= self.validate_submitted_command_buffer(&mut scratch, cb, family);
            }
            for &semaphore in &batch.signal_semaphores {
                skip |= self.validate_semaphore_op(&mut scratch, semaphore, true);
            }
        }
        skip
    }

    fn validate_semaphore_op(&self, scratch: &mut SubmitScratch, semaphore: u64, signal: bool) -> bool {
        let api = "vkQueueSubmit";
        let handle = self.semaphores.handle(semaphore);
        let state = match scratch.semaphores.get(&semaphore) {
            Some(state) => *state,
            None => match self.semaphores.with(semaphore, |s| s.state) {
                Some(state) => state,
                None => return self.unknown_object(handle, api),
            },
        };

        let mut skip = false;
        if signal {
            if state != SemaphoreState::Unset {
                skip |= self.error(
                    handle,
                    DrawStateError::QueueForwardProgress,
                    format!(
                        "{}: signals {} which is already signalled and not yet waited on",
                        api, handle
                    ),
                );
            }
            scratch.semaphores.insert(semaphore, SemaphoreState::Signalled);
        } else {
            if state != SemaphoreState::Signalled {
                skip |= self.error(
                    handle,
                    DrawStateError::QueueForwardProgress,
                    format!("{}: waits on {} which has no pending signal", api, handle),
                );
            }
            scratch.semaphores.insert(semaphore, SemaphoreState::Wait);
        }
        skip
    }

    fn validate_submitted_command_buffer(&self, scratch: &mut SubmitScratch, cb: u64, family: u32) -> bool {
        let api = "vkQueueSubmit";
        let handle = self.command_buffers.handle(cb);
        let Some(snapshot) = self.command_buffers.with(cb, |r| {
            (
                r.state,
                r.is_secondary(),
                r.pool,
                r.begin_flags,
                r.in_flight,
                r.submit_count,
                r.image_layouts.clone(),
                r.event_ops.clone(),
                r.broken_bindings.clone(),
            )
        }) else {
            return self.unknown_object(handle, api);
        };
        let (state, secondary, pool, flags, in_flight, submit_count, layouts, event_ops, broken) =
            snapshot;

        let mut skip = false;
        match state {
            CbState::Invalid => {
                let culprits: Vec<String> = broken.iter().map(ToString::to_string).collect();
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidCommandBuffer,
                    format!(
                        "{}: {} is invalid because bound objects were destroyed or updated: {}",
                        api,
                        handle,
                        culprits.join(", ")
                    ),
                );
            }
            CbState::New | CbState::Recording => {
                skip |= self.error(
                    handle,
                    DrawStateError::NoEndCommandBuffer,
                    format!("{}: {} has not completed recording ({:?})", api, handle, state),
                );
            }
            CbState::Recorded => {}
        }
        if secondary {
            skip |= self.error(
                handle,
                DrawStateError::InvalidCommandBuffer,
                format!("{}: secondary {} cannot be submitted to a queue", api, handle),
            );
        }

        let earlier = scratch.submitted.entry(cb).or_insert(0);
        if flags.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            && submit_count + *earlier > 0
        {
            skip |= self.error(
                handle,
                DrawStateError::CommandBufferSingleSubmitViolation,
                format!(
                    "{}: {} was begun with ONE_TIME_SUBMIT and has already been submitted",
                    api, handle
                ),
            );
        }
        if in_flight + *earlier > 0 && !flags.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE) {
            skip |= self.error(
                handle,
                DrawStateError::InvalidCbSimultaneousUse,
                format!(
                    "{}: {} is already in flight and was not begun with SIMULTANEOUS_USE",
                    api, handle
                ),
            );
        }
        *earlier += 1;

        if let Some(pool_family) = self.command_pools.with(pool, |p| p.queue_family_index) {
            if pool_family != family {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidQueueFamily,
                    format!(
                        "{}: {} was allocated for queue family {} but submitted to family {}",
                        api, handle, pool_family, family
                    ),
                );
            }
        }

        for (image, expected) in layouts {
            let current = match scratch.layouts.get(&image) {
                Some(layout) => Some(*layout),
                None => self.image_layout(image),
            };
            if let Some(current) = current {
                if expected.initial != vk::ImageLayout::UNDEFINED && expected.initial != current {
                    let image_handle = self.images.handle(image);
                    skip |= self.error(
                        image_handle,
                        DrawStateError::InvalidImageLayout,
                        format!(
                            "{}: {} expects {} in {:?} but it is in {:?}",
                            api, handle, image_handle, expected.initial, current
                        ),
                    );
                }
            }
            scratch.layouts.insert(image, expected.current);
        }

        for op in event_ops {
            match op {
                EventOp::Set(event) => {
                    scratch.events.insert(event, true);
                }
                EventOp::Reset(event) => {
                    scratch.events.insert(event, false);
                }
                EventOp::Wait(event) => {
                    let signaled = match scratch.events.get(&event) {
                        Some(signaled) => *signaled,
                        None => self.events.with(event, |e| e.signaled).unwrap_or(false),
                    };
                    if !signaled {
                        let event_handle = self.events.handle(event);
                        skip |= self.error(
                            event_handle,
                            DrawStateError::InvalidEvent,
                            format!(
                                "{}: {} waits on {} which is never set before the wait",
                                api, handle, event_handle
                            ),
                        );
                    }
                }
            }
        }
        skip
    }

    pub fn record_queue_submit(&self, queue: u64, batches: &[SubmitBatch], fence: u64) {
        let seq = self.next_submission_id();
        let mut submission = Submission {
            seq,
            command_buffers: Vec::new(),
            referenced: Vec::new(),
            waits: Vec::new(),
            wait_signalers: Vec::new(),
            signals: Vec::new(),
            fence: (fence != 0).then_some(fence),
        };

        for batch in batches {
            // Command buffers first: nothing else is locked while they are.
            for &cb in &batch.command_buffers {
                let Some((referenced, secondaries, layouts, event_ops)) =
                    self.command_buffers.with_mut(cb, |r| {
                        r.in_flight += 1;
                        r.submit_count += 1;
                        (
                            r.referenced.iter().copied().collect::<Vec<_>>(),
                            r.secondaries.iter().copied().collect::<Vec<_>>(),
                            r.image_layouts.clone(),
                            r.event_ops.clone(),
                        )
                    })
                else {
                    continue;
                };
                submission.command_buffers.push(cb);
                for secondary in secondaries {
                    self.command_buffers
                        .with_mut(secondary, |r| r.in_flight += 1);
                    submission.command_buffers.push(secondary);
                }
                for object in referenced {
                    self.adjust_in_use(object, 1);
                    submission.referenced.push(object);
                }
                for (image, state) in layouts {
                    self.images.with_mut(image, |i| i.layout = state.current);
                }
                for op in event_ops {
                    match op {
                        EventOp::Set(event) => self.events.with_mut(event, |e| e.signaled = true),
                        EventOp::Reset(event) => self.events.with_mut(event, |e| e.signaled = false),
                        EventOp::Wait(_) => None,
                    };
                }
            }

            for &semaphore in &batch.wait_semaphores {
                let signaler = self.semaphores.with_mut(semaphore, |s| {
                    s.state = SemaphoreState::Wait;
                    s.signaler.take()
                });
                if let Some(Some(signaler)) = signaler {
                    submission.wait_signalers.push(signaler);
                }
                submission.waits.push(semaphore);
            }
            for &semaphore in &batch.signal_semaphores {
                self.semaphores.with_mut(semaphore, |s| {
                    s.state = SemaphoreState::Signalled;
                    s.signaler = Some((queue, seq));
                });
                submission.signals.push(semaphore);
            }
        }

        if let Some(fence) = submission.fence {
            self.fences
                .with_mut(fence, |f| f.state = FenceState::InFlight { queue, seq });
        }
        debug!(
            "VkQueue 0x{:x}: submission {} with {} command buffer(s)",
            queue,
            seq,
            submission.command_buffers.len()
        );
        self.queues
            .with_mut(queue, |q| q.submissions.push_back(submission));
    }

    /// Retire every submission on `queue` with a sequence id up to `seq`.
    pub fn retire_queue_to(&self, queue: u64, seq: u64) {
        loop {
            let next = self
                .queues
                .with_mut(queue, |q| match q.submissions.front() {
                    Some(s) if s.seq <= seq => q.submissions.pop_front(),
                    _ => None,
                })
                .flatten();
            let Some(submission) = next else {
                break;
            };
            self.retire_submission(queue, submission);
        }
    }

    fn retire_submission(&self, queue: u64, submission: Submission) {
        // Work this submission waited for has completed too.
        for &(signal_queue, signal_seq) in &submission.wait_signalers {
            self.retire_queue_to(signal_queue, signal_seq);
        }
        for &cb in &submission.command_buffers {
            self.command_buffers
                .with_mut(cb, |r| r.in_flight = r.in_flight.saturating_sub(1));
        }
        for &object in &submission.referenced {
            self.adjust_in_use(object, -1);
        }
        for &semaphore in &submission.signals {
            self.semaphores.with_mut(semaphore, |s| {
                if s.signaler == Some((queue, submission.seq)) {
                    s.signaler = None;
                }
            });
        }
        for &semaphore in &submission.waits {
            self.semaphores.with_mut(semaphore, |s| {
                if s.state == SemaphoreState::Wait {
                    s.state = SemaphoreState::Unset;
                }
            });
        }
        if let Some(fence) = submission.fence {
            self.fences
                .with_mut(fence, |f| f.state = FenceState::Signaled);
        }
        self.queues
            .with_mut(queue, |q| q.completed = q.completed.max(submission.seq));
        debug!("VkQueue 0x{:x}: retired submission {}", queue, submission.seq);
    }

    pub fn validate_queue_wait_idle(&self, queue: u64) -> bool {
        let api = "vkQueueWaitIdle";
        if self.report_device_lost(api) {
            return true;
        }
        if !self.queues.contains(queue) {
            return self.unknown_object(self.queues.handle(queue), api);
        }
        false
    }

    pub fn record_queue_wait_idle(&self, queue: u64) {
        self.retire_queue_to(queue, u64::MAX);
    }

    pub fn validate_device_wait_idle(&self) -> bool {
        self.report_device_lost("vkDeviceWaitIdle")
    }

    pub fn record_device_wait_idle(&self) {
        for queue in self.queues.handles() {
            self.retire_queue_to(queue, u64::MAX);
        }
    }

    pub fn pending_submissions(&self, queue: u64) -> usize {
        self.queues.with(queue, |q| q.submissions.len()).unwrap_or(0)
    }
}

// ── Fence ───────────────────────────────────────────────────

impl DeviceState {
    pub fn record_create_fence(&self, fence: u64, signaled: bool) {
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.register(fence, FenceRecord { state });
    }

    pub fn destroy_fence(&self, fence: u64) -> bool {
        let handle = self.fences.handle(fence);
        match self.fences.destroy(fence, self) {
            Ok(_) => false,
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyFence"),
        }
    }

    pub fn fence_state(&self, fence: u64) -> Option<FenceState> {
        self.fences.with(fence, |f| f.state)
    }

    pub fn validate_wait_for_fences(&self, fences: &[u64]) -> bool {
        let api = "vkWaitForFences";
        if self.report_device_lost(api) {
            return true;
        }
        let mut skip = false;
        for &fence in fences {
            let handle = self.fences.handle(fence);
            match self.fences.with(fence, |f| f.state) {
                None => skip |= self.unknown_object(handle, api),
                Some(FenceState::Unsignaled) => {
                    skip |= self.warn(
                        handle,
                        MemTrackError::InvalidFenceState,
                        format!("{}: {} has not been submitted and will never signal", api, handle),
                    );
                }
                Some(_) => {}
            }
        }
        skip
    }

    /// A successful wait proves every fence signaled when `wait_all` is set
    /// or only one fence was given; otherwise nothing is known per fence.
    pub fn record_wait_for_fences(&self, fences: &[u64], wait_all: bool) {
        if !wait_all && fences.len() > 1 {
            return;
        }
        for &fence in fences {
            self.record_fence_signaled(fence);
        }
    }

    /// Called when the driver reports `fence` signaled.
    pub fn record_fence_signaled(&self, fence: u64) {
        match self.fence_state(fence) {
            Some(FenceState::InFlight { queue, seq }) => self.retire_queue_to(queue, seq),
            Some(FenceState::Unsignaled) => {
                warn!("VkFence 0x{:x} signaled without a tracked submission", fence);
                self.fences
                    .with_mut(fence, |f| f.state = FenceState::Signaled);
            }
            _ => {}
        }
    }

    pub fn validate_get_fence_status(&self, fence: u64) -> bool {
        let api = "vkGetFenceStatus";
        if self.report_device_lost(api) {
            return true;
        }
        if !self.fences.contains(fence) {
            return self.unknown_object(self.fences.handle(fence), api);
        }
        false
    }

    pub fn validate_reset_fences(&self, fences: &[u64]) -> bool {
        let api = "vkResetFences";
        let mut skip = false;
        for &fence in fences {
            let handle = self.fences.handle(fence);
            match self.fences.with(fence, |f| f.state) {
                None => skip |= self.unknown_object(handle, api),
                Some(FenceState::InFlight { .. }) => {
                    skip |= self.error(
                        handle,
                        MemTrackError::InvalidFenceState,
                        format!("{}: {} is still in flight", api, handle),
                    );
                }
                Some(_) => {}
            }
        }
        skip
    }

    pub fn record_reset_fences(&self, fences: &[u64]) {
        for &fence in fences {
            self.fences
                .with_mut(fence, |f| f.state = FenceState::Unsignaled);
        }
    }
}

// ── Semaphore ───────────────────────────────────────────────

impl DeviceState {
    pub fn record_create_semaphore(&self, semaphore: u64) {
        self.semaphores.register(
            semaphore,
            SemaphoreRecord {
                state: SemaphoreState::Unset,
                signaler: None,
            },
        );
    }

    pub fn destroy_semaphore(&self, semaphore: u64) -> bool {
        let handle = self.semaphores.handle(semaphore);
        match self.semaphores.destroy(semaphore, self) {
            Ok(_) => false,
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroySemaphore"),
        }
    }

    pub fn semaphore_state(&self, semaphore: u64) -> Option<SemaphoreState> {
        self.semaphores.with(semaphore, |s| s.state)
    }
}

// ── Event ───────────────────────────────────────────────────

impl DeviceState {
    pub fn record_create_event(&self, event: u64) {
        self.events.register(event, EventRecord::default());
    }

    pub fn destroy_event(&self, event: u64) -> bool {
        let handle = self.events.handle(event);
        match self.events.destroy(event, self) {
            Ok(_) => {
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyEvent"),
        }
    }

    /// Validate `vkSetEvent`, `vkResetEvent` or `vkGetEventStatus`.
    pub fn validate_host_event(&self, event: u64, api: &str) -> bool {
        if self.events.contains(event) {
            false
        } else {
            self.unknown_object(self.events.handle(event), api)
        }
    }

    /// Host-side `vkSetEvent` / `vkResetEvent`.
    pub fn record_host_event(&self, event: u64, signaled: bool) {
        self.events.with_mut(event, |e| e.signaled = signaled);
    }

    pub fn event_signaled(&self, event: u64) -> Option<bool> {
        self.events.with(event, |e| e.signaled)
    }
}
