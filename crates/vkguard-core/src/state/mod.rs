//! Shadow state of one `VkDevice`.
//!
//! [`DeviceState`] owns one [`ObjectRegistry`] per object kind. Entry points
//! come in two flavours:
//!
//! - `validate_*` / `record_*` pairs for calls that return a `VkResult`: the
//!   layer validates, forwards on no-skip, and records only on success.
//! - single methods for `void` calls (`cmd_*`, `destroy_*`, unmap, ...), which
//!   validate and record in one step and return whether to skip.
//!
//! Every method returning `bool` returns `true` when a report asked the layer
//! to skip the driver call.
//!
//! Lock order: the command buffer registry is locked before any other
//! registry. Code that holds another registry's entry never touches the
//! command buffer registry.

pub mod command_buffer;
pub mod descriptor;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod submit;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};
use vkguard_protocol::{
    MemTrackError, ObjectHandle, ObjectType, ReportFlags, ValidationCode,
};

use crate::config::CheckConfig;
use crate::debug_report::{DebugReport, Reporter};
use crate::registry::ObjectRegistry;
use crate::threading::{ThreadTracker, WriteGuard};

use command_buffer::{CommandBufferRecord, CommandPoolRecord};
use descriptor::{DescriptorPoolRecord, DescriptorSetRecord, SetLayoutRecord};
use memory::MemoryRecord;
use pipeline::{PipelineLayoutRecord, PipelineRecord, ShaderModuleRecord};
use render_pass::{FramebufferRecord, RenderPassRecord};
use resource::{BufferRecord, ImageRecord, ImageViewRecord};
use submit::{EventRecord, FenceRecord, QueueRecord, SemaphoreRecord};

pub struct DeviceState {
    device: u64,
    report: Arc<DebugReport>,
    checks: CheckConfig,
    threads: ThreadTracker,
    next_submission: AtomicU64,
    device_lost: AtomicBool,

    pub memories: ObjectRegistry<MemoryRecord>,
    pub buffers: ObjectRegistry<BufferRecord>,
    pub images: ObjectRegistry<ImageRecord>,
    pub image_views: ObjectRegistry<ImageViewRecord>,
    pub shader_modules: ObjectRegistry<ShaderModuleRecord>,
    pub set_layouts: ObjectRegistry<Arc<SetLayoutRecord>>,
    pub pipeline_layouts: ObjectRegistry<PipelineLayoutRecord>,
    pub pipelines: ObjectRegistry<PipelineRecord>,
    pub descriptor_pools: ObjectRegistry<DescriptorPoolRecord>,
    pub descriptor_sets: ObjectRegistry<DescriptorSetRecord>,
    pub render_passes: ObjectRegistry<RenderPassRecord>,
    pub framebuffers: ObjectRegistry<FramebufferRecord>,
    pub command_pools: ObjectRegistry<CommandPoolRecord>,
    pub command_buffers: ObjectRegistry<CommandBufferRecord>,
    pub queues: ObjectRegistry<QueueRecord>,
    pub fences: ObjectRegistry<FenceRecord>,
    pub semaphores: ObjectRegistry<SemaphoreRecord>,
    pub events: ObjectRegistry<EventRecord>,
}

impl DeviceState {
    pub fn new(device: u64, report: Arc<DebugReport>, checks: CheckConfig) -> Self {
        info!("tracking device 0x{:x}", device);
        Self {
            device,
            report,
            checks,
            threads: ThreadTracker::new(),
            next_submission: AtomicU64::new(1),
            device_lost: AtomicBool::new(false),
            memories: ObjectRegistry::new(ObjectType::DeviceMemory),
            buffers: ObjectRegistry::new(ObjectType::Buffer),
            images: ObjectRegistry::new(ObjectType::Image),
            image_views: ObjectRegistry::new(ObjectType::ImageView),
            shader_modules: ObjectRegistry::new(ObjectType::ShaderModule),
            set_layouts: ObjectRegistry::new(ObjectType::DescriptorSetLayout),
            pipeline_layouts: ObjectRegistry::new(ObjectType::PipelineLayout),
            pipelines: ObjectRegistry::new(ObjectType::Pipeline),
            descriptor_pools: ObjectRegistry::new(ObjectType::DescriptorPool),
            descriptor_sets: ObjectRegistry::new(ObjectType::DescriptorSet),
            render_passes: ObjectRegistry::new(ObjectType::RenderPass),
            framebuffers: ObjectRegistry::new(ObjectType::Framebuffer),
            command_pools: ObjectRegistry::new(ObjectType::CommandPool),
            command_buffers: ObjectRegistry::new(ObjectType::CommandBuffer),
            queues: ObjectRegistry::new(ObjectType::Queue),
            fences: ObjectRegistry::new(ObjectType::Fence),
            semaphores: ObjectRegistry::new(ObjectType::Semaphore),
            events: ObjectRegistry::new(ObjectType::Event),
        }
    }

    pub fn device(&self) -> ObjectHandle {
        ObjectHandle::new(self.device, ObjectType::Device)
    }

    pub fn debug_report(&self) -> &Arc<DebugReport> {
        &self.report
    }

    pub fn checks(&self) -> CheckConfig {
        self.checks
    }

    /// Claim an externally synchronized object for the calling thread for
    /// the lifetime of the returned guard.
    pub fn claim(&self, object: ObjectHandle) -> WriteGuard<'_> {
        self.threads.start_write(object, self)
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Called by the layer whenever a forwarded call returns
    /// `VK_ERROR_DEVICE_LOST`.
    pub fn mark_device_lost(&self) {
        if !self.device_lost.swap(true, Ordering::AcqRel) {
            error!("device 0x{:x} lost", self.device);
        }
    }

    pub(crate) fn next_submission_id(&self) -> u64 {
        self.next_submission.fetch_add(1, Ordering::Relaxed)
    }

    #[track_caller]
    pub(crate) fn error(
        &self,
        object: ObjectHandle,
        code: impl Into<ValidationCode>,
        message: impl AsRef<str>,
    ) -> bool {
        self.report(ReportFlags::ERROR, object, code.into(), message.as_ref())
    }

    #[track_caller]
    pub(crate) fn warn(
        &self,
        object: ObjectHandle,
        code: impl Into<ValidationCode>,
        message: impl AsRef<str>,
    ) -> bool {
        self.report(ReportFlags::WARNING, object, code.into(), message.as_ref())
    }

    /// Report a handle the layer has never seen.
    #[track_caller]
    pub(crate) fn unknown_object(&self, object: ObjectHandle, api: &str) -> bool {
        self.error(
            object,
            MemTrackError::InvalidObject,
            format!("{}: invalid {}", api, object),
        )
    }

    /// Move `delta` on the in-flight use count of an object referenced by a
    /// submitted command buffer. Objects without a use count are ignored.
    pub(crate) fn adjust_in_use(&self, object: ObjectHandle, delta: i32) {
        fn bump(count: &mut u32, delta: i32) {
            *count = count.saturating_add_signed(delta);
        }
        let raw = object.raw;
        match object.object_type {
            ObjectType::Buffer => self.buffers.with_mut(raw, |r| bump(&mut r.in_use, delta)),
            ObjectType::Image => self.images.with_mut(raw, |r| bump(&mut r.in_use, delta)),
            ObjectType::ImageView => self.image_views.with_mut(raw, |r| bump(&mut r.in_use, delta)),
            ObjectType::Pipeline => self.pipelines.with_mut(raw, |r| bump(&mut r.in_use, delta)),
            ObjectType::DescriptorSet => {
                self.descriptor_sets.with_mut(raw, |r| bump(&mut r.in_use, delta))
            }
            ObjectType::Framebuffer => {
                self.framebuffers.with_mut(raw, |r| bump(&mut r.in_use, delta))
            }
            ObjectType::RenderPass => {
                self.render_passes.with_mut(raw, |r| bump(&mut r.in_use, delta))
            }
            ObjectType::Event => self.events.with_mut(raw, |r| bump(&mut r.in_use, delta)),
            _ => None,
        };
    }

    /// Mark every command buffer that references `object` as broken.
    ///
    /// Recorded buffers become invalid at once; buffers still recording
    /// become invalid when recording ends. Must not be called while holding
    /// a command buffer entry.
    pub(crate) fn invalidate_command_buffers(&self, object: ObjectHandle) {
        self.command_buffers.for_each_mut(|raw, cb| {
            if cb.references(object) {
                cb.break_binding(object);
                debug!("VkCommandBuffer 0x{:x} invalidated by {}", raw, object);
            }
        });
    }

    /// Report every object still alive at device teardown.
    pub fn report_leaks(&self) {
        let device = self.device();
        for raw in self.memories.handles() {
            self.warn(
                self.memories.handle(raw),
                MemTrackError::MemoryLeak,
                format!(
                    "VkDeviceMemory 0x{:x} has not been freed before vkDestroyDevice",
                    raw
                ),
            );
        }

        let leaked = [
            (ObjectType::Buffer, self.buffers.handles()),
            (ObjectType::Image, self.images.handles()),
            (ObjectType::ImageView, self.image_views.handles()),
            (ObjectType::ShaderModule, self.shader_modules.handles()),
            (ObjectType::DescriptorSetLayout, self.set_layouts.handles()),
            (ObjectType::PipelineLayout, self.pipeline_layouts.handles()),
            (ObjectType::Pipeline, self.pipelines.handles()),
            (ObjectType::DescriptorPool, self.descriptor_pools.handles()),
            (ObjectType::RenderPass, self.render_passes.handles()),
            (ObjectType::Framebuffer, self.framebuffers.handles()),
            (ObjectType::CommandPool, self.command_pools.handles()),
            (ObjectType::Fence, self.fences.handles()),
            (ObjectType::Semaphore, self.semaphores.handles()),
            (ObjectType::Event, self.events.handles()),
        ];
        for (object_type, handles) in leaked {
            for raw in handles {
                let object = ObjectHandle::new(raw, object_type);
                self.warn(
                    object,
                    MemTrackError::ObjectLeak,
                    format!("{} has not been destroyed before vkDestroyDevice", object),
                );
            }
        }
        debug!("leak check finished for {}", device);
    }
}

impl Reporter for DeviceState {
    /// Reports of disabled check categories are dropped.
    #[track_caller]
    fn report(
        &self,
        flags: ReportFlags,
        object: ObjectHandle,
        code: ValidationCode,
        message: &str,
    ) -> bool {
        if !self.checks.allows(code) {
            return false;
        }
        self.report.log(flags, object, code, message)
    }
}
