//! Command pools, command buffer lifecycle and command recording.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;
use tracing::debug;
use vkguard_protocol::{
    CmdNode, CmdType, DrawStateError, MemTrackError, ObjectHandle, ObjectType, RenderPassScope,
};

use super::descriptor::SetLayoutRecord;
use super::render_pass::RenderPassLayout;
use super::DeviceState;

bitflags! {
    /// Command buffer state that draws may depend on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CbStatusFlags: u32 {
        const VIEWPORT_SET = 1 << 0;
        const SCISSOR_SET = 1 << 1;
        const LINE_WIDTH_SET = 1 << 2;
        const DEPTH_BIAS_SET = 1 << 3;
        const BLEND_CONSTANTS_SET = 1 << 4;
        const DEPTH_BOUNDS_SET = 1 << 5;
        const STENCIL_READ_MASK_SET = 1 << 6;
        const STENCIL_WRITE_MASK_SET = 1 << 7;
        const STENCIL_REFERENCE_SET = 1 << 8;
        const INDEX_BUFFER_BOUND = 1 << 9;
    }
}

impl CbStatusFlags {
    pub fn from_dynamic_state(state: vk::DynamicState) -> Self {
        match state {
            vk::DynamicState::VIEWPORT => Self::VIEWPORT_SET,
            vk::DynamicState::SCISSOR => Self::SCISSOR_SET,
            vk::DynamicState::LINE_WIDTH => Self::LINE_WIDTH_SET,
            vk::DynamicState::DEPTH_BIAS => Self::DEPTH_BIAS_SET,
            vk::DynamicState::BLEND_CONSTANTS => Self::BLEND_CONSTANTS_SET,
            vk::DynamicState::DEPTH_BOUNDS => Self::DEPTH_BOUNDS_SET,
            vk::DynamicState::STENCIL_COMPARE_MASK => Self::STENCIL_READ_MASK_SET,
            vk::DynamicState::STENCIL_WRITE_MASK => Self::STENCIL_WRITE_MASK_SET,
            vk::DynamicState::STENCIL_REFERENCE => Self::STENCIL_REFERENCE_SET,
            _ => Self::empty(),
        }
    }
}

/// Dynamic state bits checked at draw time and the code reported when unset.
const DYNAMIC_STATE_CHECKS: [(CbStatusFlags, DrawStateError, &str); 7] = [
    (CbStatusFlags::VIEWPORT_SET, DrawStateError::ViewportNotBound, "viewport"),
    (CbStatusFlags::SCISSOR_SET, DrawStateError::ScissorNotBound, "scissor"),
    (CbStatusFlags::LINE_WIDTH_SET, DrawStateError::LineWidthNotBound, "line width"),
    (CbStatusFlags::DEPTH_BIAS_SET, DrawStateError::DepthBiasNotBound, "depth bias"),
    (CbStatusFlags::BLEND_CONSTANTS_SET, DrawStateError::BlendNotBound, "blend constants"),
    (CbStatusFlags::DEPTH_BOUNDS_SET, DrawStateError::DepthBoundsNotBound, "depth bounds"),
    (
        CbStatusFlags::STENCIL_READ_MASK_SET
            .union(CbStatusFlags::STENCIL_WRITE_MASK_SET)
            .union(CbStatusFlags::STENCIL_REFERENCE_SET),
        DrawStateError::StencilNotBound,
        "stencil",
    ),
];

const TRANSFER_SRC_LAYOUTS: [vk::ImageLayout; 2] =
    [vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::GENERAL];
const TRANSFER_DST_LAYOUTS: [vk::ImageLayout; 2] =
    [vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbState {
    New,
    Recording,
    Recorded,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct CommandPoolRecord {
    pub flags: vk::CommandPoolCreateFlags,
    pub queue_family_index: u32,
    pub command_buffers: HashSet<u64>,
}

/// Layout expectations of one image within one command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayoutState {
    /// Layout the image must be in when the buffer executes; `UNDEFINED`
    /// means any
    pub initial: vk::ImageLayout,
    /// Layout after the recorded commands
    pub current: vk::ImageLayout,
}

#[derive(Debug, Clone)]
pub struct ActiveRenderPass {
    pub render_pass: u64,
    pub layout: Arc<RenderPassLayout>,
    pub framebuffer: u64,
    pub subpass: u32,
    pub contents: vk::SubpassContents,
}

/// Render pass a secondary buffer continues.
#[derive(Debug, Clone)]
pub struct InheritedRenderPass {
    pub layout: Arc<RenderPassLayout>,
    pub subpass: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceInfo {
    pub render_pass: u64,
    pub subpass: u32,
    pub framebuffer: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeginInfo {
    pub flags: vk::CommandBufferUsageFlags,
    pub inheritance: Option<InheritanceInfo>,
}

/// Last bound state of one pipeline bind point.
#[derive(Debug, Clone, Default)]
pub struct BoundState {
    pub pipeline: Option<u64>,
    pub layout: Option<u64>,
    pub sets: Vec<Option<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    Set(u64),
    Reset(u64),
    Wait(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: u64,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Debug, Clone)]
pub struct CommandBufferRecord {
    pub pool: u64,
    pub level: vk::CommandBufferLevel,
    pub state: CbState,
    pub begin_flags: vk::CommandBufferUsageFlags,
    pub inherited: Option<InheritedRenderPass>,
    pub commands: Vec<CmdNode>,
    pub graphics: BoundState,
    pub compute: BoundState,
    pub status: CbStatusFlags,
    pub index_buffer: Option<u64>,
    pub active_render_pass: Option<ActiveRenderPass>,
    pub image_layouts: HashMap<u64, ImageLayoutState>,
    pub event_ops: Vec<EventOp>,
    pub draw_count: u32,
    pub dispatch_count: u32,
    pub referenced: HashSet<ObjectHandle>,
    pub secondaries: HashSet<u64>,
    pub broken_bindings: Vec<ObjectHandle>,
    /// Submissions containing this buffer that have not been retired.
    /// Survives resets so that retirement stays balanced.
    pub in_flight: u32,
    pub submit_count: u32,
}

impl CommandBufferRecord {
    pub fn new(pool: u64, level: vk::CommandBufferLevel) -> Self {
        Self {
            pool,
            level,
            state: CbState::New,
            begin_flags: vk::CommandBufferUsageFlags::empty(),
            inherited: None,
            commands: Vec::new(),
            graphics: BoundState::default(),
            compute: BoundState::default(),
            status: CbStatusFlags::empty(),
            index_buffer: None,
            active_render_pass: None,
            image_layouts: HashMap::new(),
            event_ops: Vec::new(),
            draw_count: 0,
            dispatch_count: 0,
            referenced: HashSet::new(),
            secondaries: HashSet::new(),
            broken_bindings: Vec::new(),
            in_flight: 0,
            submit_count: 0,
        }
    }

    /// Return to the initial state, handing back the references dropped.
    pub fn reset(&mut self) -> HashSet<ObjectHandle> {
        let referenced = std::mem::take(&mut self.referenced);
        *self = Self {
            in_flight: self.in_flight,
            ..Self::new(self.pool, self.level)
        };
        referenced
    }

    pub fn is_secondary(&self) -> bool {
        self.level == vk::CommandBufferLevel::SECONDARY
    }

    pub fn inside_render_pass(&self) -> bool {
        self.active_render_pass.is_some()
            || (self.is_secondary()
                && self
                    .begin_flags
                    .contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE))
    }

    pub fn references(&self, object: ObjectHandle) -> bool {
        matches!(self.state, CbState::Recording | CbState::Recorded)
            && self.referenced.contains(&object)
    }

    pub fn break_binding(&mut self, object: ObjectHandle) {
        self.broken_bindings.push(object);
        if self.state == CbState::Recorded {
            self.state = CbState::Invalid;
        }
    }

    pub fn bound(&self, bind_point: vk::PipelineBindPoint) -> &BoundState {
        if bind_point == vk::PipelineBindPoint::COMPUTE {
            &self.compute
        } else {
            &self.graphics
        }
    }

    pub fn bound_mut(&mut self, bind_point: vk::PipelineBindPoint) -> &mut BoundState {
        if bind_point == vk::PipelineBindPoint::COMPUTE {
            &mut self.compute
        } else {
            &mut self.graphics
        }
    }

    /// Render pass and subpass the next draw runs in.
    fn current_subpass(&self) -> Option<(Arc<RenderPassLayout>, u32)> {
        match (&self.active_render_pass, &self.inherited) {
            (Some(active), _) => Some((Arc::clone(&active.layout), active.subpass)),
            (None, Some(inherited)) => Some((Arc::clone(&inherited.layout), inherited.subpass)),
            _ => None,
        }
    }
}

/// What `vkCmdExecuteCommands` needs from a secondary, captured before the
/// primary is locked.
struct SecondarySnapshot {
    level: vk::CommandBufferLevel,
    state: CbState,
    flags: vk::CommandBufferUsageFlags,
    inherited: Option<InheritedRenderPass>,
    in_flight: u32,
    referenced: HashSet<ObjectHandle>,
    image_layouts: HashMap<u64, ImageLayoutState>,
    event_ops: Vec<EventOp>,
}

impl SecondarySnapshot {
    fn of(record: &CommandBufferRecord) -> Self {
        Self {
            level: record.level,
            state: record.state,
            flags: record.begin_flags,
            inherited: record.inherited.clone(),
            in_flight: record.in_flight,
            referenced: record.referenced.clone(),
            image_layouts: record.image_layouts.clone(),
            event_ops: record.event_ops.clone(),
        }
    }
}

// ── Pools and lifecycle ─────────────────────────────────────

impl DeviceState {
    pub fn record_create_command_pool(&self, pool: u64, info: &vk::CommandPoolCreateInfo<'_>) {
        debug!(
            "created VkCommandPool 0x{:x} for family {} ({:?})",
            pool, info.queue_family_index, info.flags
        );
        self.command_pools.register(
            pool,
            CommandPoolRecord {
                flags: info.flags,
                queue_family_index: info.queue_family_index,
                command_buffers: HashSet::new(),
            },
        );
    }

    fn pool_command_buffers(&self, pool: u64) -> Option<Vec<u64>> {
        self.command_pools
            .with(pool, |p| p.command_buffers.iter().copied().collect())
    }

    fn report_in_flight(&self, cbs: &[u64], code: DrawStateError, api: &str) -> bool {
        let mut skip = false;
        for &cb in cbs {
            let in_flight = self.command_buffers.with(cb, |r| r.in_flight).unwrap_or(0);
            if in_flight > 0 {
                let handle = self.command_buffers.handle(cb);
                skip |= self.error(
                    handle,
                    code,
                    format!("{}: {} is still in flight", api, handle),
                );
            }
        }
        skip
    }

    /// Destroy a pool and free every command buffer allocated from it.
    pub fn destroy_command_pool(&self, pool: u64) -> bool {
        let handle = self.command_pools.handle(pool);
        let Some(cbs) = self.pool_command_buffers(pool) else {
            return self.unknown_object(handle, "vkDestroyCommandPool");
        };
        if self.report_in_flight(&cbs, DrawStateError::ObjectInuse, "vkDestroyCommandPool") {
            return true;
        }
        for cb in cbs {
            self.drop_command_buffer(cb);
        }
        self.command_pools.remove(pool);
        debug!("destroyed {}", handle);
        false
    }

    pub fn validate_reset_command_pool(&self, pool: u64) -> bool {
        match self.pool_command_buffers(pool) {
            Some(cbs) => self.report_in_flight(
                &cbs,
                DrawStateError::ResetCbWhileInFlight,
                "vkResetCommandPool",
            ),
            None => self.unknown_object(self.command_pools.handle(pool), "vkResetCommandPool"),
        }
    }

    pub fn record_reset_command_pool(&self, pool: u64) {
        for cb in self.pool_command_buffers(pool).unwrap_or_default() {
            self.reset_record(cb);
        }
    }

    pub fn record_allocate_command_buffers(
        &self,
        pool: u64,
        level: vk::CommandBufferLevel,
        cbs: &[u64],
    ) {
        for &cb in cbs {
            self.command_buffers
                .register(cb, CommandBufferRecord::new(pool, level));
        }
        self.command_pools
            .with_mut(pool, |p| p.command_buffers.extend(cbs.iter().copied()));
        debug!(
            "allocated {} {:?} command buffer(s) from VkCommandPool 0x{:x}",
            cbs.len(),
            level,
            pool
        );
    }

    pub fn free_command_buffers(&self, pool: u64, cbs: &[u64]) -> bool {
        let live: Vec<u64> = cbs.iter().copied().filter(|&cb| cb != 0).collect();
        if self.report_in_flight(&live, DrawStateError::ObjectInuse, "vkFreeCommandBuffers") {
            return true;
        }
        for cb in live {
            self.drop_command_buffer(cb);
            self.command_pools
                .with_mut(pool, |p| p.command_buffers.remove(&cb));
        }
        false
    }

    fn drop_command_buffer(&self, cb: u64) {
        if let Some(mut record) = self.command_buffers.remove(cb) {
            let referenced = record.reset();
            self.release_references(cb, referenced);
            self.invalidate_command_buffers(self.command_buffers.handle(cb));
        }
    }

    /// Undo the back-references a command buffer left in memory and
    /// descriptor set records.
    fn release_references(&self, cb: u64, referenced: HashSet<ObjectHandle>) {
        for object in referenced {
            match object.object_type {
                ObjectType::DeviceMemory => {
                    self.memories
                        .with_mut(object.raw, |m| m.bound_command_buffers.remove(&cb));
                }
                ObjectType::DescriptorSet => {
                    self.descriptor_sets
                        .with_mut(object.raw, |s| s.bound_command_buffers.remove(&cb));
                }
                _ => {}
            }
        }
    }

    /// Reset a command buffer's recording. Primaries that executed it are
    /// invalidated.
    fn reset_record(&self, cb: u64) {
        let Some(referenced) = self.command_buffers.with_mut(cb, CommandBufferRecord::reset) else {
            return;
        };
        self.release_references(cb, referenced);
        self.invalidate_command_buffers(self.command_buffers.handle(cb));
    }

    fn unknown_command_buffer(&self, cb: u64, api: &str) -> bool {
        let handle = self.command_buffers.handle(cb);
        self.error(
            handle,
            DrawStateError::InvalidCommandBuffer,
            format!("{}: unknown {}", api, handle),
        )
    }

    pub fn validate_begin_command_buffer(&self, cb: u64, info: &BeginInfo) -> bool {
        let api = "vkBeginCommandBuffer";
        let handle = self.command_buffers.handle(cb);
        let Some((state, level, pool, in_flight)) = self
            .command_buffers
            .with(cb, |r| (r.state, r.level, r.pool, r.in_flight))
        else {
            return self.unknown_command_buffer(cb, api);
        };

        let mut skip = false;
        match state {
            CbState::Recording => {
                skip |= self.error(
                    handle,
                    DrawStateError::BeginCbInvalidState,
                    format!("{}: {} is already recording", api, handle),
                );
            }
            CbState::Recorded | CbState::Invalid => {
                let pool_flags = self.command_pools.with(pool, |p| p.flags).unwrap_or_default();
                if !pool_flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER) {
                    skip |= self.error(
                        handle,
                        DrawStateError::InvalidCommandBufferReset,
                        format!(
                            "{}: implicit reset of {} but VkCommandPool 0x{:x} lacks RESET_COMMAND_BUFFER",
                            api, handle, pool
                        ),
                    );
                }
                if in_flight > 0 {
                    skip |= self.error(
                        handle,
                        DrawStateError::ResetCbWhileInFlight,
                        format!("{}: implicit reset of {} while it is in flight", api, handle),
                    );
                }
            }
            CbState::New => {}
        }

        if level == vk::CommandBufferLevel::SECONDARY {
            match info.inheritance {
                None => {
                    skip |= self.error(
                        handle,
                        DrawStateError::BeginCbInvalidState,
                        format!("{}: secondary {} begun without inheritance info", api, handle),
                    );
                }
                Some(inheritance)
                    if info
                        .flags
                        .contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE) =>
                {
                    let rp = self.render_passes.handle(inheritance.render_pass);
                    match self.render_pass_layout(inheritance.render_pass) {
                        None => {
                            skip |= self.error(
                                rp,
                                DrawStateError::InvalidRenderpass,
                                format!("{}: {} inherits unknown {}", api, handle, rp),
                            );
                        }
                        Some(layout) if inheritance.subpass >= layout.subpass_count() => {
                            skip |= self.error(
                                rp,
                                DrawStateError::InvalidSubpassIndex,
                                format!(
                                    "{}: {} inherits subpass {} of {} which has {}",
                                    api,
                                    handle,
                                    inheritance.subpass,
                                    rp,
                                    layout.subpass_count()
                                ),
                            );
                        }
                        Some(_) => {}
                    }
                }
                Some(_) => {}
            }
        }
        skip
    }

    pub fn record_begin_command_buffer(&self, cb: u64, info: &BeginInfo) {
        let inherited = info
            .inheritance
            .filter(|_| {
                info.flags
                    .contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
            })
            .and_then(|i| {
                self.render_pass_layout(i.render_pass)
                    .map(|layout| InheritedRenderPass {
                        layout,
                        subpass: i.subpass,
                    })
            });

        let referenced = self.command_buffers.with_mut(cb, |r| {
            let was_recorded = r.state != CbState::New;
            let referenced = r.reset();
            r.state = CbState::Recording;
            r.begin_flags = info.flags;
            if r.is_secondary() {
                r.inherited = inherited;
            }
            (was_recorded, referenced)
        });
        if let Some((was_recorded, referenced)) = referenced {
            self.release_references(cb, referenced);
            if was_recorded {
                self.invalidate_command_buffers(self.command_buffers.handle(cb));
            }
        }
    }

    pub fn validate_end_command_buffer(&self, cb: u64) -> bool {
        let api = "vkEndCommandBuffer";
        let handle = self.command_buffers.handle(cb);
        let Some((state, in_render_pass)) = self
            .command_buffers
            .with(cb, |r| (r.state, r.active_render_pass.is_some()))
        else {
            return self.unknown_command_buffer(cb, api);
        };

        if state != CbState::Recording {
            return self.error(
                handle,
                DrawStateError::NoBeginCommandBuffer,
                format!("{}: {} is not recording ({:?})", api, handle, state),
            );
        }
        if in_render_pass {
            return self.error(
                handle,
                DrawStateError::InvalidRenderpassCmd,
                format!("{}: {} ends inside a render pass instance", api, handle),
            );
        }
        false
    }

    pub fn record_end_command_buffer(&self, cb: u64) {
        self.command_buffers.with_mut(cb, |r| {
            r.state = if r.broken_bindings.is_empty() {
                CbState::Recorded
            } else {
                CbState::Invalid
            };
            debug!(
                "VkCommandBuffer 0x{:x} recorded {} command(s)",
                cb,
                r.commands.len()
            );
        });
    }

    pub fn validate_reset_command_buffer(&self, cb: u64) -> bool {
        let api = "vkResetCommandBuffer";
        let handle = self.command_buffers.handle(cb);
        let Some((pool, in_flight)) = self.command_buffers.with(cb, |r| (r.pool, r.in_flight))
        else {
            return self.unknown_command_buffer(cb, api);
        };

        let mut skip = false;
        let pool_flags = self.command_pools.with(pool, |p| p.flags).unwrap_or_default();
        if !pool_flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER) {
            skip |= self.error(
                handle,
                DrawStateError::InvalidCommandBufferReset,
                format!(
                    "{}: VkCommandPool 0x{:x} of {} lacks RESET_COMMAND_BUFFER",
                    api, pool, handle
                ),
            );
        }
        if in_flight > 0 {
            skip |= self.error(
                handle,
                DrawStateError::ResetCbWhileInFlight,
                format!("{}: {} is in flight", api, handle),
            );
        }
        skip
    }

    pub fn record_reset_command_buffer(&self, cb: u64) {
        self.reset_record(cb);
    }

    pub fn command_buffer_state(&self, cb: u64) -> Option<CbState> {
        self.command_buffers.with(cb, |r| r.state)
    }
}

// ── Recording ───────────────────────────────────────────────

impl DeviceState {
    /// Append `cmd` to the log of a recording command buffer, check its
    /// render pass scope, then run the command-specific checks in `f`.
    fn record_cmd(
        &self,
        cb: u64,
        cmd: CmdType,
        f: impl FnOnce(&mut CommandBufferRecord) -> bool,
    ) -> bool {
        let handle = self.command_buffers.handle(cb);
        let Some(mut record) = self.command_buffers.lookup_mut(cb) else {
            return self.unknown_command_buffer(cb, cmd.name());
        };
        if record.state != CbState::Recording {
            return self.error(
                handle,
                DrawStateError::NoBeginCommandBuffer,
                format!(
                    "{}: {} is not recording ({:?}); call vkBeginCommandBuffer first",
                    cmd, handle, record.state
                ),
            );
        }

        let mut skip = false;
        match (cmd.render_pass_scope(), record.inside_render_pass()) {
            (RenderPassScope::Inside, false) => {
                skip |= self.error(
                    handle,
                    DrawStateError::NoActiveRenderpass,
                    format!("{}: must be recorded inside a render pass", cmd),
                );
            }
            (RenderPassScope::Outside, true) => {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidRenderpassCmd,
                    format!("{}: must be recorded outside a render pass", cmd),
                );
            }
            _ => {}
        }
        if let Some(active) = &record.active_render_pass {
            let secondary_only = active.contents == vk::SubpassContents::SECONDARY_COMMAND_BUFFERS;
            let allowed = matches!(
                cmd,
                CmdType::ExecuteCommands | CmdType::NextSubpass | CmdType::EndRenderPass
            );
            if secondary_only && !allowed {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidRenderpassCmd,
                    format!(
                        "{}: subpass {} contents are SECONDARY_COMMAND_BUFFERS",
                        cmd, active.subpass
                    ),
                );
            }
        }

        let sequence = record.commands.len() as u64;
        record.commands.push(CmdNode {
            cmd_type: cmd,
            sequence,
        });
        skip | f(&mut *record)
    }

    /// Reference a buffer from a command, checking usage and memory binding.
    /// Returns the skip decision and the buffer size when known.
    fn use_buffer(
        &self,
        cb: u64,
        record: &mut CommandBufferRecord,
        buffer: u64,
        usage: vk::BufferUsageFlags,
        cmd: CmdType,
    ) -> (bool, Option<u64>) {
        let handle = self.buffers.handle(buffer);
        let Some((size, created_usage, binding)) =
            self.buffers.with(buffer, |b| (b.size, b.usage, b.binding))
        else {
            return (self.unknown_object(handle, cmd.name()), None);
        };

        let mut skip = false;
        if !created_usage.contains(usage) {
            skip |= self.error(
                handle,
                MemTrackError::InvalidUsageFlag,
                format!("{}: {} was not created with {:?} usage", cmd, handle, usage),
            );
        }
        match binding {
            None => skip |= self.report_unbound(handle, cmd.name()),
            Some(binding) => self.reference_memory(cb, record, binding.memory),
        }
        record.referenced.insert(handle);
        (skip, Some(size))
    }

    fn use_image(
        &self,
        cb: u64,
        record: &mut CommandBufferRecord,
        image: u64,
        usage: vk::ImageUsageFlags,
        cmd: CmdType,
    ) -> (bool, bool) {
        let handle = self.images.handle(image);
        let Some((created_usage, binding)) = self.images.with(image, |i| (i.usage, i.binding))
        else {
            return (self.unknown_object(handle, cmd.name()), false);
        };

        let mut skip = false;
        if !created_usage.contains(usage) {
            skip |= self.error(
                handle,
                MemTrackError::InvalidUsageFlag,
                format!("{}: {} was not created with {:?} usage", cmd, handle, usage),
            );
        }
        match binding {
            None => skip |= self.report_unbound(handle, cmd.name()),
            Some(binding) => self.reference_memory(cb, record, binding.memory),
        }
        record.referenced.insert(handle);
        (skip, true)
    }

    fn reference_memory(&self, cb: u64, record: &mut CommandBufferRecord, memory: u64) {
        if record.referenced.insert(self.memories.handle(memory)) {
            self.memories
                .with_mut(memory, |m| m.bound_command_buffers.insert(cb));
        }
    }

    /// Check an image layout argument against the layouts the command
    /// accepts and the layout tracked so far in this buffer.
    fn use_image_layout(
        &self,
        record: &mut CommandBufferRecord,
        image: u64,
        layout: vk::ImageLayout,
        allowed: &[vk::ImageLayout],
        cmd: CmdType,
    ) -> bool {
        let handle = self.images.handle(image);
        let mut skip = false;
        if !allowed.contains(&layout) {
            skip |= self.error(
                handle,
                DrawStateError::InvalidImageLayout,
                format!(
                    "{}: {:?} is not a valid layout for {} here, expected one of {:?}",
                    cmd, layout, handle, allowed
                ),
            );
        }
        match record.image_layouts.get(&image) {
            Some(state) if state.current != layout => {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidImageLayout,
                    format!(
                        "{}: {} is in {:?} but the command says {:?}",
                        cmd, handle, state.current, layout
                    ),
                );
            }
            Some(_) => {}
            None => {
                record.image_layouts.insert(
                    image,
                    ImageLayoutState {
                        initial: layout,
                        current: layout,
                    },
                );
            }
        }
        skip
    }

    fn transition_image(
        &self,
        record: &mut CommandBufferRecord,
        barrier: &ImageBarrier,
        cmd: CmdType,
    ) -> bool {
        let handle = self.images.handle(barrier.image);
        if !self.images.contains(barrier.image) {
            return self.unknown_object(handle, cmd.name());
        }
        record.referenced.insert(handle);

        let mut skip = false;
        match record.image_layouts.get_mut(&barrier.image) {
            Some(state) => {
                if barrier.old_layout != vk::ImageLayout::UNDEFINED
                    && barrier.old_layout != state.current
                {
                    skip |= self.error(
                        handle,
                        DrawStateError::InvalidImageLayout,
                        format!(
                            "{}: barrier transitions {} from {:?} but it is in {:?}",
                            cmd, handle, barrier.old_layout, state.current
                        ),
                    );
                }
                state.current = barrier.new_layout;
            }
            None => {
                record.image_layouts.insert(
                    barrier.image,
                    ImageLayoutState {
                        initial: barrier.old_layout,
                        current: barrier.new_layout,
                    },
                );
            }
        }
        skip
    }

    fn check_range(
        &self,
        object: ObjectHandle,
        cmd: CmdType,
        region: usize,
        offset: u64,
        len: u64,
        size: Option<u64>,
    ) -> bool {
        match size {
            Some(size) if offset.saturating_add(len) > size => self.error(
                object,
                DrawStateError::CopyOutOfBounds,
                format!(
                    "{}: region {} covers [{}, {}) but {} is {} bytes",
                    cmd,
                    region,
                    offset,
                    offset.saturating_add(len),
                    object,
                    size
                ),
            ),
            _ => false,
        }
    }

    fn validate_bound_sets(
        &self,
        cb: ObjectHandle,
        bound: &BoundState,
        layouts: &[Arc<SetLayoutRecord>],
        cmd: CmdType,
    ) -> bool {
        let mut skip = false;
        for (index, expected) in layouts.iter().enumerate() {
            let Some(set) = bound.sets.get(index).copied().flatten() else {
                skip |= self.error(
                    cb,
                    DrawStateError::DescriptorSetNotBound,
                    format!("{}: descriptor set {} used by the pipeline is not bound", cmd, index),
                );
                continue;
            };
            let set_handle = self.descriptor_sets.handle(set);
            match self
                .descriptor_sets
                .with(set, |s| (Arc::clone(&s.layout), s.updated))
            {
                None => {
                    skip |= self.error(
                        set_handle,
                        DrawStateError::InvalidSet,
                        format!("{}: bound {} no longer exists", cmd, set_handle),
                    );
                }
                Some((layout, _)) if !layout.compatible_with(expected) => {
                    skip |= self.error(
                        set_handle,
                        DrawStateError::PipelineLayoutsIncompatible,
                        format!(
                            "{}: {} bound at index {} is incompatible with the pipeline layout",
                            cmd, set_handle, index
                        ),
                    );
                }
                Some((layout, false)) if layout.descriptor_count() > 0 => {
                    skip |= self.warn(
                        set_handle,
                        DrawStateError::DescriptorSetNotUpdated,
                        format!("{}: {} is bound but was never updated", cmd, set_handle),
                    );
                }
                Some(_) => {}
            }
        }
        skip
    }

    fn validate_draw(&self, cb: u64, record: &mut CommandBufferRecord, cmd: CmdType) -> bool {
        let handle = self.command_buffers.handle(cb);
        let Some(pipeline) = record.graphics.pipeline else {
            return self.error(
                handle,
                DrawStateError::NoPipelineBound,
                format!("{}: no graphics pipeline bound", cmd),
            );
        };
        let Some(p) = self.pipelines.with(pipeline, Clone::clone) else {
            let p = self.pipelines.handle(pipeline);
            return self.error(
                p,
                DrawStateError::InvalidPipeline,
                format!("{}: bound {} no longer exists", cmd, p),
            );
        };

        let mut skip = false;
        let missing = p.needs_dynamic().difference(record.status);
        for (bits, code, what) in DYNAMIC_STATE_CHECKS {
            if missing.intersects(bits) {
                skip |= self.error(
                    handle,
                    code,
                    format!(
                        "{}: dynamic {} state is required by VkPipeline 0x{:x} but was never set",
                        cmd, what, pipeline
                    ),
                );
            }
        }
        if cmd.is_indexed() && !record.status.contains(CbStatusFlags::INDEX_BUFFER_BOUND) {
            skip |= self.error(
                handle,
                DrawStateError::IndexBufferNotBound,
                format!("{}: no index buffer bound", cmd),
            );
        }

        skip |= self.validate_bound_sets(handle, &record.graphics, &p.set_layouts, cmd);

        if let (Some(expected), Some((active, subpass))) = (&p.render_pass, record.current_subpass())
        {
            if !expected.compatible_with(&active) {
                skip |= self.error(
                    handle,
                    DrawStateError::RenderpassIncompatible,
                    format!(
                        "{}: VkPipeline 0x{:x} was built for an incompatible render pass",
                        cmd, pipeline
                    ),
                );
            } else if p.subpass != subpass {
                skip |= self.error(
                    handle,
                    DrawStateError::RenderpassIncompatible,
                    format!(
                        "{}: VkPipeline 0x{:x} targets subpass {} but subpass {} is active",
                        cmd, pipeline, p.subpass, subpass
                    ),
                );
            }
        }

        record.draw_count += 1;
        skip
    }

    fn validate_dispatch(&self, cb: u64, record: &mut CommandBufferRecord, cmd: CmdType) -> bool {
        let handle = self.command_buffers.handle(cb);
        let Some(pipeline) = record.compute.pipeline else {
            return self.error(
                handle,
                DrawStateError::NoPipelineBound,
                format!("{}: no compute pipeline bound", cmd),
            );
        };
        let Some(layouts) = self.pipelines.with(pipeline, |p| p.set_layouts.clone()) else {
            let p = self.pipelines.handle(pipeline);
            return self.error(
                p,
                DrawStateError::InvalidPipeline,
                format!("{}: bound {} no longer exists", cmd, p),
            );
        };
        record.dispatch_count += 1;
        self.validate_bound_sets(handle, &record.compute, &layouts, cmd)
    }

    pub fn cmd_bind_pipeline(
        &self,
        cb: u64,
        bind_point: vk::PipelineBindPoint,
        pipeline: u64,
    ) -> bool {
        let cmd = CmdType::BindPipeline;
        self.record_cmd(cb, cmd, |record| {
            let handle = self.pipelines.handle(pipeline);
            let Some(created_for) = self.pipelines.with(pipeline, |p| p.bind_point) else {
                return self.error(
                    handle,
                    DrawStateError::InvalidPipeline,
                    format!("{}: unknown {}", cmd, handle),
                );
            };
            let mut skip = false;
            if created_for != bind_point {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidPipeline,
                    format!(
                        "{}: {} is a {:?} pipeline bound to {:?}",
                        cmd, handle, created_for, bind_point
                    ),
                );
            }
            record.bound_mut(bind_point).pipeline = Some(pipeline);
            record.referenced.insert(handle);
            skip
        })
    }

    /// `vkCmdSet*` for one piece of dynamic state.
    pub fn cmd_set_dynamic_state(&self, cb: u64, cmd: CmdType, state: CbStatusFlags) -> bool {
        self.record_cmd(cb, cmd, |record| {
            record.status |= state;
            false
        })
    }

    pub fn cmd_bind_descriptor_sets(
        &self,
        cb: u64,
        bind_point: vk::PipelineBindPoint,
        layout: u64,
        first_set: u32,
        sets: &[u64],
        dynamic_offset_count: u32,
    ) -> bool {
        let cmd = CmdType::BindDescriptorSets;
        self.record_cmd(cb, cmd, |record| {
            let layout_handle = self.pipeline_layouts.handle(layout);
            let Some(expected) = self.pipeline_layouts.with(layout, |l| l.set_layouts.clone())
            else {
                return self.unknown_object(layout_handle, cmd.name());
            };

            let mut skip = false;
            let mut dynamic = 0u32;
            for (i, &set) in sets.iter().enumerate() {
                let index = first_set as usize + i;
                let set_handle = self.descriptor_sets.handle(set);
                let Some(set_layout) = self.descriptor_sets.with_mut(set, |s| {
                    s.bound_command_buffers.insert(cb);
                    Arc::clone(&s.layout)
                }) else {
                    skip |= self.error(
                        set_handle,
                        DrawStateError::InvalidSet,
                        format!("{}: unknown {}", cmd, set_handle),
                    );
                    continue;
                };
                dynamic += set_layout.dynamic_count();

                match expected.get(index) {
                    None => {
                        skip |= self.error(
                            set_handle,
                            DrawStateError::PipelineLayoutsIncompatible,
                            format!(
                                "{}: set index {} is beyond the {} set(s) of {}",
                                cmd,
                                index,
                                expected.len(),
                                layout_handle
                            ),
                        );
                    }
                    Some(l) if !l.compatible_with(&set_layout) => {
                        skip |= self.error(
                            set_handle,
                            DrawStateError::PipelineLayoutsIncompatible,
                            format!(
                                "{}: {} is incompatible with set {} of {}",
                                cmd, set_handle, index, layout_handle
                            ),
                        );
                    }
                    Some(_) => {}
                }

                let bound = record.bound_mut(bind_point);
                if bound.sets.len() <= index {
                    bound.sets.resize(index + 1, None);
                }
                bound.sets[index] = Some(set);
                record.referenced.insert(set_handle);
            }
            record.bound_mut(bind_point).layout = Some(layout);

            if dynamic != dynamic_offset_count {
                skip |= self.error(
                    self.command_buffers.handle(cb),
                    DrawStateError::InvalidDynamicOffsetCount,
                    format!(
                        "{}: {} dynamic offset(s) given but the sets have {} dynamic descriptor(s)",
                        cmd, dynamic_offset_count, dynamic
                    ),
                );
            }
            skip
        })
    }

    pub fn cmd_bind_index_buffer(&self, cb: u64, buffer: u64) -> bool {
        let cmd = CmdType::BindIndexBuffer;
        self.record_cmd(cb, cmd, |record| {
            let (skip, _) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::INDEX_BUFFER, cmd);
            record.status |= CbStatusFlags::INDEX_BUFFER_BOUND;
            record.index_buffer = Some(buffer);
            skip
        })
    }

    pub fn cmd_bind_vertex_buffers(&self, cb: u64, buffers: &[u64]) -> bool {
        let cmd = CmdType::BindVertexBuffers;
        self.record_cmd(cb, cmd, |record| {
            buffers.iter().fold(false, |skip, &buffer| {
                skip | self
                    .use_buffer(cb, record, buffer, vk::BufferUsageFlags::VERTEX_BUFFER, cmd)
                    .0
            })
        })
    }

    /// `vkCmdDraw` and `vkCmdDrawIndexed`.
    pub fn cmd_draw(&self, cb: u64, cmd: CmdType) -> bool {
        self.record_cmd(cb, cmd, |record| self.validate_draw(cb, record, cmd))
    }

    /// `vkCmdDrawIndirect` and `vkCmdDrawIndexedIndirect`.
    pub fn cmd_draw_indirect(&self, cb: u64, cmd: CmdType, buffer: u64) -> bool {
        self.record_cmd(cb, cmd, |record| {
            let (skip, _) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::INDIRECT_BUFFER, cmd);
            skip | self.validate_draw(cb, record, cmd)
        })
    }

    pub fn cmd_dispatch(&self, cb: u64) -> bool {
        let cmd = CmdType::Dispatch;
        self.record_cmd(cb, cmd, |record| self.validate_dispatch(cb, record, cmd))
    }

    pub fn cmd_dispatch_indirect(&self, cb: u64, buffer: u64) -> bool {
        let cmd = CmdType::DispatchIndirect;
        self.record_cmd(cb, cmd, |record| {
            let (skip, _) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::INDIRECT_BUFFER, cmd);
            skip | self.validate_dispatch(cb, record, cmd)
        })
    }

    pub fn cmd_copy_buffer(&self, cb: u64, src: u64, dst: u64, regions: &[vk::BufferCopy]) -> bool {
        let cmd = CmdType::CopyBuffer;
        self.record_cmd(cb, cmd, |record| {
            let (mut skip, src_size) =
                self.use_buffer(cb, record, src, vk::BufferUsageFlags::TRANSFER_SRC, cmd);
            let (dst_skip, dst_size) =
                self.use_buffer(cb, record, dst, vk::BufferUsageFlags::TRANSFER_DST, cmd);
            skip |= dst_skip;
            let (src, dst) = (self.buffers.handle(src), self.buffers.handle(dst));
            for (i, region) in regions.iter().enumerate() {
                skip |= self.check_range(src, cmd, i, region.src_offset, region.size, src_size);
                skip |= self.check_range(dst, cmd, i, region.dst_offset, region.size, dst_size);
            }
            skip
        })
    }

    /// `vkCmdCopyImage` and `vkCmdBlitImage`.
    pub fn cmd_copy_image(
        &self,
        cb: u64,
        cmd: CmdType,
        src: u64,
        src_layout: vk::ImageLayout,
        dst: u64,
        dst_layout: vk::ImageLayout,
    ) -> bool {
        self.record_cmd(cb, cmd, |record| {
            let mut skip = false;
            let (s, known) =
                self.use_image(cb, record, src, vk::ImageUsageFlags::TRANSFER_SRC, cmd);
            skip |= s;
            if known {
                skip |= self.use_image_layout(record, src, src_layout, &TRANSFER_SRC_LAYOUTS, cmd);
            }
            let (s, known) =
                self.use_image(cb, record, dst, vk::ImageUsageFlags::TRANSFER_DST, cmd);
            skip |= s;
            if known {
                skip |= self.use_image_layout(record, dst, dst_layout, &TRANSFER_DST_LAYOUTS, cmd);
            }
            skip
        })
    }

    pub fn cmd_copy_buffer_to_image(
        &self,
        cb: u64,
        buffer: u64,
        image: u64,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> bool {
        let cmd = CmdType::CopyBufferToImage;
        self.record_cmd(cb, cmd, |record| {
            let (mut skip, size) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::TRANSFER_SRC, cmd);
            let (s, known) =
                self.use_image(cb, record, image, vk::ImageUsageFlags::TRANSFER_DST, cmd);
            skip |= s;
            if known {
                skip |= self.use_image_layout(record, image, layout, &TRANSFER_DST_LAYOUTS, cmd);
            }
            let buffer = self.buffers.handle(buffer);
            for (i, region) in regions.iter().enumerate() {
                skip |= self.check_range(buffer, cmd, i, region.buffer_offset, 1, size);
            }
            skip
        })
    }

    pub fn cmd_copy_image_to_buffer(
        &self,
        cb: u64,
        image: u64,
        layout: vk::ImageLayout,
        buffer: u64,
        regions: &[vk::BufferImageCopy],
    ) -> bool {
        let cmd = CmdType::CopyImageToBuffer;
        self.record_cmd(cb, cmd, |record| {
            let (mut skip, known) =
                self.use_image(cb, record, image, vk::ImageUsageFlags::TRANSFER_SRC, cmd);
            if known {
                skip |= self.use_image_layout(record, image, layout, &TRANSFER_SRC_LAYOUTS, cmd);
            }
            let (s, size) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::TRANSFER_DST, cmd);
            skip |= s;
            let buffer = self.buffers.handle(buffer);
            for (i, region) in regions.iter().enumerate() {
                skip |= self.check_range(buffer, cmd, i, region.buffer_offset, 1, size);
            }
            skip
        })
    }

    pub fn cmd_update_buffer(&self, cb: u64, buffer: u64, offset: u64, data_size: u64) -> bool {
        let cmd = CmdType::UpdateBuffer;
        self.record_cmd(cb, cmd, |record| {
            let (skip, size) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::TRANSFER_DST, cmd);
            skip | self.check_range(self.buffers.handle(buffer), cmd, 0, offset, data_size, size)
        })
    }

    pub fn cmd_fill_buffer(&self, cb: u64, buffer: u64, offset: u64, fill_size: u64) -> bool {
        let cmd = CmdType::FillBuffer;
        self.record_cmd(cb, cmd, |record| {
            let (skip, size) =
                self.use_buffer(cb, record, buffer, vk::BufferUsageFlags::TRANSFER_DST, cmd);
            let len = if fill_size == vk::WHOLE_SIZE { 1 } else { fill_size };
            skip | self.check_range(self.buffers.handle(buffer), cmd, 0, offset, len, size)
        })
    }

    pub fn cmd_clear_color_image(&self, cb: u64, image: u64, layout: vk::ImageLayout) -> bool {
        let cmd = CmdType::ClearColorImage;
        self.record_cmd(cb, cmd, |record| {
            let (mut skip, known) =
                self.use_image(cb, record, image, vk::ImageUsageFlags::TRANSFER_DST, cmd);
            if known {
                skip |= self.use_image_layout(record, image, layout, &TRANSFER_DST_LAYOUTS, cmd);
            }
            skip
        })
    }

    /// `vkCmdSetEvent` and `vkCmdResetEvent`.
    pub fn cmd_event(&self, cb: u64, cmd: CmdType, event: u64) -> bool {
        self.record_cmd(cb, cmd, |record| {
            let handle = self.events.handle(event);
            if !self.events.contains(event) {
                return self.unknown_object(handle, cmd.name());
            }
            record.referenced.insert(handle);
            record.event_ops.push(if cmd == CmdType::ResetEvent {
                EventOp::Reset(event)
            } else {
                EventOp::Set(event)
            });
            false
        })
    }

    pub fn cmd_wait_events(&self, cb: u64, events: &[u64], barriers: &[ImageBarrier]) -> bool {
        let cmd = CmdType::WaitEvents;
        self.record_cmd(cb, cmd, |record| {
            let mut skip = false;
            for &event in events {
                let handle = self.events.handle(event);
                if !self.events.contains(event) {
                    skip |= self.unknown_object(handle, cmd.name());
                    continue;
                }
                record.referenced.insert(handle);
                record.event_ops.push(EventOp::Wait(event));
            }
            for barrier in barriers {
                skip |= self.transition_image(record, barrier, cmd);
            }
            skip
        })
    }

    pub fn cmd_pipeline_barrier(&self, cb: u64, barriers: &[ImageBarrier]) -> bool {
        let cmd = CmdType::PipelineBarrier;
        self.record_cmd(cb, cmd, |record| {
            barriers.iter().fold(false, |skip, barrier| {
                skip | self.transition_image(record, barrier, cmd)
            })
        })
    }

    pub fn cmd_begin_render_pass(
        &self,
        cb: u64,
        render_pass: u64,
        framebuffer: u64,
        contents: vk::SubpassContents,
    ) -> bool {
        let cmd = CmdType::BeginRenderPass;
        self.record_cmd(cb, cmd, |record| {
            let mut skip = false;
            if record.is_secondary() {
                skip |= self.error(
                    self.command_buffers.handle(cb),
                    DrawStateError::InvalidRenderpassCmd,
                    format!("{}: recorded into a secondary command buffer", cmd),
                );
            }

            let rp_handle = self.render_passes.handle(render_pass);
            let Some(layout) = self.render_pass_layout(render_pass) else {
                return skip
                    | self.error(
                        rp_handle,
                        DrawStateError::InvalidRenderpass,
                        format!("{}: unknown {}", cmd, rp_handle),
                    );
            };
            let fb_handle = self.framebuffers.handle(framebuffer);
            let Some((fb_layout, views, images)) = self.framebuffers.with(framebuffer, |f| {
                (
                    Arc::clone(&f.render_pass),
                    f.attachments.clone(),
                    f.images.clone(),
                )
            }) else {
                return skip | self.unknown_object(fb_handle, cmd.name());
            };

            if !fb_layout.compatible_with(&layout) {
                skip |= self.error(
                    fb_handle,
                    DrawStateError::RenderpassIncompatible,
                    format!(
                        "{}: {} was created for a render pass incompatible with {}",
                        cmd, fb_handle, rp_handle
                    ),
                );
            }

            for (i, (attachment, &image)) in layout.attachments.iter().zip(&images).enumerate() {
                if image == 0 {
                    continue;
                }
                let image_handle = self.images.handle(image);
                match record.image_layouts.get_mut(&image) {
                    Some(state) => {
                        if attachment.initial_layout != vk::ImageLayout::UNDEFINED
                            && state.current != attachment.initial_layout
                        {
                            skip |= self.error(
                                image_handle,
                                DrawStateError::InvalidImageLayout,
                                format!(
                                    "{}: attachment {} ({}) is in {:?} but the render pass expects {:?}",
                                    cmd, i, image_handle, state.current, attachment.initial_layout
                                ),
                            );
                        }
                        state.current = attachment.final_layout;
                    }
                    None => {
                        record.image_layouts.insert(
                            image,
                            ImageLayoutState {
                                initial: attachment.initial_layout,
                                current: attachment.final_layout,
                            },
                        );
                    }
                }
                record.referenced.insert(image_handle);
            }
            record
                .referenced
                .extend(views.iter().map(|&v| self.image_views.handle(v)));
            record.referenced.insert(rp_handle);
            record.referenced.insert(fb_handle);
            record.active_render_pass = Some(ActiveRenderPass {
                render_pass,
                layout,
                framebuffer,
                subpass: 0,
                contents,
            });
            skip
        })
    }

    pub fn cmd_next_subpass(&self, cb: u64, contents: vk::SubpassContents) -> bool {
        let cmd = CmdType::NextSubpass;
        self.record_cmd(cb, cmd, |record| {
            let handle = self.command_buffers.handle(cb);
            let Some(active) = record.active_render_pass.as_mut() else {
                return false;
            };
            let count = active.layout.subpass_count();
            if active.subpass + 1 >= count {
                return self.error(
                    handle,
                    DrawStateError::InvalidSubpassIndex,
                    format!(
                        "{}: already in the last subpass ({} of {})",
                        cmd,
                        active.subpass,
                        count
                    ),
                );
            }
            active.subpass += 1;
            active.contents = contents;
            false
        })
    }

    pub fn cmd_end_render_pass(&self, cb: u64) -> bool {
        let cmd = CmdType::EndRenderPass;
        self.record_cmd(cb, cmd, |record| {
            let handle = self.command_buffers.handle(cb);
            let Some(active) = record.active_render_pass.take() else {
                return false;
            };
            let count = active.layout.subpass_count();
            if active.subpass + 1 != count {
                return self.error(
                    handle,
                    DrawStateError::InvalidSubpassIndex,
                    format!(
                        "{}: render pass ended in subpass {} of {}",
                        cmd, active.subpass, count
                    ),
                );
            }
            false
        })
    }

    pub fn cmd_execute_commands(&self, cb: u64, secondaries: &[u64]) -> bool {
        let cmd = CmdType::ExecuteCommands;
        // Secondaries live in the same registry as the primary, so read them
        // before the primary's entry is locked.
        let snapshots: Vec<(u64, Option<SecondarySnapshot>)> = secondaries
            .iter()
            .map(|&s| (s, self.command_buffers.with(s, SecondarySnapshot::of)))
            .collect();

        self.record_cmd(cb, cmd, |record| {
            let primary = self.command_buffers.handle(cb);
            let mut skip = false;
            if record.is_secondary() {
                skip |= self.error(
                    primary,
                    DrawStateError::InvalidSecondaryCommandBuffer,
                    format!("{}: recorded into secondary {}", cmd, primary),
                );
            }
            let active = record.active_render_pass.clone();
            if let Some(active) = &active {
                if active.contents != vk::SubpassContents::SECONDARY_COMMAND_BUFFERS {
                    skip |= self.error(
                        primary,
                        DrawStateError::InvalidRenderpassCmd,
                        format!(
                            "{}: subpass {} contents are INLINE",
                            cmd, active.subpass
                        ),
                    );
                }
            }

            for (raw, snapshot) in snapshots {
                let handle = self.command_buffers.handle(raw);
                let Some(snapshot) = snapshot else {
                    skip |= self.unknown_command_buffer(raw, cmd.name());
                    continue;
                };
                if snapshot.level != vk::CommandBufferLevel::SECONDARY {
                    skip |= self.error(
                        handle,
                        DrawStateError::InvalidSecondaryCommandBuffer,
                        format!("{}: {} is a primary command buffer", cmd, handle),
                    );
                    continue;
                }
                if snapshot.state != CbState::Recorded {
                    skip |= self.error(
                        handle,
                        DrawStateError::InvalidSecondaryCommandBuffer,
                        format!("{}: {} is not recorded ({:?})", cmd, handle, snapshot.state),
                    );
                }
                if let Some(active) = &active {
                    if !snapshot
                        .flags
                        .contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
                    {
                        skip |= self.error(
                            handle,
                            DrawStateError::InvalidSecondaryCommandBuffer,
                            format!(
                                "{}: {} runs inside a render pass but was not begun with RENDER_PASS_CONTINUE",
                                cmd, handle
                            ),
                        );
                    } else if let Some(inherited) = &snapshot.inherited {
                        if !inherited.layout.compatible_with(&active.layout) {
                            skip |= self.error(
                                handle,
                                DrawStateError::RenderpassIncompatible,
                                format!(
                                    "{}: {} inherits a render pass incompatible with the active one",
                                    cmd, handle
                                ),
                            );
                        }
                    }
                }
                if snapshot.in_flight > 0
                    && !snapshot
                        .flags
                        .contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
                {
                    skip |= self.error(
                        handle,
                        DrawStateError::InvalidCbSimultaneousUse,
                        format!(
                            "{}: {} is in flight and was not begun with SIMULTANEOUS_USE",
                            cmd, handle
                        ),
                    );
                }

                for object in &snapshot.referenced {
                    if object.object_type == ObjectType::DeviceMemory {
                        self.reference_memory(cb, record, object.raw);
                    }
                }
                record.referenced.extend(snapshot.referenced);
                record.referenced.insert(handle);
                for (image, state) in snapshot.image_layouts {
                    record
                        .image_layouts
                        .entry(image)
                        .and_modify(|s| s.current = state.current)
                        .or_insert(state);
                }
                record.event_ops.extend(snapshot.event_ops);
                record.secondaries.insert(raw);
            }
            skip
        })
    }
}
