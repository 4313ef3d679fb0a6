//! Shared fixtures: a validation layer over the null driver with every report
//! captured for inspection.

#![allow(dead_code)]

use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use vkguard_core::spirv;
use vkguard_core::VkGuardConfig;
use vkguard_layer::{NullDriver, ValidationInstance, ValidationLayer};
use vkguard_protocol::{ReportFlags, ReportMessage, ValidationCode};

pub struct Harness {
    pub instance: ValidationInstance,
    pub layer: ValidationLayer<NullDriver>,
    reports: Arc<Mutex<Vec<ReportMessage>>>,
}

pub fn make_harness() -> Harness {
    make_harness_with(VkGuardConfig::default())
}

pub fn make_harness_with(config: VkGuardConfig) -> Harness {
    let instance = ValidationInstance::new(config).expect("instance");
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    instance.create_debug_report_callback(
        ReportFlags::all(),
        Arc::new(move |msg: &ReportMessage| {
            sink.lock().push(msg.clone());
            false
        }),
    );
    let layer = instance.wrap_device(NullDriver::new());
    Harness {
        instance,
        layer,
        reports,
    }
}

impl Harness {
    pub fn driver(&self) -> &NullDriver {
        self.layer.dispatch()
    }

    pub fn reports(&self) -> Vec<ReportMessage> {
        self.reports.lock().clone()
    }

    pub fn codes(&self) -> Vec<ValidationCode> {
        self.reports.lock().iter().map(|r| r.code).collect()
    }

    pub fn has(&self, code: impl Into<ValidationCode>) -> bool {
        let code = code.into();
        self.reports.lock().iter().any(|r| r.code == code)
    }

    pub fn errors(&self) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.flags.contains(ReportFlags::ERROR))
            .count()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }

    pub fn assert_clean(&self) {
        let reports = self.reports();
        assert!(reports.is_empty(), "unexpected reports: {:#?}", reports);
    }

    // ── Object helpers ──────────────────────────────────────

    pub fn memory(&self, size: u64) -> vk::DeviceMemory {
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(0);
        unsafe { self.layer.allocate_memory(&info) }.expect("allocate memory")
    }

    pub fn buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> vk::Buffer {
        let info = vk::BufferCreateInfo::default().size(size).usage(usage);
        unsafe { self.layer.create_buffer(&info) }.expect("create buffer")
    }

    /// A buffer bound at offset 0 of its own allocation.
    pub fn bound_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> (vk::Buffer, vk::DeviceMemory) {
        let buffer = self.buffer(size, usage);
        let memory = self.memory(size);
        unsafe { self.layer.bind_buffer_memory(buffer, memory, 0) }.expect("bind buffer");
        (buffer, memory)
    }

    pub fn image(&self, format: vk::Format, usage: vk::ImageUsageFlags) -> vk::Image {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: 16,
                height: 16,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        unsafe { self.layer.create_image(&info) }.expect("create image")
    }

    pub fn command_pool(&self, flags: vk::CommandPoolCreateFlags) -> vk::CommandPool {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(0);
        unsafe { self.layer.create_command_pool(&info) }.expect("create command pool")
    }

    pub fn command_buffer(&self, pool: vk::CommandPool, level: vk::CommandBufferLevel) -> vk::CommandBuffer {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        unsafe { self.layer.allocate_command_buffers(&info) }.expect("allocate command buffer")[0]
    }

    /// A primary command buffer from a resettable pool.
    pub fn primary(&self) -> vk::CommandBuffer {
        let pool = self.command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        self.command_buffer(pool, vk::CommandBufferLevel::PRIMARY)
    }

    pub fn begin(&self, cb: vk::CommandBuffer) {
        self.begin_with(cb, vk::CommandBufferUsageFlags::empty());
    }

    pub fn begin_with(&self, cb: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags) {
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.layer.begin_command_buffer(cb, &info) }.expect("begin command buffer");
    }

    pub fn end(&self, cb: vk::CommandBuffer) {
        unsafe { self.layer.end_command_buffer(cb) }.expect("end command buffer");
    }

    /// An empty recorded primary command buffer.
    pub fn recorded(&self) -> vk::CommandBuffer {
        let cb = self.primary();
        self.begin(cb);
        self.end(cb);
        cb
    }

    pub fn queue(&self) -> vk::Queue {
        unsafe { self.layer.get_device_queue(0, 0) }
    }

    pub fn fence(&self, signaled: bool) -> vk::Fence {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.layer.create_fence(&info) }.expect("create fence")
    }

    pub fn semaphore(&self) -> vk::Semaphore {
        unsafe { self.layer.create_semaphore(&vk::SemaphoreCreateInfo::default()) }
            .expect("create semaphore")
    }

    pub fn submit(&self, queue: vk::Queue, cbs: &[vk::CommandBuffer], fence: vk::Fence) -> ash::prelude::VkResult<()> {
        let submit = vk::SubmitInfo::default().command_buffers(cbs);
        unsafe { self.layer.queue_submit(queue, &[submit], fence) }
    }

    pub fn shader_module(&self, execution_model: u32, name: &str) -> vk::ShaderModule {
        let words = spirv::minimal_module(execution_model, name);
        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        unsafe { self.layer.create_shader_module(&info) }.expect("create shader module")
    }

    pub fn set_layout(&self, bindings: &[vk::DescriptorSetLayoutBinding<'_>]) -> vk::DescriptorSetLayout {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        unsafe { self.layer.create_descriptor_set_layout(&info) }.expect("create set layout")
    }

    pub fn pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> vk::PipelineLayout {
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        unsafe { self.layer.create_pipeline_layout(&info) }.expect("create pipeline layout")
    }

    /// A render pass with no attachments and `subpasses` empty subpasses,
    /// chained by dependencies.
    pub fn render_pass(&self, subpasses: u32) -> vk::RenderPass {
        let descs: Vec<vk::SubpassDescription<'_>> = (0..subpasses)
            .map(|_| {
                vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            })
            .collect();
        let deps: Vec<vk::SubpassDependency> = (1..subpasses)
            .map(|i| vk::SubpassDependency {
                src_subpass: i - 1,
                dst_subpass: i,
                ..Default::default()
            })
            .collect();
        let info = vk::RenderPassCreateInfo::default()
            .subpasses(&descs)
            .dependencies(&deps);
        unsafe { self.layer.create_render_pass(&info) }.expect("create render pass")
    }

    pub fn framebuffer(&self, render_pass: vk::RenderPass) -> vk::Framebuffer {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .width(16)
            .height(16)
            .layers(1);
        unsafe { self.layer.create_framebuffer(&info) }.expect("create framebuffer")
    }

    /// A graphics pipeline with one vertex stage and the given dynamic state.
    pub fn graphics_pipeline(
        &self,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        dynamic: &[vk::DynamicState],
    ) -> vk::Pipeline {
        let module = self.shader_module(spirv::EXECUTION_MODEL_VERTEX, "main");
        let stages = [vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(module)
            .name(c"main")];
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(dynamic);
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .input_assembly_state(&input_assembly)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);
        unsafe { self.layer.create_graphics_pipelines(vk::PipelineCache::null(), &[info]) }
            .expect("create graphics pipeline")[0]
    }

    pub fn begin_render_pass(&self, cb: vk::CommandBuffer, render_pass: vk::RenderPass, framebuffer: vk::Framebuffer) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer);
        unsafe {
            self.layer
                .cmd_begin_render_pass(cb, &info, vk::SubpassContents::INLINE)
        }
    }
}
