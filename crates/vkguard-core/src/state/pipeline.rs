//! Shader modules, pipeline layouts and pipelines.

use std::sync::Arc;

use ash::vk;
use tracing::debug;
use vkguard_protocol::{DrawStateError, ObjectHandle, ShaderCheckerError};

use super::command_buffer::CbStatusFlags;
use super::descriptor::SetLayoutRecord;
use super::render_pass::RenderPassLayout;
use super::DeviceState;
use crate::error::CoreError;
use crate::registry::Tracked;
use crate::spirv::{self, EntryPoint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleRecord {
    /// False when the code was not SPIR-V; such modules are not inspected
    pub is_spirv: bool,
    pub entry_points: Vec<EntryPoint>,
}

impl ShaderModuleRecord {
    pub fn has_entry_point(&self, execution_model: u32, name: &str) -> bool {
        self.entry_points
            .iter()
            .any(|e| e.execution_model == execution_model && e.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineLayoutRecord {
    pub set_layouts: Vec<Arc<SetLayoutRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: u64,
    pub entry_point: String,
}

/// The parts of `VkGraphicsPipelineCreateInfo` the tracker inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub layout: u64,
    pub render_pass: u64,
    pub subpass: u32,
    pub stages: Vec<ShaderStageDesc>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub rasterizer_discard: bool,
    pub depth_bias_enable: bool,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    /// Any colour blend attachment uses a constant blend factor
    pub uses_blend_constants: bool,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            layout: 0,
            render_pass: 0,
            subpass: 0,
            stages: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            rasterizer_discard: false,
            depth_bias_enable: false,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            uses_blend_constants: false,
            dynamic_states: Vec::new(),
        }
    }
}

impl GraphicsPipelineDesc {
    /// State a draw with this pipeline depends on.
    pub fn required_state(&self) -> CbStatusFlags {
        let mut required = CbStatusFlags::empty();
        if !self.rasterizer_discard {
            required |= CbStatusFlags::VIEWPORT_SET | CbStatusFlags::SCISSOR_SET;
        }
        let lines = matches!(
            self.topology,
            vk::PrimitiveTopology::LINE_LIST
                | vk::PrimitiveTopology::LINE_STRIP
                | vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY
                | vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY
        );
        if lines || self.polygon_mode == vk::PolygonMode::LINE {
            required |= CbStatusFlags::LINE_WIDTH_SET;
        }
        if self.depth_bias_enable {
            required |= CbStatusFlags::DEPTH_BIAS_SET;
        }
        if self.uses_blend_constants {
            required |= CbStatusFlags::BLEND_CONSTANTS_SET;
        }
        if self.depth_bounds_test_enable {
            required |= CbStatusFlags::DEPTH_BOUNDS_SET;
        }
        if self.stencil_test_enable {
            required |= CbStatusFlags::STENCIL_READ_MASK_SET
                | CbStatusFlags::STENCIL_WRITE_MASK_SET
                | CbStatusFlags::STENCIL_REFERENCE_SET;
        }
        required
    }

    pub fn dynamic_state(&self) -> CbStatusFlags {
        self.dynamic_states
            .iter()
            .fold(CbStatusFlags::empty(), |acc, s| acc | CbStatusFlags::from_dynamic_state(*s))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub bind_point: vk::PipelineBindPoint,
    pub set_layouts: Vec<Arc<SetLayoutRecord>>,
    pub render_pass: Option<Arc<RenderPassLayout>>,
    pub subpass: u32,
    pub required: CbStatusFlags,
    pub dynamic: CbStatusFlags,
    pub in_use: u32,
}

impl PipelineRecord {
    /// State that must be set on the command buffer before drawing.
    pub fn needs_dynamic(&self) -> CbStatusFlags {
        self.required & self.dynamic
    }
}

impl Tracked for PipelineRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

impl DeviceState {
    /// Scan shader code. Returns the skip decision and the record to keep
    /// if the module is created.
    pub fn validate_create_shader_module(
        &self,
        code_size: usize,
        words: &[u32],
    ) -> (bool, ShaderModuleRecord) {
        let device = self.device();
        match spirv::scan_module(code_size, words) {
            Ok(entry_points) => (
                false,
                ShaderModuleRecord {
                    is_spirv: true,
                    entry_points,
                },
            ),
            Err(e) => {
                let skip = if e.is_not_spirv() {
                    self.warn(
                        device,
                        ShaderCheckerError::NonSpirvShader,
                        format!("vkCreateShaderModule: shader is not SPIR-V: {}", e),
                    )
                } else {
                    self.error(
                        device,
                        ShaderCheckerError::InconsistentSpirv,
                        format!("vkCreateShaderModule: malformed SPIR-V: {}", e),
                    )
                };
                (
                    skip,
                    ShaderModuleRecord {
                        is_spirv: false,
                        entry_points: Vec::new(),
                    },
                )
            }
        }
    }

    pub fn record_create_shader_module(&self, module: u64, record: ShaderModuleRecord) {
        debug!(
            "created VkShaderModule 0x{:x} with {} entry point(s)",
            module,
            record.entry_points.len()
        );
        self.shader_modules.register(module, record);
    }

    pub fn destroy_shader_module(&self, module: u64) -> bool {
        if self.shader_modules.remove(module).is_none() {
            return self.unknown_object(self.shader_modules.handle(module), "vkDestroyShaderModule");
        }
        false
    }

    pub fn validate_create_pipeline_layout(&self, set_layouts: &[u64]) -> bool {
        set_layouts
            .iter()
            .filter(|&&l| !self.set_layouts.contains(l))
            .fold(false, |skip, &l| {
                skip | self.unknown_object(self.set_layouts.handle(l), "vkCreatePipelineLayout")
            })
    }

    pub fn record_create_pipeline_layout(&self, layout: u64, set_layouts: &[u64]) {
        let set_layouts = set_layouts
            .iter()
            .filter_map(|&l| self.set_layouts.with(l, Arc::clone))
            .collect();
        self.pipeline_layouts
            .register(layout, PipelineLayoutRecord { set_layouts });
    }

    pub fn destroy_pipeline_layout(&self, layout: u64) -> bool {
        if self.pipeline_layouts.remove(layout).is_none() {
            return self.unknown_object(self.pipeline_layouts.handle(layout), "vkDestroyPipelineLayout");
        }
        false
    }

    fn pipeline_set_layouts(&self, layout: u64) -> Option<Vec<Arc<SetLayoutRecord>>> {
        self.pipeline_layouts.with(layout, |l| l.set_layouts.clone())
    }

    fn validate_stage(&self, index: usize, stage: &ShaderStageDesc, api: &str) -> bool {
        let module = self.shader_modules.handle(stage.module);
        let Some(record) = self.shader_modules.with(stage.module, Clone::clone) else {
            return self.error(
                module,
                DrawStateError::InvalidPipelineCreateState,
                format!("{}: stage {} uses unknown {}", api, index, module),
            );
        };
        let Some(model) = spirv::execution_model_for_stage(stage.stage) else {
            return self.error(
                module,
                DrawStateError::InvalidPipelineCreateState,
                format!("{}: stage {} has invalid stage flags {:?}", api, index, stage.stage),
            );
        };
        if record.is_spirv && !record.has_entry_point(model, &stage.entry_point) {
            return self.error(
                module,
                ShaderCheckerError::MissingEntrypoint,
                format!(
                    "{}: no entry point \"{}\" for {:?} in {}",
                    api, stage.entry_point, stage.stage, module
                ),
            );
        }
        false
    }

    pub fn validate_create_graphics_pipeline(&self, index: usize, desc: &GraphicsPipelineDesc) -> bool {
        let api = "vkCreateGraphicsPipelines";
        let device = self.device();
        let mut skip = false;

        if !self.pipeline_layouts.contains(desc.layout) {
            skip |= self.unknown_object(self.pipeline_layouts.handle(desc.layout), api);
        }

        match self.render_pass_layout(desc.render_pass) {
            None => skip |= self.unknown_object(self.render_passes.handle(desc.render_pass), api),
            Some(rp) if desc.subpass >= rp.subpass_count() => {
                skip |= self.error(
                    self.render_passes.handle(desc.render_pass),
                    DrawStateError::InvalidPipelineCreateState,
                    format!(
                        "{}: pipeline {} uses subpass {} but the render pass has {}",
                        api,
                        index,
                        desc.subpass,
                        rp.subpass_count()
                    ),
                );
            }
            Some(_) => {}
        }

        let mut seen = vk::ShaderStageFlags::empty();
        for (i, stage) in desc.stages.iter().enumerate() {
            if seen.intersects(stage.stage) {
                skip |= self.error(
                    device,
                    DrawStateError::InvalidPipelineCreateState,
                    format!("{}: pipeline {} has stage {:?} twice", api, index, stage.stage),
                );
            }
            seen |= stage.stage;
            skip |= self.validate_stage(i, stage, api);
        }
        if !seen.contains(vk::ShaderStageFlags::VERTEX) {
            skip |= self.error(
                device,
                DrawStateError::InvalidPipelineCreateState,
                format!("{}: pipeline {} has no vertex stage", api, index),
            );
        }
        if seen.contains(vk::ShaderStageFlags::COMPUTE) {
            skip |= self.error(
                device,
                DrawStateError::InvalidPipelineCreateState,
                format!("{}: pipeline {} includes a compute stage", api, index),
            );
        }
        skip
    }

    pub fn record_create_graphics_pipeline(&self, pipeline: u64, desc: &GraphicsPipelineDesc) {
        let record = PipelineRecord {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            set_layouts: self.pipeline_set_layouts(desc.layout).unwrap_or_default(),
            render_pass: self.render_pass_layout(desc.render_pass),
            subpass: desc.subpass,
            required: desc.required_state(),
            dynamic: desc.dynamic_state(),
            in_use: 0,
        };
        debug!(
            "created graphics VkPipeline 0x{:x}: requires {:?}, dynamic {:?}",
            pipeline, record.required, record.dynamic
        );
        self.pipelines.register(pipeline, record);
    }

    pub fn validate_create_compute_pipeline(
        &self,
        index: usize,
        layout: u64,
        stage: &ShaderStageDesc,
    ) -> bool {
        let api = "vkCreateComputePipelines";
        let mut skip = false;
        if !self.pipeline_layouts.contains(layout) {
            skip |= self.unknown_object(self.pipeline_layouts.handle(layout), api);
        }
        if stage.stage != vk::ShaderStageFlags::COMPUTE {
            skip |= self.error(
                self.device(),
                DrawStateError::InvalidPipelineCreateState,
                format!("{}: pipeline {} stage is {:?}, not COMPUTE", api, index, stage.stage),
            );
        }
        skip | self.validate_stage(0, stage, api)
    }

    pub fn record_create_compute_pipeline(&self, pipeline: u64, layout: u64) {
        debug!("created compute VkPipeline 0x{:x}", pipeline);
        self.pipelines.register(
            pipeline,
            PipelineRecord {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                set_layouts: self.pipeline_set_layouts(layout).unwrap_or_default(),
                render_pass: None,
                subpass: 0,
                required: CbStatusFlags::empty(),
                dynamic: CbStatusFlags::empty(),
                in_use: 0,
            },
        );
    }

    pub fn destroy_pipeline(&self, pipeline: u64) -> bool {
        let handle: ObjectHandle = self.pipelines.handle(pipeline);
        match self.pipelines.destroy(pipeline, self) {
            Ok(_) => {
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyPipeline"),
        }
    }
}
