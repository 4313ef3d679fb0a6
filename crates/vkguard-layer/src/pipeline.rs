//! Shader module, pipeline layout, and pipeline entry points.

use std::ffi::CStr;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::state::pipeline::{GraphicsPipelineDesc, ShaderStageDesc};

use crate::dispatch::DeviceDispatch;
use crate::{raw_handles, raw_slice, ValidationLayer, SKIPPED};

const CONSTANT_BLEND_FACTORS: [vk::BlendFactor; 4] = [
    vk::BlendFactor::CONSTANT_COLOR,
    vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
    vk::BlendFactor::CONSTANT_ALPHA,
    vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
];

unsafe fn stage_desc(stage: &vk::PipelineShaderStageCreateInfo<'_>) -> ShaderStageDesc {
    let entry_point = if stage.p_name.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(stage.p_name) }
            .to_string_lossy()
            .into_owned()
    };
    ShaderStageDesc {
        stage: stage.stage,
        module: stage.module.as_raw(),
        entry_point,
    }
}

fn uses_constants(attachment: &vk::PipelineColorBlendAttachmentState) -> bool {
    attachment.blend_enable != vk::FALSE
        && [
            attachment.src_color_blend_factor,
            attachment.dst_color_blend_factor,
            attachment.src_alpha_blend_factor,
            attachment.dst_alpha_blend_factor,
        ]
        .iter()
        .any(|f| CONSTANT_BLEND_FACTORS.contains(f))
}

/// Extract the state the tracker inspects from a graphics pipeline create
/// info.
unsafe fn graphics_desc(info: &vk::GraphicsPipelineCreateInfo<'_>) -> GraphicsPipelineDesc {
    let mut desc = GraphicsPipelineDesc {
        layout: info.layout.as_raw(),
        render_pass: info.render_pass.as_raw(),
        subpass: info.subpass,
        ..Default::default()
    };
    unsafe {
        desc.stages = raw_slice(info.p_stages, info.stage_count)
            .iter()
            .map(|s| stage_desc(s))
            .collect();

        if let Some(ia) = info.p_input_assembly_state.as_ref() {
            desc.topology = ia.topology;
        }
        if let Some(rs) = info.p_rasterization_state.as_ref() {
            desc.polygon_mode = rs.polygon_mode;
            desc.rasterizer_discard = rs.rasterizer_discard_enable != vk::FALSE;
            desc.depth_bias_enable = rs.depth_bias_enable != vk::FALSE;
        }
        if let Some(ds) = info.p_depth_stencil_state.as_ref() {
            desc.depth_bounds_test_enable = ds.depth_bounds_test_enable != vk::FALSE;
            desc.stencil_test_enable = ds.stencil_test_enable != vk::FALSE;
        }
        if let Some(cb) = info.p_color_blend_state.as_ref() {
            desc.uses_blend_constants = raw_slice(cb.p_attachments, cb.attachment_count)
                .iter()
                .any(uses_constants);
        }
        if let Some(dy) = info.p_dynamic_state.as_ref() {
            desc.dynamic_states = raw_slice(dy.p_dynamic_states, dy.dynamic_state_count).to_vec();
        }
    }
    desc
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── Shader modules ──────────────────────────────────────────

    /// # Safety
    /// `info.p_code` must point to `info.code_size` readable bytes.
    pub unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        let words = unsafe { raw_slice(info.p_code, (info.code_size / 4) as u32) };
        let (skip, record) = self.state.validate_create_shader_module(info.code_size, words);
        if skip {
            return Err(SKIPPED);
        }
        let module = self.track(unsafe { self.dispatch.create_shader_module(info) })?;
        self.state.record_create_shader_module(module.as_raw(), record);
        Ok(module)
    }

    /// # Safety
    /// `module` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        if module == vk::ShaderModule::null() {
            return;
        }
        if self.state.destroy_shader_module(module.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_shader_module(module) }
    }

    // ── Pipeline layouts ────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkPipelineLayoutCreateInfo`.
    pub unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        let set_layouts = raw_handles(unsafe { raw_slice(info.p_set_layouts, info.set_layout_count) });
        if self.state.validate_create_pipeline_layout(&set_layouts) {
            return Err(SKIPPED);
        }
        let layout = self.track(unsafe { self.dispatch.create_pipeline_layout(info) })?;
        self.state
            .record_create_pipeline_layout(layout.as_raw(), &set_layouts);
        Ok(layout)
    }

    /// # Safety
    /// `layout` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        if layout == vk::PipelineLayout::null() {
            return;
        }
        if self.state.destroy_pipeline_layout(layout.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_pipeline_layout(layout) }
    }

    // ── Pipelines ───────────────────────────────────────────────

    /// # Safety
    /// Every create info must be valid, including the pointed-to state blocks.
    pub unsafe fn create_graphics_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::GraphicsPipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        let descs: Vec<GraphicsPipelineDesc> =
            infos.iter().map(|info| unsafe { graphics_desc(info) }).collect();
        let mut skip = false;
        for (index, desc) in descs.iter().enumerate() {
            skip |= self.state.validate_create_graphics_pipeline(index, desc);
        }
        if skip {
            return Err(SKIPPED);
        }

        let pipelines = self.track(unsafe { self.dispatch.create_graphics_pipelines(cache, infos) })?;
        for (pipeline, desc) in pipelines.iter().zip(&descs) {
            self.state
                .record_create_graphics_pipeline(pipeline.as_raw(), desc);
        }
        Ok(pipelines)
    }

    /// # Safety
    /// Every create info must be valid.
    pub unsafe fn create_compute_pipelines(
        &self,
        cache: vk::PipelineCache,
        infos: &[vk::ComputePipelineCreateInfo<'_>],
    ) -> VkResult<Vec<vk::Pipeline>> {
        let mut skip = false;
        for (index, info) in infos.iter().enumerate() {
            let stage = unsafe { stage_desc(&info.stage) };
            skip |= self
                .state
                .validate_create_compute_pipeline(index, info.layout.as_raw(), &stage);
        }
        if skip {
            return Err(SKIPPED);
        }

        let pipelines = self.track(unsafe { self.dispatch.create_compute_pipelines(cache, infos) })?;
        for (pipeline, info) in pipelines.iter().zip(infos) {
            self.state
                .record_create_compute_pipeline(pipeline.as_raw(), info.layout.as_raw());
        }
        Ok(pipelines)
    }

    /// # Safety
    /// `pipeline` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        if pipeline == vk::Pipeline::null() {
            return;
        }
        if self.state.destroy_pipeline(pipeline.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_pipeline(pipeline) }
    }
}
