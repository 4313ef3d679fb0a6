//! Integration test: shader modules and pipelines
//!
//! SPIR-V scanning at module creation, stage and entry point checks at
//! pipeline creation, and bind point matching when a pipeline is bound.
//!
//! Run with: cargo test -p vkguard-layer --test pipeline

mod common;

use ash::vk::{self, Handle};
use common::*;
use vkguard_core::spirv::{self, SPIRV_MAGIC};
use vkguard_layer::SKIPPED;
use vkguard_protocol::{DrawStateError, ReportFlags, ShaderCheckerError, ValidationCode};

fn module_from_words(h: &Harness, words: &[u32]) -> ash::prelude::VkResult<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(words);
    unsafe { h.layer.create_shader_module(&info) }
}

fn compute_pipeline(h: &Harness, module: vk::ShaderModule, layout: vk::PipelineLayout) -> ash::prelude::VkResult<vk::Pipeline> {
    let info = vk::ComputePipelineCreateInfo::default()
        .stage(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module)
                .name(c"main"),
        )
        .layout(layout);
    unsafe { h.layer.create_compute_pipelines(vk::PipelineCache::null(), &[info]) }
        .map(|pipelines| pipelines[0])
}

fn graphics_with_stages(
    h: &Harness,
    stages: &[vk::PipelineShaderStageCreateInfo<'_>],
    subpass: u32,
) -> ash::prelude::VkResult<Vec<vk::Pipeline>> {
    let layout = h.pipeline_layout(&[]);
    let rp = h.render_pass(1);
    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(stages)
        .layout(layout)
        .render_pass(rp)
        .subpass(subpass);
    unsafe { h.layer.create_graphics_pipelines(vk::PipelineCache::null(), &[info]) }
}

#[test]
fn test_minimal_module_is_clean() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_FRAGMENT, "main");
    unsafe { h.layer.destroy_shader_module(module) };
    h.assert_clean();
}

#[test]
fn test_non_spirv_module_warns() {
    let h = make_harness();
    let words = [0x1234_5678u32; 8];
    let module = module_from_words(&h, &words);
    assert!(module.is_ok(), "non-SPIR-V code is still passed to the driver");

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].code,
        ValidationCode::from(ShaderCheckerError::NonSpirvShader)
    );
    assert!(reports[0].flags.contains(ReportFlags::WARNING));
}

#[test]
fn test_misaligned_code_size() {
    let h = make_harness();
    let words = spirv::minimal_module(spirv::EXECUTION_MODEL_VERTEX, "main");
    let mut info = vk::ShaderModuleCreateInfo::default().code(&words);
    info.code_size -= 2;
    let _ = unsafe { h.layer.create_shader_module(&info) };
    assert!(h.has(ShaderCheckerError::NonSpirvShader));
}

#[test]
fn test_zero_word_count_is_inconsistent() {
    let h = make_harness();
    // Valid header followed by an instruction claiming zero words
    let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0, 0x0000_0011];
    let _ = module_from_words(&h, &words);
    assert!(h.has(ShaderCheckerError::InconsistentSpirv));
    assert_eq!(h.errors(), 1);
}

#[test]
fn test_inconsistent_module_skipped_on_break() {
    let mut config = vkguard_core::VkGuardConfig::default();
    config
        .report
        .actions
        .push(vkguard_core::config::DebugAction::Break);
    let h = make_harness_with(config);

    let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0, 0x0004_000f];
    let result = module_from_words(&h, &words);
    assert_eq!(result, Err(SKIPPED));
    assert_eq!(h.driver().call_count("vkCreateShaderModule"), 0);
}

#[test]
fn test_graphics_pipeline_clean() {
    let h = make_harness();
    let layout = h.pipeline_layout(&[]);
    let rp = h.render_pass(1);
    let pipeline = h.graphics_pipeline(layout, rp, &[]);
    unsafe { h.layer.destroy_pipeline(pipeline) };
    h.assert_clean();
}

#[test]
fn test_missing_entry_point() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_VERTEX, "main");
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"vs_main")];
    let _ = graphics_with_stages(&h, &stages, 0);
    assert!(h.has(ShaderCheckerError::MissingEntrypoint));
}

#[test]
fn test_entry_point_for_wrong_stage() {
    let h = make_harness();
    // "main" exists, but only as a fragment entry point
    let module = h.shader_module(spirv::EXECUTION_MODEL_FRAGMENT, "main");
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"main")];
    let _ = graphics_with_stages(&h, &stages, 0);
    assert!(h.has(ShaderCheckerError::MissingEntrypoint));
}

#[test]
fn test_non_spirv_module_skips_entry_point_check() {
    let h = make_harness();
    let module = module_from_words(&h, &[0xfeed_beefu32; 6]).expect("module");
    h.clear();

    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"anything")];
    graphics_with_stages(&h, &stages, 0).expect("pipeline");
    h.assert_clean();
}

#[test]
fn test_no_vertex_stage() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_FRAGMENT, "main");
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(module)
        .name(c"main")];
    let _ = graphics_with_stages(&h, &stages, 0);
    assert!(h.has(DrawStateError::InvalidPipelineCreateState));
}

#[test]
fn test_duplicate_stage() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_VERTEX, "main");
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"main");
    let _ = graphics_with_stages(&h, &[stage, stage], 0);
    assert!(h.has(DrawStateError::InvalidPipelineCreateState));
}

#[test]
fn test_unknown_stage_module() {
    let h = make_harness();
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vk::ShaderModule::from_raw(0x5151))
        .name(c"main")];
    let _ = graphics_with_stages(&h, &stages, 0);
    assert!(h.has(DrawStateError::InvalidPipelineCreateState));
}

#[test]
fn test_subpass_out_of_range() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_VERTEX, "main");
    let stages = [vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(module)
        .name(c"main")];
    let _ = graphics_with_stages(&h, &stages, 1);
    assert!(h.has(DrawStateError::InvalidPipelineCreateState));
}

#[test]
fn test_compute_pipeline_clean() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_GL_COMPUTE, "main");
    let layout = h.pipeline_layout(&[]);
    compute_pipeline(&h, module, layout).expect("compute pipeline");
    h.assert_clean();
}

#[test]
fn test_compute_pipeline_without_compute_entry_point() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_VERTEX, "main");
    let layout = h.pipeline_layout(&[]);
    let _ = compute_pipeline(&h, module, layout);
    assert!(h.has(ShaderCheckerError::MissingEntrypoint));
}

#[test]
fn test_compute_pipeline_bound_to_graphics() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_GL_COMPUTE, "main");
    let layout = h.pipeline_layout(&[]);
    let pipeline = compute_pipeline(&h, module, layout).expect("compute pipeline");

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline)
    };
    assert!(h.has(DrawStateError::InvalidPipeline));
}

#[test]
fn test_bind_unknown_pipeline() {
    let h = make_harness();
    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer.cmd_bind_pipeline(
            cb,
            vk::PipelineBindPoint::COMPUTE,
            vk::Pipeline::from_raw(0x7777),
        )
    };
    assert!(h.has(DrawStateError::InvalidPipeline));
}

#[test]
fn test_destroy_pipeline_in_flight() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_GL_COMPUTE, "main");
    let layout = h.pipeline_layout(&[]);
    let pipeline = compute_pipeline(&h, module, layout).expect("compute pipeline");

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, pipeline);
        h.layer.cmd_dispatch(cb, 1, 1, 1);
    }
    h.end(cb);
    h.submit(h.queue(), &[cb], vk::Fence::null()).expect("submit");
    h.assert_clean();

    unsafe { h.layer.destroy_pipeline(pipeline) };
    assert!(h.has(DrawStateError::ObjectInuse));
}

#[test]
fn test_destroy_pipeline_after_idle() {
    let h = make_harness();
    let module = h.shader_module(spirv::EXECUTION_MODEL_GL_COMPUTE, "main");
    let layout = h.pipeline_layout(&[]);
    let pipeline = compute_pipeline(&h, module, layout).expect("compute pipeline");

    let cb = h.primary();
    h.begin(cb);
    unsafe {
        h.layer
            .cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, pipeline);
        h.layer.cmd_dispatch(cb, 1, 1, 1);
    }
    h.end(cb);
    let queue = h.queue();
    h.submit(queue, &[cb], vk::Fence::null()).expect("submit");
    unsafe { h.layer.queue_wait_idle(queue) }.expect("wait idle");

    unsafe { h.layer.destroy_pipeline(pipeline) };
    h.assert_clean();
    assert_eq!(h.driver().call_count("vkDestroyPipeline"), 1);
}
