use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use parking_lot::Mutex;
use serde::Serialize;
use vkguard_core::config::DebugAction;
use vkguard_core::spirv;
use vkguard_core::VkGuardConfig;
use vkguard_layer::{NullDriver, ValidationInstance, ValidationLayer};
use vkguard_protocol::{
    DrawStateError, MemTrackError, ReportFlags, ReportMessage, ShaderCheckerError, ValidationCode,
};

// ── Check result types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            details: Vec::new(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Warn, message)
    }

    fn skip(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Skip, message)
    }

    fn detail(mut self, detail: &str) -> Self {
        self.details.push(detail.to_string());
        self
    }
}

// ── Scenario fixture ────────────────────────────────────────────────────────

/// A validation layer over the null driver that records every report.
struct Fixture {
    _instance: ValidationInstance,
    layer: ValidationLayer<NullDriver>,
    reports: Arc<Mutex<Vec<ReportMessage>>>,
}

impl Fixture {
    fn new(config: &VkGuardConfig) -> anyhow::Result<Self> {
        let instance = ValidationInstance::new(config.clone())?;
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
        Ok(Self {
            _instance: instance,
            layer,
            reports,
        })
    }

    fn reports(&self) -> Vec<ReportMessage> {
        self.reports.lock().clone()
    }

    unsafe fn memory(&self, size: u64) -> VkResult<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(0);
        unsafe { self.layer.allocate_memory(&info) }
    }

    unsafe fn buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let info = vk::BufferCreateInfo::default().size(size).usage(usage);
        unsafe { self.layer.create_buffer(&info) }
    }

    unsafe fn bound_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
    ) -> VkResult<(vk::Buffer, vk::DeviceMemory)> {
        unsafe {
            let buffer = self.buffer(size, usage)?;
            let memory = self.memory(size)?;
            self.layer.bind_buffer_memory(buffer, memory, 0)?;
            Ok((buffer, memory))
        }
    }

    /// A primary command buffer from a resettable pool, not yet begun.
    unsafe fn primary(&self) -> VkResult<vk::CommandBuffer> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(0);
        let pool = unsafe { self.layer.create_command_pool(&pool_info) }?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cbs = unsafe { self.layer.allocate_command_buffers(&info) }?;
        cbs.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    unsafe fn begin(&self, cb: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.layer
                .begin_command_buffer(cb, &vk::CommandBufferBeginInfo::default())
        }
    }

    unsafe fn recorded(&self) -> VkResult<vk::CommandBuffer> {
        unsafe {
            let cb = self.primary()?;
            self.begin(cb)?;
            self.layer.end_command_buffer(cb)?;
            Ok(cb)
        }
    }

    unsafe fn submit(&self, cbs: &[vk::CommandBuffer], fence: vk::Fence) -> VkResult<()> {
        let submit = vk::SubmitInfo::default().command_buffers(cbs);
        unsafe {
            let queue = self.layer.get_device_queue(0, 0);
            self.layer.queue_submit(queue, &[submit], fence)
        }
    }

    unsafe fn fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        unsafe {
            self.layer
                .create_fence(&vk::FenceCreateInfo::default().flags(flags))
        }
    }

    unsafe fn shader_module(&self, words: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(words);
        unsafe { self.layer.create_shader_module(&info) }
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

type ScenarioFn = unsafe fn(&Fixture) -> VkResult<()>;

struct Scenario {
    name: &'static str,
    /// Code the scenario must raise, or `None` for a scenario that must stay
    /// clean.
    expect: Option<ValidationCode>,
    run: ScenarioFn,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "Clean frame",
            expect: None,
            run: clean_frame,
        },
        Scenario {
            name: "Free memory still bound",
            expect: Some(MemTrackError::FreedMemRef.into()),
            run: free_bound_memory,
        },
        Scenario {
            name: "Map memory twice",
            expect: Some(MemTrackError::InvalidMap.into()),
            run: double_map,
        },
        Scenario {
            name: "Use buffer without memory",
            expect: Some(MemTrackError::ObjectNotBound.into()),
            run: unbound_buffer,
        },
        Scenario {
            name: "End command buffer never begun",
            expect: Some(DrawStateError::NoBeginCommandBuffer.into()),
            run: end_without_begin,
        },
        Scenario {
            name: "Draw outside render pass",
            expect: Some(DrawStateError::NoActiveRenderpass.into()),
            run: draw_outside_render_pass,
        },
        Scenario {
            name: "Submit with signaled fence",
            expect: Some(MemTrackError::InvalidFenceState.into()),
            run: submit_signaled_fence,
        },
        Scenario {
            name: "Wait on unsignalled semaphore",
            expect: Some(DrawStateError::QueueForwardProgress.into()),
            run: wait_unsignalled_semaphore,
        },
        Scenario {
            name: "Reset command buffer in flight",
            expect: Some(DrawStateError::ResetCbWhileInFlight.into()),
            run: reset_in_flight,
        },
        Scenario {
            name: "Destroy buffer in flight",
            expect: Some(DrawStateError::ObjectInuse.into()),
            run: destroy_buffer_in_flight,
        },
        Scenario {
            name: "Exhaust descriptor pool",
            expect: Some(DrawStateError::DescriptorPoolEmpty.into()),
            run: exhaust_descriptor_pool,
        },
        Scenario {
            name: "Backwards subpass dependency",
            expect: Some(DrawStateError::InvalidRenderpass.into()),
            run: backwards_dependency,
        },
        Scenario {
            name: "Non-SPIR-V shader",
            expect: Some(ShaderCheckerError::NonSpirvShader.into()),
            run: non_spirv_shader,
        },
        Scenario {
            name: "Missing shader entry point",
            expect: Some(ShaderCheckerError::MissingEntrypoint.into()),
            run: missing_entry_point,
        },
        Scenario {
            name: "Leak at device teardown",
            expect: Some(MemTrackError::MemoryLeak.into()),
            run: leak_at_teardown,
        },
    ]
}

unsafe fn clean_frame(f: &Fixture) -> VkResult<()> {
    unsafe {
        let (buffer, memory) = f.bound_buffer(256, vk::BufferUsageFlags::TRANSFER_DST)?;
        let cb = f.primary()?;
        f.begin(cb)?;
        f.layer.cmd_fill_buffer(cb, buffer, 0, 256, 0);
        f.layer.end_command_buffer(cb)?;

        let fence = f.fence(vk::FenceCreateFlags::empty())?;
        f.submit(&[cb], fence)?;
        f.layer.wait_for_fences(&[fence], true, u64::MAX)?;

        // Recorded work keeps the memory referenced until the reset
        f.layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())?;
        f.layer.destroy_fence(fence);
        f.layer.destroy_buffer(buffer);
        f.layer.free_memory(memory);
    }
    Ok(())
}

unsafe fn free_bound_memory(f: &Fixture) -> VkResult<()> {
    unsafe {
        let (_, memory) = f.bound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
        f.layer.free_memory(memory);
    }
    Ok(())
}

unsafe fn double_map(f: &Fixture) -> VkResult<()> {
    unsafe {
        let memory = f.memory(64)?;
        f.layer
            .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?;
        let _ = f
            .layer
            .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty());
    }
    Ok(())
}

unsafe fn unbound_buffer(f: &Fixture) -> VkResult<()> {
    unsafe {
        let buffer = f.buffer(64, vk::BufferUsageFlags::TRANSFER_DST)?;
        let cb = f.primary()?;
        f.begin(cb)?;
        f.layer.cmd_fill_buffer(cb, buffer, 0, 64, 0);
    }
    Ok(())
}

unsafe fn end_without_begin(f: &Fixture) -> VkResult<()> {
    unsafe {
        let cb = f.primary()?;
        let _ = f.layer.end_command_buffer(cb);
    }
    Ok(())
}

unsafe fn draw_outside_render_pass(f: &Fixture) -> VkResult<()> {
    unsafe {
        let cb = f.primary()?;
        f.begin(cb)?;
        f.layer.cmd_draw(cb, 3, 1, 0, 0);
    }
    Ok(())
}

unsafe fn submit_signaled_fence(f: &Fixture) -> VkResult<()> {
    unsafe {
        let fence = f.fence(vk::FenceCreateFlags::SIGNALED)?;
        let cb = f.recorded()?;
        let _ = f.submit(&[cb], fence);
    }
    Ok(())
}

unsafe fn wait_unsignalled_semaphore(f: &Fixture) -> VkResult<()> {
    unsafe {
        let semaphore = f
            .layer
            .create_semaphore(&vk::SemaphoreCreateInfo::default())?;
        let waits = [semaphore];
        let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages);
        let queue = f.layer.get_device_queue(0, 0);
        let _ = f.layer.queue_submit(queue, &[submit], vk::Fence::null());
    }
    Ok(())
}

unsafe fn reset_in_flight(f: &Fixture) -> VkResult<()> {
    unsafe {
        let cb = f.recorded()?;
        f.submit(&[cb], vk::Fence::null())?;
        let _ = f
            .layer
            .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty());
    }
    Ok(())
}

unsafe fn destroy_buffer_in_flight(f: &Fixture) -> VkResult<()> {
    unsafe {
        let (buffer, _) = f.bound_buffer(64, vk::BufferUsageFlags::TRANSFER_DST)?;
        let cb = f.primary()?;
        f.begin(cb)?;
        f.layer.cmd_fill_buffer(cb, buffer, 0, 64, 0);
        f.layer.end_command_buffer(cb)?;
        f.submit(&[cb], vk::Fence::null())?;
        f.layer.destroy_buffer(buffer);
    }
    Ok(())
}

unsafe fn exhaust_descriptor_pool(f: &Fixture) -> VkResult<()> {
    unsafe {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)];
        let layout = f.layer.create_descriptor_set_layout(
            &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
        )?;
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 4,
        }];
        let pool = f.layer.create_descriptor_pool(
            &vk::DescriptorPoolCreateInfo::default()
                .max_sets(1)
                .pool_sizes(&sizes),
        )?;
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        f.layer.allocate_descriptor_sets(&info)?;
        let _ = f.layer.allocate_descriptor_sets(&info);
    }
    Ok(())
}

unsafe fn backwards_dependency(f: &Fixture) -> VkResult<()> {
    let subpasses = [
        vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS),
        vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS),
    ];
    let dependencies = [vk::SubpassDependency {
        src_subpass: 1,
        dst_subpass: 0,
        ..Default::default()
    }];
    let info = vk::RenderPassCreateInfo::default()
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    let _ = unsafe { f.layer.create_render_pass(&info) };
    Ok(())
}

unsafe fn non_spirv_shader(f: &Fixture) -> VkResult<()> {
    // GLSL source handed over as if it were SPIR-V
    let words: Vec<u32> = b"#version 450\nvoid main() {}\n\0\0\0\0"
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let _ = unsafe { f.shader_module(&words) };
    Ok(())
}

unsafe fn missing_entry_point(f: &Fixture) -> VkResult<()> {
    unsafe {
        let words = spirv::minimal_module(spirv::EXECUTION_MODEL_FRAGMENT, "main");
        let module = f.shader_module(&words)?;
        let layout = f
            .layer
            .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default())?;
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::COMPUTE)
                    .module(module)
                    .name(c"main"),
            )
            .layout(layout);
        let _ = f
            .layer
            .create_compute_pipelines(vk::PipelineCache::null(), &[info]);
    }
    Ok(())
}

unsafe fn leak_at_teardown(f: &Fixture) -> VkResult<()> {
    let _memory = unsafe { f.memory(1024) }?;
    f.layer.state().report_leaks();
    Ok(())
}

// ── Main entry point ────────────────────────────────────────────────────────

pub fn run_verify(config_path: &str, json: bool) -> anyhow::Result<()> {
    let mut results: Vec<CheckResult> = Vec::new();

    let config = check_config(config_path, &mut results);
    for scenario in scenarios() {
        results.push(run_scenario(&scenario, &config)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results_pretty(&results);
    }

    // Exit code 1 if any failures
    if results
        .iter()
        .any(|r| matches!(r.status, CheckStatus::Fail))
    {
        std::process::exit(1);
    }

    Ok(())
}

/// Load the configuration the scenarios run under. Reports are delivered to
/// the fixture through callbacks only, so log output stays out of the
/// results.
fn check_config(config_path: &str, results: &mut Vec<CheckResult>) -> VkGuardConfig {
    let mut config = if !std::path::Path::new(config_path).exists() {
        results.push(
            CheckResult::warn(
                "Configuration",
                &format!("Config file not found: {}", config_path),
            )
            .detail("Using default configuration"),
        );
        VkGuardConfig::default()
    } else {
        match VkGuardConfig::load(config_path) {
            Ok(config) => {
                results.push(
                    CheckResult::pass("Configuration", &format!("Loaded from {}", config_path))
                        .detail(&format!("Report flags: {:?}", config.report.flags))
                        .detail(&format!("Actions: {:?}", config.report.actions))
                        .detail(&format!("Checks: {:?}", config.checks)),
                );
                config
            }
            Err(e) => {
                results.push(
                    CheckResult::fail(
                        "Configuration",
                        &format!("Failed to parse {}: {}", config_path, e),
                    )
                    .detail("Scenarios run with the default configuration"),
                );
                VkGuardConfig::default()
            }
        }
    };

    let break_on_error = config.report.has_action(DebugAction::Break);
    config.report.actions = vec![DebugAction::Callback];
    if break_on_error {
        config.report.actions.push(DebugAction::Break);
    }
    config.report.log_file = None;
    config
}

fn run_scenario(scenario: &Scenario, config: &VkGuardConfig) -> anyhow::Result<CheckResult> {
    if let Some(code) = scenario.expect {
        if !config.checks.allows(code) {
            return Ok(CheckResult::skip(
                scenario.name,
                &format!("{} checks are disabled", code.layer_prefix()),
            ));
        }
    }

    let fixture = Fixture::new(config)?;
    // SAFETY: scenarios only touch objects created through the fixture's layer
    if let Err(e) = unsafe { (scenario.run)(&fixture) } {
        return Ok(CheckResult::fail(
            scenario.name,
            &format!("Scenario setup failed: {:?}", e),
        ));
    }

    let reports = fixture.reports();
    let result = match scenario.expect {
        Some(code) => match reports.iter().find(|r| r.code == code) {
            Some(report) => CheckResult::pass(scenario.name, &format!("{} reported", code))
                .detail(&report.message),
            None => {
                let mut result =
                    CheckResult::fail(scenario.name, &format!("{} was not reported", code));
                for report in &reports {
                    result = result.detail(&format!("got {}: {}", report.code, report.message));
                }
                result
            }
        },
        None if reports.is_empty() => CheckResult::pass(scenario.name, "No reports"),
        None => {
            let mut result = CheckResult::fail(
                scenario.name,
                &format!("{} unexpected report(s)", reports.len()),
            );
            for report in &reports {
                result = result.detail(&format!("{}: {}", report.code, report.message));
            }
            result
        }
    };
    Ok(result)
}

// ── Output formatters ───────────────────────────────────────────────────────

fn print_results_pretty(results: &[CheckResult]) {
    println!();
    println!("vkguard Verification");
    println!("====================");
    println!();

    let mut pass_count = 0u32;
    let mut fail_count = 0u32;
    let mut warn_count = 0u32;

    for result in results {
        let (icon, color_start, color_end) = match result.status {
            CheckStatus::Pass => {
                pass_count += 1;
                ("[PASS]", "\x1b[32m", "\x1b[0m")
            }
            CheckStatus::Fail => {
                fail_count += 1;
                ("[FAIL]", "\x1b[31m", "\x1b[0m")
            }
            CheckStatus::Warn => {
                warn_count += 1;
                ("[WARN]", "\x1b[33m", "\x1b[0m")
            }
            CheckStatus::Skip => ("[SKIP]", "\x1b[90m", "\x1b[0m"),
        };

        println!(
            "  {}{}{} {} - {}",
            color_start, icon, color_end, result.name, result.message
        );

        for detail in &result.details {
            println!("         {}", detail);
        }
    }

    println!();
    println!("-------------------------------");
    println!(
        "  {} passed, {} failed, {} warnings",
        pass_count, fail_count, warn_count
    );
    println!();
}
