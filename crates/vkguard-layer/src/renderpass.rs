//! Render pass and framebuffer entry points.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::state::render_pass::{
    AttachmentInfo, FramebufferDesc, RenderPassDesc, SubpassDependencyInfo, SubpassInfo,
};

use crate::dispatch::DeviceDispatch;
use crate::{raw_handles, raw_slice, ValidationLayer, SKIPPED};

fn attachment_index(reference: &vk::AttachmentReference) -> Option<u32> {
    (reference.attachment != vk::ATTACHMENT_UNUSED).then_some(reference.attachment)
}

unsafe fn subpass_info(subpass: &vk::SubpassDescription<'_>) -> SubpassInfo {
    let refs = |ptr: *const vk::AttachmentReference, count: u32| -> Vec<Option<u32>> {
        unsafe { raw_slice(ptr, count) }
            .iter()
            .map(attachment_index)
            .collect()
    };
    SubpassInfo {
        input: refs(subpass.p_input_attachments, subpass.input_attachment_count),
        color: refs(subpass.p_color_attachments, subpass.color_attachment_count),
        // Resolve attachments, when present, match the colour count
        resolve: refs(subpass.p_resolve_attachments, subpass.color_attachment_count),
        depth_stencil: unsafe { subpass.p_depth_stencil_attachment.as_ref() }
            .and_then(attachment_index),
    }
}

/// Convert a `VkRenderPassCreateInfo` into the tracker's description.
unsafe fn render_pass_desc(info: &vk::RenderPassCreateInfo<'_>) -> RenderPassDesc {
    unsafe {
        RenderPassDesc {
            attachments: raw_slice(info.p_attachments, info.attachment_count)
                .iter()
                .map(|a| AttachmentInfo {
                    format: a.format,
                    samples: a.samples,
                    initial_layout: a.initial_layout,
                    final_layout: a.final_layout,
                })
                .collect(),
            subpasses: raw_slice(info.p_subpasses, info.subpass_count)
                .iter()
                .map(|s| subpass_info(s))
                .collect(),
            dependencies: raw_slice(info.p_dependencies, info.dependency_count)
                .iter()
                .map(|d| SubpassDependencyInfo {
                    src_subpass: d.src_subpass,
                    dst_subpass: d.dst_subpass,
                })
                .collect(),
        }
    }
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── Render passes ───────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkRenderPassCreateInfo`.
    pub unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        let desc = unsafe { render_pass_desc(info) };
        if self.state.validate_create_render_pass(&desc) {
            return Err(SKIPPED);
        }
        let render_pass = self.track(unsafe { self.dispatch.create_render_pass(info) })?;
        self.state
            .record_create_render_pass(render_pass.as_raw(), desc);
        Ok(render_pass)
    }

    /// # Safety
    /// `render_pass` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        if render_pass == vk::RenderPass::null() {
            return;
        }
        if self.state.destroy_render_pass(render_pass.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_render_pass(render_pass) }
    }

    // ── Framebuffers ────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkFramebufferCreateInfo`.
    pub unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        let desc = FramebufferDesc {
            render_pass: info.render_pass.as_raw(),
            attachments: raw_handles(unsafe { raw_slice(info.p_attachments, info.attachment_count) }),
            width: info.width,
            height: info.height,
            layers: info.layers,
        };
        if self.state.validate_create_framebuffer(&desc) {
            return Err(SKIPPED);
        }
        let framebuffer = self.track(unsafe { self.dispatch.create_framebuffer(info) })?;
        self.state
            .record_create_framebuffer(framebuffer.as_raw(), desc);
        Ok(framebuffer)
    }

    /// # Safety
    /// `framebuffer` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        if framebuffer == vk::Framebuffer::null() {
            return;
        }
        if self.state.destroy_framebuffer(framebuffer.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_framebuffer(framebuffer) }
    }
}
