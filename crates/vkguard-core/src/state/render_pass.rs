//! Render passes, their subpass dependency graph, and framebuffers.

use std::collections::VecDeque;
use std::sync::Arc;

use ash::vk;
use tracing::debug;
use vkguard_protocol::{DrawStateError, ObjectHandle};

use super::DeviceState;
use crate::error::CoreError;
use crate::registry::Tracked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// Attachment references of one subpass. `None` is `VK_ATTACHMENT_UNUSED`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassInfo {
    pub input: Vec<Option<u32>>,
    pub color: Vec<Option<u32>>,
    pub resolve: Vec<Option<u32>>,
    pub depth_stencil: Option<u32>,
}

impl SubpassInfo {
    fn writes(&self) -> impl Iterator<Item = u32> + '_ {
        self.color
            .iter()
            .chain(&self.resolve)
            .chain(std::iter::once(&self.depth_stencil))
            .flatten()
            .copied()
    }

    fn references(&self) -> impl Iterator<Item = u32> + '_ {
        self.input.iter().flatten().copied().chain(self.writes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassDependencyInfo {
    pub src_subpass: u32,
    pub dst_subpass: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentInfo>,
    pub subpasses: Vec<SubpassInfo>,
    pub dependencies: Vec<SubpassDependencyInfo>,
}

/// A subpass and its direct dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagNode {
    pub pass: u32,
    pub prev: Vec<u32>,
    pub next: Vec<u32>,
}

/// Immutable part of a render pass, shared with the pipelines and command
/// buffers that were built against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassLayout {
    pub attachments: Vec<AttachmentInfo>,
    pub subpasses: Vec<SubpassInfo>,
    pub dag: Vec<DagNode>,
    /// Formats of each subpass's colour attachments
    pub color_formats: Vec<Vec<vk::Format>>,
}

impl RenderPassLayout {
    pub fn new(desc: RenderPassDesc) -> Self {
        let count = desc.subpasses.len() as u32;
        let mut dag: Vec<DagNode> = (0..count)
            .map(|pass| DagNode {
                pass,
                ..DagNode::default()
            })
            .collect();
        for dep in &desc.dependencies {
            let (src, dst) = (dep.src_subpass, dep.dst_subpass);
            if src == vk::SUBPASS_EXTERNAL || dst == vk::SUBPASS_EXTERNAL {
                continue;
            }
            if src < dst && dst < count {
                dag[src as usize].next.push(dst);
                dag[dst as usize].prev.push(src);
            }
        }

        let color_formats = desc
            .subpasses
            .iter()
            .map(|s| {
                s.color
                    .iter()
                    .map(|a| {
                        a.and_then(|a| desc.attachments.get(a as usize))
                            .map_or(vk::Format::UNDEFINED, |a| a.format)
                    })
                    .collect()
            })
            .collect();

        Self {
            attachments: desc.attachments,
            subpasses: desc.subpasses,
            dag,
            color_formats,
        }
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    /// Whether `to` is reachable from `from` along dependency edges.
    pub fn has_path(&self, from: u32, to: u32) -> bool {
        let mut seen = vec![false; self.dag.len()];
        let mut queue = VecDeque::from([from]);
        while let Some(pass) = queue.pop_front() {
            if pass == to {
                return true;
            }
            let Some(node) = self.dag.get(pass as usize) else {
                continue;
            };
            for &next in &node.next {
                if !std::mem::replace(&mut seen[next as usize], true) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    fn attachment_signature(&self, index: Option<u32>) -> Option<(vk::Format, vk::SampleCountFlags)> {
        index
            .and_then(|i| self.attachments.get(i as usize))
            .map(|a| (a.format, a.samples))
    }

    /// Render pass compatibility: matching attachment formats and sample
    /// counts, and matching references in every subpass.
    pub fn compatible_with(&self, other: &RenderPassLayout) -> bool {
        if self.attachments.len() != other.attachments.len()
            || self.subpasses.len() != other.subpasses.len()
        {
            return false;
        }
        let attachments_match = self
            .attachments
            .iter()
            .zip(&other.attachments)
            .all(|(a, b)| a.format == b.format && a.samples == b.samples);
        if !attachments_match {
            return false;
        }

        let refs_match = |a: &[Option<u32>], b: &[Option<u32>]| {
            let len = a.len().max(b.len());
            (0..len).all(|i| {
                self.attachment_signature(a.get(i).copied().flatten())
                    == other.attachment_signature(b.get(i).copied().flatten())
            })
        };
        self.subpasses.iter().zip(&other.subpasses).all(|(a, b)| {
            refs_match(&a.color, &b.color)
                && refs_match(&a.input, &b.input)
                && refs_match(&a.resolve, &b.resolve)
                && self.attachment_signature(a.depth_stencil)
                    == other.attachment_signature(b.depth_stencil)
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassRecord {
    pub layout: Arc<RenderPassLayout>,
    pub in_use: u32,
}

impl Tracked for RenderPassRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub render_pass: u64,
    pub attachments: Vec<u64>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug, Clone)]
pub struct FramebufferRecord {
    pub render_pass: Arc<RenderPassLayout>,
    /// Image views, in attachment order
    pub attachments: Vec<u64>,
    /// Images behind `attachments`
    pub images: Vec<u64>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub in_use: u32,
}

impl Tracked for FramebufferRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

impl DeviceState {
    pub fn validate_create_render_pass(&self, desc: &RenderPassDesc) -> bool {
        let device = self.device();
        let attachment_count = desc.attachments.len() as u32;
        let subpass_count = desc.subpasses.len() as u32;
        let mut problems = Vec::new();

        for (i, subpass) in desc.subpasses.iter().enumerate() {
            for a in subpass.references() {
                if a >= attachment_count {
                    problems.push(format!(
                        "vkCreateRenderPass: subpass {} references attachment {} but only {} exist",
                        i, a, attachment_count
                    ));
                }
            }
        }

        for dep in &desc.dependencies {
            let (src, dst) = (dep.src_subpass, dep.dst_subpass);
            let external = vk::SUBPASS_EXTERNAL;
            if src == external && dst == external {
                problems.push("vkCreateRenderPass: dependency between two external scopes".to_string());
                continue;
            }
            if (src != external && src >= subpass_count) || (dst != external && dst >= subpass_count) {
                problems.push(format!(
                    "vkCreateRenderPass: dependency {} -> {} references a missing subpass",
                    src, dst
                ));
            } else if src != external && dst != external && src > dst {
                problems.push(format!(
                    "vkCreateRenderPass: dependency {} -> {} points backwards",
                    src, dst
                ));
            }
        }

        if problems.is_empty() {
            let layout = RenderPassLayout::new(desc.clone());
            for (reader, subpass) in desc.subpasses.iter().enumerate() {
                let reader = reader as u32;
                for input in subpass.input.iter().flatten() {
                    for writer in 0..reader {
                        let writes = desc.subpasses[writer as usize]
                            .writes()
                            .any(|a| a == *input);
                        if writes && !layout.has_path(writer, reader) {
                            problems.push(format!(
                                "vkCreateRenderPass: subpass {} reads attachment {} written by subpass {} with no dependency between them",
                                reader, input, writer
                            ));
                        }
                    }
                }
            }
        }

        problems.into_iter().fold(false, |skip, msg| {
            skip | self.error(device, DrawStateError::InvalidRenderpass, msg)
        })
    }

    pub fn record_create_render_pass(&self, render_pass: u64, desc: RenderPassDesc) {
        debug!(
            "created VkRenderPass 0x{:x}: {} attachment(s), {} subpass(es)",
            render_pass,
            desc.attachments.len(),
            desc.subpasses.len()
        );
        self.render_passes.register(
            render_pass,
            RenderPassRecord {
                layout: Arc::new(RenderPassLayout::new(desc)),
                in_use: 0,
            },
        );
    }

    pub fn destroy_render_pass(&self, render_pass: u64) -> bool {
        let handle = self.render_passes.handle(render_pass);
        match self.render_passes.destroy(render_pass, self) {
            Ok(_) => {
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyRenderPass"),
        }
    }

    pub fn render_pass_layout(&self, render_pass: u64) -> Option<Arc<RenderPassLayout>> {
        self.render_passes
            .with(render_pass, |r| Arc::clone(&r.layout))
    }

    pub fn validate_create_framebuffer(&self, desc: &FramebufferDesc) -> bool {
        let rp_handle = self.render_passes.handle(desc.render_pass);
        let Some(layout) = self.render_pass_layout(desc.render_pass) else {
            return self.unknown_object(rp_handle, "vkCreateFramebuffer");
        };
        self.check_attachments(&layout, rp_handle, &desc.attachments, "vkCreateFramebuffer")
    }

    /// Match image views against the attachment descriptions of a render pass.
    pub(crate) fn check_attachments(
        &self,
        layout: &RenderPassLayout,
        render_pass: ObjectHandle,
        views: &[u64],
        api: &str,
    ) -> bool {
        let mut skip = false;
        if views.len() != layout.attachments.len() {
            skip |= self.error(
                render_pass,
                DrawStateError::RenderpassIncompatible,
                format!(
                    "{}: {} image view(s) given but {} has {} attachment(s)",
                    api,
                    views.len(),
                    render_pass,
                    layout.attachments.len()
                ),
            );
        }

        for (i, (&view, attachment)) in views.iter().zip(&layout.attachments).enumerate() {
            let view_handle = self.image_views.handle(view);
            let Some((format, samples)) = self.image_views.with(view, |v| (v.format, v.samples))
            else {
                skip |= self.unknown_object(view_handle, api);
                continue;
            };
            if format != attachment.format {
                skip |= self.error(
                    view_handle,
                    DrawStateError::RenderpassIncompatible,
                    format!(
                        "{}: attachment {} is {:?} but {} expects {:?}",
                        api, i, format, render_pass, attachment.format
                    ),
                );
            }
            if samples != attachment.samples {
                skip |= self.error(
                    view_handle,
                    DrawStateError::RenderpassIncompatible,
                    format!(
                        "{}: attachment {} has {:?} samples but {} expects {:?}",
                        api, i, samples, render_pass, attachment.samples
                    ),
                );
            }
        }
        skip
    }

    pub fn record_create_framebuffer(&self, framebuffer: u64, desc: FramebufferDesc) {
        let Some(layout) = self.render_pass_layout(desc.render_pass) else {
            return;
        };
        let images = desc
            .attachments
            .iter()
            .map(|&v| self.image_views.with(v, |v| v.image).unwrap_or(0))
            .collect();
        debug!(
            "created VkFramebuffer 0x{:x}: {}x{}x{}",
            framebuffer, desc.width, desc.height, desc.layers
        );
        self.framebuffers.register(
            framebuffer,
            FramebufferRecord {
                render_pass: layout,
                attachments: desc.attachments,
                images,
                width: desc.width,
                height: desc.height,
                layers: desc.layers,
                in_use: 0,
            },
        );
    }

    pub fn destroy_framebuffer(&self, framebuffer: u64) -> bool {
        let handle = self.framebuffers.handle(framebuffer);
        match self.framebuffers.destroy(framebuffer, self) {
            Ok(_) => {
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyFramebuffer"),
        }
    }
}
