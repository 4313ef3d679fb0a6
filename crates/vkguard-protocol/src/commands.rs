use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a recorded command may appear relative to a render pass instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassScope {
    Inside,
    Outside,
    Both,
}

/// Opcode of a command recorded into a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmdType {
    BindPipeline,
    SetViewport,
    SetScissor,
    SetLineWidth,
    SetDepthBias,
    SetBlendConstants,
    SetDepthBounds,
    SetStencilCompareMask,
    SetStencilWriteMask,
    SetStencilReference,
    BindDescriptorSets,
    BindIndexBuffer,
    BindVertexBuffers,
    Draw,
    DrawIndexed,
    DrawIndirect,
    DrawIndexedIndirect,
    Dispatch,
    DispatchIndirect,
    CopyBuffer,
    CopyImage,
    BlitImage,
    CopyBufferToImage,
    CopyImageToBuffer,
    UpdateBuffer,
    FillBuffer,
    ClearColorImage,
    SetEvent,
    ResetEvent,
    WaitEvents,
    PipelineBarrier,
    BeginRenderPass,
    NextSubpass,
    EndRenderPass,
    ExecuteCommands,
}

impl CmdType {
    /// Entry point name, used in report messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::BindPipeline => "vkCmdBindPipeline",
            Self::SetViewport => "vkCmdSetViewport",
            Self::SetScissor => "vkCmdSetScissor",
            Self::SetLineWidth => "vkCmdSetLineWidth",
            Self::SetDepthBias => "vkCmdSetDepthBias",
            Self::SetBlendConstants => "vkCmdSetBlendConstants",
            Self::SetDepthBounds => "vkCmdSetDepthBounds",
            Self::SetStencilCompareMask => "vkCmdSetStencilCompareMask",
            Self::SetStencilWriteMask => "vkCmdSetStencilWriteMask",
            Self::SetStencilReference => "vkCmdSetStencilReference",
            Self::BindDescriptorSets => "vkCmdBindDescriptorSets",
            Self::BindIndexBuffer => "vkCmdBindIndexBuffer",
            Self::BindVertexBuffers => "vkCmdBindVertexBuffers",
            Self::Draw => "vkCmdDraw",
            Self::DrawIndexed => "vkCmdDrawIndexed",
            Self::DrawIndirect => "vkCmdDrawIndirect",
            Self::DrawIndexedIndirect => "vkCmdDrawIndexedIndirect",
            Self::Dispatch => "vkCmdDispatch",
            Self::DispatchIndirect => "vkCmdDispatchIndirect",
            Self::CopyBuffer => "vkCmdCopyBuffer",
            Self::CopyImage => "vkCmdCopyImage",
            Self::BlitImage => "vkCmdBlitImage",
            Self::CopyBufferToImage => "vkCmdCopyBufferToImage",
            Self::CopyImageToBuffer => "vkCmdCopyImageToBuffer",
            Self::UpdateBuffer => "vkCmdUpdateBuffer",
            Self::FillBuffer => "vkCmdFillBuffer",
            Self::ClearColorImage => "vkCmdClearColorImage",
            Self::SetEvent => "vkCmdSetEvent",
            Self::ResetEvent => "vkCmdResetEvent",
            Self::WaitEvents => "vkCmdWaitEvents",
            Self::PipelineBarrier => "vkCmdPipelineBarrier",
            Self::BeginRenderPass => "vkCmdBeginRenderPass",
            Self::NextSubpass => "vkCmdNextSubpass",
            Self::EndRenderPass => "vkCmdEndRenderPass",
            Self::ExecuteCommands => "vkCmdExecuteCommands",
        }
    }

    pub fn render_pass_scope(self) -> RenderPassScope {
        match self {
            Self::Draw
            | Self::DrawIndexed
            | Self::DrawIndirect
            | Self::DrawIndexedIndirect
            | Self::NextSubpass
            | Self::EndRenderPass => RenderPassScope::Inside,
            Self::Dispatch
            | Self::DispatchIndirect
            | Self::CopyBuffer
            | Self::CopyImage
            | Self::BlitImage
            | Self::CopyBufferToImage
            | Self::CopyImageToBuffer
            | Self::UpdateBuffer
            | Self::FillBuffer
            | Self::ClearColorImage
            | Self::SetEvent
            | Self::ResetEvent
            | Self::BeginRenderPass => RenderPassScope::Outside,
            _ => RenderPassScope::Both,
        }
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            Self::Draw | Self::DrawIndexed | Self::DrawIndirect | Self::DrawIndexedIndirect
        )
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, Self::DrawIndexed | Self::DrawIndexedIndirect)
    }
}

impl fmt::Display for CmdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a command buffer's command log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdNode {
    pub cmd_type: CmdType,
    /// Position in the log since the last begin/reset, starting at 0
    pub sequence: u64,
}
