//! Closed taxonomy of validation message codes.
//!
//! Each checker category owns one enum. The numeric value of a variant is the
//! `messageCode` handed to debug-report callbacks, and the category prefix is
//! the `pLayerPrefix`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! validation_codes {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal {
            $($variant:ident = $value:literal => $text:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant = $value,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];
            pub const LAYER_PREFIX: &'static str = $prefix;

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

validation_codes! {
    /// Memory object tracking.
    MemTrackError, "MEM" {
        InvalidObject = 1 => "MEMTRACK_INVALID_OBJECT",
        InvalidMemObj = 2 => "MEMTRACK_INVALID_MEM_OBJ",
        FreedMemRef = 3 => "MEMTRACK_FREED_MEM_REF",
        MemoryLeak = 4 => "MEMTRACK_MEMORY_LEAK",
        ObjectLeak = 5 => "MEMTRACK_OBJECT_LEAK",
        RebindObject = 6 => "MEMTRACK_REBIND_OBJECT",
        ObjectNotBound = 7 => "MEMTRACK_OBJECT_NOT_BOUND",
        InvalidMap = 8 => "MEMTRACK_INVALID_MAP",
        InvalidFenceState = 9 => "MEMTRACK_INVALID_FENCE_STATE",
        InvalidUsageFlag = 10 => "MEMTRACK_INVALID_USAGE_FLAG",
        InvalidAliasing = 11 => "MEMTRACK_INVALID_ALIASING",
        InvalidMemRegion = 12 => "MEMTRACK_INVALID_MEM_REGION",
    }
}

validation_codes! {
    /// Draw-time and object-lifetime state checks.
    DrawStateError, "DS" {
        InvalidSet = 1 => "DRAWSTATE_INVALID_SET",
        InvalidPipeline = 2 => "DRAWSTATE_INVALID_PIPELINE",
        InvalidPipelineCreateState = 3 => "DRAWSTATE_INVALID_PIPELINE_CREATE_STATE",
        InvalidCommandBuffer = 4 => "DRAWSTATE_INVALID_COMMAND_BUFFER",
        NoPipelineBound = 5 => "DRAWSTATE_NO_PIPELINE_BOUND",
        ViewportNotBound = 6 => "DRAWSTATE_VIEWPORT_NOT_BOUND",
        ScissorNotBound = 7 => "DRAWSTATE_SCISSOR_NOT_BOUND",
        LineWidthNotBound = 8 => "DRAWSTATE_LINE_WIDTH_NOT_BOUND",
        DepthBiasNotBound = 9 => "DRAWSTATE_DEPTH_BIAS_NOT_BOUND",
        BlendNotBound = 10 => "DRAWSTATE_BLEND_NOT_BOUND",
        DepthBoundsNotBound = 11 => "DRAWSTATE_DEPTH_BOUNDS_NOT_BOUND",
        StencilNotBound = 12 => "DRAWSTATE_STENCIL_NOT_BOUND",
        IndexBufferNotBound = 13 => "DRAWSTATE_INDEX_BUFFER_NOT_BOUND",
        DescriptorSetNotBound = 14 => "DRAWSTATE_DESCRIPTOR_SET_NOT_BOUND",
        DescriptorSetNotUpdated = 15 => "DRAWSTATE_DESCRIPTOR_SET_NOT_UPDATED",
        PipelineLayoutsIncompatible = 16 => "DRAWSTATE_PIPELINE_LAYOUTS_INCOMPATIBLE",
        InvalidDynamicOffsetCount = 17 => "DRAWSTATE_INVALID_DYNAMIC_OFFSET_COUNT",
        DescriptorPoolEmpty = 18 => "DRAWSTATE_DESCRIPTOR_POOL_EMPTY",
        CantFreeFromNonFreePool = 19 => "DRAWSTATE_CANT_FREE_FROM_NON_FREE_POOL",
        InvalidUpdateIndex = 20 => "DRAWSTATE_INVALID_UPDATE_INDEX",
        DescriptorTypeMismatch = 21 => "DRAWSTATE_DESCRIPTOR_TYPE_MISMATCH",
        DescriptorUpdateOutOfBounds = 22 => "DRAWSTATE_DESCRIPTOR_UPDATE_OUT_OF_BOUNDS",
        NoBeginCommandBuffer = 23 => "DRAWSTATE_NO_BEGIN_COMMAND_BUFFER",
        BeginCbInvalidState = 24 => "DRAWSTATE_BEGIN_CB_INVALID_STATE",
        NoEndCommandBuffer = 25 => "DRAWSTATE_NO_END_COMMAND_BUFFER",
        InvalidCommandBufferReset = 26 => "DRAWSTATE_INVALID_COMMAND_BUFFER_RESET",
        ResetCbWhileInFlight = 27 => "DRAWSTATE_RESET_CB_WHILE_IN_FLIGHT",
        CommandBufferSingleSubmitViolation = 28 => "DRAWSTATE_COMMAND_BUFFER_SINGLE_SUBMIT_VIOLATION",
        InvalidCbSimultaneousUse = 29 => "DRAWSTATE_INVALID_CB_SIMULTANEOUS_USE",
        InvalidSecondaryCommandBuffer = 30 => "DRAWSTATE_INVALID_SECONDARY_COMMAND_BUFFER",
        NoActiveRenderpass = 31 => "DRAWSTATE_NO_ACTIVE_RENDERPASS",
        InvalidRenderpassCmd = 32 => "DRAWSTATE_INVALID_RENDERPASS_CMD",
        InvalidRenderpass = 33 => "DRAWSTATE_INVALID_RENDERPASS",
        RenderpassIncompatible = 34 => "DRAWSTATE_RENDERPASS_INCOMPATIBLE",
        InvalidSubpassIndex = 35 => "DRAWSTATE_INVALID_SUBPASS_INDEX",
        InvalidImageLayout = 36 => "DRAWSTATE_INVALID_IMAGE_LAYOUT",
        CopyOutOfBounds = 37 => "DRAWSTATE_COPY_OUT_OF_BOUNDS",
        ObjectInuse = 38 => "DRAWSTATE_OBJECT_INUSE",
        QueueForwardProgress = 39 => "DRAWSTATE_QUEUE_FORWARD_PROGRESS",
        InvalidEvent = 40 => "DRAWSTATE_INVALID_EVENT",
        InvalidQueueFamily = 41 => "DRAWSTATE_INVALID_QUEUE_FAMILY",
        DeviceLost = 42 => "DRAWSTATE_DEVICE_LOST",
    }
}

validation_codes! {
    /// SPIR-V module and shader stage interface checks.
    ShaderCheckerError, "SC" {
        NonSpirvShader = 1 => "SHADER_CHECKER_NON_SPIRV_SHADER",
        InconsistentSpirv = 2 => "SHADER_CHECKER_INCONSISTENT_SPIRV",
        MissingEntrypoint = 3 => "SHADER_CHECKER_MISSING_ENTRYPOINT",
    }
}

validation_codes! {
    /// Externally synchronized objects used from more than one thread.
    ThreadingCheckerError, "Threading" {
        MultipleThreads = 1 => "THREADING_CHECKER_MULTIPLE_THREADS",
    }
}

/// A validation message code from any checker category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    MemTrack(MemTrackError),
    DrawState(DrawStateError),
    ShaderChecker(ShaderCheckerError),
    Threading(ThreadingCheckerError),
}

impl ValidationCode {
    pub fn name(self) -> &'static str {
        match self {
            Self::MemTrack(c) => c.name(),
            Self::DrawState(c) => c.name(),
            Self::ShaderChecker(c) => c.name(),
            Self::Threading(c) => c.name(),
        }
    }

    pub fn layer_prefix(self) -> &'static str {
        match self {
            Self::MemTrack(_) => MemTrackError::LAYER_PREFIX,
            Self::DrawState(_) => DrawStateError::LAYER_PREFIX,
            Self::ShaderChecker(_) => ShaderCheckerError::LAYER_PREFIX,
            Self::Threading(_) => ThreadingCheckerError::LAYER_PREFIX,
        }
    }

    /// Value passed as `messageCode`; unique within a layer prefix.
    pub fn message_code(self) -> i32 {
        match self {
            Self::MemTrack(c) => c as i32,
            Self::DrawState(c) => c as i32,
            Self::ShaderChecker(c) => c as i32,
            Self::Threading(c) => c as i32,
        }
    }

    /// Every code of every category, in declaration order.
    pub fn all() -> impl Iterator<Item = ValidationCode> {
        MemTrackError::ALL
            .iter()
            .map(|c| Self::MemTrack(*c))
            .chain(DrawStateError::ALL.iter().map(|c| Self::DrawState(*c)))
            .chain(ShaderCheckerError::ALL.iter().map(|c| Self::ShaderChecker(*c)))
            .chain(ThreadingCheckerError::ALL.iter().map(|c| Self::Threading(*c)))
    }

    /// Look a code up by its canonical name, e.g. `DRAWSTATE_VIEWPORT_NOT_BOUND`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|c| c.name() == name)
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<MemTrackError> for ValidationCode {
    fn from(c: MemTrackError) -> Self {
        Self::MemTrack(c)
    }
}

impl From<DrawStateError> for ValidationCode {
    fn from(c: DrawStateError) -> Self {
        Self::DrawState(c)
    }
}

impl From<ShaderCheckerError> for ValidationCode {
    fn from(c: ShaderCheckerError) -> Self {
        Self::ShaderChecker(c)
    }
}

impl From<ThreadingCheckerError> for ValidationCode {
    fn from(c: ThreadingCheckerError) -> Self {
        Self::Threading(c)
    }
}
