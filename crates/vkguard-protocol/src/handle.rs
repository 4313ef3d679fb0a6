use std::fmt;

use ash::vk;
use serde::{Deserialize, Serialize};

/// Identifies any tracked Vulkan object by raw handle value and object type.
/// Two objects of different types may share a raw value (non-dispatchable
/// handles are only unique per type), so both fields take part in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    /// Raw handle value as returned by the driver
    pub raw: u64,
    /// Type tag, reported to debug callbacks as the object type
    pub object_type: ObjectType,
}

impl ObjectHandle {
    pub fn new(raw: u64, object_type: ObjectType) -> Self {
        Self { raw, object_type }
    }

    /// Build a handle from any typed `ash` handle.
    pub fn of<H: vk::Handle>(handle: H) -> Self {
        Self {
            raw: handle.as_raw(),
            object_type: ObjectType::from_vk(H::TYPE),
        }
    }

    /// Create a null/invalid handle.
    pub fn null() -> Self {
        Self {
            raw: 0,
            object_type: ObjectType::Unknown,
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 0x{:x}", self.object_type.name(), self.raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Unknown,
    Instance,
    PhysicalDevice,
    Device,
    Queue,
    Semaphore,
    CommandBuffer,
    Fence,
    DeviceMemory,
    Buffer,
    Image,
    Event,
    QueryPool,
    BufferView,
    ImageView,
    ShaderModule,
    PipelineCache,
    PipelineLayout,
    RenderPass,
    Pipeline,
    DescriptorSetLayout,
    Sampler,
    DescriptorPool,
    DescriptorSet,
    Framebuffer,
    CommandPool,
    Swapchain,
    DebugReportCallback,
}

impl ObjectType {
    pub fn from_vk(ty: vk::ObjectType) -> Self {
        match ty {
            vk::ObjectType::INSTANCE => Self::Instance,
            vk::ObjectType::PHYSICAL_DEVICE => Self::PhysicalDevice,
            vk::ObjectType::DEVICE => Self::Device,
            vk::ObjectType::QUEUE => Self::Queue,
            vk::ObjectType::SEMAPHORE => Self::Semaphore,
            vk::ObjectType::COMMAND_BUFFER => Self::CommandBuffer,
            vk::ObjectType::FENCE => Self::Fence,
            vk::ObjectType::DEVICE_MEMORY => Self::DeviceMemory,
            vk::ObjectType::BUFFER => Self::Buffer,
            vk::ObjectType::IMAGE => Self::Image,
            vk::ObjectType::EVENT => Self::Event,
            vk::ObjectType::QUERY_POOL => Self::QueryPool,
            vk::ObjectType::BUFFER_VIEW => Self::BufferView,
            vk::ObjectType::IMAGE_VIEW => Self::ImageView,
            vk::ObjectType::SHADER_MODULE => Self::ShaderModule,
            vk::ObjectType::PIPELINE_CACHE => Self::PipelineCache,
            vk::ObjectType::PIPELINE_LAYOUT => Self::PipelineLayout,
            vk::ObjectType::RENDER_PASS => Self::RenderPass,
            vk::ObjectType::PIPELINE => Self::Pipeline,
            vk::ObjectType::DESCRIPTOR_SET_LAYOUT => Self::DescriptorSetLayout,
            vk::ObjectType::SAMPLER => Self::Sampler,
            vk::ObjectType::DESCRIPTOR_POOL => Self::DescriptorPool,
            vk::ObjectType::DESCRIPTOR_SET => Self::DescriptorSet,
            vk::ObjectType::FRAMEBUFFER => Self::Framebuffer,
            vk::ObjectType::COMMAND_POOL => Self::CommandPool,
            vk::ObjectType::SWAPCHAIN_KHR => Self::Swapchain,
            vk::ObjectType::DEBUG_REPORT_CALLBACK_EXT => Self::DebugReportCallback,
            _ => Self::Unknown,
        }
    }

    /// Object type tag passed to debug-report callbacks.
    pub fn debug_report_type(self) -> vk::DebugReportObjectTypeEXT {
        use vk::DebugReportObjectTypeEXT as T;
        match self {
            Self::Unknown => T::UNKNOWN,
            Self::Instance => T::INSTANCE,
            Self::PhysicalDevice => T::PHYSICAL_DEVICE,
            Self::Device => T::DEVICE,
            Self::Queue => T::QUEUE,
            Self::Semaphore => T::SEMAPHORE,
            Self::CommandBuffer => T::COMMAND_BUFFER,
            Self::Fence => T::FENCE,
            Self::DeviceMemory => T::DEVICE_MEMORY,
            Self::Buffer => T::BUFFER,
            Self::Image => T::IMAGE,
            Self::Event => T::EVENT,
            Self::QueryPool => T::QUERY_POOL,
            Self::BufferView => T::BUFFER_VIEW,
            Self::ImageView => T::IMAGE_VIEW,
            Self::ShaderModule => T::SHADER_MODULE,
            Self::PipelineCache => T::PIPELINE_CACHE,
            Self::PipelineLayout => T::PIPELINE_LAYOUT,
            Self::RenderPass => T::RENDER_PASS,
            Self::Pipeline => T::PIPELINE,
            Self::DescriptorSetLayout => T::DESCRIPTOR_SET_LAYOUT,
            Self::Sampler => T::SAMPLER,
            Self::DescriptorPool => T::DESCRIPTOR_POOL,
            Self::DescriptorSet => T::DESCRIPTOR_SET,
            Self::Framebuffer => T::FRAMEBUFFER,
            Self::CommandPool => T::COMMAND_POOL,
            Self::Swapchain => T::SWAPCHAIN_KHR,
            Self::DebugReportCallback => T::DEBUG_REPORT_CALLBACK_EXT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "VkUnknownObject",
            Self::Instance => "VkInstance",
            Self::PhysicalDevice => "VkPhysicalDevice",
            Self::Device => "VkDevice",
            Self::Queue => "VkQueue",
            Self::Semaphore => "VkSemaphore",
            Self::CommandBuffer => "VkCommandBuffer",
            Self::Fence => "VkFence",
            Self::DeviceMemory => "VkDeviceMemory",
            Self::Buffer => "VkBuffer",
            Self::Image => "VkImage",
            Self::Event => "VkEvent",
            Self::QueryPool => "VkQueryPool",
            Self::BufferView => "VkBufferView",
            Self::ImageView => "VkImageView",
            Self::ShaderModule => "VkShaderModule",
            Self::PipelineCache => "VkPipelineCache",
            Self::PipelineLayout => "VkPipelineLayout",
            Self::RenderPass => "VkRenderPass",
            Self::Pipeline => "VkPipeline",
            Self::DescriptorSetLayout => "VkDescriptorSetLayout",
            Self::Sampler => "VkSampler",
            Self::DescriptorPool => "VkDescriptorPool",
            Self::DescriptorSet => "VkDescriptorSet",
            Self::Framebuffer => "VkFramebuffer",
            Self::CommandPool => "VkCommandPool",
            Self::Swapchain => "VkSwapchainKHR",
            Self::DebugReportCallback => "VkDebugReportCallbackEXT",
        }
    }
}
