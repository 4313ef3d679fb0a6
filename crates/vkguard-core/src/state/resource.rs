//! Buffers, images and image views.

use ash::vk::{self, Handle};
use tracing::debug;
use vkguard_protocol::{MemTrackError, ObjectHandle, ObjectType};

use super::DeviceState;
use crate::error::CoreError;
use crate::registry::Tracked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBinding {
    pub memory: u64,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub binding: Option<MemoryBinding>,
    /// Submitted, unretired command buffers using the buffer
    pub in_use: u32,
}

impl Tracked for BufferRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub binding: Option<MemoryBinding>,
    /// Layout the image is in once all submitted work has executed
    pub layout: vk::ImageLayout,
    pub in_use: u32,
}

impl ImageRecord {
    pub fn from_info(info: &vk::ImageCreateInfo<'_>) -> Self {
        Self {
            image_type: info.image_type,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            tiling: info.tiling,
            usage: info.usage,
            binding: None,
            layout: info.initial_layout,
            in_use: 0,
        }
    }

    pub fn is_linear(&self) -> bool {
        self.tiling == vk::ImageTiling::LINEAR
    }

    /// Conservative footprint used for range checks when binding: one byte
    /// per texel of the base level.
    pub fn memory_size(&self) -> u64 {
        u64::from(self.extent.width)
            * u64::from(self.extent.height.max(1))
            * u64::from(self.extent.depth.max(1))
            * u64::from(self.array_layers.max(1))
    }
}

impl Tracked for ImageRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

#[derive(Debug, Clone)]
pub struct ImageViewRecord {
    pub image: u64,
    pub format: vk::Format,
    /// Sample count of the image, captured at creation
    pub samples: vk::SampleCountFlags,
    pub in_use: u32,
}

impl Tracked for ImageViewRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

impl DeviceState {
    pub fn record_create_buffer(&self, buffer: u64, info: &vk::BufferCreateInfo<'_>) {
        debug!(
            "created VkBuffer 0x{:x}: {} bytes, usage {:?}",
            buffer, info.size, info.usage
        );
        self.buffers.register(
            buffer,
            BufferRecord {
                size: info.size,
                usage: info.usage,
                binding: None,
                in_use: 0,
            },
        );
    }

    pub fn destroy_buffer(&self, buffer: u64) -> bool {
        let handle = self.buffers.handle(buffer);
        match self.buffers.destroy(buffer, self) {
            Ok(record) => {
                self.release_binding(handle, record.binding);
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyBuffer"),
        }
    }

    pub fn record_create_image(&self, image: u64, info: &vk::ImageCreateInfo<'_>) {
        debug!(
            "created VkImage 0x{:x}: {:?} {}x{}x{}",
            image, info.format, info.extent.width, info.extent.height, info.extent.depth
        );
        self.images.register(image, ImageRecord::from_info(info));
    }

    pub fn destroy_image(&self, image: u64) -> bool {
        let handle = self.images.handle(image);
        match self.images.destroy(image, self) {
            Ok(record) => {
                self.release_binding(handle, record.binding);
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyImage"),
        }
    }

    pub fn validate_create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> bool {
        if self.images.contains(info.image.as_raw()) {
            false
        } else {
            self.unknown_object(ObjectHandle::of(info.image), "vkCreateImageView")
        }
    }

    pub fn record_create_image_view(&self, view: u64, info: &vk::ImageViewCreateInfo<'_>) {
        let image = info.image.as_raw();
        let samples = self
            .images
            .with(image, |i| i.samples)
            .unwrap_or(vk::SampleCountFlags::TYPE_1);
        self.image_views.register(
            view,
            ImageViewRecord {
                image,
                format: info.format,
                samples,
                in_use: 0,
            },
        );
    }

    pub fn destroy_image_view(&self, view: u64) -> bool {
        let handle = self.image_views.handle(view);
        match self.image_views.destroy(view, self) {
            Ok(_) => {
                self.invalidate_command_buffers(handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.unknown_object(handle, "vkDestroyImageView"),
        }
    }

    /// Tracked layout of an image after all submitted work.
    pub fn image_layout(&self, image: u64) -> Option<vk::ImageLayout> {
        self.images.with(image, |i| i.layout)
    }

    /// Memory currently bound to a buffer or image.
    pub fn bound_memory(&self, object: ObjectHandle) -> Option<MemoryBinding> {
        match object.object_type {
            ObjectType::Buffer => {
                self.buffers.with(object.raw, |b| b.binding).flatten()
            }
            ObjectType::Image => {
                self.images.with(object.raw, |i| i.binding).flatten()
            }
            _ => None,
        }
    }

    #[track_caller]
    pub(crate) fn report_unbound(&self, object: ObjectHandle, api: &str) -> bool {
        self.error(
            object,
            MemTrackError::ObjectNotBound,
            format!("{}: {} has no memory bound", api, object),
        )
    }
}

