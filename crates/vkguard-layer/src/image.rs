//! Image and image view entry points.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::dispatch::DeviceDispatch;
use crate::{ValidationLayer, SKIPPED};

impl<D: DeviceDispatch> ValidationLayer<D> {
    /// # Safety
    /// `info` must be a valid `VkImageCreateInfo`.
    pub unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let image = self.track(unsafe { self.dispatch.create_image(info) })?;
        self.state.record_create_image(image.as_raw(), info);
        Ok(image)
    }

    /// # Safety
    /// `image` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_image(&self, image: vk::Image) {
        if image == vk::Image::null() {
            return;
        }
        if self.state.destroy_image(image.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_image(image) }
    }

    /// # Safety
    /// `info` must be a valid `VkImageViewCreateInfo`.
    pub unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        if self.state.validate_create_image_view(info) {
            return Err(SKIPPED);
        }
        let view = self.track(unsafe { self.dispatch.create_image_view(info) })?;
        self.state.record_create_image_view(view.as_raw(), info);
        Ok(view)
    }

    /// # Safety
    /// `view` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        if view == vk::ImageView::null() {
            return;
        }
        if self.state.destroy_image_view(view.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_image_view(view) }
    }
}
