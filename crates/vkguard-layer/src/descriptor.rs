//! Descriptor set layout, pool, set, and update entry points.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use vkguard_core::state::descriptor::{DescriptorCopy, DescriptorWrite, LayoutBinding};
use vkguard_protocol::ObjectHandle;

use crate::dispatch::DeviceDispatch;
use crate::{raw_handles, raw_slice, ValidationLayer, SKIPPED};

/// The objects a `VkWriteDescriptorSet` stores, one per descriptor.
unsafe fn write_resources(write: &vk::WriteDescriptorSet<'_>) -> Vec<ObjectHandle> {
    let count = write.descriptor_count;
    unsafe {
        match write.descriptor_type {
            vk::DescriptorType::SAMPLER => raw_slice(write.p_image_info, count)
                .iter()
                .map(|i| ObjectHandle::of(i.sampler))
                .collect(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::INPUT_ATTACHMENT => raw_slice(write.p_image_info, count)
                .iter()
                .map(|i| ObjectHandle::of(i.image_view))
                .collect(),
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER => {
                raw_slice(write.p_texel_buffer_view, count)
                    .iter()
                    .map(|v| ObjectHandle::of(*v))
                    .collect()
            }
            _ => raw_slice(write.p_buffer_info, count)
                .iter()
                .map(|b| ObjectHandle::of(b.buffer))
                .collect(),
        }
    }
}

impl<D: DeviceDispatch> ValidationLayer<D> {
    // ── Set layouts ─────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkDescriptorSetLayoutCreateInfo`.
    pub unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let bindings = unsafe { raw_slice(info.p_bindings, info.binding_count) }
            .iter()
            .map(|b| LayoutBinding {
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                count: b.descriptor_count,
                stages: b.stage_flags,
            })
            .collect();
        let layout = self.track(unsafe { self.dispatch.create_descriptor_set_layout(info) })?;
        self.state.record_create_set_layout(layout.as_raw(), bindings);
        Ok(layout)
    }

    /// # Safety
    /// `layout` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        if layout == vk::DescriptorSetLayout::null() {
            return;
        }
        if self.state.destroy_set_layout(layout.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_descriptor_set_layout(layout) }
    }

    // ── Pools ───────────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkDescriptorPoolCreateInfo`.
    pub unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        let sizes = unsafe { raw_slice(info.p_pool_sizes, info.pool_size_count) };
        let pool = self.track(unsafe { self.dispatch.create_descriptor_pool(info) })?;
        self.state
            .record_create_descriptor_pool(pool.as_raw(), info.flags, info.max_sets, sizes);
        Ok(pool)
    }

    /// # Safety
    /// `pool` must be null or have been created from the wrapped device.
    pub unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        if pool == vk::DescriptorPool::null() {
            return;
        }
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self.state.destroy_descriptor_pool(pool.as_raw()) {
            return;
        }
        unsafe { self.dispatch.destroy_descriptor_pool(pool) }
    }

    /// # Safety
    /// `pool` must have been created from the wrapped device.
    pub unsafe fn reset_descriptor_pool(
        &self,
        pool: vk::DescriptorPool,
        flags: vk::DescriptorPoolResetFlags,
    ) -> VkResult<()> {
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self.state.validate_reset_descriptor_pool(pool.as_raw()) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.reset_descriptor_pool(pool, flags) })?;
        self.state.record_reset_descriptor_pool(pool.as_raw());
        Ok(())
    }

    // ── Sets ────────────────────────────────────────────────────

    /// # Safety
    /// `info` must be a valid `VkDescriptorSetAllocateInfo`.
    pub unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let pool = info.descriptor_pool.as_raw();
        let layouts = raw_handles(unsafe { raw_slice(info.p_set_layouts, info.descriptor_set_count) });
        let _claim = self.state.claim(ObjectHandle::of(info.descriptor_pool));
        if self.state.validate_allocate_descriptor_sets(pool, &layouts) {
            return Err(SKIPPED);
        }
        let sets = self.track(unsafe { self.dispatch.allocate_descriptor_sets(info) })?;
        self.state
            .record_allocate_descriptor_sets(pool, &layouts, &raw_handles(&sets));
        Ok(sets)
    }

    /// # Safety
    /// `pool` and every set must belong to the wrapped device.
    pub unsafe fn free_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> VkResult<()> {
        let raw = raw_handles(sets);
        let _claim = self.state.claim(ObjectHandle::of(pool));
        if self.state.validate_free_descriptor_sets(pool.as_raw(), &raw) {
            return Err(SKIPPED);
        }
        self.track(unsafe { self.dispatch.free_descriptor_sets(pool, sets) })?;
        self.state.record_free_descriptor_sets(pool.as_raw(), &raw);
        Ok(())
    }

    /// # Safety
    /// Every write and copy must be a valid Vulkan structure.
    pub unsafe fn update_descriptor_sets(
        &self,
        writes: &[vk::WriteDescriptorSet<'_>],
        copies: &[vk::CopyDescriptorSet<'_>],
    ) {
        let tracked_writes: Vec<DescriptorWrite> = writes
            .iter()
            .map(|w| DescriptorWrite {
                set: w.dst_set.as_raw(),
                binding: w.dst_binding,
                array_element: w.dst_array_element,
                descriptor_type: w.descriptor_type,
                resources: unsafe { write_resources(w) },
            })
            .collect();
        let tracked_copies: Vec<DescriptorCopy> = copies
            .iter()
            .map(|c| DescriptorCopy {
                src_set: c.src_set.as_raw(),
                src_binding: c.src_binding,
                src_array_element: c.src_array_element,
                dst_set: c.dst_set.as_raw(),
                dst_binding: c.dst_binding,
                dst_array_element: c.dst_array_element,
                count: c.descriptor_count,
            })
            .collect();
        if self
            .state
            .update_descriptor_sets(&tracked_writes, &tracked_copies)
        {
            return;
        }
        unsafe { self.dispatch.update_descriptor_sets(writes, copies) }
    }
}
