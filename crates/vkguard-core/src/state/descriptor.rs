//! Descriptor set layouts, pools, sets and updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk;
use tracing::debug;
use vkguard_protocol::{DrawStateError, ObjectHandle, ObjectType};

use super::DeviceState;
use crate::registry::Tracked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// A descriptor set layout. Shared by the sets and pipeline layouts built
/// from it, which outlive the layout object itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLayoutRecord {
    /// Sorted by binding number
    pub bindings: Vec<LayoutBinding>,
}

impl SetLayoutRecord {
    pub fn new(mut bindings: Vec<LayoutBinding>) -> Self {
        bindings.sort_by_key(|b| b.binding);
        Self { bindings }
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    /// Index of the first slot of `binding` in a set's flat slot array.
    pub fn slot_offset(&self, binding: u32) -> Option<usize> {
        let mut offset = 0usize;
        for b in &self.bindings {
            if b.binding == binding {
                return Some(offset);
            }
            offset += b.count as usize;
        }
        None
    }

    pub fn descriptor_count(&self) -> usize {
        self.bindings.iter().map(|b| b.count as usize).sum()
    }

    pub fn dynamic_count(&self) -> u32 {
        self.bindings
            .iter()
            .filter(|b| {
                matches!(
                    b.descriptor_type,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
                )
            })
            .map(|b| b.count)
            .sum()
    }

    /// Layouts are compatible when they declare identical bindings.
    pub fn compatible_with(&self, other: &SetLayoutRecord) -> bool {
        self.bindings == other.bindings
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorPoolRecord {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub available_sets: u32,
    pub max_descriptors: HashMap<vk::DescriptorType, u32>,
    pub available_descriptors: HashMap<vk::DescriptorType, u32>,
    pub sets: HashSet<u64>,
}

impl DescriptorPoolRecord {
    pub fn new(
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Self {
        let mut max_descriptors = HashMap::new();
        for size in sizes {
            *max_descriptors.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        Self {
            flags,
            max_sets,
            available_sets: max_sets,
            available_descriptors: max_descriptors.clone(),
            max_descriptors,
            sets: HashSet::new(),
        }
    }

    fn release(&mut self, layout: &SetLayoutRecord) {
        self.available_sets = (self.available_sets + 1).min(self.max_sets);
        for b in &layout.bindings {
            let max = self.max_descriptors.get(&b.descriptor_type).copied().unwrap_or(0);
            let avail = self.available_descriptors.entry(b.descriptor_type).or_insert(0);
            *avail = (*avail + b.count).min(max);
        }
    }
}

/// One array element of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSlot {
    pub descriptor_type: vk::DescriptorType,
    pub resource: Option<ObjectHandle>,
}

#[derive(Debug, Clone)]
pub struct DescriptorSetRecord {
    pub pool: u64,
    pub layout: Arc<SetLayoutRecord>,
    /// Flat slot array; binding `b` starts at `layout.slot_offset(b)`
    pub slots: Vec<DescriptorSlot>,
    pub updated: bool,
    pub bound_command_buffers: HashSet<u64>,
    pub in_use: u32,
}

impl DescriptorSetRecord {
    pub fn new(pool: u64, layout: Arc<SetLayoutRecord>) -> Self {
        let slots = layout
            .bindings
            .iter()
            .flat_map(|b| {
                std::iter::repeat(DescriptorSlot {
                    descriptor_type: b.descriptor_type,
                    resource: None,
                })
                .take(b.count as usize)
            })
            .collect();
        Self {
            pool,
            layout,
            slots,
            updated: false,
            bound_command_buffers: HashSet::new(),
            in_use: 0,
        }
    }
}

impl Tracked for DescriptorSetRecord {
    fn ref_count(&self) -> u32 {
        self.in_use
    }
}

/// A `VkWriteDescriptorSet`, with one resource per descriptor written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: u64,
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resources: Vec<ObjectHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCopy {
    pub src_set: u64,
    pub src_binding: u32,
    pub src_array_element: u32,
    pub dst_set: u64,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub count: u32,
}

impl DeviceState {
    pub fn record_create_set_layout(&self, layout: u64, bindings: Vec<LayoutBinding>) {
        debug!(
            "created VkDescriptorSetLayout 0x{:x} with {} binding(s)",
            layout,
            bindings.len()
        );
        self.set_layouts
            .register(layout, Arc::new(SetLayoutRecord::new(bindings)));
    }

    pub fn destroy_set_layout(&self, layout: u64) -> bool {
        if self.set_layouts.remove(layout).is_none() {
            return self.unknown_object(self.set_layouts.handle(layout), "vkDestroyDescriptorSetLayout");
        }
        false
    }

    pub fn record_create_descriptor_pool(
        &self,
        pool: u64,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) {
        debug!("created VkDescriptorPool 0x{:x}: {} sets", pool, max_sets);
        self.descriptor_pools
            .register(pool, DescriptorPoolRecord::new(flags, max_sets, sizes));
    }

    /// Destroy a pool and implicitly every set allocated from it.
    pub fn destroy_descriptor_pool(&self, pool: u64) -> bool {
        let handle = self.descriptor_pools.handle(pool);
        let Some(sets) = self.descriptor_pools.with(pool, |p| p.sets.clone()) else {
            return self.unknown_object(handle, "vkDestroyDescriptorPool");
        };
        if self.report_sets_in_use(&sets, "vkDestroyDescriptorPool") {
            return true;
        }
        self.descriptor_pools.remove(pool);
        debug!("destroyed {}", handle);
        self.drop_sets(sets);
        false
    }

    pub fn validate_reset_descriptor_pool(&self, pool: u64) -> bool {
        match self.descriptor_pools.with(pool, |p| p.sets.clone()) {
            Some(sets) => self.report_sets_in_use(&sets, "vkResetDescriptorPool"),
            None => self.unknown_object(self.descriptor_pools.handle(pool), "vkResetDescriptorPool"),
        }
    }

    pub fn record_reset_descriptor_pool(&self, pool: u64) {
        let sets = self.descriptor_pools.with_mut(pool, |p| {
            p.available_sets = p.max_sets;
            p.available_descriptors = p.max_descriptors.clone();
            std::mem::take(&mut p.sets)
        });
        if let Some(sets) = sets {
            self.drop_sets(sets);
        }
    }

    fn report_sets_in_use(&self, sets: &HashSet<u64>, api: &str) -> bool {
        let mut skip = false;
        for &set in sets {
            let in_use = self.descriptor_sets.with(set, |s| s.in_use).unwrap_or(0);
            if in_use > 0 {
                let handle = self.descriptor_sets.handle(set);
                skip |= self.error(
                    handle,
                    DrawStateError::ObjectInuse,
                    format!("{}: {} is in use by a command buffer in flight", api, handle),
                );
            }
        }
        skip
    }

    fn drop_sets(&self, sets: impl IntoIterator<Item = u64>) {
        for set in sets {
            if self.descriptor_sets.remove(set).is_some() {
                self.invalidate_command_buffers(self.descriptor_sets.handle(set));
            }
        }
    }

    pub fn validate_allocate_descriptor_sets(&self, pool: u64, layouts: &[u64]) -> bool {
        let pool_handle = self.descriptor_pools.handle(pool);
        let mut skip = false;

        let mut needed_sets = 0u32;
        let mut needed: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for &layout in layouts {
            match self.set_layouts.with(layout, Arc::clone) {
                Some(l) => {
                    needed_sets += 1;
                    for b in &l.bindings {
                        *needed.entry(b.descriptor_type).or_insert(0) += b.count;
                    }
                }
                None => {
                    skip |= self.unknown_object(
                        self.set_layouts.handle(layout),
                        "vkAllocateDescriptorSets",
                    )
                }
            }
        }

        let Some(p) = self.descriptor_pools.lookup(pool) else {
            return skip | self.unknown_object(pool_handle, "vkAllocateDescriptorSets");
        };
        let mut problems = Vec::new();
        if needed_sets > p.available_sets {
            problems.push(format!(
                "vkAllocateDescriptorSets: {} has {} set(s) left, {} requested",
                pool_handle, p.available_sets, needed_sets
            ));
        }
        for (ty, count) in &needed {
            let available = p.available_descriptors.get(ty).copied().unwrap_or(0);
            if *count > available {
                problems.push(format!(
                    "vkAllocateDescriptorSets: {} has {} {:?} descriptor(s) left, {} requested",
                    pool_handle, available, ty, count
                ));
            }
        }
        drop(p);

        problems.into_iter().fold(skip, |skip, msg| {
            skip | self.error(pool_handle, DrawStateError::DescriptorPoolEmpty, msg)
        })
    }

    pub fn record_allocate_descriptor_sets(&self, pool: u64, layouts: &[u64], sets: &[u64]) {
        for (&layout, &set) in layouts.iter().zip(sets) {
            let Some(layout) = self.set_layouts.with(layout, Arc::clone) else {
                continue;
            };
            self.descriptor_pools.with_mut(pool, |p| {
                p.available_sets = p.available_sets.saturating_sub(1);
                for b in &layout.bindings {
                    let avail = p.available_descriptors.entry(b.descriptor_type).or_insert(0);
                    *avail = avail.saturating_sub(b.count);
                }
                p.sets.insert(set);
            });
            self.descriptor_sets
                .register(set, DescriptorSetRecord::new(pool, layout));
        }
        debug!("allocated {} set(s) from VkDescriptorPool 0x{:x}", sets.len(), pool);
    }

    pub fn validate_free_descriptor_sets(&self, pool: u64, sets: &[u64]) -> bool {
        let pool_handle = self.descriptor_pools.handle(pool);
        let Some(flags) = self.descriptor_pools.with(pool, |p| p.flags) else {
            return self.unknown_object(pool_handle, "vkFreeDescriptorSets");
        };
        let mut skip = false;
        if !flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            skip |= self.error(
                pool_handle,
                DrawStateError::CantFreeFromNonFreePool,
                format!(
                    "vkFreeDescriptorSets: {} was not created with FREE_DESCRIPTOR_SET",
                    pool_handle
                ),
            );
        }
        let live: HashSet<u64> = sets
            .iter()
            .copied()
            .filter(|&s| s != 0 && self.descriptor_sets.contains(s))
            .collect();
        skip | self.report_sets_in_use(&live, "vkFreeDescriptorSets")
    }

    pub fn record_free_descriptor_sets(&self, pool: u64, sets: &[u64]) {
        for &set in sets {
            let Some(record) = self.descriptor_sets.remove(set) else {
                continue;
            };
            self.descriptor_pools.with_mut(pool, |p| {
                p.release(&record.layout);
                p.sets.remove(&set);
            });
            self.invalidate_command_buffers(self.descriptor_sets.handle(set));
        }
    }

    /// Validate and apply `vkUpdateDescriptorSets`.
    pub fn update_descriptor_sets(&self, writes: &[DescriptorWrite], copies: &[DescriptorCopy]) -> bool {
        let mut skip = false;
        for write in writes {
            skip |= self.validate_write(write);
        }
        for copy in copies {
            skip |= self.validate_copy(copy);
        }
        if skip {
            return true;
        }

        let mut touched = HashSet::new();
        for write in writes {
            self.descriptor_sets.with_mut(write.set, |s| {
                let start = s.layout.slot_offset(write.binding).unwrap_or(0)
                    .saturating_add(write.array_element as usize);
                for (slot, resource) in s.slots.iter_mut().skip(start).zip(&write.resources) {
                    slot.resource = Some(*resource);
                }
                s.updated = true;
            });
            touched.insert(write.set);
        }
        for copy in copies {
            let src = self.descriptor_sets.with(copy.src_set, |s| {
                let start = s.layout.slot_offset(copy.src_binding).unwrap_or(0)
                    .saturating_add(copy.src_array_element as usize);
                s.slots
                    .iter()
                    .skip(start)
                    .take(copy.count as usize)
                    .copied()
                    .collect::<Vec<_>>()
            });
            let Some(src) = src else { continue };
            self.descriptor_sets.with_mut(copy.dst_set, |s| {
                let start = s.layout.slot_offset(copy.dst_binding).unwrap_or(0)
                    .saturating_add(copy.dst_array_element as usize);
                for (slot, from) in s.slots.iter_mut().skip(start).zip(&src) {
                    slot.resource = from.resource;
                }
                s.updated = true;
            });
            touched.insert(copy.dst_set);
        }

        for set in touched {
            let bound = self
                .descriptor_sets
                .with_mut(set, |s| std::mem::take(&mut s.bound_command_buffers))
                .unwrap_or_default();
            if !bound.is_empty() {
                self.invalidate_command_buffers(self.descriptor_sets.handle(set));
            }
        }
        false
    }

    fn validate_write(&self, write: &DescriptorWrite) -> bool {
        let handle = self.descriptor_sets.handle(write.set);
        let Some(layout) = self.descriptor_sets.with(write.set, |s| Arc::clone(&s.layout)) else {
            return self.error(
                handle,
                DrawStateError::InvalidSet,
                format!("vkUpdateDescriptorSets: write to unknown {}", handle),
            );
        };
        let mut skip = self.validate_range(
            handle,
            &layout,
            write.binding,
            write.array_element,
            write.resources.len() as u32,
            Some(write.descriptor_type),
        );

        for resource in &write.resources {
            let known = match resource.object_type {
                ObjectType::Buffer => self.buffers.contains(resource.raw),
                ObjectType::ImageView => self.image_views.contains(resource.raw),
                _ => true,
            };
            if !known {
                skip |= self.unknown_object(*resource, "vkUpdateDescriptorSets");
            }
        }
        skip
    }

    fn validate_copy(&self, copy: &DescriptorCopy) -> bool {
        let mut skip = false;
        let mut types = [None, None];
        for (i, (set, binding, element)) in [
            (copy.src_set, copy.src_binding, copy.src_array_element),
            (copy.dst_set, copy.dst_binding, copy.dst_array_element),
        ]
        .into_iter()
        .enumerate()
        {
            let handle = self.descriptor_sets.handle(set);
            let Some(layout) = self.descriptor_sets.with(set, |s| Arc::clone(&s.layout)) else {
                skip |= self.error(
                    handle,
                    DrawStateError::InvalidSet,
                    format!("vkUpdateDescriptorSets: copy with unknown {}", handle),
                );
                continue;
            };
            skip |= self.validate_range(handle, &layout, binding, element, copy.count, None);
            types[i] = layout.binding(binding).map(|b| b.descriptor_type);
        }

        if let [Some(src), Some(dst)] = types {
            if src != dst {
                let handle = self.descriptor_sets.handle(copy.dst_set);
                skip |= self.error(
                    handle,
                    DrawStateError::DescriptorTypeMismatch,
                    format!(
                        "vkUpdateDescriptorSets: copy from {:?} binding into {:?} binding of {}",
                        src, dst, handle
                    ),
                );
            }
        }
        skip
    }

    /// Check that `count` descriptors starting at `binding[element]` fit in
    /// the layout. Updates may spill into consecutive bindings of the same
    /// type, so the bound is the end of the set's flat slot array.
    fn validate_range(
        &self,
        set: ObjectHandle,
        layout: &SetLayoutRecord,
        binding: u32,
        element: u32,
        count: u32,
        descriptor_type: Option<vk::DescriptorType>,
    ) -> bool {
        let (Some(b), Some(offset)) = (layout.binding(binding), layout.slot_offset(binding)) else {
            return self.error(
                set,
                DrawStateError::InvalidUpdateIndex,
                format!("vkUpdateDescriptorSets: {} has no binding {}", set, binding),
            );
        };

        let mut skip = false;
        if let Some(ty) = descriptor_type {
            if ty != b.descriptor_type {
                skip |= self.error(
                    set,
                    DrawStateError::DescriptorTypeMismatch,
                    format!(
                        "vkUpdateDescriptorSets: writing {:?} to binding {} of {} which is {:?}",
                        ty, binding, set, b.descriptor_type
                    ),
                );
            }
        }

        let end = offset as u64 + u64::from(element) + u64::from(count);
        if element >= b.count || end > layout.descriptor_count() as u64 {
            skip |= self.error(
                set,
                DrawStateError::DescriptorUpdateOutOfBounds,
                format!(
                    "vkUpdateDescriptorSets: elements [{}, {}) of binding {} exceed {} ({} descriptor(s))",
                    element,
                    u64::from(element) + u64::from(count),
                    binding,
                    set,
                    b.count
                ),
            );
        }
        skip
    }

    /// Whether a descriptor set has seen any update since allocation.
    pub fn descriptor_set_updated(&self, set: u64) -> Option<bool> {
        self.descriptor_sets.with(set, |s| s.updated)
    }
}
