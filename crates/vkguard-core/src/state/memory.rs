use std::collections::HashSet;

use ash::vk;
use tracing::debug;
use vkguard_protocol::{MemTrackError, ObjectHandle, ObjectType, ValidationCode};

use super::resource::MemoryBinding;
use super::DeviceState;
use crate::error::CoreError;
use crate::registry::Tracked;

/// Part of an allocation reserved for one buffer or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub object: ObjectHandle,
    pub offset: u64,
    pub size: u64,
    /// Buffers and linear-tiled images are linear
    pub linear: bool,
}

impl MemoryRange {
    fn overlaps(&self, offset: u64, size: u64) -> bool {
        self.offset < offset.saturating_add(size) && offset < self.offset.saturating_add(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub allocation_size: u64,
    pub memory_type_index: u32,
    pub bound_objects: HashSet<ObjectHandle>,
    /// Command buffers whose recorded commands use this memory
    pub bound_command_buffers: HashSet<u64>,
    pub ranges: Vec<MemoryRange>,
    /// Currently mapped `(offset, size)`, size already resolved from `WHOLE_SIZE`
    pub mapped: Option<(u64, u64)>,
}

impl MemoryRecord {
    pub fn new(allocation_size: u64, memory_type_index: u32) -> Self {
        Self {
            allocation_size,
            memory_type_index,
            bound_objects: HashSet::new(),
            bound_command_buffers: HashSet::new(),
            ranges: Vec::new(),
            mapped: None,
        }
    }
}

impl Tracked for MemoryRecord {
    const IN_USE_CODE: ValidationCode = ValidationCode::MemTrack(MemTrackError::FreedMemRef);

    fn ref_count(&self) -> u32 {
        (self.bound_objects.len() + self.bound_command_buffers.len()) as u32
    }
}

/// What a bind call needs to know about the object being bound.
#[derive(Debug, Clone, Copy)]
struct BindTarget {
    size: u64,
    linear: bool,
    bound: Option<MemoryBinding>,
}

impl DeviceState {
    pub fn record_allocate_memory(&self, memory: u64, info: &vk::MemoryAllocateInfo<'_>) {
        debug!(
            "allocated VkDeviceMemory 0x{:x}: {} bytes, type {}",
            memory, info.allocation_size, info.memory_type_index
        );
        self.memories.register(
            memory,
            MemoryRecord::new(info.allocation_size, info.memory_type_index),
        );
    }

    /// Free an allocation. Objects bound to it lose their binding and command
    /// buffers that used it become invalid.
    pub fn free_memory(&self, memory: u64) -> bool {
        let handle = self.memories.handle(memory);
        match self.memories.destroy(memory, self) {
            Ok(record) => {
                for object in &record.bound_objects {
                    self.clear_binding(*object, memory);
                }
                self.invalidate_command_buffers(handle);
                debug!("freed {}", handle);
                false
            }
            Err(CoreError::ObjectInUse { .. }) => true,
            Err(_) => self.error(
                handle,
                MemTrackError::InvalidMemObj,
                format!("vkFreeMemory: unknown {}", handle),
            ),
        }
    }

    /// Forget `object`'s binding if it still points at `memory`.
    fn clear_binding(&self, object: ObjectHandle, memory: u64) {
        let clear = |binding: &mut Option<MemoryBinding>| {
            if binding.is_some_and(|b| b.memory == memory) {
                *binding = None;
            }
        };
        match object.object_type {
            ObjectType::Buffer => self.buffers.with_mut(object.raw, |b| clear(&mut b.binding)),
            ObjectType::Image => self.images.with_mut(object.raw, |i| clear(&mut i.binding)),
            _ => None,
        };
    }

    /// Drop `object` from the memory it is bound to. Called when the object
    /// itself is destroyed.
    pub(crate) fn release_binding(&self, object: ObjectHandle, binding: Option<MemoryBinding>) {
        if let Some(binding) = binding {
            self.memories.with_mut(binding.memory, |m| {
                m.bound_objects.remove(&object);
                m.ranges.retain(|r| r.object != object);
            });
        }
    }

    pub fn validate_bind_buffer_memory(&self, buffer: u64, memory: u64, offset: u64) -> bool {
        let object = self.buffers.handle(buffer);
        let target = self.buffers.with(buffer, |b| BindTarget {
            size: b.size,
            linear: true,
            bound: b.binding,
        });
        self.validate_bind(target, object, memory, offset, "vkBindBufferMemory")
    }

    pub fn validate_bind_image_memory(&self, image: u64, memory: u64, offset: u64) -> bool {
        let object = self.images.handle(image);
        let target = self.images.with(image, |i| BindTarget {
            size: i.memory_size(),
            linear: i.is_linear(),
            bound: i.binding,
        });
        self.validate_bind(target, object, memory, offset, "vkBindImageMemory")
    }

    fn validate_bind(
        &self,
        target: Option<BindTarget>,
        object: ObjectHandle,
        memory: u64,
        offset: u64,
        api: &str,
    ) -> bool {
        let Some(target) = target else {
            return self.unknown_object(object, api);
        };
        let mem_handle = self.memories.handle(memory);
        let mut skip = false;

        if let Some(bound) = target.bound {
            skip |= self.error(
                object,
                MemTrackError::RebindObject,
                format!(
                    "{}: {} is already bound to VkDeviceMemory 0x{:x}",
                    api, object, bound.memory
                ),
            );
        }

        let Some(mem) = self.memories.lookup(memory) else {
            return skip
                | self.error(
                    mem_handle,
                    MemTrackError::InvalidMemObj,
                    format!("{}: unknown {} for {}", api, mem_handle, object),
                );
        };

        if offset.saturating_add(target.size) > mem.allocation_size {
            skip |= self.error(
                object,
                MemTrackError::InvalidMemRegion,
                format!(
                    "{}: {} needs {} bytes at offset {} but {} is only {} bytes",
                    api, object, target.size, offset, mem_handle, mem.allocation_size
                ),
            );
        }

        let aliased: Vec<ObjectHandle> = mem
            .ranges
            .iter()
            .filter(|r| r.linear != target.linear && r.overlaps(offset, target.size))
            .map(|r| r.object)
            .collect();
        drop(mem);
        for other in aliased {
            skip |= self.warn(
                object,
                MemTrackError::InvalidAliasing,
                format!(
                    "{}: {} overlaps {} in {} with different tiling",
                    api, object, other, mem_handle
                ),
            );
        }

        skip
    }

    /// Buffers and images bind once; a reported rebind keeps the first
    /// binding.
    pub fn record_bind_buffer_memory(&self, buffer: u64, memory: u64, offset: u64) {
        let object = self.buffers.handle(buffer);
        let Some(size) = self
            .buffers
            .with_mut(buffer, |b| {
                if b.binding.is_some() {
                    return None;
                }
                b.binding = Some(MemoryBinding { memory, offset });
                Some(b.size)
            })
            .flatten()
        else {
            return;
        };
        self.record_bind(object, memory, offset, size, true);
    }

    pub fn record_bind_image_memory(&self, image: u64, memory: u64, offset: u64) {
        let object = self.images.handle(image);
        let Some((size, linear)) = self
            .images
            .with_mut(image, |i| {
                if i.binding.is_some() {
                    return None;
                }
                i.binding = Some(MemoryBinding { memory, offset });
                Some((i.memory_size(), i.is_linear()))
            })
            .flatten()
        else {
            return;
        };
        self.record_bind(object, memory, offset, size, linear);
    }

    fn record_bind(&self, object: ObjectHandle, memory: u64, offset: u64, size: u64, linear: bool) {
        self.memories.with_mut(memory, |m| {
            m.bound_objects.insert(object);
            m.ranges.push(MemoryRange {
                object,
                offset,
                size,
                linear,
            });
        });
        debug!("bound {} to VkDeviceMemory 0x{:x} at {}", object, memory, offset);
    }

    pub fn validate_map_memory(&self, memory: u64, offset: u64, size: u64) -> bool {
        let handle = self.memories.handle(memory);
        let Some(mem) = self.memories.lookup(memory) else {
            return self.error(
                handle,
                MemTrackError::InvalidMemObj,
                format!("vkMapMemory: unknown {}", handle),
            );
        };

        let mut problems = Vec::new();
        if let Some((mapped_offset, mapped_size)) = mem.mapped {
            problems.push(format!(
                "vkMapMemory: {} is already mapped at offset {} size {}",
                handle, mapped_offset, mapped_size
            ));
        }
        if offset >= mem.allocation_size {
            problems.push(format!(
                "vkMapMemory: offset {} is past the end of {} ({} bytes)",
                offset, handle, mem.allocation_size
            ));
        } else if size != vk::WHOLE_SIZE
            && (size == 0 || offset.saturating_add(size) > mem.allocation_size)
        {
            problems.push(format!(
                "vkMapMemory: range [{}, +{}) is outside {} ({} bytes)",
                offset, size, handle, mem.allocation_size
            ));
        }
        drop(mem);

        problems
            .into_iter()
            .fold(false, |skip, msg| skip | self.error(handle, MemTrackError::InvalidMap, msg))
    }

    pub fn record_map_memory(&self, memory: u64, offset: u64, size: u64) {
        self.memories.with_mut(memory, |m| {
            let size = if size == vk::WHOLE_SIZE {
                m.allocation_size.saturating_sub(offset)
            } else {
                size
            };
            m.mapped = Some((offset, size));
        });
    }

    pub fn unmap_memory(&self, memory: u64) -> bool {
        let handle = self.memories.handle(memory);
        match self.memories.with_mut(memory, |m| m.mapped.take()) {
            None => self.error(
                handle,
                MemTrackError::InvalidMemObj,
                format!("vkUnmapMemory: unknown {}", handle),
            ),
            Some(None) => self.error(
                handle,
                MemTrackError::InvalidMap,
                format!("vkUnmapMemory: {} is not mapped", handle),
            ),
            Some(Some(_)) => false,
        }
    }

    /// Mapped range of an allocation, if any.
    pub fn mapped_range(&self, memory: u64) -> Option<(u64, u64)> {
        self.memories.with(memory, |m| m.mapped).flatten()
    }
}
