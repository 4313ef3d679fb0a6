use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use tracing::debug;
use vkguard_protocol::{DrawStateError, ObjectHandle, ObjectType, ReportFlags, ValidationCode};

use crate::debug_report::Reporter;
use crate::error::CoreError;

/// A shadow record whose destruction depends on outstanding references.
pub trait Tracked {
    /// Code reported when the object is destroyed while still referenced.
    const IN_USE_CODE: ValidationCode = ValidationCode::DrawState(DrawStateError::ObjectInuse);

    /// Outstanding references that forbid destruction.
    fn ref_count(&self) -> u32 {
        0
    }
}

/// Shadow records of one Vulkan object kind, keyed by raw handle.
///
/// Each registry is its own concurrent map, so threads touching different
/// object kinds never contend.
pub struct ObjectRegistry<T> {
    object_type: ObjectType,
    records: DashMap<u64, T>,
}

impl<T> ObjectRegistry<T> {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            records: DashMap::new(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn handle(&self, raw: u64) -> ObjectHandle {
        ObjectHandle::new(raw, self.object_type)
    }

    /// Insert a record, returning whatever was registered under the same handle.
    pub fn register(&self, raw: u64, record: T) -> Option<T> {
        let previous = self.records.insert(raw, record);
        if previous.is_some() {
            debug!("{} re-registered", self.handle(raw));
        }
        previous
    }

    pub fn lookup(&self, raw: u64) -> Option<Ref<'_, u64, T>> {
        self.records.get(&raw)
    }

    pub fn lookup_mut(&self, raw: u64) -> Option<RefMut<'_, u64, T>> {
        self.records.get_mut(&raw)
    }

    /// Run `f` against a record without holding the map entry afterwards.
    pub fn with<R>(&self, raw: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.records.get(&raw).map(|r| f(r.value()))
    }

    pub fn with_mut<R>(&self, raw: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.records.get_mut(&raw).map(|mut r| f(r.value_mut()))
    }

    pub fn contains(&self, raw: u64) -> bool {
        self.records.contains_key(&raw)
    }

    /// Remove a record without any reference check.
    pub fn remove(&self, raw: u64) -> Option<T> {
        self.records.remove(&raw).map(|(_, v)| v)
    }

    pub fn handles(&self) -> Vec<u64> {
        self.records.iter().map(|e| *e.key()).collect()
    }

    /// Mutate every record. Holds each shard lock in turn.
    pub fn for_each_mut(&self, mut f: impl FnMut(u64, &mut T)) {
        for mut entry in self.records.iter_mut() {
            let raw = *entry.key();
            f(raw, entry.value_mut());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl<T: Tracked> ObjectRegistry<T> {
    /// Remove a record whose object is being destroyed.
    ///
    /// A record with outstanding references is reported with the record
    /// kind's in-use code. If the reporter asks to skip the call the record is
    /// kept and [`CoreError::ObjectInUse`] returned; otherwise the record is
    /// removed anyway, since the driver object is going away.
    #[track_caller]
    pub fn destroy<R: Reporter + ?Sized>(&self, raw: u64, reporter: &R) -> Result<T, CoreError> {
        let handle = self.handle(raw);
        let refs = match self.records.get(&raw) {
            Some(record) => record.ref_count(),
            None => return Err(CoreError::ObjectNotFound(handle)),
        };

        if refs > 0 {
            let message = format!(
                "Attempt to destroy {} which still has {} outstanding reference(s)",
                handle, refs
            );
            if reporter.report(ReportFlags::ERROR, handle, T::IN_USE_CODE, &message) {
                return Err(CoreError::ObjectInUse {
                    object: handle,
                    refs,
                });
            }
        }

        self.remove(raw).ok_or(CoreError::ObjectNotFound(handle))
    }
}
