//! Debug-report callback chain.
//!
//! Registered callbacks live in a slot arena indexed by [`CallbackId`]. A slot
//! is reused after its callback is destroyed; the generation counter keeps a
//! stale id from removing the new occupant.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use vkguard_protocol::{ObjectHandle, ReportFlags, ReportMessage, ValidationCode};

use crate::config::{DebugAction, ReportConfig};
use crate::error::CoreError;

/// User callback. Returning `true` asks the layer to skip the driver call.
pub type ReportCallback = Arc<dyn Fn(&ReportMessage) -> bool + Send + Sync>;

/// Handle of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId {
    index: u32,
    generation: u32,
}

/// Anything that can raise a validation report.
pub trait Reporter {
    /// Raise a report. Returns `true` if the intercepted call must be skipped.
    fn report(
        &self,
        flags: ReportFlags,
        object: ObjectHandle,
        code: ValidationCode,
        message: &str,
    ) -> bool;
}

struct CallbackNode {
    flags: ReportFlags,
    callback: ReportCallback,
}

struct Slot {
    generation: u32,
    node: Option<CallbackNode>,
}

#[derive(Default)]
struct CallbackArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Counters of raised reports, by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub errors: u64,
    pub warnings: u64,
    pub other: u64,
}

pub struct DebugReport {
    arena: RwLock<CallbackArena>,
    log_flags: ReportFlags,
    log_enabled: bool,
    callbacks_enabled: bool,
    break_on_error: bool,
    log_file: Option<Mutex<BufWriter<File>>>,
    errors: AtomicU64,
    warnings: AtomicU64,
    other: AtomicU64,
}

impl DebugReport {
    pub fn from_config(config: &ReportConfig) -> Result<Self, CoreError> {
        let log_file = match &config.log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                info!("writing validation reports to {}", path);
                Some(Mutex::new(BufWriter::new(file)))
            }
            None => None,
        };

        Ok(Self {
            arena: RwLock::new(CallbackArena::default()),
            log_flags: config.report_flags(),
            log_enabled: config.has_action(DebugAction::LogMsg),
            callbacks_enabled: config.has_action(DebugAction::Callback),
            break_on_error: config.has_action(DebugAction::Break),
            log_file,
            errors: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            other: AtomicU64::new(0),
        })
    }

    /// Register a callback for every report whose flags intersect `flags`.
    pub fn register_callback(&self, flags: ReportFlags, callback: ReportCallback) -> CallbackId {
        let mut arena = self.arena.write();
        let node = CallbackNode { flags, callback };

        let id = if let Some(index) = arena.free.pop() {
            let slot = &mut arena.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            CallbackId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = arena.slots.len() as u32;
            arena.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            CallbackId {
                index,
                generation: 0,
            }
        };

        debug!("registered debug report callback {:?} for {:?}", id, flags);
        id
    }

    /// Remove a callback. Returns false for an unknown or already removed id.
    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        let mut arena = self.arena.write();
        let removed = match arena.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.node.is_some() => {
                slot.node = None;
                true
            }
            _ => false,
        };
        if removed {
            arena.free.push(id.index);
            debug!("unregistered debug report callback {:?}", id);
        }
        removed
    }

    pub fn callback_count(&self) -> usize {
        self.arena
            .read()
            .slots
            .iter()
            .filter(|s| s.node.is_some())
            .count()
    }

    /// Dispatch one report to the log and to every matching callback.
    ///
    /// Callbacks run under a read lock and must not register or unregister
    /// callbacks themselves.
    #[track_caller]
    pub fn log(
        &self,
        flags: ReportFlags,
        object: ObjectHandle,
        code: ValidationCode,
        message: &str,
    ) -> bool {
        let location = Location::caller().line() as usize;

        if flags.contains(ReportFlags::ERROR) {
            self.errors.fetch_add(1, Ordering::Relaxed);
        } else if flags.intersects(ReportFlags::WARNING | ReportFlags::PERFORMANCE_WARNING) {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        } else {
            self.other.fetch_add(1, Ordering::Relaxed);
        }

        if self.log_enabled && self.log_flags.intersects(flags) {
            self.write_log(flags, object, code, message);
        }

        let mut skip = false;
        if self.callbacks_enabled {
            let arena = self.arena.read();
            let mut report: Option<ReportMessage> = None;
            for node in arena.slots.iter().filter_map(|s| s.node.as_ref()) {
                if !node.flags.intersects(flags) {
                    continue;
                }
                let msg = report.get_or_insert_with(|| ReportMessage {
                    flags,
                    object,
                    location,
                    code,
                    message: message.to_string(),
                });
                skip |= (node.callback)(&*msg);
            }
        }

        if self.break_on_error && flags.contains(ReportFlags::ERROR) {
            error!(target: "vkguard::report", code = %code, "break on error: skipping call");
            skip = true;
        }

        skip
    }

    pub fn stats(&self) -> ReportStats {
        ReportStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            other: self.other.load(Ordering::Relaxed),
        }
    }

    fn write_log(&self, flags: ReportFlags, object: ObjectHandle, code: ValidationCode, message: &str) {
        let prefix = code.layer_prefix();
        if flags.contains(ReportFlags::ERROR) {
            error!(target: "vkguard::report", prefix, code = %code, object = %object, "{}", message);
        } else if flags.intersects(ReportFlags::WARNING | ReportFlags::PERFORMANCE_WARNING) {
            warn!(target: "vkguard::report", prefix, code = %code, object = %object, "{}", message);
        } else if flags.contains(ReportFlags::INFORMATION) {
            info!(target: "vkguard::report", prefix, code = %code, object = %object, "{}", message);
        } else {
            debug!(target: "vkguard::report", prefix, code = %code, object = %object, "{}", message);
        }

        if let Some(file) = &self.log_file {
            let mut file = file.lock();
            let written = writeln!(
                file,
                "{}({}): object: {} type: {} code: {} [{}]: {}",
                prefix,
                flags.severity_label(),
                object.raw,
                object.object_type.name(),
                code.message_code(),
                code,
                message
            )
            .and_then(|_| file.flush());
            if let Err(e) = written {
                warn!("failed to write validation log: {}", e);
            }
        }
    }
}

impl Default for DebugReport {
    fn default() -> Self {
        Self {
            arena: RwLock::new(CallbackArena::default()),
            log_flags: ReportConfig::default().report_flags(),
            log_enabled: true,
            callbacks_enabled: true,
            break_on_error: false,
            log_file: None,
            errors: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            other: AtomicU64::new(0),
        }
    }
}

impl Reporter for DebugReport {
    #[track_caller]
    fn report(
        &self,
        flags: ReportFlags,
        object: ObjectHandle,
        code: ValidationCode,
        message: &str,
    ) -> bool {
        self.log(flags, object, code, message)
    }
}
