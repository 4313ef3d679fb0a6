use ash::vk;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::codes::ValidationCode;
use crate::handle::ObjectHandle;

bitflags! {
    /// Message severities, bit-identical to `VkDebugReportFlagsEXT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReportFlags: u32 {
        const INFORMATION = 0x1;
        const WARNING = 0x2;
        const PERFORMANCE_WARNING = 0x4;
        const ERROR = 0x8;
        const DEBUG = 0x10;
    }
}

impl From<ReportFlags> for vk::DebugReportFlagsEXT {
    fn from(flags: ReportFlags) -> Self {
        vk::DebugReportFlagsEXT::from_raw(flags.bits())
    }
}

impl From<vk::DebugReportFlagsEXT> for ReportFlags {
    fn from(flags: vk::DebugReportFlagsEXT) -> Self {
        ReportFlags::from_bits_truncate(flags.as_raw())
    }
}

impl ReportFlags {
    /// Short label of the most severe bit set.
    pub fn severity_label(self) -> &'static str {
        if self.contains(Self::ERROR) {
            "error"
        } else if self.contains(Self::WARNING) {
            "warn"
        } else if self.contains(Self::PERFORMANCE_WARNING) {
            "perf"
        } else if self.contains(Self::INFORMATION) {
            "info"
        } else {
            "debug"
        }
    }
}

/// Everything a debug-report callback receives for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    #[serde(with = "flag_bits")]
    pub flags: ReportFlags,
    pub object: ObjectHandle,
    /// Source line that raised the report
    pub location: usize,
    pub code: ValidationCode,
    pub message: String,
}

impl ReportMessage {
    pub fn object_type(&self) -> vk::DebugReportObjectTypeEXT {
        self.object.object_type.debug_report_type()
    }

    pub fn message_code(&self) -> i32 {
        self.code.message_code()
    }

    pub fn layer_prefix(&self) -> &'static str {
        self.code.layer_prefix()
    }
}

mod flag_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ReportFlags;

    pub fn serialize<S: Serializer>(flags: &ReportFlags, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ReportFlags, D::Error> {
        Ok(ReportFlags::from_bits_truncate(u32::deserialize(d)?))
    }
}
