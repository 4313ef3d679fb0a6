pub mod codes;
pub mod commands;
pub mod handle;
pub mod report;

pub use codes::{
    DrawStateError, MemTrackError, ShaderCheckerError, ThreadingCheckerError, ValidationCode,
};
pub use commands::{CmdNode, CmdType, RenderPassScope};
pub use handle::{ObjectHandle, ObjectType};
pub use report::{ReportFlags, ReportMessage};
