pub mod config;
pub mod debug_report;
pub mod error;
pub mod registry;
pub mod spirv;
pub mod state;
pub mod threading;

pub use config::{CheckConfig, VkGuardConfig};
pub use debug_report::{CallbackId, DebugReport, ReportCallback, ReportStats, Reporter};
pub use error::CoreError;
pub use registry::{ObjectRegistry, Tracked};
pub use state::DeviceState;
pub use threading::{ThreadTracker, WriteGuard};
