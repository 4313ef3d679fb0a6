//! Instance-level state: configuration and the debug report callback chain
//! shared by every device created from the instance.

use std::sync::Arc;

use tracing::info;
use vkguard_core::{CallbackId, CoreError, DebugReport, ReportCallback, VkGuardConfig};
use vkguard_protocol::ReportFlags;

use crate::dispatch::DeviceDispatch;
use crate::ValidationLayer;

pub struct ValidationInstance {
    config: VkGuardConfig,
    report: Arc<DebugReport>,
}

impl ValidationInstance {
    pub fn new(config: VkGuardConfig) -> Result<Self, CoreError> {
        let report = Arc::new(DebugReport::from_config(&config.report)?);
        info!(
            "validation instance created (flags {:?}, checks {:?})",
            config.report.report_flags(),
            config.checks
        );
        Ok(Self { config, report })
    }

    /// Build an instance from the environment and the config file search
    /// path. Installs a `warn`-level subscriber when the host has none.
    pub fn from_env() -> Result<Self, CoreError> {
        vkguard_common::try_init_layer_logging("warn");
        Self::new(VkGuardConfig::from_env())
    }

    pub fn config(&self) -> &VkGuardConfig {
        &self.config
    }

    pub fn debug_report(&self) -> &Arc<DebugReport> {
        &self.report
    }

    /// `vkCreateDebugReportCallbackEXT`
    pub fn create_debug_report_callback(
        &self,
        flags: ReportFlags,
        callback: ReportCallback,
    ) -> CallbackId {
        self.report.register_callback(flags, callback)
    }

    /// `vkDestroyDebugReportCallbackEXT`
    pub fn destroy_debug_report_callback(&self, id: CallbackId) -> bool {
        self.report.unregister_callback(id)
    }

    /// Start validating a device reached through `dispatch`.
    pub fn wrap_device<D: DeviceDispatch>(&self, dispatch: D) -> ValidationLayer<D> {
        ValidationLayer::new(dispatch, Arc::clone(&self.report), self.config.checks)
    }
}
