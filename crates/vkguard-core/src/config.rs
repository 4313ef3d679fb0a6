use serde::{Deserialize, Serialize};
use tracing::warn;
use vkguard_protocol::{ReportFlags, ValidationCode};

use crate::error::CoreError;

/// Top-level layer configuration, loaded from vkguard.toml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkGuardConfig {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub checks: CheckConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Severities written to the log
    #[serde(default = "default_report_flags")]
    pub flags: Vec<ReportLevel>,
    /// What happens when a report is raised
    #[serde(default = "default_actions")]
    pub actions: Vec<DebugAction>,
    /// Append log output to this file in addition to tracing
    pub log_file: Option<String>,
}

/// Per-category switches. A disabled category still tracks state but raises
/// no reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub draw_state: bool,
    #[serde(default = "default_true")]
    pub shader: bool,
    #[serde(default = "default_true")]
    pub threading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportLevel {
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "perf")]
    Perf,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "debug")]
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugAction {
    /// Drop reports entirely
    #[serde(rename = "ignore")]
    Ignore,
    /// Emit reports through tracing (and the log file, if any)
    #[serde(rename = "log")]
    LogMsg,
    /// Invoke registered debug-report callbacks
    #[serde(rename = "callback")]
    Callback,
    /// Skip the offending driver call on any error
    #[serde(rename = "break")]
    Break,
}

impl ReportLevel {
    pub fn flag(self) -> ReportFlags {
        match self {
            ReportLevel::Info => ReportFlags::INFORMATION,
            ReportLevel::Warn => ReportFlags::WARNING,
            ReportLevel::Perf => ReportFlags::PERFORMANCE_WARNING,
            ReportLevel::Error => ReportFlags::ERROR,
            ReportLevel::Debug => ReportFlags::DEBUG,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(ReportLevel::Info),
            "warn" => Some(ReportLevel::Warn),
            "perf" => Some(ReportLevel::Perf),
            "error" => Some(ReportLevel::Error),
            "debug" => Some(ReportLevel::Debug),
            _ => None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            flags: default_report_flags(),
            actions: default_actions(),
            log_file: None,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            memory: true,
            draw_state: true,
            shader: true,
            threading: true,
        }
    }
}

impl ReportConfig {
    pub fn report_flags(&self) -> ReportFlags {
        self.flags
            .iter()
            .fold(ReportFlags::empty(), |acc, level| acc | level.flag())
    }

    pub fn has_action(&self, action: DebugAction) -> bool {
        !self.actions.contains(&DebugAction::Ignore) && self.actions.contains(&action)
    }
}

impl CheckConfig {
    /// Whether reports of this code's category are enabled.
    pub fn allows(&self, code: ValidationCode) -> bool {
        match code {
            ValidationCode::MemTrack(_) => self.memory,
            ValidationCode::DrawState(_) => self.draw_state,
            ValidationCode::ShaderChecker(_) => self.shader,
            ValidationCode::Threading(_) => self.threading,
        }
    }
}

impl VkGuardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CoreError> {
        let config: VkGuardConfig = toml::from_str(content)?;
        if config.report.actions.contains(&DebugAction::Ignore) && config.report.actions.len() > 1
        {
            return Err(CoreError::ConfigError(
                "report action \"ignore\" cannot be combined with other actions".to_string(),
            ));
        }
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        if !std::path::Path::new(path).exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring {}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Resolve the config the way the layer does at load time: explicit
    /// `VKGUARD_CONFIG`, then the platform search path, then environment
    /// overrides.
    pub fn from_env() -> Self {
        let path = std::env::var("VKGUARD_CONFIG").unwrap_or_else(|_| default_config_path());
        let mut config = Self::load_or_default(&path);
        if let Ok(flags) = std::env::var("VKGUARD_REPORT_FLAGS") {
            config.apply_report_flags_override(&flags);
        }
        config
    }

    /// Replace `report.flags` with a comma separated list such as `error,warn`.
    /// Unknown entries are ignored.
    pub fn apply_report_flags_override(&mut self, list: &str) {
        let levels: Vec<ReportLevel> = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| {
                let level = ReportLevel::parse(s);
                if level.is_none() {
                    warn!("unknown report flag in VKGUARD_REPORT_FLAGS: {}", s.trim());
                }
                level
            })
            .collect();
        self.report.flags = levels;
    }
}

/// Returns the default config file path based on platform conventions.
/// Search order:
/// 1. System-wide config: `%PROGRAMDATA%\VkGuard\vkguard.toml` (Windows) or `/etc/vkguard/vkguard.toml` (Linux/macOS)
/// 2. Local fallback: `./vkguard.toml`
pub fn default_config_path() -> String {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = format!(r"{}\VkGuard\vkguard.toml", programdata);
        if std::path::Path::new(&system_path).exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = "/etc/vkguard/vkguard.toml";
        if std::path::Path::new(system_path).exists() {
            return system_path.to_string();
        }
    }
    "vkguard.toml".to_string()
}

fn default_report_flags() -> Vec<ReportLevel> {
    vec![ReportLevel::Error, ReportLevel::Warn, ReportLevel::Perf]
}

fn default_actions() -> Vec<DebugAction> {
    vec![DebugAction::LogMsg, DebugAction::Callback]
}

fn default_true() -> bool {
    true
}
