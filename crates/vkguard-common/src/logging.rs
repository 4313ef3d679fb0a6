use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the tracing filter directives.
pub const LOG_ENV: &str = "VKGUARD_LOG";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize structured logging for the `vkguard` binary.
/// Set VKGUARD_LOG=debug (or trace, info, warn, error) for verbosity control.
///
/// Output goes to stderr so JSON printed on stdout stays parseable.
pub fn init_logging() {
    fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Install a subscriber from inside the layer unless the host application
/// already has one. Returns whether ours was installed.
pub fn try_init_layer_logging(default_directive: &str) -> bool {
    fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
}
