pub mod logging;

pub use logging::{init_logging, try_init_layer_logging, LOG_ENV};
