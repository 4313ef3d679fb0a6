use vkguard_protocol::ObjectHandle;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectHandle),

    #[error("{object} is still referenced {refs} time(s)")]
    ObjectInUse { object: ObjectHandle, refs: u32 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
