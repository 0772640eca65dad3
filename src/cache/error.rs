use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cached payload `{key}` could not be decoded: {reason}")]
    Deserialization { key: String, reason: String },
    #[error("payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn deserialization(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Deserialization {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}
