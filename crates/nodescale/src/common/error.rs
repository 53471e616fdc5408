use thiserror::Error;

use crate::common::error::ScaleError::GenericError;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid policy configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid schedule: {0}")]
    ScheduleError(String),
    #[error("Could not connect to the scheduler after {trials} attempt(s): {reason}")]
    ConnectionExhausted { trials: u32, reason: String },
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for ScaleError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for ScaleError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<anyhow::Error> for ScaleError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<String> for ScaleError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}

pub fn invalid_config<T>(message: impl Into<String>) -> crate::Result<T> {
    Err(ScaleError::InvalidConfig(message.into()))
}
