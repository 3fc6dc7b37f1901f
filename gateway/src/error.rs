use thiserror::Error;

use crate::record::RecordId;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: RecordId },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("remote failure: {0}")]
    RemoteFailure(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteFailure(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
