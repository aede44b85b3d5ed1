use api_types::reply::ResultCode;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{document} document has schema version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        document: String,
        found: u32,
        supported: u32,
    },
    #[error("operation {0} is not queued")]
    UnknownOperation(Uuid),
    #[error("rejected ({code}): {message}")]
    Rejected { code: ResultCode, message: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("state store unavailable: {0}")]
    Store(String),
}
