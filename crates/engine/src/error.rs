//! The module contains the error the engine can throw.
//!
//! Errors split in two families:
//!
//! - business rejections ([`KeyNotFound`], [`NotOwned`], [`InvalidInput`],
//!   [`LockedPeriod`], [`ExistingKey`]) that surface to callers as a result
//!   code;
//! - hard failures ([`Conflict`], [`Database`]) that abort the request.
//!
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`NotOwned`]: EngineError::NotOwned
//!  [`InvalidInput`]: EngineError::InvalidInput
//!  [`LockedPeriod`]: EngineError::LockedPeriod
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`Conflict`]: EngineError::Conflict
//!  [`Database`]: EngineError::Database
use api_types::reply::{Rejection, ResultCode};
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Not owned: {0}")]
    NotOwned(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Locked period: {0}")]
    LockedPeriod(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Result code for business rejections, `None` for hard failures.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            Self::KeyNotFound(_) => Some(ResultCode::NotFound),
            Self::NotOwned(_) => Some(ResultCode::NotOwned),
            Self::ExistingKey(_) | Self::InvalidInput(_) => Some(ResultCode::InvalidInput),
            Self::LockedPeriod(_) => Some(ResultCode::LockedPeriod),
            Self::Conflict(_) | Self::Database(_) => None,
        }
    }

    /// Converts a business error into a [`Rejection`], handing hard failures back.
    pub fn into_rejection(self) -> Result<Rejection, EngineError> {
        let Some(code) = self.code() else {
            return Err(self);
        };
        let reason = match self {
            Self::KeyNotFound(msg)
            | Self::NotOwned(msg)
            | Self::InvalidInput(msg)
            | Self::LockedPeriod(msg) => msg,
            Self::ExistingKey(key) => format!("{key} already present"),
            other => other.to_string(),
        };
        Ok(Rejection { code, reason })
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::NotOwned(a), Self::NotOwned(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::LockedPeriod(a), Self::LockedPeriod(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
