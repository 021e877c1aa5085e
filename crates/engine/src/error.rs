//! The module contains the errors the engine can throw.
//!
//! The errors are:
//!
//! - [`Unauthorized`] thrown when an operation runs without a valid user.
//! - [`Unbalanced`] thrown when a set of ledger lines does not balance.
//! - [`KeyNotFound`] thrown when an item is not found (or belongs to someone
//!   else).
//! - [`ExternalProvider`] thrown when no exchange rate could be obtained.
//! - [`PartialWrite`] thrown when a transaction was inserted but its lines
//!   were not.
//!
//!  [`Unauthorized`]: EngineError::Unauthorized
//!  [`Unbalanced`]: EngineError::Unbalanced
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`ExternalProvider`]: EngineError::ExternalProvider
//!  [`PartialWrite`]: EngineError::PartialWrite
use sea_orm::DbErr;
use thiserror::Error;

use crate::rates::RateError;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Unbalanced transaction: {0}")]
    Unbalanced(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid account hierarchy: {0}")]
    InvalidHierarchy(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Conversion unavailable: {0}")]
    ExternalProvider(String),
    #[error("Partial write: {0}")]
    PartialWrite(String),
    #[error("{0} statement rows are still unmatched")]
    Unreconciled(usize),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<RateError> for EngineError {
    fn from(value: RateError) -> Self {
        Self::ExternalProvider(value.to_string())
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unauthorized, Self::Unauthorized) => true,
            (Self::Unbalanced(a), Self::Unbalanced(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::InvalidHierarchy(a), Self::InvalidHierarchy(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::ExternalProvider(a), Self::ExternalProvider(b)) => a == b,
            (Self::PartialWrite(a), Self::PartialWrite(b)) => a == b,
            (Self::Unreconciled(a), Self::Unreconciled(b)) => a == b,
            (Self::Config(a), Self::Config(b)) => a.to_string() == b.to_string(),
            (Self::Serialization(a), Self::Serialization(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
