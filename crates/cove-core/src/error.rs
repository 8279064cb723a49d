//! Error taxonomy of the service layer.
//!
//! Five classes, all terminal for the triggering operation:
//! - `Unauthorized`: the credential itself failed.
//! - `Forbidden`: authenticated but lacking a role or capability.
//! - `NotFound`: absent or outside the caller's team scope. The two are
//!   deliberately indistinguishable so out-of-scope resource ids leak
//!   nothing.
//! - `Validation`: recoverable caller mistakes, with a readable reason.
//! - `Internal`: persistence or codec failure. The detail is kept for
//!   logs; `Display` stays opaque.

use thiserror::Error;

use cove_audit::AuditLogError;
use cove_crypto::{DecryptError, EncryptError};
use cove_storage::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("internal error")]
    Internal(String),
}

impl CoreError {
    pub fn validation(reason: impl Into<String>) -> Self {
        CoreError::Validation(reason.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CoreError::NotFound,
            StoreError::AlreadyExists => CoreError::Validation("already exists".to_string()),
            StoreError::Backend(detail) => CoreError::Internal(detail),
        }
    }
}

impl From<AuditLogError> for CoreError {
    fn from(e: AuditLogError) -> Self {
        CoreError::Internal(e.to_string())
    }
}

impl From<EncryptError> for CoreError {
    fn from(e: EncryptError) -> Self {
        CoreError::Internal(e.to_string())
    }
}

impl From<DecryptError> for CoreError {
    fn from(e: DecryptError) -> Self {
        CoreError::Internal(e.to_string())
    }
}
