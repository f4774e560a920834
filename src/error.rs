//! Error types shared by the clinic services.

use thiserror::Error;
use uuid::Uuid;

use crate::calendar::CalendarError;

/// Errors returned by clinic operations.
///
/// Only primary reads and writes surface through this type. Failures of
/// secondary effects (workflow tracking, slot release, notifications) are
/// logged where they happen and never reach the caller.
#[derive(Debug, Error)]
pub enum ClinicError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("cannot delete {entity}: {reason}")]
    HasDependents { entity: &'static str, reason: String },

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClinicError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClinicError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ClinicError::NotFound { entity, id }
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;
