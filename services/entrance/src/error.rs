use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors that abort a registration or ban administration call.
///
/// Every variant renders a message an operator can read; store failures carry
/// the underlying detail.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Visitor lookup failed: {0}")]
    LookupFailed(StoreError),

    #[error("A photo is required to register a new visitor")]
    PhotoRequired,

    #[error("Failed to create visitor: {0}")]
    VisitorCreationFailed(StoreError),

    #[error("Failed to record entry: {0}")]
    LogWriteFailed(StoreError),

    #[error("A reason is required to ban a visitor")]
    ReasonRequired,

    #[error("Visitor is banned: {reason}")]
    BannedVisitor { reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Visitor not found: {0}")]
    VisitorNotFound(String),

    #[error("Failed to update ban state: {0}")]
    BanUpdateFailed(StoreError),
}

impl RegistrationError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationError::LookupFailed(_) => "LOOKUP_FAILED",
            RegistrationError::PhotoRequired => "PHOTO_REQUIRED",
            RegistrationError::VisitorCreationFailed(_) => "VISITOR_CREATION_FAILED",
            RegistrationError::LogWriteFailed(_) => "LOG_WRITE_FAILED",
            RegistrationError::ReasonRequired => "REASON_REQUIRED",
            RegistrationError::BannedVisitor { .. } => "BANNED_VISITOR",
            RegistrationError::InvalidRequest(_) => "INVALID_REQUEST",
            RegistrationError::VisitorNotFound(_) => "VISITOR_NOT_FOUND",
            RegistrationError::BanUpdateFailed(_) => "BAN_UPDATE_FAILED",
        }
    }

    pub(crate) fn visitor_id_not_found(id: Uuid) -> Self {
        RegistrationError::VisitorNotFound(id.to_string())
    }
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;
