//! Error types module
//!
//! Every failure an authorization operation can report is a variant of
//! [`AppError`]. A denied permission check is not an error; it is an
//! `allowed = false` result.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for conflicts and state violations
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// by whatever transport adapter sits in front of the services.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "ROLE_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Immutable: {0}")]
    Immutable(String),

    #[error("In use: {0}")]
    InUse(String),

    #[error("Already bound: {0}")]
    AlreadyBound(String),

    #[error("Already a member: {0}")]
    AlreadyMember(String),

    #[error("Invitation expired: {0}")]
    Expired(String),

    #[error("Invitation already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid permission format: {0}")]
    InvalidPermissionFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID"),
            false,
            LogLevel::Debug,
        ),
        AppError::OrganizationNotFound(_) => (
            404,
            "ORGANIZATION_NOT_FOUND",
            false,
            Some("Verify the organization ID"),
            false,
            LogLevel::Debug,
        ),
        AppError::RoleNotFound(_) => (
            404,
            "ROLE_NOT_FOUND",
            false,
            Some("Verify the role ID or configure a default role"),
            false,
            LogLevel::Debug,
        ),
        AppError::DuplicateName(_) => (
            409,
            "DUPLICATE_NAME",
            false,
            Some("Choose a different name"),
            false,
            LogLevel::Debug,
        ),
        AppError::Immutable(_) => (
            403,
            "IMMUTABLE",
            false,
            Some("System entries cannot be modified"),
            false,
            LogLevel::Warn,
        ),
        AppError::InUse(_) => (
            409,
            "IN_USE",
            false,
            Some("Remove references before retrying"),
            false,
            LogLevel::Warn,
        ),
        AppError::AlreadyBound(_) => (
            409,
            "ALREADY_BOUND",
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        AppError::AlreadyMember(_) => (
            409,
            "ALREADY_MEMBER",
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        AppError::Expired(_) => (
            410,
            "INVITATION_EXPIRED",
            false,
            Some("Request a new invitation"),
            false,
            LogLevel::Debug,
        ),
        AppError::AlreadyProcessed(_) => (
            409,
            "INVITATION_ALREADY_PROCESSED",
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidState(_) => (
            409,
            "INVALID_STATE",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidPermissionFormat(_) => (
            400,
            "INVALID_PERMISSION_FORMAT",
            false,
            Some("Provide a JSON object mapping permission names to booleans"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Cancelled => (499, "CANCELLED", true, None, false, LogLevel::Debug),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_variants_map_to_409() {
        for err in [
            AppError::DuplicateName("x".into()),
            AppError::InUse("x".into()),
            AppError::AlreadyBound("x".into()),
            AppError::AlreadyMember("x".into()),
            AppError::AlreadyProcessed("x".into()),
        ] {
            assert_eq!(err.http_status_code(), 409, "{err}");
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Internal("pool exhausted at 10.0.0.3".into());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "An internal error occurred");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn domain_errors_keep_their_message() {
        let err = AppError::RoleNotFound("role 42".into());
        assert_eq!(err.error_code(), "ROLE_NOT_FOUND");
        assert_eq!(err.client_message(), "Role not found: role 42");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn anyhow_errors_are_wrapped_with_source() {
        let err: AppError = anyhow::anyhow!("boom").into();
        match err {
            AppError::InternalWithSource { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
