//! 权限服务错误

use cuba_errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Role not found")]
    RoleNotFound,
    #[error("Permission not found")]
    PermissionNotFound,
    #[error("Policy not found")]
    PolicyNotFound,
    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),
    #[error("System role cannot be deleted")]
    SystemRoleProtected,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<PermissionError> for AppError {
    fn from(error: PermissionError) -> Self {
        match error {
            PermissionError::RoleNotFound
            | PermissionError::PermissionNotFound
            | PermissionError::PolicyNotFound => AppError::NotFound(error.to_string()),
            PermissionError::RoleAlreadyExists(_) => AppError::Conflict(error.to_string()),
            PermissionError::SystemRoleProtected => AppError::Forbidden(error.to_string()),
            PermissionError::InvalidRequest(msg) => AppError::Validation(msg),
        }
    }
}
