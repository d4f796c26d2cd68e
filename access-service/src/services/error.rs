use service_core::error::AppError;
use thiserror::Error;

use crate::models::{LookupError, Role};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown domain: {0}")]
    UnknownTenant(String),

    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Role {actual} may not use {route}")]
    RoleMismatch { actual: Role, route: &'static str },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Realm text for the `WWW-Authenticate` challenge, for errors the
    /// authentication gate answers with 401.
    pub fn challenge(&self) -> Option<&'static str> {
        match self {
            ServiceError::MissingCredentials => Some("Please enter your username and password"),
            ServiceError::InvalidCredentials => Some("Invalid username or password"),
            ServiceError::SessionNotFound => Some("Session expired. Login again"),
            ServiceError::RoleMismatch { .. } => Some("Unauthorized"),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            ServiceError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

impl From<LookupError> for ServiceError {
    fn from(err: LookupError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        if err.is_unique_violation() {
            return AppError::Conflict(anyhow::anyhow!("Record already exists"));
        }

        match err {
            ServiceError::UnknownTenant(name) => {
                AppError::UnknownTenant(anyhow::anyhow!("Unknown domain: {}", name))
            }
            ServiceError::UnknownPrincipal(name) => {
                AppError::NotFound(anyhow::anyhow!("Unknown principal: {}", name))
            }
            ServiceError::MissingCredentials
            | ServiceError::InvalidCredentials
            | ServiceError::SessionNotFound => {
                AppError::AuthError(anyhow::anyhow!("Authentication failed"))
            }
            ServiceError::RoleMismatch { .. } => {
                AppError::Unauthorized(anyhow::anyhow!("Unauthorized"))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            ServiceError::Conflict(what) => AppError::Conflict(anyhow::anyhow!(what)),
            ServiceError::Validation(what) => AppError::BadRequest(anyhow::anyhow!(what)),
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
