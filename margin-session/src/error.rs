//! Session-specific error types

use margin_core::{ErrorContext, MarginError};
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend could not load or create the session
    #[error("Session could not be started: {message}")]
    Startup { message: String },

    /// Identifier or name changes are refused once a session is running
    #[error("Cannot change the {field} of an active session")]
    Active { field: &'static str },

    #[error("Session backend {backend} failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("Invalid session id: {id}")]
    InvalidId { id: String },

    #[error("Session data could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        Self::backend("database", e.to_string())
    }
}

impl From<SessionError> for MarginError {
    fn from(e: SessionError) -> Self {
        let operation = match &e {
            SessionError::Startup { .. } => "start",
            SessionError::Active { .. } => "configure",
            _ => "persist",
        };
        MarginError::Session {
            message: e.to_string(),
            context: ErrorContext::new("session").with_operation(operation),
            source: Some(Box::new(e)),
        }
    }
}
