use thiserror::Error;

/// Errors raised by the key/value store, the settings manager and the
/// session authenticator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required argument was empty or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A fixed-capacity container (entry table or session slots) is full.
    #[error("{what} is full (capacity {capacity})")]
    Capacity { what: &'static str, capacity: usize },

    /// Unknown entry, session token or file.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted before the owning component finished initializing.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Username or password did not match the stored credential.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Wrapper around filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn invalid_arg(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_ready(component: &str) -> Self {
        CoreError::InvalidState(format!("{component} is not initialized"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
