//! Application error model
//!
//! Defines the typed error hierarchy used by every component. Store-session and
//! resolution failures abort the whole capability call and surface as the
//! top-level `error` field; per-item failures are contained by the component
//! that encounters them and never reach this type.

use thiserror::Error;

use crate::store::StoreError;

/// Application error type
///
/// Components report a locate miss as `Ok(None)` and a rejected send through
/// `SendResult`; only capability handlers turn them into `EmailNotFound` and
/// `SendFailed` when the miss or rejection is the answer to the call.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (missing parameter, malformed arguments or config)
    #[error("{0}")]
    InvalidInput(String),
    /// The mail store cannot be reached (not running, access denied)
    #[error("Failed to connect to mail store: {0}")]
    Connection(String),
    /// No top-level store matches the account identifier
    #[error("Could not find folder for account: {0}")]
    AccountNotFound(String),
    /// The matched store has no Inbox child
    #[error("Could not find Inbox folder for account: {0}")]
    FolderNotFound(String),
    /// A store reference was used after its binding was released
    #[error("store handle is no longer valid: {0}")]
    InvalidHandle(String),
    /// No message matched the subject search
    #[error("No email found with subject containing: {0}")]
    EmailNotFound(String),
    /// A correlated reply cannot be addressed
    #[error("Could not determine sender email address for: {0}")]
    SenderUnresolved(String),
    /// The store did not accept an explicitly requested send
    #[error("{0}")]
    SendFailed(String),
    /// The operation exceeded the configured watchdog
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Local filesystem failure while persisting extraction output
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// Internal error (unexpected driver failure, serialization)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `Io` with a human-readable context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable code, attached to log records
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Connection(_) => "connection",
            Self::AccountNotFound(_) => "account_not_found",
            Self::FolderNotFound(_) => "folder_not_found",
            Self::InvalidHandle(_) => "invalid_handle",
            Self::EmailNotFound(_) => "email_not_found",
            Self::SenderUnresolved(_) => "sender_unresolved",
            Self::SendFailed(_) => "send_failed",
            Self::Timeout(_) => "timeout",
            Self::Io { .. } => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::Connection(msg),
            StoreError::Disposed(what) => Self::InvalidHandle(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;
