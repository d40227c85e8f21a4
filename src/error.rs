//! Unified application error model for the client core.
//! One enum covers both provider seams (identity, profile table) and local
//! policy failures, with a retryability classification the resolver uses to
//! decide between backoff and degrading to the default role.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Misconfiguration surfaced once at startup (bad URL, missing key).
    #[error("{code}: {message}")]
    Config { code: String, message: String },
    /// Row-level-security rejection or invalid/expired credentials.
    #[error("{code}: {message}")]
    Auth { code: String, message: String },
    /// Requested row does not exist (e.g. no profile for the user id).
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    /// Network failure or upstream 5xx; safe to retry.
    #[error("{code}: {message}")]
    Transient { code: String, message: String },
    /// Bounded wait elapsed on a suspension point; safe to retry.
    #[error("{code}: {message}")]
    Timeout { code: String, message: String },
    /// Provider answered with something we could not interpret.
    #[error("{code}: {message}")]
    Provider { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Config { code, .. }
            | AppError::Auth { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Transient { code, .. }
            | AppError::Timeout { code, .. }
            | AppError::Provider { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Config { message, .. }
            | AppError::Auth { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Transient { message, .. }
            | AppError::Timeout { message, .. }
            | AppError::Provider { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn config<S: Into<String>>(code: S, msg: S) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn transient<S: Into<String>>(code: S, msg: S) -> Self { AppError::Transient { code: code.into(), message: msg.into() } }
    pub fn timeout<S: Into<String>>(code: S, msg: S) -> Self { AppError::Timeout { code: code.into(), message: msg.into() } }
    pub fn provider<S: Into<String>>(code: S, msg: S) -> Self { AppError::Provider { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Whether a profile/session fetch hitting this error is worth another
    /// attempt. Auth and NotFound are definitive: retrying cannot change the
    /// answer, the caller degrades to the least-privileged role instead.
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Transient { .. } | AppError::Timeout { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Provider unless downcasted elsewhere
        AppError::Provider { code: "provider_error".into(), message: err.to_string() }
    }
}
