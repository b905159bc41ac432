//! Error types for the stores and the token manager.

use thiserror::Error;

/// Errors raised by client and token store backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("client already registered: {0}")]
    DuplicateClient(String),

    #[error("token not found")]
    TokenNotFound,

    #[error("token value already in use")]
    DuplicateToken,

    /// Transient backend failure, worth retrying
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors raised by the manager while serving a token request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Unknown client and wrong secret both end up here
    #[error("client authentication failed")]
    InvalidClient,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("token not found or expired")]
    TokenNotFound,

    #[error("could not generate a unique token after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    #[error("storage unavailable after {attempts} attempts: {reason}")]
    StorageUnavailable { attempts: u32, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OAuthError {
    /// Protocol-level error code returned to callers
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::TokenNotFound => "invalid_request",
            OAuthError::GenerationExhausted { .. }
            | OAuthError::StorageUnavailable { .. }
            | OAuthError::Store(_) => "server_error",
        }
    }

    /// Description safe to hand back to the caller. Internal failures get a
    /// generic message so nothing about the backend leaks out.
    pub fn public_description(&self) -> String {
        match self {
            OAuthError::InvalidClient => "Client authentication failed".to_string(),
            OAuthError::GenerationExhausted { .. }
            | OAuthError::StorageUnavailable { .. }
            | OAuthError::Store(_) => "Failed to issue token".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.error_code() == "server_error"
    }
}
