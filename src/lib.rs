//! OAuth 2.0 client-credentials token issuance with pluggable client and
//! token storage.
//!
//! The [`Manager`] authenticates clients against a [`ClientStore`], mints
//! opaque bearer tokens and keeps them in a [`TokenStore`] until they expire
//! or are revoked.

pub mod config;
pub mod error;
pub mod oauth;

pub use config::{ManagerConfig, RetryPolicy, StoreBackend};
pub use error::{OAuthError, StoreError};
pub use oauth::{
    Client, ClientStore, GrantType, Manager, Token, TokenGenerateRequest, TokenRequest,
    TokenResponse, TokenStore,
};
