use super::traits::{Scope, Token};
use crate::error::OAuthError;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// OAuth 2.0 token request as it arrives on the wire (form-encoded)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// space-delimited
    pub scope: Option<String>,
    /// only checked for grants other than client_credentials
    pub redirect_uri: Option<String>,
}

impl TokenRequest {
    pub fn from_form(body: &str) -> Result<Self, OAuthError> {
        serde_urlencoded::from_str(body)
            .map_err(|e| OAuthError::InvalidRequest(format!("malformed form body: {}", e)))
    }
}

/// Validated request handed to the manager (never persisted)
#[derive(Clone, Default)]
pub struct TokenGenerateRequest {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Scope,
    pub redirect_uri: Option<String>,
}

impl TokenGenerateRequest {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }
}

impl std::fmt::Debug for TokenGenerateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGenerateRequest")
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64, // seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&Token> for TokenResponse {
    fn from(token: &Token) -> Self {
        Self {
            access_token: token.value.clone(),
            token_type: "Bearer".to_string(),
            expires_in: token.expires_in.as_secs(),
            scope: (!token.scope.is_empty()).then(|| token.scope_string()),
        }
    }
}

/// OAuth 2.0 error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl From<&OAuthError> for ErrorResponse {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: Some(err.public_description()),
        }
    }
}

/// Token introspection response (RFC 7662)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<&Token> for IntrospectionResponse {
    fn from(token: &Token) -> Self {
        Self {
            active: !token.is_expired_at(Utc::now()),
            client_id: Some(token.client_id.clone()),
            scope: (!token.scope.is_empty()).then(|| token.scope_string()),
            token_type: Some("Bearer".to_string()),
            grant_type: Some(token.grant_type.to_string()),
            iat: Some(token.issued_at.timestamp()),
            exp: Some(token.expires_at().timestamp()),
        }
    }
}

/// scope-token = 1*( %x21 / %x23-5B / %x5D-7E )
fn is_scope_char(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x5B' | '\x5D'..='\x7E')
}

/// Parse a space-delimited scope parameter. Missing or blank means no scope.
pub fn parse_scope(raw: Option<&str>) -> Result<Scope, OAuthError> {
    let mut scope = Scope::new();
    for item in raw.unwrap_or_default().split(' ').filter(|s| !s.is_empty()) {
        if !item.chars().all(is_scope_char) {
            return Err(OAuthError::InvalidScope(format!(
                "illegal character in scope '{}'",
                item.escape_default()
            )));
        }
        scope.insert(item.to_string());
    }
    Ok(scope)
}
