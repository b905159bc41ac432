use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Space-delimited scope, kept sorted and de-duplicated
pub type Scope = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
    AuthorizationCode,
    #[serde(rename = "refresh_token")]
    Refresh,
    Password,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::Refresh => "refresh_token",
            GrantType::Password => "password",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::Refresh),
            "password" => Ok(GrantType::Password),
            other => Err(other.to_string()),
        }
    }
}

/// A registered client application
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub secret: String,
    /// registered redirect origin, e.g. `http://localhost`
    pub domain: String,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            domain: domain.into(),
        }
    }
}

// keep secrets out of logs
impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// An issued opaque access token and its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub client_id: String,
    pub scope: Scope,
    pub grant_type: GrantType,
    pub issued_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl Token {
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.expires_in)
            .ok()
            .and_then(|d| self.issued_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A token is dead from the instant `issued_at + expires_in` is reached
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn scope_string(&self) -> String {
        self.scope.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

/// Storage for registered clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn set(&self, id: &str, client: Client) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Client, StoreError>;

    /// Removing an unknown id is not an error
    async fn remove(&self, id: &str) -> Result<(), StoreError>;
}

/// Storage for issued tokens, keyed by token value
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fails with `DuplicateToken` if a live token already has this value
    async fn create(&self, token: Token) -> Result<(), StoreError>;

    /// Expired tokens are reported as `TokenNotFound`
    async fn get_by_value(&self, value: &str) -> Result<Token, StoreError>;

    async fn remove(&self, value: &str) -> Result<(), StoreError>;

    /// Drop every expired token, returning how many went
    async fn remove_expired(&self) -> Result<usize, StoreError>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Source of raw token bytes
pub trait ValueSource: Send + Sync {
    fn next_value(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_issued(issued_at: DateTime<Utc>, secs: u64) -> Token {
        Token {
            value: "abc".to_string(),
            client_id: "000000".to_string(),
            scope: Scope::new(),
            grant_type: GrantType::ClientCredentials,
            issued_at,
            expires_in: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_grant_type_round_trips_wire_names() {
        for grant in [
            GrantType::ClientCredentials,
            GrantType::AuthorizationCode,
            GrantType::Refresh,
            GrantType::Password,
        ] {
            assert_eq!(grant.as_str().parse::<GrantType>(), Ok(grant));
        }
        assert_eq!(
            "implicit".parse::<GrantType>(),
            Err("implicit".to_string())
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let token = token_issued(now - chrono::Duration::seconds(10), 10);
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let token = token_issued(Utc::now(), u64::MAX);
        assert_eq!(token.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_client_debug_redacts_secret() {
        let client = Client::new("igomez10", "secret", "http://github.com");
        let debug = format!("{:?}", client);
        assert!(debug.contains("igomez10"));
        assert!(!debug.contains("\"secret\""));
    }

    #[test]
    fn test_scope_string_is_space_delimited() {
        let mut token = token_issued(Utc::now(), 60);
        token.scope = ["write", "read"].iter().map(|s| s.to_string()).collect();
        assert_eq!(token.scope_string(), "read write");
    }
}
