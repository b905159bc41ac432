use super::traits::{Client, GrantType, Scope, Token, ValueSource};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

/// 32 bytes = 256 bits of entropy per token
pub const TOKEN_BYTES: usize = 32;

/// Random URL-safe token values from the thread-local CSPRNG
pub struct RandomValueSource {
    bytes: usize,
}

impl RandomValueSource {
    pub fn new(bytes: usize) -> Self {
        // never drop below 128 bits
        Self {
            bytes: bytes.max(16),
        }
    }
}

impl Default for RandomValueSource {
    fn default() -> Self {
        Self::new(TOKEN_BYTES)
    }
}

impl ValueSource for RandomValueSource {
    fn next_value(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(&buf)
    }
}

/// Builds fresh (unpersisted) tokens
#[derive(Clone)]
pub struct TokenGenerator {
    source: Arc<dyn ValueSource>,
    default_expiration: Duration,
}

impl TokenGenerator {
    pub fn new(default_expiration: Duration) -> Self {
        Self::with_source(Arc::new(RandomValueSource::default()), default_expiration)
    }

    pub fn with_source(source: Arc<dyn ValueSource>, default_expiration: Duration) -> Self {
        Self {
            source,
            default_expiration,
        }
    }

    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    pub fn new_token(&self, client: &Client, grant_type: GrantType, scope: Scope) -> Token {
        Token {
            value: self.source.next_value(),
            client_id: client.id.clone(),
            scope,
            grant_type,
            issued_at: Utc::now(),
            expires_in: self.default_expiration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_values_are_url_safe_and_long_enough() {
        let source = RandomValueSource::default();
        let value = source.next_value();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(value.len(), 43);
        assert!(
            value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_small_sizes_are_clamped() {
        let value = RandomValueSource::new(1).next_value();
        assert_eq!(URL_SAFE_NO_PAD.decode(value).unwrap().len(), 16);
    }

    #[test]
    fn test_values_do_not_repeat() {
        let source = RandomValueSource::default();
        let values: HashSet<String> = (0..1000).map(|_| source.next_value()).collect();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn test_new_token_carries_client_and_expiry() {
        let generator = TokenGenerator::new(Duration::from_secs(3600));
        let client = Client::new("000000", "999999", "http://localhost");
        let scope: Scope = ["read".to_string()].into_iter().collect();

        let token = generator.new_token(&client, GrantType::ClientCredentials, scope.clone());
        assert_eq!(token.client_id, "000000");
        assert_eq!(token.scope, scope);
        assert_eq!(token.expires_in, Duration::from_secs(3600));
        assert!(!token.is_expired());
    }
}
