use crate::oauth::GrantType;
use std::time::Duration;

/// Default access token lifetime (1 hour)
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Which token store implementation the manager is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// one map behind one lock
    #[default]
    Memory,
    /// tokens spread over `shards` independently locked maps
    Sharded { shards: usize },
}

/// Bounded exponential backoff for transient storage failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (0-indexed) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Configuration for the token manager and its stores
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub access_token_ttl: Duration,
    pub grant_types: Vec<GrantType>,
    /// attempts at finding an unused token value before giving up
    pub generation_attempts: u32,
    pub retry: RetryPolicy,
    pub store_backend: StoreBackend,
    pub sweep_interval: Duration,
    /// when false, registering an existing client id is an error
    pub allow_client_overwrite: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            grant_types: vec![GrantType::ClientCredentials],
            generation_attempts: 3,
            retry: RetryPolicy::default(),
            store_backend: StoreBackend::default(),
            sweep_interval: Duration::from_secs(60),
            allow_client_overwrite: true,
        }
    }
}
