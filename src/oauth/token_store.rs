use super::traits::{Token, TokenStore};
use crate::config::StoreBackend;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::{Entry, RandomState};
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TokenMap = HashMap<String, Token>;

fn insert_live(map: &mut TokenMap, token: Token, now: DateTime<Utc>) -> Result<(), StoreError> {
    match map.entry(token.value.clone()) {
        // a dead token's value is free to be handed out again
        Entry::Occupied(mut existing) if existing.get().is_expired_at(now) => {
            existing.insert(token);
            Ok(())
        }
        Entry::Occupied(_) => Err(StoreError::DuplicateToken),
        Entry::Vacant(slot) => {
            slot.insert(token);
            Ok(())
        }
    }
}

fn lookup_live(map: &TokenMap, value: &str, now: DateTime<Utc>) -> Result<Token, StoreError> {
    match map.get(value) {
        Some(token) if !token.is_expired_at(now) => Ok(token.clone()),
        _ => Err(StoreError::TokenNotFound),
    }
}

fn purge_expired(map: &mut TokenMap, now: DateTime<Utc>) -> usize {
    let before = map.len();
    map.retain(|_, token| !token.is_expired_at(now));
    before - map.len()
}

/// issued tokens behind a single lock (in-memory, doesn't persist)
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<TokenMap>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, token: Token) -> Result<(), StoreError> {
        insert_live(&mut *self.tokens.write().await, token, Utc::now())
    }

    async fn get_by_value(&self, value: &str) -> Result<Token, StoreError> {
        lookup_live(&*self.tokens.read().await, value, Utc::now())
    }

    async fn remove(&self, value: &str) -> Result<(), StoreError> {
        self.tokens.write().await.remove(value);
        Ok(())
    }

    async fn remove_expired(&self) -> Result<usize, StoreError> {
        Ok(purge_expired(&mut *self.tokens.write().await, Utc::now()))
    }

    async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }
}

/// Tokens split across independently locked shards, so writers for
/// different values rarely contend
#[derive(Clone)]
pub struct ShardedTokenStore {
    shards: Arc<Vec<RwLock<TokenMap>>>,
    hasher: RandomState,
}

impl ShardedTokenStore {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(TokenMap::new()))
            .collect();
        Self {
            shards: Arc::new(shards),
            hasher: RandomState::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, value: &str) -> &RwLock<TokenMap> {
        let index = self.hasher.hash_one(value) as usize % self.shards.len();
        &self.shards[index]
    }
}

#[async_trait]
impl TokenStore for ShardedTokenStore {
    async fn create(&self, token: Token) -> Result<(), StoreError> {
        let shard = self.shard_for(&token.value);
        insert_live(&mut *shard.write().await, token, Utc::now())
    }

    async fn get_by_value(&self, value: &str) -> Result<Token, StoreError> {
        lookup_live(&*self.shard_for(value).read().await, value, Utc::now())
    }

    async fn remove(&self, value: &str) -> Result<(), StoreError> {
        self.shard_for(value).write().await.remove(value);
        Ok(())
    }

    async fn remove_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut removed = 0;
        // one shard locked at a time
        for shard in self.shards.iter() {
            removed += purge_expired(&mut *shard.write().await, now);
        }
        Ok(removed)
    }

    async fn len(&self) -> usize {
        let mut total = 0;
        for shard in self.shards.iter() {
            total += shard.read().await.len();
        }
        total
    }
}

/// Build the token store named by the configured backend
pub fn token_store_for(backend: StoreBackend) -> Arc<dyn TokenStore> {
    match backend {
        StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        StoreBackend::Sharded { shards } => Arc::new(ShardedTokenStore::new(shards)),
    }
}

/// Periodically drop expired tokens until `cancel` fires
pub fn spawn_expiry_sweeper(
    store: Arc<dyn TokenStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // interval() panics on a zero period
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        // first tick completes immediately, skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.remove_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!("swept {} expired tokens", n),
                        Err(e) => tracing::warn!("expiry sweep failed: {}", e),
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("expiry sweeper stopped");
                    break;
                }
            }
        }
    })
}
