use super::traits::{Client, ClientStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// registered clients, in-memory (doesn't persist)
#[derive(Clone, Default)]
pub struct MemoryClientStore {
    clients: Arc<RwLock<HashMap<String, Client>>>,
    reject_overwrite: bool,
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// a store where re-registering an existing id fails with `DuplicateClient`
    pub fn rejecting_overwrites() -> Self {
        Self {
            reject_overwrite: true,
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn set(&self, id: &str, client: Client) -> Result<(), StoreError> {
        let mut clients = self.clients.write().await;
        if self.reject_overwrite && clients.contains_key(id) {
            return Err(StoreError::DuplicateClient(id.to_string()));
        }
        clients.insert(id.to_string(), client);
        tracing::debug!("stored client {}", id);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Client, StoreError> {
        self.clients
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ClientNotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.clients.write().await.remove(id);
        Ok(())
    }
}
