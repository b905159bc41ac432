use super::client_credentials::verify_client;
use super::client_store::MemoryClientStore;
use super::protocol::{
    ErrorResponse, IntrospectionResponse, TokenGenerateRequest, TokenRequest, TokenResponse,
    parse_scope,
};
use super::token::{RandomValueSource, TokenGenerator};
use super::token_store::{spawn_expiry_sweeper, token_store_for};
use super::traits::{Client, ClientStore, GrantType, Scope, Token, TokenStore, ValueSource};
use crate::config::ManagerConfig;
use crate::error::{OAuthError, StoreError};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Validates token requests, issues tokens and answers introspection queries
#[derive(Clone)]
pub struct Manager {
    config: ManagerConfig,
    client_store: Arc<dyn ClientStore>,
    token_store: Arc<dyn TokenStore>,
    generator: TokenGenerator,
}

impl Manager {
    /// In-memory stores, picked according to `config`
    pub fn new(config: ManagerConfig) -> Self {
        let client_store: Arc<dyn ClientStore> = if config.allow_client_overwrite {
            Arc::new(MemoryClientStore::new())
        } else {
            Arc::new(MemoryClientStore::rejecting_overwrites())
        };
        let token_store = token_store_for(config.store_backend);
        Self::with_stores(config, client_store, token_store)
    }

    pub fn with_stores(
        config: ManagerConfig,
        client_store: Arc<dyn ClientStore>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let generator = TokenGenerator::new(config.access_token_ttl);
        Self {
            config,
            client_store,
            token_store,
            generator,
        }
    }

    /// Swap the randomness behind token values
    pub fn with_value_source(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.generator = TokenGenerator::with_source(source, self.config.access_token_ttl);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn client_store(&self) -> Arc<dyn ClientStore> {
        self.client_store.clone()
    }

    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        self.token_store.clone()
    }

    pub async fn register_client(&self, client: Client) -> Result<(), OAuthError> {
        let store = &self.client_store;
        self.with_retry("register client", || store.set(&client.id, client.clone()))
            .await?;
        tracing::info!("Registered client '{}' for {}", client.id, client.domain);
        Ok(())
    }

    /// Mint a fresh id/secret pair for `domain` and register it
    pub async fn generate_client_credentials(
        &self,
        domain: impl Into<String>,
    ) -> Result<Client, OAuthError> {
        let client = Client::new(
            format!("client-{}", Uuid::new_v4()),
            RandomValueSource::default().next_value(),
            domain,
        );
        self.register_client(client.clone()).await?;
        Ok(client)
    }

    pub async fn get_client(&self, id: &str) -> Result<Client, OAuthError> {
        let store = &self.client_store;
        self.with_retry("get client", || store.get_by_id(id)).await
    }

    /// Run a full grant: check the grant type, authenticate the client,
    /// check grant preconditions, then issue and persist a token.
    pub async fn generate_access_token(
        &self,
        grant_type: GrantType,
        req: &TokenGenerateRequest,
    ) -> Result<Token, OAuthError> {
        if !self.config.grant_types.contains(&grant_type) {
            return Err(OAuthError::UnsupportedGrantType(grant_type.to_string()));
        }

        let found = match self.get_client(&req.client_id).await {
            Ok(client) => Some(client),
            Err(OAuthError::Store(StoreError::ClientNotFound(_))) => None,
            Err(e) => return Err(e),
        };
        let client = verify_client(&req.client_id, found, &req.client_secret)?;

        if grant_type != GrantType::ClientCredentials {
            let redirect_uri = req.redirect_uri.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("Missing required parameter: redirect_uri".to_string())
            })?;
            if !redirect_matches_domain(&client.domain, redirect_uri) {
                tracing::warn!(
                    "redirect_uri '{}' does not match domain '{}' for client {}",
                    redirect_uri,
                    client.domain,
                    client.id
                );
                return Err(OAuthError::InvalidRequest(
                    "redirect_uri does not match the registered domain".to_string(),
                ));
            }
        }

        let token = self.issue(&client, grant_type, req.scope.clone()).await?;
        tracing::info!(
            "Issued OAuth token via {} for client: {}",
            grant_type,
            client.id
        );
        Ok(token)
    }

    /// Generate values until one is free, without holding the store lock
    /// between attempts
    async fn issue(
        &self,
        client: &Client,
        grant_type: GrantType,
        scope: Scope,
    ) -> Result<Token, OAuthError> {
        let attempts = self.config.generation_attempts.max(1);
        let store = &self.token_store;

        for attempt in 1..=attempts {
            let token = self.generator.new_token(client, grant_type, scope.clone());
            match self
                .with_retry("create token", || store.create(token.clone()))
                .await
            {
                Ok(()) => return Ok(token),
                Err(OAuthError::Store(StoreError::DuplicateToken)) => {
                    tracing::warn!("token value collision ({}/{})", attempt, attempts);
                }
                Err(e) => return Err(e),
            }
        }

        Err(OAuthError::GenerationExhausted { attempts })
    }

    pub async fn load_access_token(&self, value: &str) -> Result<Token, OAuthError> {
        let store = &self.token_store;
        match self.with_retry("load token", || store.get_by_value(value)).await {
            Err(OAuthError::Store(StoreError::TokenNotFound)) => Err(OAuthError::TokenNotFound),
            other => other,
        }
    }

    /// Unknown and expired tokens come back as `active: false`
    pub async fn introspect(&self, value: &str) -> Result<IntrospectionResponse, OAuthError> {
        match self.load_access_token(value).await {
            Ok(token) => Ok(IntrospectionResponse::from(&token)),
            Err(OAuthError::TokenNotFound) => Ok(IntrospectionResponse::inactive()),
            Err(e) => Err(e),
        }
    }

    pub async fn remove_access_token(&self, value: &str) -> Result<(), OAuthError> {
        let store = &self.token_store;
        self.with_retry("remove token", || store.remove(value)).await?;
        tracing::info!("Revoked access token");
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<usize, OAuthError> {
        let store = &self.token_store;
        self.with_retry("sweep tokens", || store.remove_expired())
            .await
    }

    pub fn spawn_expiry_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        spawn_expiry_sweeper(
            self.token_store.clone(),
            self.config.sweep_interval,
            cancel,
        )
    }

    /// Wire-level entry point: validate raw parameters, run the grant and
    /// turn failures into OAuth error responses
    pub async fn handle_token_request(
        &self,
        req: TokenRequest,
    ) -> Result<TokenResponse, ErrorResponse> {
        match self.token_from_wire(req).await {
            Ok(token) => Ok(TokenResponse::from(&token)),
            Err(e) => {
                if e.is_internal() {
                    tracing::error!("Failed to issue token: {}", e);
                }
                Err(ErrorResponse::from(&e))
            }
        }
    }

    async fn token_from_wire(&self, req: TokenRequest) -> Result<Token, OAuthError> {
        let grant_type = required(req.grant_type, "grant_type")?
            .parse::<GrantType>()
            .map_err(OAuthError::UnsupportedGrantType)?;
        let client_id = required(req.client_id, "client_id")?;
        let client_secret = required(req.client_secret, "client_secret")?;
        let scope = parse_scope(req.scope.as_deref())?;

        let mut generate = TokenGenerateRequest::new(client_id, client_secret).with_scope(scope);
        generate.redirect_uri = req.redirect_uri;

        self.generate_access_token(grant_type, &generate).await
    }

    /// Retry transient store failures with bounded backoff
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, OAuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let policy = &self.config.retry;
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= attempts {
                        tracing::warn!("{} failed after {} attempts: {}", what, attempts, e);
                        return Err(OAuthError::StorageUnavailable {
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                    let delay = policy.delay_for(attempt - 1);
                    tracing::debug!("{} failed ({}), retrying in {:?}", what, e, delay);
                    tokio::time::sleep(delay).await;
                }
                other => return other.map_err(OAuthError::from),
            }
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("Missing required parameter: {}", name)))
}

/// Does `redirect_uri` sit under the client's registered `domain`?
/// Scheme and host must match, the path must be under the domain's path,
/// and localhost gets any port for development.
fn redirect_matches_domain(domain: &str, redirect_uri: &str) -> bool {
    let (Ok(registered), Ok(requested)) = (Url::parse(domain), Url::parse(redirect_uri)) else {
        return false;
    };

    if registered.scheme() != requested.scheme() {
        return false;
    }

    let (Some(reg_host), Some(req_host)) = (registered.host_str(), requested.host_str()) else {
        return false;
    };
    if reg_host != req_host {
        return false;
    }

    let is_local = reg_host == "localhost" || reg_host == "127.0.0.1";
    if !is_local && registered.port_or_known_default() != requested.port_or_known_default() {
        return false;
    }

    let base = registered.path().trim_end_matches('/');
    let path = requested.path();
    path == base || path.starts_with(&format!("{}/", base))
}
