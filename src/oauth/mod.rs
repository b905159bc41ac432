mod client_credentials;
mod client_store;
mod manager;
mod protocol;
mod token;
mod token_store;
mod traits;

pub use client_credentials::{secrets_match, verify_client};
pub use client_store::MemoryClientStore;
pub use manager::Manager;
pub use protocol::{
    ErrorResponse, IntrospectionResponse, TokenGenerateRequest, TokenRequest, TokenResponse,
    parse_scope,
};
pub use token::{RandomValueSource, TOKEN_BYTES, TokenGenerator};
pub use token_store::{MemoryTokenStore, ShardedTokenStore, spawn_expiry_sweeper, token_store_for};
pub use traits::{Client, ClientStore, GrantType, Scope, Token, TokenStore, ValueSource};
