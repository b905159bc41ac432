use super::traits::Client;
use crate::error::OAuthError;
use subtle::ConstantTimeEq;

/// Constant-time secret comparison. Never compare client secrets with `==`:
/// the running time of this function depends only on the input lengths.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Check a presented secret against the (possibly missing) registered client.
///
/// An unknown client still pays for a comparison, and both failure cases
/// return the same `InvalidClient` error so callers can't enumerate ids.
pub fn verify_client(
    client_id: &str,
    client: Option<Client>,
    client_secret: &str,
) -> Result<Client, OAuthError> {
    let authenticated = match client {
        Some(client) if secrets_match(client_secret, &client.secret) => Some(client),
        Some(_) => None,
        None => {
            let _ = secrets_match(client_secret, client_secret);
            None
        }
    };

    authenticated.ok_or_else(|| {
        tracing::warn!(
            "Invalid client credentials attempted for client_id: {}",
            client_id
        );
        OAuthError::InvalidClient
    })
}
