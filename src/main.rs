use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use credgate::{
    Client, GrantType, Manager, ManagerConfig, RetryPolicy, StoreBackend, TokenRequest,
    oauth::ErrorResponse,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    Memory,
    Sharded,
}

#[derive(Parser, Debug)]
#[command(name = "credgate")]
#[command(about = "oauth2 client-credentials token issuer, serving form-encoded requests on stdin")]
struct Args {
    /// Access token lifetime in seconds
    #[arg(long, env = "CREDGATE_TOKEN_TTL", default_value = "3600")]
    token_ttl: u64,

    /// Grant types the manager accepts
    #[arg(
        long,
        env = "CREDGATE_GRANT_TYPES",
        value_delimiter = ',',
        default_value = "client_credentials",
        value_parser = parse_grant_type
    )]
    grant_types: Vec<GrantType>,

    /// Token store implementation
    #[arg(long, value_enum, env = "CREDGATE_STORE", default_value = "memory")]
    store: StoreKind,

    /// Shard count for the sharded token store
    #[arg(long, env = "CREDGATE_SHARDS", default_value = "16")]
    shards: usize,

    /// Seconds between expired-token sweeps
    #[arg(long, env = "CREDGATE_SWEEP_INTERVAL", default_value = "60")]
    sweep_interval: u64,

    /// Attempts at finding an unused token value
    #[arg(long, env = "CREDGATE_GENERATION_ATTEMPTS", default_value = "3")]
    generation_attempts: u32,

    /// Attempts at a storage operation before giving up
    #[arg(long, env = "CREDGATE_RETRY_ATTEMPTS", default_value = "3")]
    retry_attempts: u32,

    /// Initial retry backoff in milliseconds (doubles each retry)
    #[arg(long, env = "CREDGATE_RETRY_BACKOFF_MS", default_value = "50")]
    retry_backoff_ms: u64,

    /// Refuse to re-register an existing client id
    #[arg(long, env = "CREDGATE_REJECT_CLIENT_OVERWRITE", default_value = "false")]
    reject_client_overwrite: bool,

    /// Client to register at startup, as ID:SECRET[@DOMAIN]
    #[arg(long = "client", env = "CREDGATE_CLIENTS", value_delimiter = ',')]
    clients: Vec<String>,
}

fn parse_grant_type(s: &str) -> Result<GrantType, String> {
    s.parse::<GrantType>()
        .map_err(|other| format!("unknown grant type '{}'", other))
}

impl Args {
    fn manager_config(&self) -> Result<ManagerConfig> {
        if self.token_ttl == 0 {
            bail!("CREDGATE_TOKEN_TTL must be greater than zero");
        }

        let store_backend = match self.store {
            StoreKind::Memory => StoreBackend::Memory,
            StoreKind::Sharded => StoreBackend::Sharded {
                shards: self.shards,
            },
        };

        Ok(ManagerConfig {
            access_token_ttl: Duration::from_secs(self.token_ttl),
            grant_types: self.grant_types.clone(),
            generation_attempts: self.generation_attempts,
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                ..RetryPolicy::default()
            },
            store_backend,
            sweep_interval: Duration::from_secs(self.sweep_interval),
            allow_client_overwrite: !self.reject_client_overwrite,
        })
    }
}

/// `ID:SECRET` or `ID:SECRET@DOMAIN`, domain defaults to http://localhost
fn parse_client_spec(spec: &str) -> Result<Client> {
    let (id, rest) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("client '{}' is not in ID:SECRET[@DOMAIN] form", spec))?;
    let (secret, domain) = rest.split_once('@').unwrap_or((rest, "http://localhost"));

    if id.is_empty() || secret.is_empty() {
        bail!("client '{}' has an empty id or secret", spec);
    }
    Ok(Client::new(id, secret, domain))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    #[default]
    Token,
    Introspect,
    Revoke,
}

/// fields that pick what a stdin line asks for; the rest is a token request
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    action: Action,
    token: Option<String>,
}

async fn handle_line(manager: &Manager, line: &str) -> serde_json::Value {
    let envelope: Envelope = match serde_urlencoded::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => return bad_request(&format!("malformed request: {}", e)),
    };

    let result = match envelope.action {
        Action::Token => match TokenRequest::from_form(line) {
            Ok(req) => manager.handle_token_request(req).await.map(|r| serde_json::json!(r)),
            Err(e) => Err(ErrorResponse::from(&e)),
        },
        Action::Introspect | Action::Revoke => {
            let Some(token) = envelope.token.filter(|t| !t.is_empty()) else {
                return bad_request("Missing required parameter: token");
            };
            if matches!(envelope.action, Action::Introspect) {
                manager
                    .introspect(&token)
                    .await
                    .map(|r| serde_json::json!(r))
                    .map_err(|e| ErrorResponse::from(&e))
            } else {
                manager
                    .remove_access_token(&token)
                    .await
                    .map(|()| serde_json::json!({ "revoked": true }))
                    .map_err(|e| ErrorResponse::from(&e))
            }
        }
    };

    match result {
        Ok(value) => value,
        Err(err) => serde_json::json!(err),
    }
}

fn bad_request(description: &str) -> serde_json::Value {
    serde_json::json!(ErrorResponse {
        error: "invalid_request".to_string(),
        error_description: Some(description.to_string()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // logs go to stderr, stdout carries responses
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.manager_config()?;
    tracing::info!(
        "Starting token manager (ttl={}s, grants={:?}, store={:?})",
        config.access_token_ttl.as_secs(),
        config.grant_types,
        config.store_backend
    );
    let manager = Manager::new(config);

    for spec in &args.clients {
        let client = parse_client_spec(spec)?;
        manager
            .register_client(client)
            .await
            .with_context(|| format!("registering client from '{}'", spec))?;
    }
    if args.clients.is_empty() {
        tracing::warn!("No clients registered, every token request will fail");
    }

    let cancel = CancellationToken::new();
    let sweeper = manager.spawn_expiry_sweeper(cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = handle_line(&manager, line).await;
                stdout.write_all(response.to_string().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    cancel.cancel();
    sweeper.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_spec() {
        let client = parse_client_spec("000000:999999").unwrap();
        assert_eq!(client.id, "000000");
        assert_eq!(client.secret, "999999");
        assert_eq!(client.domain, "http://localhost");

        let client = parse_client_spec("igomez10:secret@http://github.com").unwrap();
        assert_eq!(client.domain, "http://github.com");

        assert!(parse_client_spec("no-secret").is_err());
        assert!(parse_client_spec(":secret").is_err());
    }

    #[test]
    fn test_args_build_config() {
        let args = Args::try_parse_from([
            "credgate",
            "--token-ttl",
            "120",
            "--store",
            "sharded",
            "--shards",
            "4",
            "--grant-types",
            "client_credentials,password",
            "--client",
            "000000:999999",
        ])
        .unwrap();

        let config = args.manager_config().unwrap();
        assert_eq!(config.access_token_ttl, Duration::from_secs(120));
        assert_eq!(config.store_backend, StoreBackend::Sharded { shards: 4 });
        assert_eq!(
            config.grant_types,
            vec![GrantType::ClientCredentials, GrantType::Password]
        );
        assert_eq!(args.clients, vec!["000000:999999".to_string()]);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let args = Args::try_parse_from(["credgate", "--token-ttl", "0"]).unwrap();
        assert!(args.manager_config().is_err());
    }

    #[tokio::test]
    async fn test_stdin_line_round_trip() {
        let manager = Manager::new(ManagerConfig::default());
        manager
            .register_client(Client::new("000000", "999999", "http://localhost"))
            .await
            .unwrap();

        let issued = handle_line(
            &manager,
            "grant_type=client_credentials&client_id=000000&client_secret=999999",
        )
        .await;
        assert_eq!(issued["token_type"], "Bearer");
        let token = issued["access_token"].as_str().unwrap().to_string();

        let info = handle_line(&manager, &format!("action=introspect&token={}", token)).await;
        assert_eq!(info["active"], true);

        let revoked = handle_line(&manager, &format!("action=revoke&token={}", token)).await;
        assert_eq!(revoked["revoked"], true);

        let info = handle_line(&manager, &format!("action=introspect&token={}", token)).await;
        assert_eq!(info["active"], false);

        let missing = handle_line(&manager, "action=introspect").await;
        assert_eq!(missing["error"], "invalid_request");
    }
}
