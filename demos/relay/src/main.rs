//! Relay server: a Chatwire server whose events come from stdin.
//!
//! Stands in for the request/response half of a chat backend. Each line on
//! stdin is one JSON command that is published to the connected clients:
//!
//! ```text
//! {"type":"message","message":{"id":"m1","author":"u1","channel":"c1","server":"s1","content":"hi","created_at_millis":0}}
//! {"type":"channel","author":"u1","channel":{"id":"c2","server":"s1","name":"random"}}
//! {"type":"user_joined","user":{"id":"u3","username":"carol"},"server":"s1"}
//! ```
//!
//! Environment:
//! - `CHATWIRE_BIND` — listen address (default `127.0.0.1:8080`)
//! - `CHATWIRE_ACCOUNTS` — path to a JSON object mapping tokens to accounts
//! - `RUST_LOG` — log filter (default `chatwire=info,relay=info`)

use std::collections::HashMap;
use std::path::PathBuf;

use chatwire::prelude::*;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct RelayConfig {
    bind: String,
    accounts: Option<PathBuf>,
}

impl RelayConfig {
    fn from_env() -> Self {
        Self::from_vars(
            std::env::var("CHATWIRE_BIND").ok(),
            std::env::var("CHATWIRE_ACCOUNTS").ok(),
        )
    }

    fn from_vars(bind: Option<String>, accounts: Option<String>) -> Self {
        Self {
            bind: bind.unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            accounts: accounts.filter(|p| !p.is_empty()).map(PathBuf::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Token → account table loaded at startup.
struct TokenTable(HashMap<String, Account>);

impl TokenTable {
    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::from_str(json)?))
    }

    fn demo() -> Self {
        let account = Account {
            user: UserRecord {
                id: "demo".into(),
                username: "demo".into(),
            },
            servers: vec!["lobby".into()],
        };
        Self(HashMap::from([("demo-token".to_string(), account)]))
    }
}

impl Authorizer for TokenTable {
    type Identity = Account;

    async fn authorize(&self, credential: &str) -> Result<Account, SessionError> {
        self.0
            .get(credential)
            .cloned()
            .ok_or_else(|| SessionError::AuthorizationRejected("Forbidden".into()))
    }
}

// ---------------------------------------------------------------------------
// Relay commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayCommand {
    Message { message: MessageRecord },
    Channel { author: String, channel: ChannelRecord },
    UserJoined { user: UserRecord, server: String },
}

async fn relay(hub: &ChatHub, command: RelayCommand) -> Result<usize, ChatwireError> {
    match command {
        RelayCommand::Message { message } => hub.publish_message(&message).await,
        RelayCommand::Channel { author, channel } => hub.publish_channel(&author, &channel).await,
        RelayCommand::UserJoined { user, server } => hub.publish_user_joined(&user, &server).await,
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatwire=info,chatwire_session=info,relay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = RelayConfig::from_env();
    let accounts = match &config.accounts {
        Some(path) => TokenTable::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => {
            warn!("CHATWIRE_ACCOUNTS not set, accepting only \"demo-token\"");
            TokenTable::demo()
        }
    };
    info!(accounts = accounts.0.len(), "accounts loaded");

    let server = ChatServer::builder()
        .bind(&config.bind)
        .build(accounts)
        .await?;
    let hub = server.hub();
    let server_task = tokio::spawn(server.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RelayCommand>(&line) {
            Ok(command) => match relay(&hub, command).await {
                Ok(reached) => info!(reached, "relayed"),
                Err(e) => warn!(error = %e, "relay failed"),
            },
            Err(e) => warn!(error = %e, "ignoring malformed command"),
        }
    }

    info!("stdin closed, serving until terminated");
    server_task.await??;
    Ok(())
}
