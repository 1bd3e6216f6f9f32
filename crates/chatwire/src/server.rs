//! `ChatServer` builder and accept loop.
//!
//! This is the entry point for running a Chatwire server. It ties the
//! layers together: transport → session → hub.

use std::net::SocketAddr;
use std::sync::Arc;

use chatwire_session::{Authorizer, SessionConfig};
use chatwire_transport::{Transport, WebSocketTransport};
use tracing::{debug, error, info};

use crate::handler::handle_connection;
use crate::{Account, ChatHub, ChatwireError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A> {
    pub(crate) hub: Arc<ChatHub>,
    pub(crate) auth: A,
    pub(crate) session_config: SessionConfig,
}

/// Builder for configuring and starting a Chatwire server.
///
/// # Example
///
/// ```rust,ignore
/// use chatwire::prelude::*;
///
/// let server = ChatServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_authorizer)
///     .await?;
/// let hub = server.hub();
/// server.run().await
/// ```
pub struct ChatServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration for every accepted session.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener. Connections are accepted once
    /// [`run`](ChatServer::run) is called.
    pub async fn build<A>(self, auth: A) -> Result<ChatServer<A>, ChatwireError>
    where
        A: Authorizer<Identity = Account>,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_handshake_timeout(self.session_config.auth_grace_period);

        let state = Arc::new(ServerState {
            hub: Arc::new(ChatHub::new()),
            auth,
            session_config: self.session_config,
        });

        Ok(ChatServer { transport, state })
    }
}

impl Default for ChatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Chatwire server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ChatServer<A> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
}

impl ChatServer<()> {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }
}

impl<A> ChatServer<A>
where
    A: Authorizer<Identity = Account>,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The fan-out hub. Clone the `Arc` before calling [`run`](Self::run)
    /// to publish from elsewhere.
    pub fn hub(&self) -> Arc<ChatHub> {
        Arc::clone(&self.state.hub)
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection gets its own handler task. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), ChatwireError> {
        info!(addr = ?self.transport.local_addr().ok(), "chat server listening");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}
