//! # Chatwire
//!
//! Real-time chat over a compact binary protocol.
//!
//! A server keeps one long-lived connection per logged-in client and pushes
//! chat events (new messages, new channels, members joining, presence) over
//! it. Both sides run a [`ConnectionSession`](chatwire_session::ConnectionSession)
//! that authorizes the connection, keeps a heartbeat, and detects dead
//! peers.
//!
//! - [`ChatClient`] — the connecting side, with reconnect and credential
//!   invalidation policy
//! - [`ChatServer`] — WebSocket accept loop with an [`Authorizer`](chatwire_session::Authorizer)
//! - [`ChatHub`] — presence and fan-out of server-side events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwire::prelude::*;
//!
//! // Implement Authorizer<Identity = Account> for your user store, then:
//! // let server = ChatServer::builder()
//! //     .bind("0.0.0.0:8080")
//! //     .build(my_authorizer)
//! //     .await?;
//! // let hub = server.hub();
//! // tokio::spawn(server.run());
//! // hub.publish_message(&message).await?;
//! ```

mod client;
mod error;
mod handler;
mod hub;
mod server;

pub use client::{ChatClient, ClientConfig, ClientEvent, ClientEvents, ClientStatus};
pub use error::ChatwireError;
pub use hub::{Account, ChatHub};
pub use server::{ChatServer, ChatServerBuilder};

pub mod prelude {
    pub use crate::{
        Account, ChatClient, ChatHub, ChatServer, ChatServerBuilder, ChatwireError, ClientConfig,
        ClientEvent, ClientEvents, ClientStatus,
    };
    pub use chatwire_protocol::{ChannelRecord, MessageRecord, Packet, UserRecord};
    pub use chatwire_session::{
        Authorizer, CloseReason, SessionConfig, SessionError, SessionState,
    };
    pub use chatwire_transport::WebSocketConnector;
}
