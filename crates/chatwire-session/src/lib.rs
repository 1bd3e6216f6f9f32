//! Connection sessions for Chatwire.
//!
//! A session wraps one transport connection and gives it the behavior both
//! peers rely on:
//!
//! 1. **Authorization** — the accepting side validates the connecting side's
//!    credential through your [`Authorizer`] and answers with an
//!    `AuthorizationResult` packet before any chat traffic flows.
//! 2. **Heartbeat** — the initiator sends `Ping` every 5 seconds and the
//!    responder echoes it.
//! 3. **Dead-peer detection** — each side closes the session when the
//!    other has been silent for too long ([`SessionConfig`]).
//! 4. **Dispatch** — decoded packets are routed by kind into
//!    [`SessionEvent`]s for the owner. Undecodable frames are logged and
//!    dropped without closing the session.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client / Server (above)  ← reconnect policy, fan-out to users
//!     ↕
//! Session Layer (this crate)  ← handshake, heartbeat, one close per session
//!     ↕
//! Protocol + Transport (below)  ← packets and frames
//! ```

mod auth;
mod config;
mod dispatch;
mod error;
mod fingerprint;
mod session;
mod state;

pub use auth::Authorizer;
pub use config::SessionConfig;
pub use dispatch::{ChatEvent, Route, route};
pub use error::SessionError;
pub use fingerprint::CredentialFingerprint;
pub use session::{ConnectionSession, SessionEvent, SessionEvents, SessionHandle, SessionId};
pub use state::{CloseReason, Role, SessionState};
