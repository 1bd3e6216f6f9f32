//! `ChatHub`: who is online, which servers they belong to, and fan-out.
//!
//! The hub is the push half of the server. The request/response side (REST
//! handlers, the demo's stdin reader) persists a change and then calls one
//! of the `publish_*` methods; the hub encodes the packet once and queues
//! the same frame on every session that should see it.
//!
//! Publishing never waits on a peer: [`SessionHandle::send_frame`] only
//! enqueues.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatwire_protocol::{ChannelRecord, MessageRecord, Packet, UserRecord};
use chatwire_session::{SessionHandle, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ChatwireError;

/// The identity an authorizer resolves a credential to on a chat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user: UserRecord,
    /// Ids of the servers the user is a member of.
    pub servers: Vec<String>,
}

/// Online sessions and server memberships, shared by every connection task.
#[derive(Debug, Default)]
pub struct ChatHub {
    state: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    /// Open sessions per user id. Only users with at least one session.
    sessions: HashMap<String, Vec<SessionHandle>>,
    /// Server ids per online user id.
    memberships: HashMap<String, HashSet<String>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user's session. The user's first session announces them as
    /// online to everyone sharing a server with them.
    pub async fn register(
        &self,
        account: &Account,
        session: SessionHandle,
    ) -> Result<(), ChatwireError> {
        let user = account.user.id.clone();
        let mut state = self.state.lock().await;

        state
            .memberships
            .entry(user.clone())
            .or_default()
            .extend(account.servers.iter().cloned());

        let sessions = state.sessions.entry(user.clone()).or_default();
        let first = sessions.is_empty();
        debug!(%user, session = %session.id(), "session registered");
        sessions.push(session);

        if first {
            info!(%user, "user online");
            state.announce_presence(&user, true)?;
        }
        Ok(())
    }

    /// Removes a session. The user's last session announces them as offline.
    pub async fn unregister(&self, user: &str, session: SessionId) -> Result<(), ChatwireError> {
        let mut state = self.state.lock().await;

        let Some(sessions) = state.sessions.get_mut(user) else {
            return Ok(());
        };
        sessions.retain(|s| s.id() != session);
        debug!(%user, %session, "session unregistered");
        if !sessions.is_empty() {
            return Ok(());
        }

        state.sessions.remove(user);
        info!(%user, "user offline");
        let announced = state.announce_presence(user, false);
        state.memberships.remove(user);
        announced.map(|_| ())
    }

    /// Sends `NewMessage` to the other members of the message's server.
    ///
    /// Returns the number of sessions the frame was queued on.
    pub async fn publish_message(&self, message: &MessageRecord) -> Result<usize, ChatwireError> {
        let packet = Packet::NewMessage(message.clone());
        let state = self.state.lock().await;
        state.fan_out(&message.server, &message.author, &packet)
    }

    /// Sends `NewChannel` to the members of the channel's server other than
    /// `author`.
    pub async fn publish_channel(
        &self,
        author: &str,
        channel: &ChannelRecord,
    ) -> Result<usize, ChatwireError> {
        let packet = Packet::NewChannel(channel.clone());
        let state = self.state.lock().await;
        state.fan_out(&channel.server, author, &packet)
    }

    /// Records that `user` joined `server`, then tells the server's other
    /// members.
    pub async fn publish_user_joined(
        &self,
        user: &UserRecord,
        server: &str,
    ) -> Result<usize, ChatwireError> {
        let mut state = self.state.lock().await;
        if let Some(servers) = state.memberships.get_mut(&user.id) {
            servers.insert(server.to_owned());
        }
        let packet = Packet::UserJoined {
            user: user.clone(),
            server: server.to_owned(),
        };
        state.fan_out(server, &user.id, &packet)
    }

    /// Whether `user` has at least one open session.
    pub async fn is_online(&self, user: &str) -> bool {
        self.state.lock().await.sessions.contains_key(user)
    }

    /// Ids of every online user, sorted.
    pub async fn online_users(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut users: Vec<String> = state.sessions.keys().cloned().collect();
        users.sort();
        users
    }

    /// Total open sessions across all users.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.values().map(Vec::len).sum()
    }
}

impl HubState {
    fn is_member(&self, user: &str, server: &str) -> bool {
        self.memberships
            .get(user)
            .is_some_and(|servers| servers.contains(server))
    }

    fn shares_server(&self, a: &str, b: &str) -> bool {
        match (self.memberships.get(a), self.memberships.get(b)) {
            (Some(a), Some(b)) => !a.is_disjoint(b),
            _ => false,
        }
    }

    /// Queues `packet` on every session of every member of `server` except
    /// `except`.
    fn fan_out(
        &self,
        server: &str,
        except: &str,
        packet: &Packet,
    ) -> Result<usize, ChatwireError> {
        let frame: Arc<[u8]> = packet.encode()?.into();
        let reached = self.queue(
            |user| user != except && self.is_member(user, server),
            &frame,
        );
        debug!(kind = %packet.kind(), %server, reached, "fan-out");
        Ok(reached)
    }

    fn announce_presence(&self, user: &str, online: bool) -> Result<usize, ChatwireError> {
        let packet = Packet::UserStatusChanged {
            user: user.to_owned(),
            online,
        };
        let frame: Arc<[u8]> = packet.encode()?.into();
        Ok(self.queue(
            |other| other != user && self.shares_server(user, other),
            &frame,
        ))
    }

    fn queue(&self, wants: impl Fn(&str) -> bool, frame: &Arc<[u8]>) -> usize {
        self.sessions
            .iter()
            .filter(|(user, _)| wants(user.as_str()))
            .flat_map(|(_, sessions)| sessions)
            // A session that closed since registering is skipped; its
            // handler unregisters it shortly.
            .filter(|session| session.send_frame(Arc::clone(frame)).is_ok())
            .count()
    }
}
