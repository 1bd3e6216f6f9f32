//! Per-connection handler: handshake, hub registration, event drain.
//!
//! Each accepted connection gets its own Tokio task running this handler:
//!   1. Accept handshake → the authorizer resolves the credential to an
//!      [`Account`]
//!   2. Register the session with the hub (presence goes out)
//!   3. Drain session events until the session closes
//!   4. Unregister (via a drop guard, so it also runs on panic)

use std::sync::Arc;

use chatwire_session::{Authorizer, ConnectionSession, SessionEvent, SessionId};
use chatwire_transport::Connection;
use tracing::{debug, info, warn};

use crate::server::ServerState;
use crate::{Account, ChatHub, ChatwireError};

/// Drop guard that unregisters a session from the hub when the handler
/// exits. `Drop` is synchronous, so the async unregister is spawned.
struct HubGuard {
    hub: Arc<ChatHub>,
    user: String,
    session: SessionId,
}

impl Drop for HubGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let user = std::mem::take(&mut self.user);
        let session = self.session;
        tokio::spawn(async move {
            if let Err(e) = hub.unregister(&user, session).await {
                warn!(%user, error = %e, "unregister failed");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, A>(
    conn: C,
    state: Arc<ServerState<A>>,
) -> Result<(), ChatwireError>
where
    C: Connection,
    A: Authorizer<Identity = Account>,
{
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let (session, account) =
        ConnectionSession::accept(conn, &state.auth, state.session_config.clone()).await?;
    let (handle, mut events) = session.into_parts();
    let user = account.user.id.clone();

    info!(%conn_id, %user, session = %handle.id(), "user connected");

    state.hub.register(&account, handle.clone()).await?;
    let _guard = HubGuard {
        hub: Arc::clone(&state.hub),
        user: user.clone(),
        session: handle.id(),
    };

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Chat(event) => {
                // Clients publish through the request/response API, not the socket.
                debug!(%user, ?event, "ignoring chat event from client");
            }
            SessionEvent::Closed(reason) => {
                info!(%user, %reason, "user disconnected");
                break;
            }
            other => debug!(%user, ?other, "session event"),
        }
    }

    // _guard drops here → hub unregister fires.
    Ok(())
}
