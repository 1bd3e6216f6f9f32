//! Authorization hook for the accepting side.
//!
//! Chatwire does not decide who may connect. The embedding server implements
//! [`Authorizer`] (look the token up in a database, verify a JWT, compare
//! against a static list) and the session layer calls it once per
//! connection, before any chat traffic flows.

use std::future::Future;

use crate::SessionError;

/// Validates a peer's credential and resolves it to an identity.
///
/// # Example
///
/// ```rust
/// use chatwire_session::{Authorizer, SessionError};
///
/// /// Accepts exactly one shared secret.
/// struct SharedSecret(String);
///
/// impl Authorizer for SharedSecret {
///     type Identity = ();
///
///     async fn authorize(&self, credential: &str) -> Result<(), SessionError> {
///         if credential == self.0 {
///             Ok(())
///         } else {
///             Err(SessionError::AuthorizationRejected("Forbidden".into()))
///         }
///     }
/// }
/// ```
pub trait Authorizer: Send + Sync + 'static {
    /// What a successful authorization resolves to (a user, an account, ...).
    type Identity: Send + 'static;

    /// Validates `credential`.
    ///
    /// # Returns
    /// - `Ok(identity)` — the peer is who the credential says
    /// - `Err(SessionError::AuthorizationRejected(reason))` — `reason` is
    ///   sent back to the peer verbatim
    /// - any other error — the peer is told `"Forbidden"`
    fn authorize(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Self::Identity, SessionError>> + Send;
}
