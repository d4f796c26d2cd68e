use chrono::Utc;
use std::sync::Arc;

use super::{store::DirectoryStore, ServiceError};
use crate::models::{AuthContext, PrincipalKind, Role, Session, SessionToken};

/// Issues, resolves and ends bearer-token sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn DirectoryStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Stores a fresh session and returns its token. A token collision
    /// surfaces as `Conflict` and nothing is stored.
    pub async fn issue(
        &self,
        kind: PrincipalKind,
        principal_id: i64,
        domain_id: i64,
        role: Role,
    ) -> Result<SessionToken, ServiceError> {
        let token = SessionToken::generate(kind);
        let session = Session::new(&token, principal_id, domain_id, role);

        self.store.insert_session(&session).await?;

        tracing::info!(
            kind = %kind,
            principal_id,
            domain_id,
            role = %role,
            token = %token.fingerprint(),
            "Session issued"
        );
        Ok(token)
    }

    /// Resolves a token to the session's principal, working domain and
    /// role. Tokens that are not of the issued shape never reach the store.
    pub async fn resolve(&self, token: &str) -> Result<AuthContext, ServiceError> {
        let kind = SessionToken::kind_of(token).ok_or(ServiceError::SessionNotFound)?;

        self.store
            .find_session(kind, token)
            .await?
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Ends the session. Ending an unknown or already-ended session is
    /// not an error.
    pub async fn invalidate(&self, token: &str) -> Result<(), ServiceError> {
        let affected = self.store.end_session(token, Utc::now()).await?;
        if affected == 0 {
            tracing::warn!(
                token = %crate::models::session::fingerprint(token),
                "Logout for unknown or ended session"
            );
        }
        Ok(())
    }

    /// Moves an active session to another domain.
    pub async fn rehome(&self, token: &str, domain_id: i64) -> Result<(), ServiceError> {
        match self.store.rehome_session(token, domain_id).await? {
            0 => Err(ServiceError::SessionNotFound),
            _ => Ok(()),
        }
    }
}
