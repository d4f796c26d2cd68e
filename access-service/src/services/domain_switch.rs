use std::sync::Arc;

use super::{session::SessionRegistry, store::DirectoryStore, ServiceError};
use crate::models::{AuthContext, Lookup, Role};

/// Moves a power-admin session between domains.
#[derive(Clone)]
pub struct DomainSwitch {
    store: Arc<dyn DirectoryStore>,
    sessions: SessionRegistry,
}

impl DomainSwitch {
    pub fn new(store: Arc<dyn DirectoryStore>, sessions: SessionRegistry) -> Self {
        Self { store, sessions }
    }

    /// Returns the caller's context with the new working domain. Targeting
    /// the current domain is a no-op that touches neither store nor session.
    pub async fn switch(
        &self,
        ctx: &AuthContext,
        target: &Lookup,
    ) -> Result<AuthContext, ServiceError> {
        if ctx.role != Role::PowerAdmin {
            return Err(ServiceError::RoleMismatch {
                actual: ctx.role,
                route: "domain switch",
            });
        }

        if target.matches(ctx.domain_id, &ctx.domain_name) {
            return Ok(ctx.clone());
        }

        let domain = self
            .store
            .find_domain(target)
            .await?
            .ok_or_else(|| ServiceError::UnknownTenant(target.to_string()))?;

        if let Err(e) = self.sessions.rehome(&ctx.token, domain.id).await {
            tracing::error!(
                error = %e,
                token = %ctx.token_fingerprint(),
                "Failed to move session to new domain"
            );
            return Err(ServiceError::SessionNotFound);
        }

        tracing::info!(
            admin = %ctx.principal_name,
            from = %ctx.domain_name,
            to = %domain.name,
            "Working domain changed"
        );

        Ok(AuthContext {
            domain_id: domain.id,
            domain_name: domain.name,
            ..ctx.clone()
        })
    }
}
