use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::ServiceError;
use crate::models::{
    App, AuthContext, Domain, Grant, GrantSubject, Group, Lookup, NewPrincipal, PolicyRow,
    Principal, PrincipalKind, PrincipalUpdate, Session,
};

/// Which grant rows a policy query draws from. Every source is confined
/// to service nodes of the given domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    UserDirect { domain_id: i64, user_id: i64 },
    UserGroups { domain_id: i64, user_id: i64 },
    DomainDirect { domain_id: i64 },
    DomainGroups { domain_id: i64 },
}

impl PolicySource {
    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            PolicySource::UserDirect { .. } | PolicySource::DomainDirect { .. }
        )
    }
}

/// Persistence boundary for the directory, sessions and grants.
///
/// Lookups only see active records; "not found" is `Ok(None)` so callers
/// pick the error that fits their context.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError>;

    async fn find_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError>;

    async fn create_domain(&self, name: &str) -> Result<Domain, ServiceError>;

    /// Soft-deletes a domain. Fails with `Conflict` while any active admin,
    /// user, service or group still belongs to it.
    async fn delete_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError>;

    async fn create_principal(&self, new: &NewPrincipal) -> Result<Principal, ServiceError>;

    async fn find_principal_for_login(
        &self,
        kind: PrincipalKind,
        name: &str,
        domain_name: &str,
    ) -> Result<Option<Principal>, ServiceError>;

    async fn find_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
    ) -> Result<Option<Principal>, ServiceError>;

    async fn update_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
        update: &PrincipalUpdate,
    ) -> Result<Option<Principal>, ServiceError>;

    async fn create_group(&self, domain_id: i64, name: &str) -> Result<Group, ServiceError>;

    async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<(), ServiceError>;

    async fn create_app(
        &self,
        service_id: i64,
        name: &str,
        allowed_ips: Option<&str>,
    ) -> Result<App, ServiceError>;

    /// Replaces any existing grant of the app to the subject with a fresh
    /// active one. Subject and app must both belong to the domain.
    async fn grant_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<Grant, ServiceError>;

    /// Marks active grants of the app to the subject deleted and returns
    /// how many were affected.
    async fn revoke_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<u64, ServiceError>;

    /// Fails with `Conflict` if the token is already stored.
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    /// Resolves an active session against the principal table of `kind`.
    async fn find_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Option<AuthContext>, ServiceError>;

    async fn end_session(&self, token: &str, at: DateTime<Utc>) -> Result<u64, ServiceError>;

    async fn rehome_session(&self, token: &str, domain_id: i64) -> Result<u64, ServiceError>;

    async fn policy_rows(&self, source: PolicySource) -> Result<Vec<PolicyRow>, ServiceError>;
}
