use std::sync::Arc;

use super::{
    store::{DirectoryStore, PolicySource},
    ServiceError,
};
use crate::models::{Lookup, Policy, PolicyRow, PrincipalKind};

/// Builds connectivity policies from direct and group grants.
#[derive(Clone)]
pub struct PolicyAggregator {
    store: Arc<dyn DirectoryStore>,
}

impl PolicyAggregator {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Policy of one user in `domain_id`: direct grants first, then grants
    /// inherited through active group memberships.
    pub async fn policy_for_user(
        &self,
        domain_id: i64,
        user: &Lookup,
    ) -> Result<Policy, ServiceError> {
        let principal = self
            .store
            .find_principal(PrincipalKind::User, domain_id, user)
            .await?
            .ok_or_else(|| ServiceError::UnknownPrincipal(user.to_string()))?;

        let user_id = principal.id();
        self.collect([
            PolicySource::UserDirect { domain_id, user_id },
            PolicySource::UserGroups { domain_id, user_id },
        ])
        .await
    }

    /// Every grant held by anyone in the domain.
    pub async fn policy_for_domain(&self, domain_id: i64) -> Result<Policy, ServiceError> {
        self.collect([
            PolicySource::DomainDirect { domain_id },
            PolicySource::DomainGroups { domain_id },
        ])
        .await
    }

    async fn collect(&self, sources: [PolicySource; 2]) -> Result<Policy, ServiceError> {
        let mut policy = Policy::default();
        for source in sources {
            let rows = self.store.policy_rows(source).await?;
            tracing::debug!(?source, rows = rows.len(), "Policy rows fetched");
            merge_rows(&mut policy, rows, source.is_direct());
        }
        Ok(policy)
    }
}

/// Appends rows to the policy in order. An app granted both directly and
/// through a group appears once per grant.
pub fn merge_rows(policy: &mut Policy, rows: Vec<PolicyRow>, direct: bool) {
    for row in rows {
        policy.absorb(row, direct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(service: &str, app: &str) -> PolicyRow {
        PolicyRow {
            service_name: service.into(),
            wg_key: None,
            virtual_ip: None,
            public_ip: None,
            local_ip: None,
            app_name: app.into(),
            allowed_ips: Some("10.0.0.0/24".into()),
        }
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let mut policy = Policy::default();
        merge_rows(&mut policy, vec![row("vpn1", "ssh")], true);
        merge_rows(&mut policy, vec![row("vpn1", "ssh")], false);

        let apps = &policy.node("vpn1").unwrap().apps;
        assert_eq!(apps.len(), 2);
        assert!(apps[0].is_user_policy);
        assert!(!apps[1].is_user_policy);
    }

    #[test]
    fn test_merge_groups_by_service() {
        let mut policy = Policy::default();
        merge_rows(
            &mut policy,
            vec![row("vpn1", "ssh"), row("vpn2", "web"), row("vpn1", "rdp")],
            true,
        );

        assert_eq!(policy.nodes.len(), 2);
        let names: Vec<_> = policy
            .node("vpn1")
            .unwrap()
            .apps
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["ssh", "rdp"]);
    }
}
