use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::error::ServiceError;
use super::store::{DirectoryStore, PolicySource};
use crate::models::{
    App, AuthContext, Domain, Grant, GrantSubject, Group, Lookup, NetworkIdentity, NewPrincipal,
    PolicyRow, Principal, PrincipalKind, PrincipalRow, PrincipalUpdate, RecordStatus, Session,
    SessionRow,
};

/// In-process `DirectoryStore` used for tests and the `memory` backend.
/// Every operation runs under one lock, so multi-step writes are atomic.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    session_lookups: Mutex<HashMap<PrincipalKind, usize>>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    domains: Vec<Domain>,
    principals: Vec<PrincipalRecord>,
    groups: Vec<Group>,
    members: Vec<(i64, i64)>,
    apps: Vec<App>,
    grants: Vec<(GrantSubject, Grant)>,
    sessions: HashMap<String, Session>,
}

#[derive(Clone)]
struct PrincipalRecord {
    kind: PrincipalKind,
    id: i64,
    domain_id: i64,
    name: String,
    password: String,
    network: NetworkIdentity,
    status: RecordStatus,
}

impl PrincipalRecord {
    fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    fn to_principal(&self, domain: &Domain) -> Principal {
        let network = self.kind.has_network().then(|| self.network.clone());
        PrincipalRow {
            id: self.id,
            name: self.name.clone(),
            password: self.password.clone(),
            domain_id: domain.id,
            domain_name: domain.name.clone(),
            wg_key: network.as_ref().map(|n| n.wg_key.clone()),
            local_ip: network.as_ref().map(|n| n.local_ip.clone()),
            public_ip: network.as_ref().map(|n| n.public_ip.clone()),
            virtual_ip: network.as_ref().map(|n| n.virtual_ip.clone()),
        }
        .into_principal(self.kind)
    }
}

fn active() -> String {
    RecordStatus::Active.as_str().to_string()
}

fn deleted() -> String {
    RecordStatus::Deleted.as_str().to_string()
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn domain(&self, id: i64) -> Option<&Domain> {
        self.domains.iter().find(|d| d.id == id && d.is_active())
    }

    fn domain_by(&self, lookup: &Lookup) -> Option<&Domain> {
        self.domains
            .iter()
            .find(|d| d.is_active() && lookup.matches(d.id, &d.name))
    }

    fn principal_index(&self, kind: PrincipalKind, domain_id: i64, lookup: &Lookup) -> Option<usize> {
        self.principals.iter().position(|p| {
            p.kind == kind && p.domain_id == domain_id && p.is_active() && lookup.matches(p.id, &p.name)
        })
    }

    fn principal(&self, kind: PrincipalKind, domain_id: i64, lookup: &Lookup) -> Option<Principal> {
        let record = &self.principals[self.principal_index(kind, domain_id, lookup)?];
        let domain = self.domain(domain_id)?;
        Some(record.to_principal(domain))
    }

    fn name_taken(&self, kind: PrincipalKind, domain_id: i64, name: &str, except: Option<i64>) -> bool {
        self.principals.iter().any(|p| {
            p.kind == kind
                && p.domain_id == domain_id
                && p.is_active()
                && p.name == name
                && Some(p.id) != except
        })
    }

    fn active_service(&self, service_id: i64) -> Option<&PrincipalRecord> {
        self.principals
            .iter()
            .find(|p| p.kind == PrincipalKind::Service && p.id == service_id && p.is_active())
    }

    fn app_in_domain(&self, domain_id: i64, lookup: &Lookup) -> Option<&App> {
        self.apps.iter().find(|a| {
            a.is_active()
                && lookup.matches(a.id, &a.name)
                && self
                    .active_service(a.service_id)
                    .is_some_and(|s| s.domain_id == domain_id)
        })
    }

    fn subject_id(&self, subject: GrantSubject, domain_id: i64, lookup: &Lookup) -> Option<i64> {
        match subject {
            GrantSubject::User => self
                .principal_index(PrincipalKind::User, domain_id, lookup)
                .map(|i| self.principals[i].id),
            GrantSubject::Group => self
                .groups
                .iter()
                .find(|g| g.domain_id == domain_id && g.is_active() && lookup.matches(g.id, &g.name))
                .map(|g| g.id),
        }
    }

    fn domain_in_use(&self, domain_id: i64) -> bool {
        self.principals
            .iter()
            .any(|p| p.domain_id == domain_id && p.is_active())
            || self
                .groups
                .iter()
                .any(|g| g.domain_id == domain_id && g.is_active())
            || self
                .sessions
                .values()
                .any(|s| s.domain_id == domain_id && s.is_active())
    }

    fn holder_is_active(&self, subject: GrantSubject, subject_id: i64) -> bool {
        match subject {
            GrantSubject::User => self
                .principals
                .iter()
                .any(|p| p.kind == PrincipalKind::User && p.id == subject_id && p.is_active()),
            GrantSubject::Group => self
                .groups
                .iter()
                .any(|g| g.id == subject_id && g.is_active()),
        }
    }

    fn policy_row(&self, app_id: i64, domain_id: i64) -> Option<PolicyRow> {
        let app = self.apps.iter().find(|a| a.id == app_id && a.is_active())?;
        let service = self.active_service(app.service_id)?;
        if service.domain_id != domain_id {
            return None;
        }

        Some(PolicyRow {
            service_name: service.name.clone(),
            wg_key: Some(service.network.wg_key.clone()),
            virtual_ip: Some(service.network.virtual_ip.clone()),
            public_ip: Some(service.network.public_ip.clone()),
            local_ip: Some(service.network.local_ip.clone()),
            app_name: app.name.clone(),
            allowed_ips: app.allowed_ips.clone(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            session_lookups: Mutex::new(HashMap::new()),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, ServiceError> {
        self.tables
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }

    /// How many session lookups have been routed to the principal table of
    /// `kind`.
    pub fn session_lookups(&self, kind: PrincipalKind) -> usize {
        self.session_lookups
            .lock()
            .map(|lookups| lookups.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.tables().map(|_| ())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError> {
        let tables = self.tables()?;
        Ok(tables.domains.iter().filter(|d| d.is_active()).cloned().collect())
    }

    async fn find_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError> {
        Ok(self.tables()?.domain_by(lookup).cloned())
    }

    async fn create_domain(&self, name: &str) -> Result<Domain, ServiceError> {
        let mut tables = self.tables()?;
        if tables.domain_by(&Lookup::Name(name.to_string())).is_some() {
            return Err(ServiceError::Conflict(format!("Domain {name} already exists")));
        }

        let domain = Domain::new(tables.allocate(), name);
        tables.domains.push(domain.clone());
        Ok(domain)
    }

    async fn delete_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError> {
        let mut tables = self.tables()?;
        let Some(domain_id) = tables.domain_by(lookup).map(|d| d.id) else {
            return Ok(None);
        };

        if tables.domain_in_use(domain_id) {
            return Err(ServiceError::Conflict(format!(
                "Domain {lookup} still has active members or sessions"
            )));
        }

        let domain = tables
            .domains
            .iter_mut()
            .find(|d| d.id == domain_id)
            .map(|d| {
                d.status_code = deleted();
                d.clone()
            });
        Ok(domain)
    }

    async fn create_principal(&self, new: &NewPrincipal) -> Result<Principal, ServiceError> {
        let mut tables = self.tables()?;
        let domain = tables
            .domain(new.domain_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownTenant(new.domain_id.to_string()))?;

        if tables.name_taken(new.kind, domain.id, &new.name, None) {
            return Err(ServiceError::Conflict(format!(
                "{} {} already exists",
                new.kind, new.name
            )));
        }

        let record = PrincipalRecord {
            kind: new.kind,
            id: tables.allocate(),
            domain_id: domain.id,
            name: new.name.clone(),
            password: new.password.clone(),
            network: new.network.clone(),
            status: RecordStatus::Active,
        };

        if new.kind == PrincipalKind::Service {
            let app = App {
                id: tables.allocate(),
                service_id: record.id,
                name: new.name.clone(),
                allowed_ips: None,
                status_code: active(),
            };
            tables.apps.push(app);
        }

        let principal = record.to_principal(&domain);
        tables.principals.push(record);
        Ok(principal)
    }

    async fn find_principal_for_login(
        &self,
        kind: PrincipalKind,
        name: &str,
        domain_name: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let tables = self.tables()?;
        let Some(domain) = tables.domain_by(&Lookup::Name(domain_name.to_string())) else {
            return Ok(None);
        };
        Ok(tables.principal(kind, domain.id, &Lookup::Name(name.to_string())))
    }

    async fn find_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
    ) -> Result<Option<Principal>, ServiceError> {
        Ok(self.tables()?.principal(kind, domain_id, lookup))
    }

    async fn update_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
        update: &PrincipalUpdate,
    ) -> Result<Option<Principal>, ServiceError> {
        if !kind.has_network() && update.touches_network() {
            return Err(ServiceError::Validation(format!(
                "{kind} records have no network fields"
            )));
        }

        let mut tables = self.tables()?;
        let Some(index) = tables.principal_index(kind, domain_id, lookup) else {
            return Ok(None);
        };
        let id = tables.principals[index].id;

        if let Some(name) = &update.name {
            if tables.name_taken(kind, domain_id, name, Some(id)) {
                return Err(ServiceError::Conflict(format!("{kind} {name} already exists")));
            }
        }

        let record = &mut tables.principals[index];
        for (column, value) in update.assignments() {
            let slot = match column {
                "name" => &mut record.name,
                "password" => &mut record.password,
                "wg_key" => &mut record.network.wg_key,
                "local_ip" => &mut record.network.local_ip,
                "public_ip" => &mut record.network.public_ip,
                "virtual_ip" => &mut record.network.virtual_ip,
                _ => continue,
            };
            *slot = value.to_string();
        }

        Ok(tables.principal(kind, domain_id, &Lookup::Id(id)))
    }

    async fn create_group(&self, domain_id: i64, name: &str) -> Result<Group, ServiceError> {
        let mut tables = self.tables()?;
        if tables.domain(domain_id).is_none() {
            return Err(ServiceError::UnknownTenant(domain_id.to_string()));
        }
        if tables
            .groups
            .iter()
            .any(|g| g.domain_id == domain_id && g.is_active() && g.name == name)
        {
            return Err(ServiceError::Conflict(format!("Group {name} already exists")));
        }

        let group = Group {
            id: tables.allocate(),
            domain_id,
            name: name.to_string(),
            status_code: active(),
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<(), ServiceError> {
        let mut tables = self.tables()?;
        if !tables.members.contains(&(group_id, user_id)) {
            tables.members.push((group_id, user_id));
        }
        Ok(())
    }

    async fn create_app(
        &self,
        service_id: i64,
        name: &str,
        allowed_ips: Option<&str>,
    ) -> Result<App, ServiceError> {
        let mut tables = self.tables()?;
        if tables.active_service(service_id).is_none() {
            return Err(ServiceError::NotFound(format!("Service {service_id}")));
        }

        let app = App {
            id: tables.allocate(),
            service_id,
            name: name.to_string(),
            allowed_ips: allowed_ips.map(str::to_string),
            status_code: active(),
        };
        tables.apps.push(app.clone());
        Ok(app)
    }

    async fn grant_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<Grant, ServiceError> {
        let mut tables = self.tables()?;
        let subject_id = tables
            .subject_id(subject, domain_id, subject_lookup)
            .ok_or_else(|| ServiceError::NotFound(format!("{} {subject_lookup}", subject.as_str())))?;
        let app_id = tables
            .app_in_domain(domain_id, app_lookup)
            .map(|a| a.id)
            .ok_or_else(|| ServiceError::NotFound(format!("App {app_lookup}")))?;

        tables
            .grants
            .retain(|(s, g)| !(*s == subject && g.subject_id == subject_id && g.app_id == app_id));

        let grant = Grant {
            id: tables.allocate(),
            subject_id,
            app_id,
            status_code: active(),
        };
        tables.grants.push((subject, grant.clone()));
        Ok(grant)
    }

    async fn revoke_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<u64, ServiceError> {
        let mut tables = self.tables()?;
        let Some(subject_id) = tables.subject_id(subject, domain_id, subject_lookup) else {
            return Ok(0);
        };
        let Some(app_id) = tables.app_in_domain(domain_id, app_lookup).map(|a| a.id) else {
            return Ok(0);
        };

        let mut affected = 0;
        for (s, grant) in tables.grants.iter_mut() {
            if *s == subject
                && grant.subject_id == subject_id
                && grant.app_id == app_id
                && grant.status_code == RecordStatus::Active.as_str()
            {
                grant.status_code = deleted();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        let mut tables = self.tables()?;
        if tables.sessions.contains_key(&session.token) {
            return Err(ServiceError::Conflict("Session token already issued".into()));
        }
        tables.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Option<AuthContext>, ServiceError> {
        if let Ok(mut lookups) = self.session_lookups.lock() {
            *lookups.entry(kind).or_insert(0) += 1;
        }

        let tables = self.tables()?;
        let Some(session) = tables.sessions.get(token).filter(|s| s.is_active()) else {
            return Ok(None);
        };
        let Some(domain) = tables.domain(session.domain_id) else {
            return Ok(None);
        };
        let Some(principal) = tables
            .principals
            .iter()
            .find(|p| p.kind == kind && p.id == session.principal_id && p.is_active())
        else {
            return Ok(None);
        };

        let row = SessionRow {
            token: session.token.clone(),
            role_code: session.role_code.clone(),
            principal_id: principal.id,
            principal_name: principal.name.clone(),
            domain_id: domain.id,
            domain_name: domain.name.clone(),
        };
        AuthContext::from_row(kind, row)
            .map(Some)
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Session carries an unknown role code")))
    }

    async fn end_session(&self, token: &str, at: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut tables = self.tables()?;
        match tables.sessions.get_mut(token).filter(|s| s.is_active()) {
            Some(session) => {
                session.end(at);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn rehome_session(&self, token: &str, domain_id: i64) -> Result<u64, ServiceError> {
        let mut tables = self.tables()?;
        if tables.domain(domain_id).is_none() {
            return Ok(0);
        }
        match tables.sessions.get_mut(token).filter(|s| s.is_active()) {
            Some(session) => {
                session.domain_id = domain_id;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn policy_rows(&self, source: PolicySource) -> Result<Vec<PolicyRow>, ServiceError> {
        let tables = self.tables()?;

        let (wanted_subject, domain_id, subjects): (GrantSubject, i64, Option<HashSet<i64>>) =
            match source {
                PolicySource::UserDirect { domain_id, user_id } => {
                    (GrantSubject::User, domain_id, Some(HashSet::from([user_id])))
                }
                PolicySource::UserGroups { domain_id, user_id } => {
                    let groups = tables
                        .members
                        .iter()
                        .filter(|(_, member)| *member == user_id)
                        .map(|(group_id, _)| *group_id)
                        .filter(|group_id| tables.groups.iter().any(|g| g.id == *group_id && g.is_active()))
                        .collect();
                    (GrantSubject::Group, domain_id, Some(groups))
                }
                PolicySource::DomainDirect { domain_id } => (GrantSubject::User, domain_id, None),
                PolicySource::DomainGroups { domain_id } => (GrantSubject::Group, domain_id, None),
            };

        let rows = tables
            .grants
            .iter()
            .filter(|(subject, grant)| {
                *subject == wanted_subject
                    && grant.status_code == RecordStatus::Active.as_str()
                    && tables.holder_is_active(*subject, grant.subject_id)
                    && subjects
                        .as_ref()
                        .map_or(true, |ids| ids.contains(&grant.subject_id))
            })
            .filter_map(|(_, grant)| tables.policy_row(grant.app_id, domain_id))
            .collect();
        Ok(rows)
    }
}
