//! Principals: the three kinds of actor that can open a session.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use subtle::ConstantTimeEq;
use validator::Validate;

use super::domain::Domain;
use crate::utils::validation::validate_name;

/// Authorization role carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "A")]
    Admin,
    #[serde(rename = "P")]
    PowerAdmin,
    #[serde(rename = "U")]
    User,
    #[serde(rename = "S")]
    Service,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "A",
            Role::PowerAdmin => "P",
            Role::User => "U",
            Role::Service => "S",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Role::Admin),
            "P" => Some(Role::PowerAdmin),
            "U" => Some(Role::User),
            "S" => Some(Role::Service),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::PowerAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Admin,
    User,
    Service,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 3] = [
        PrincipalKind::Admin,
        PrincipalKind::User,
        PrincipalKind::Service,
    ];

    /// First character of every session token issued to this kind.
    pub fn token_prefix(&self) -> char {
        match self {
            PrincipalKind::Admin => 'A',
            PrincipalKind::User => 'U',
            PrincipalKind::Service => 'S',
        }
    }

    pub fn from_token_prefix(prefix: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.token_prefix() == prefix)
    }

    /// Role granted at login, before any power-domain promotion.
    pub fn base_role(&self) -> Role {
        match self {
            PrincipalKind::Admin => Role::Admin,
            PrincipalKind::User => Role::User,
            PrincipalKind::Service => Role::Service,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            PrincipalKind::Admin => "admins",
            PrincipalKind::User => "users",
            PrincipalKind::Service => "services",
        }
    }

    pub fn has_network(&self) -> bool {
        !matches!(self, PrincipalKind::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Admin => "admin",
            PrincipalKind::User => "user",
            PrincipalKind::Service => "service",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WireGuard addressing carried by users and services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub wg_key: String,
    pub local_ip: String,
    pub public_ip: String,
    pub virtual_ip: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub domain: Domain,
    password: String,
}

impl Identity {
    pub fn new(id: i64, name: impl Into<String>, domain: Domain, password: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            domain,
            password: password.into(),
        }
    }

    /// Byte-for-byte comparison in constant time.
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin(Identity),
    User {
        identity: Identity,
        network: NetworkIdentity,
    },
    Service {
        identity: Identity,
        network: NetworkIdentity,
    },
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::Admin(_) => PrincipalKind::Admin,
            Principal::User { .. } => PrincipalKind::User,
            Principal::Service { .. } => PrincipalKind::Service,
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Principal::Admin(identity)
            | Principal::User { identity, .. }
            | Principal::Service { identity, .. } => identity,
        }
    }

    pub fn network(&self) -> Option<&NetworkIdentity> {
        match self {
            Principal::Admin(_) => None,
            Principal::User { network, .. } | Principal::Service { network, .. } => Some(network),
        }
    }

    pub fn id(&self) -> i64 {
        self.identity().id
    }

    pub fn name(&self) -> &str {
        &self.identity().name
    }

    pub fn domain(&self) -> &Domain {
        &self.identity().domain
    }
}

/// Flat row shape shared by the three principal tables, joined with the
/// owning domain. Admin rows select NULL for the network columns.
#[derive(Debug, Clone, FromRow)]
pub struct PrincipalRow {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub domain_id: i64,
    pub domain_name: String,
    pub wg_key: Option<String>,
    pub local_ip: Option<String>,
    pub public_ip: Option<String>,
    pub virtual_ip: Option<String>,
}

impl PrincipalRow {
    pub fn into_principal(self, kind: PrincipalKind) -> Principal {
        let identity = Identity::new(
            self.id,
            self.name,
            Domain::new(self.domain_id, self.domain_name),
            self.password,
        );
        let network = NetworkIdentity {
            wg_key: self.wg_key.unwrap_or_default(),
            local_ip: self.local_ip.unwrap_or_default(),
            public_ip: self.public_ip.unwrap_or_default(),
            virtual_ip: self.virtual_ip.unwrap_or_default(),
        };

        match kind {
            PrincipalKind::Admin => Principal::Admin(identity),
            PrincipalKind::User => Principal::User { identity, network },
            PrincipalKind::Service => Principal::Service { identity, network },
        }
    }
}

/// Provisioning request for any principal kind. Creating a service also
/// creates its default app.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub kind: PrincipalKind,
    pub domain_id: i64,
    pub name: String,
    pub password: String,
    pub network: NetworkIdentity,
}

impl NewPrincipal {
    pub fn admin(domain_id: i64, name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Admin,
            domain_id,
            name: name.into(),
            password: password.into(),
            network: NetworkIdentity::default(),
        }
    }

    pub fn user(
        domain_id: i64,
        name: impl Into<String>,
        password: impl Into<String>,
        network: NetworkIdentity,
    ) -> Self {
        Self {
            kind: PrincipalKind::User,
            domain_id,
            name: name.into(),
            password: password.into(),
            network,
        }
    }

    pub fn service(
        domain_id: i64,
        name: impl Into<String>,
        password: impl Into<String>,
        network: NetworkIdentity,
    ) -> Self {
        Self {
            kind: PrincipalKind::Service,
            domain_id,
            name: name.into(),
            password: password.into(),
            network,
        }
    }
}

/// Sparse update: only fields that are present are written.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PrincipalUpdate {
    #[validate(custom(function = "validate_name"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: Option<String>,
    pub wg_key: Option<String>,
    pub local_ip: Option<String>,
    pub public_ip: Option<String>,
    pub virtual_ip: Option<String>,
}

impl PrincipalUpdate {
    /// Column/value pairs for every present field, in a fixed order.
    pub fn assignments(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", &self.name),
            ("password", &self.password),
            ("wg_key", &self.wg_key),
            ("local_ip", &self.local_ip),
            ("public_ip", &self.public_ip),
            ("virtual_ip", &self.virtual_ip),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    pub fn touches_network(&self) -> bool {
        self.wg_key.is_some()
            || self.local_ip.is_some()
            || self.public_ip.is_some()
            || self.virtual_ip.is_some()
    }

    pub fn apply_to(&self, principal: &mut Principal) {
        let (identity, network) = match principal {
            Principal::Admin(identity) => (identity, None),
            Principal::User { identity, network } | Principal::Service { identity, network } => {
                (identity, Some(network))
            }
        };

        if let Some(name) = &self.name {
            identity.name = name.clone();
        }
        if let Some(password) = &self.password {
            identity.password = password.clone();
        }
        if let Some(network) = network {
            let fields = [
                (&mut network.wg_key, &self.wg_key),
                (&mut network.local_ip, &self.local_ip),
                (&mut network.public_ip, &self.public_ip),
                (&mut network.virtual_ip, &self.virtual_ip),
            ];
            for (slot, value) in fields {
                if let Some(value) = value {
                    *slot = value.clone();
                }
            }
        }
    }
}
