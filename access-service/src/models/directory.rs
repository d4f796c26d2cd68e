//! Groups, apps and the grants that tie them to users.

use serde::Serialize;
use sqlx::FromRow;

use super::status::RecordStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub domain_id: i64,
    pub name: String,
    #[serde(skip)]
    pub status_code: String,
}

/// An addressable application exposed by a service node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct App {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub allowed_ips: Option<String>,
    #[serde(skip)]
    pub status_code: String,
}

/// Direct grant of an app to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserGrant {
    pub id: i64,
    pub user_id: i64,
    pub app_id: i64,
    pub status_code: String,
}

/// Grant of an app to every member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GroupGrant {
    pub id: i64,
    pub group_id: i64,
    pub app_id: i64,
    pub status_code: String,
}

impl Group {
    pub fn is_active(&self) -> bool {
        self.status_code == RecordStatus::Active.as_str()
    }
}

impl App {
    pub fn is_active(&self) -> bool {
        self.status_code == RecordStatus::Active.as_str()
    }
}

/// Grants are addressed by subject; the revocation and grant paths are
/// otherwise identical for users and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantSubject {
    User,
    Group,
}

impl GrantSubject {
    pub fn grant_table(&self) -> &'static str {
        match self {
            GrantSubject::User => "user_access_control",
            GrantSubject::Group => "group_access_control",
        }
    }

    pub fn subject_column(&self) -> &'static str {
        match self {
            GrantSubject::User => "user_id",
            GrantSubject::Group => "group_id",
        }
    }

    pub fn subject_table(&self) -> &'static str {
        match self {
            GrantSubject::User => "users",
            GrantSubject::Group => "user_groups",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSubject::User => "user",
            GrantSubject::Group => "group",
        }
    }
}

/// A stored grant, whichever subject it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Grant {
    pub id: i64,
    pub subject_id: i64,
    pub app_id: i64,
    pub status_code: String,
}

impl From<Grant> for UserGrant {
    fn from(g: Grant) -> Self {
        Self {
            id: g.id,
            user_id: g.subject_id,
            app_id: g.app_id,
            status_code: g.status_code,
        }
    }
}

impl From<Grant> for GroupGrant {
    fn from(g: Grant) -> Self {
        Self {
            id: g.id,
            group_id: g.subject_id,
            app_id: g.app_id,
            status_code: g.status_code,
        }
    }
}
