//! Connectivity policy: service nodes keyed by name, each listing the apps
//! the subject may reach on it.

use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashMap;

/// One (service node, app) pair produced by a grant query.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PolicyRow {
    pub service_name: String,
    pub wg_key: Option<String>,
    pub virtual_ip: Option<String>,
    pub public_ip: Option<String>,
    pub local_ip: Option<String>,
    pub app_name: String,
    pub allowed_ips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyApp {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allowed_ips: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_user_policy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyNode {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub wg_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub virtual_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub public_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_ip: String,
    pub apps: Vec<PolicyApp>,
}

impl PolicyNode {
    fn from_row(row: &PolicyRow) -> Self {
        Self {
            name: row.service_name.clone(),
            wg_key: row.wg_key.clone().unwrap_or_default(),
            virtual_ip: row.virtual_ip.clone().unwrap_or_default(),
            public_ip: row.public_ip.clone().unwrap_or_default(),
            local_ip: row.local_ip.clone().unwrap_or_default(),
            apps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    #[serde(rename = "services")]
    pub nodes: HashMap<String, PolicyNode>,
}

impl Policy {
    /// Appends one row. The node record is taken from the first row that
    /// names it; later rows only contribute their app.
    pub fn absorb(&mut self, row: PolicyRow, is_user_policy: bool) {
        let node = self
            .nodes
            .entry(row.service_name.clone())
            .or_insert_with(|| PolicyNode::from_row(&row));

        node.apps.push(PolicyApp {
            name: row.app_name,
            allowed_ips: row.allowed_ips.unwrap_or_default(),
            is_user_policy,
        });
    }

    pub fn node(&self, name: &str) -> Option<&PolicyNode> {
        self.nodes.get(name)
    }

    pub fn app_count(&self) -> usize {
        self.nodes.values().map(|n| n.apps.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
