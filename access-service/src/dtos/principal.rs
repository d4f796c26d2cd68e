use serde::{Deserialize, Serialize};

use crate::models::{Principal, PrincipalKind};

/// Principal as exposed over HTTP; credentials are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalResponse {
    pub id: i64,
    pub name: String,
    pub kind: PrincipalKind,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wg_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_ip: Option<String>,
}

impl From<&Principal> for PrincipalResponse {
    fn from(principal: &Principal) -> Self {
        let network = principal.network();
        Self {
            id: principal.id(),
            name: principal.name().to_string(),
            kind: principal.kind(),
            domain: principal.domain().name.clone(),
            wg_key: network.map(|n| n.wg_key.clone()),
            local_ip: network.map(|n| n.local_ip.clone()),
            public_ip: network.map(|n| n.public_ip.clone()),
            virtual_ip: network.map(|n| n.virtual_ip.clone()),
        }
    }
}
