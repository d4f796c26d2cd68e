use serde::{Deserialize, Serialize};

use crate::models::{AuthContext, Role};

/// Body returned by the login endpoints and by a domain switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "Token")]
    pub token: String,
    pub role: Role,
    pub domain: String,
    pub logo_file: String,
    pub icon_file: String,
}

impl LoginResponse {
    pub fn new(ctx: &AuthContext, icon_id: i64) -> Self {
        Self {
            token: ctx.token.clone(),
            role: ctx.role,
            domain: ctx.domain_name.clone(),
            logo_file: format!("images/logos/{}.png", ctx.domain_id),
            icon_file: format!("images/icons/{}.png", icon_id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrincipalKind;

    #[test]
    fn test_login_payload_shape() {
        let ctx = AuthContext {
            kind: PrincipalKind::Admin,
            principal_id: 4,
            principal_name: "root".into(),
            domain_id: 7,
            domain_name: "acme".into(),
            token: "A42".into(),
            role: Role::PowerAdmin,
        };

        let json = serde_json::to_value(LoginResponse::new(&ctx, 23)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Token": "A42",
                "role": "P",
                "domain": "acme",
                "logo_file": "images/logos/7.png",
                "icon_file": "images/icons/23.png",
            })
        );
    }
}
