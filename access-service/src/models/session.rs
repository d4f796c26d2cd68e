use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

use super::{
    principal::{PrincipalKind, Role},
    status::RecordStatus,
};

/// Opaque bearer token: one kind-prefix character followed by decimal
/// digits from the OS random source.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate(kind: PrincipalKind) -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let body = u128::from_le_bytes(bytes);
        Self(format!("{}{}", kind.token_prefix(), body))
    }

    /// Recovers the principal kind a token was issued to. Tokens that do
    /// not have the issued shape yield `None`.
    pub fn kind_of(token: &str) -> Option<PrincipalKind> {
        let mut chars = token.chars();
        let kind = PrincipalKind::from_token_prefix(chars.next()?)?;
        let body = chars.as_str();

        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(kind)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Short prefix safe to put in logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

pub fn fingerprint(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    format!("{visible}...")
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&self.fingerprint()).finish()
    }
}

/// Persisted session row.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token: String,
    pub principal_id: i64,
    pub domain_id: i64,
    pub role_code: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: Option<DateTime<Utc>>,
    pub status_code: String,
}

impl Session {
    pub fn new(token: &SessionToken, principal_id: i64, domain_id: i64, role: Role) -> Self {
        Self {
            token: token.as_str().to_string(),
            principal_id,
            domain_id,
            role_code: role.as_str().to_string(),
            start_utc: Utc::now(),
            end_utc: None,
            status_code: RecordStatus::Active.as_str().to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status_code == RecordStatus::Active.as_str()
    }

    pub fn end(&mut self, at: DateTime<Utc>) {
        self.status_code = RecordStatus::Deleted.as_str().to_string();
        self.end_utc = Some(at);
    }
}

/// Row produced when a token is resolved against its principal table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub token: String,
    pub role_code: String,
    pub principal_id: i64,
    pub principal_name: String,
    pub domain_id: i64,
    pub domain_name: String,
}

/// Identity, working domain and role carried by an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub kind: PrincipalKind,
    pub principal_id: i64,
    pub principal_name: String,
    pub domain_id: i64,
    pub domain_name: String,
    #[serde(skip)]
    pub token: String,
    pub role: Role,
}

impl AuthContext {
    pub fn from_row(kind: PrincipalKind, row: SessionRow) -> Option<Self> {
        let role = Role::from_code(&row.role_code)?;
        Some(Self {
            kind,
            principal_id: row.principal_id,
            principal_name: row.principal_name,
            domain_id: row.domain_id,
            domain_name: row.domain_name,
            token: row.token,
            role,
        })
    }

    pub fn token_fingerprint(&self) -> String {
        fingerprint(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_carry_kind_prefix() {
        for kind in PrincipalKind::ALL {
            let token = SessionToken::generate(kind);
            assert_eq!(SessionToken::kind_of(token.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_generated_tokens_differ() {
        let a = SessionToken::generate(PrincipalKind::User);
        let b = SessionToken::generate(PrincipalKind::User);
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_tokens_have_no_kind() {
        assert_eq!(SessionToken::kind_of(""), None);
        assert_eq!(SessionToken::kind_of("U"), None);
        assert_eq!(SessionToken::kind_of("X123"), None);
        assert_eq!(SessionToken::kind_of("U12a3"), None);
        assert_eq!(SessionToken::kind_of("u123"), None);
    }

    #[test]
    fn test_debug_hides_full_token() {
        let token = SessionToken("A1234567890123".into());
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("1234567890123"));
        assert!(rendered.contains("A12345..."));
    }

    #[test]
    fn test_ended_session_is_inactive() {
        let token = SessionToken::generate(PrincipalKind::Admin);
        let mut session = Session::new(&token, 1, 1, Role::Admin);
        assert!(session.is_active());

        session.end(Utc::now());
        assert!(!session.is_active());
        assert!(session.end_utc.is_some());
    }
}
