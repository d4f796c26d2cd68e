use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use super::{session::SessionRegistry, store::DirectoryStore, ServiceError};
use crate::models::{select_working_domain, AuthContext, PrincipalKind, Role};

/// Which credential a request path expects and which roles may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Login(PrincipalKind),
    UserApi,
    ServiceApi,
    AdminApi,
}

impl RouteClass {
    pub fn classify(api_base: &str, path: &str) -> Self {
        let rest = path.strip_prefix(api_base).unwrap_or(path);
        match rest {
            "/login" => RouteClass::Login(PrincipalKind::User),
            "/servicelogin" => RouteClass::Login(PrincipalKind::Service),
            "/adminlogin" => RouteClass::Login(PrincipalKind::Admin),
            _ if rest.starts_with("/userapi/") => RouteClass::UserApi,
            _ if rest.starts_with("/serviceapi/") => RouteClass::ServiceApi,
            _ => RouteClass::AdminApi,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        match self {
            RouteClass::Login(kind) => {
                kind.base_role() == role || (*kind == PrincipalKind::Admin && role.is_admin())
            }
            RouteClass::UserApi => role == Role::User,
            RouteClass::ServiceApi => role == Role::Service,
            RouteClass::AdminApi => role.is_admin(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RouteClass::Login(_) => "login",
            RouteClass::UserApi => "user api",
            RouteClass::ServiceApi => "service api",
            RouteClass::AdminApi => "admin api",
        }
    }
}

/// Decodes `Authorization: Basic <base64(user:password)>`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Extracts the session token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Splits a login name of the form `name@domain`. Names with no `@` or
/// more than one are rejected.
pub fn split_login(login: &str) -> Option<(&str, &str)> {
    let mut parts = login.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(domain), None) if !name.is_empty() && !domain.is_empty() => {
            Some((name, domain))
        }
        _ => None,
    }
}

/// Turns request credentials into an authenticated context: password
/// logins open a session, every other path resumes one.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn DirectoryStore>,
    sessions: SessionRegistry,
    api_base: String,
    power_domain_id: i64,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        sessions: SessionRegistry,
        api_base: impl Into<String>,
        power_domain_id: i64,
    ) -> Self {
        Self {
            store,
            sessions,
            api_base: api_base.into(),
            power_domain_id,
        }
    }

    pub async fn authenticate(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<AuthContext, ServiceError> {
        let class = RouteClass::classify(&self.api_base, path);

        let ctx = match class {
            RouteClass::Login(kind) => self.login(kind, headers).await?,
            _ => {
                let token = bearer_token(headers).ok_or(ServiceError::MissingCredentials)?;
                self.sessions.resolve(token).await?
            }
        };

        if !class.permits(ctx.role) {
            tracing::warn!(
                principal = %ctx.principal_name,
                role = %ctx.role,
                path,
                "Role not permitted on route"
            );
            return Err(ServiceError::RoleMismatch {
                actual: ctx.role,
                route: class.name(),
            });
        }

        Ok(ctx)
    }

    async fn login(
        &self,
        kind: PrincipalKind,
        headers: &HeaderMap,
    ) -> Result<AuthContext, ServiceError> {
        let (login, password) =
            basic_credentials(headers).ok_or(ServiceError::MissingCredentials)?;
        let (name, domain_name) = split_login(&login).ok_or(ServiceError::InvalidCredentials)?;

        let Some(principal) = self
            .store
            .find_principal_for_login(kind, name, domain_name)
            .await?
        else {
            tracing::warn!(kind = %kind, name, domain = domain_name, "Login for unknown principal");
            return Err(ServiceError::InvalidCredentials);
        };

        if !principal.identity().verify_password(&password) {
            tracing::warn!(kind = %kind, name, domain = domain_name, "Login with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let mut role = kind.base_role();
        let mut domain = principal.domain().clone();

        if kind == PrincipalKind::Admin && domain.id == self.power_domain_id {
            role = Role::PowerAdmin;
            let domains = self.store.list_domains().await?;
            domain = select_working_domain(&domains, &domain);
        }

        let token = self
            .sessions
            .issue(kind, principal.id(), domain.id, role)
            .await?;

        tracing::info!(
            kind = %kind,
            name,
            domain = %domain.name,
            role = %role,
            "Login succeeded"
        );

        Ok(AuthContext {
            kind,
            principal_id: principal.id(),
            principal_name: principal.name().to_string(),
            domain_id: domain.id,
            domain_name: domain.name,
            token: token.into_string(),
            role,
        })
    }
}
