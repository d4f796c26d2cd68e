//! Shared setup for access-service integration tests.
//!
//! Every test gets its own in-memory directory seeded with a power domain,
//! an `acme` domain with two users and two services, and an empty
//! `globex` domain. Requests go straight to the router via `oneshot`.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, ApiConfig, BootstrapConfig, BrandingConfig, DatabaseConfig, Environment,
        SecurityConfig, StoreBackend,
    },
    dtos::auth::LoginResponse,
    models::{Domain, Group, Lookup, NetworkIdentity, NewPrincipal, Principal, GrantSubject},
    services::{DirectoryStore, MemoryStore},
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const API: &str = "/api/v1";
pub const ICON_ID: i64 = 23;

pub const ROOT_PASSWORD: &str = "r00t-pw";
pub const BOSS_PASSWORD: &str = "b0ss-pw";
pub const ALICE_PASSWORD: &str = "alice-pw";
pub const BOB_PASSWORD: &str = "bob-pw";
pub const SERVICE_PASSWORD: &str = "svc-pw";

pub fn test_config() -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        api: ApiConfig {
            base_path: API.to_string(),
            power_domain_id: 1,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        branding: BrandingConfig {
            default_icon_id: ICON_ID,
        },
        bootstrap: BootstrapConfig {
            admin_name: "root".to_string(),
            admin_password: None,
        },
    }
}

fn network(octet: u8) -> NetworkIdentity {
    NetworkIdentity {
        wg_key: format!("wg-key-{octet}"),
        local_ip: format!("192.168.1.{octet}"),
        public_ip: format!("203.0.113.{octet}"),
        virtual_ip: format!("10.8.0.{octet}"),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub power: Domain,
    pub acme: Domain,
    pub globex: Domain,
    pub alice: Principal,
    pub bob: Principal,
    pub vpn1: Principal,
    pub vpn1b: Principal,
    pub eng: Group,
}

impl TestApp {
    pub async fn spawn() -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let power = seed_power(&store).await?;
        let acme = store.create_domain("acme").await?;
        let globex = store.create_domain("globex").await?;

        store
            .create_principal(&NewPrincipal::admin(acme.id, "boss", BOSS_PASSWORD))
            .await?;
        let alice = store
            .create_principal(&NewPrincipal::user(acme.id, "alice", ALICE_PASSWORD, network(11)))
            .await?;
        let bob = store
            .create_principal(&NewPrincipal::user(acme.id, "bob", BOB_PASSWORD, network(12)))
            .await?;
        let vpn1 = store
            .create_principal(&NewPrincipal::service(acme.id, "vpn1", SERVICE_PASSWORD, network(1)))
            .await?;
        let vpn1b = store
            .create_principal(&NewPrincipal::service(acme.id, "vpn1b", SERVICE_PASSWORD, network(2)))
            .await?;
        let eng = store.create_group(acme.id, "eng").await?;
        store.add_group_member(eng.id, alice.id()).await?;

        let state = AppState::new(test_config(), store.clone() as Arc<dyn DirectoryStore>);
        let router = build_router(state.clone())?;

        Ok(Self {
            router,
            state,
            store,
            power,
            acme,
            globex,
            alice,
            bob,
            vpn1,
            vpn1b,
            eng,
        })
    }

    /// alice gets `vpn1` directly; `eng` gets `vpn1b`.
    pub async fn seed_grants(&self) {
        self.grant(GrantSubject::User, "alice", "vpn1").await;
        self.grant(GrantSubject::Group, "eng", "vpn1b").await;
    }

    pub async fn grant(&self, subject: GrantSubject, name: &str, app: &str) {
        self.store
            .grant_app(
                subject,
                self.acme.id,
                &Lookup::Name(name.to_string()),
                &Lookup::Name(app.to_string()),
            )
            .await
            .expect("Failed to seed grant");
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        authorization: Option<String>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{API}{path}"));
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("Failed to build request"))
            .await
            .expect("Router failed")
    }

    pub async fn get(&self, path: &str, authorization: Option<String>) -> Response {
        self.send(Method::GET, path, authorization, None).await
    }

    /// Logs in on `route` and returns the parsed payload.
    pub async fn login(&self, route: &str, login: &str, password: &str) -> LoginResponse {
        let res = self.get(route, Some(basic(login, password))).await;
        assert_eq!(res.status(), StatusCode::OK, "login {login} on {route}");
        serde_json::from_value(body_json(res).await).expect("Invalid login payload")
    }

    pub async fn admin_token(&self) -> String {
        self.login("/adminlogin", "boss@acme", BOSS_PASSWORD).await.token
    }

    pub async fn power_token(&self) -> String {
        self.login("/adminlogin", "root@power", ROOT_PASSWORD).await.token
    }

    pub async fn alice_token(&self) -> String {
        self.login("/login", "alice@acme", ALICE_PASSWORD).await.token
    }
}

/// Creates the power domain (id 1) and its `root` operator.
pub async fn seed_power(store: &MemoryStore) -> Result<Domain, Box<dyn std::error::Error>> {
    let power = store.create_domain("power").await?;
    store
        .create_principal(&NewPrincipal::admin(power.id, "root", ROOT_PASSWORD))
        .await?;
    Ok(power)
}

/// Router over an arbitrary store, for tests that need a custom layout.
pub fn router_for(store: Arc<MemoryStore>) -> Router {
    let state = AppState::new(test_config(), store as Arc<dyn DirectoryStore>);
    build_router(state).expect("Failed to build router")
}

pub fn basic(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{login}:{password}")))
}

pub fn bearer(token: &str) -> Option<String> {
    Some(format!("Bearer {token}"))
}

pub async fn body_json(res: Response) -> Value {
    let bytes = res
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub fn challenge(res: &Response) -> Option<String> {
    res.headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
