pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AccessConfig;
use crate::services::{
    Authenticator, DirectoryStore, DomainSwitch, PolicyAggregator, SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub store: Arc<dyn DirectoryStore>,
    pub sessions: SessionRegistry,
    pub authenticator: Authenticator,
    pub policies: PolicyAggregator,
    pub domain_switch: DomainSwitch,
}

impl AppState {
    /// Wires every component to the one store handle.
    pub fn new(config: AccessConfig, store: Arc<dyn DirectoryStore>) -> Self {
        let sessions = SessionRegistry::new(store.clone());
        let authenticator = Authenticator::new(
            store.clone(),
            sessions.clone(),
            config.api.base_path.clone(),
            config.api.power_domain_id,
        );
        let policies = PolicyAggregator::new(store.clone());
        let domain_switch = DomainSwitch::new(store.clone(), sessions.clone());

        Self {
            config,
            store,
            sessions,
            authenticator,
            policies,
            domain_switch,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let base = state.config.api.base_path.clone();
    let at = |path: &str| format!("{base}{path}");

    let api = Router::new()
        .route(&at("/login"), get(handlers::login))
        .route(&at("/servicelogin"), get(handlers::login))
        .route(&at("/adminlogin"), get(handlers::login))
        .route(&at("/logout"), get(handlers::logout))
        .route(&at("/userapi/logout"), get(handlers::logout))
        .route(&at("/serviceapi/logout"), get(handlers::logout))
        .route(&at("/userapi/policies"), get(handlers::my_policy))
        .route(&at("/policies"), get(handlers::domain_policy))
        .route(&at("/policies/:id"), get(handlers::user_policy))
        .route(&at("/changedomain/:id"), post(handlers::change_domain))
        .route(
            &at("/users/access/:id/:app"),
            post(handlers::grant_user_access).delete(handlers::revoke_user_access),
        )
        .route(
            &at("/groups/access/:id/:app"),
            post(handlers::grant_group_access).delete(handlers::revoke_group_access),
        )
        .route(&at("/users/:id"), put(handlers::update_user))
        .route(&at("/domains/:id"), delete(handlers::delete_domain))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::authentication_gate,
        ));

    let origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(REQUEST_ID_HEADER),
                ])
                .expose_headers([header::WWW_AUTHENTICATE]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": format!("{:?}", state.config.store).to_lowercase(),
        }
    })))
}
