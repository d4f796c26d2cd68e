use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::{dtos::ErrorResponse, models::AuthContext, services::ServiceError, AppState};

/// Authentication gate for every route under the API base. Login paths
/// check basic credentials and open a session; all other paths resume one
/// from the bearer token. The resolved context is attached to the request.
pub async fn authentication_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match state.authenticator.authenticate(&path, req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => reject(err),
    }
}

fn reject(err: ServiceError) -> Response {
    let Some(realm) = err.challenge() else {
        return AppError::from(err).into_response();
    };

    let mut res = (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
        }),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm)) {
        res.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    res
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })
    }
}
