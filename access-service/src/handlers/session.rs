use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginResponse, LogoutResponse},
    models::AuthContext,
    AppState,
};

/// Shared by the three login routes; the gate has already checked the
/// credentials and opened the session.
#[axum::debug_handler]
pub async fn login(State(state): State<AppState>, ctx: AuthContext) -> Json<LoginResponse> {
    Json(LoginResponse::new(&ctx, state.config.branding.default_icon_id))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<LogoutResponse>, AppError> {
    state.sessions.invalidate(&ctx.token).await?;

    tracing::info!(
        kind = %ctx.kind,
        principal = %ctx.principal_name,
        token = %ctx.token_fingerprint(),
        "Logged out"
    );

    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}
