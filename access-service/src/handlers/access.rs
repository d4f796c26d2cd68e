use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::access::RowsAffectedResponse,
    models::{AuthContext, GrantSubject, GroupGrant, Lookup, UserGrant},
    services::ServiceError,
    AppState,
};

fn parse_pair(subject: &str, app: &str) -> Result<(Lookup, Lookup), ServiceError> {
    Ok((Lookup::parse(subject)?, Lookup::parse(app)?))
}

pub async fn grant_user_access(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((user, app)): Path<(String, String)>,
) -> Result<(StatusCode, Json<UserGrant>), AppError> {
    let (user, app) = parse_pair(&user, &app)?;
    let grant = state
        .store
        .grant_app(GrantSubject::User, ctx.domain_id, &user, &app)
        .await?;

    tracing::info!(user = %user, app = %app, domain_id = ctx.domain_id, "User access granted");
    Ok((StatusCode::CREATED, Json(grant.into())))
}

pub async fn revoke_user_access(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((user, app)): Path<(String, String)>,
) -> Result<Json<RowsAffectedResponse>, AppError> {
    let (user, app) = parse_pair(&user, &app)?;
    let rows_affected = state
        .store
        .revoke_app(GrantSubject::User, ctx.domain_id, &user, &app)
        .await?;

    tracing::info!(user = %user, app = %app, rows_affected, "User access revoked");
    Ok(Json(RowsAffectedResponse { rows_affected }))
}

pub async fn grant_group_access(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((group, app)): Path<(String, String)>,
) -> Result<(StatusCode, Json<GroupGrant>), AppError> {
    let (group, app) = parse_pair(&group, &app)?;
    let grant = state
        .store
        .grant_app(GrantSubject::Group, ctx.domain_id, &group, &app)
        .await?;

    tracing::info!(group = %group, app = %app, domain_id = ctx.domain_id, "Group access granted");
    Ok((StatusCode::CREATED, Json(grant.into())))
}

pub async fn revoke_group_access(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((group, app)): Path<(String, String)>,
) -> Result<Json<RowsAffectedResponse>, AppError> {
    let (group, app) = parse_pair(&group, &app)?;
    let rows_affected = state
        .store
        .revoke_app(GrantSubject::Group, ctx.domain_id, &group, &app)
        .await?;

    tracing::info!(group = %group, app = %app, rows_affected, "Group access revoked");
    Ok(Json(RowsAffectedResponse { rows_affected }))
}
