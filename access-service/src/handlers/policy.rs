use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    models::{AuthContext, Lookup, Policy},
    services::ServiceError,
    AppState,
};

/// The calling user's own policy.
pub async fn my_policy(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Policy>, AppError> {
    let policy = state
        .policies
        .policy_for_user(ctx.domain_id, &Lookup::Id(ctx.principal_id))
        .await?;
    Ok(Json(policy))
}

/// Every grant in the admin's working domain.
pub async fn domain_policy(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Policy>, AppError> {
    let policy = state.policies.policy_for_domain(ctx.domain_id).await?;
    Ok(Json(policy))
}

/// One user's policy, addressed by id or name within the working domain.
pub async fn user_policy(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user): Path<String>,
) -> Result<Json<Policy>, AppError> {
    let user = Lookup::parse(&user).map_err(ServiceError::from)?;
    let policy = state.policies.policy_for_user(ctx.domain_id, &user).await?;
    Ok(Json(policy))
}
