use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::principal::PrincipalResponse,
    models::{AuthContext, Lookup, PrincipalKind, PrincipalUpdate},
    services::ServiceError,
    utils::validation::ValidatedJson,
    AppState,
};

/// Sparse update of a user in the admin's working domain.
#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user): Path<String>,
    ValidatedJson(update): ValidatedJson<PrincipalUpdate>,
) -> Result<Json<PrincipalResponse>, AppError> {
    let user = Lookup::parse(&user).map_err(ServiceError::from)?;

    if update.is_empty() {
        return Err(ServiceError::Validation("No fields to update".into()).into());
    }

    let principal = state
        .store
        .update_principal(PrincipalKind::User, ctx.domain_id, &user, &update)
        .await?
        .ok_or_else(|| ServiceError::UnknownPrincipal(user.to_string()))?;

    tracing::info!(
        user_id = principal.id(),
        fields = ?update.assignments().iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        "User updated"
    );
    Ok(Json(PrincipalResponse::from(&principal)))
}
