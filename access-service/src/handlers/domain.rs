use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::auth::LoginResponse,
    models::{AuthContext, Domain, Lookup, Role},
    services::ServiceError,
    AppState,
};

#[axum::debug_handler]
pub async fn change_domain(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(target): Path<String>,
) -> Result<Json<LoginResponse>, AppError> {
    let target = Lookup::parse(&target).map_err(ServiceError::from)?;
    let ctx = state.domain_switch.switch(&ctx, &target).await?;
    Ok(Json(LoginResponse::new(
        &ctx,
        state.config.branding.default_icon_id,
    )))
}

#[axum::debug_handler]
pub async fn delete_domain(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(target): Path<String>,
) -> Result<Json<Domain>, AppError> {
    if ctx.role != Role::PowerAdmin {
        return Err(ServiceError::RoleMismatch {
            actual: ctx.role,
            route: "domain delete",
        }
        .into());
    }

    let target = Lookup::parse(&target).map_err(ServiceError::from)?;
    let power_domain_id = state.config.api.power_domain_id;

    if let Lookup::Id(id) = target {
        if id == power_domain_id {
            return Err(ServiceError::Conflict("The power domain cannot be deleted".into()).into());
        }
    }

    let Some(existing) = state.store.find_domain(&target).await? else {
        return Err(ServiceError::NotFound(format!("Domain {target}")).into());
    };
    if existing.id == power_domain_id {
        return Err(ServiceError::Conflict("The power domain cannot be deleted".into()).into());
    }

    let domain = state
        .store
        .delete_domain(&Lookup::Id(existing.id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Domain {target}")))?;

    tracing::info!(
        domain_id = domain.id,
        domain = %domain.name,
        admin = %ctx.principal_name,
        "Domain deleted"
    );
    Ok(Json(domain))
}
