use super::{store::DirectoryStore, ServiceError};
use crate::models::{Lookup, NewPrincipal, PrincipalKind};

const POWER_DOMAIN_NAME: &str = "power";

/// Makes sure the power domain exists and holds an operator account named
/// `admin_name`. Returns `true` when the account had to be created.
pub async fn ensure_operator(
    store: &dyn DirectoryStore,
    power_domain_id: i64,
    admin_name: &str,
    admin_password: &str,
) -> Result<bool, ServiceError> {
    let power = match store.find_domain(&Lookup::Id(power_domain_id)).await? {
        Some(domain) => domain,
        None => {
            let domain = store.create_domain(POWER_DOMAIN_NAME).await?;
            if domain.id != power_domain_id {
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "Power domain was created with id {} but {} is configured",
                    domain.id,
                    power_domain_id
                )));
            }
            tracing::info!(domain_id = domain.id, "Power domain created");
            domain
        }
    };

    let existing = store
        .find_principal(
            PrincipalKind::Admin,
            power.id,
            &Lookup::Name(admin_name.to_string()),
        )
        .await?;
    if existing.is_some() {
        return Ok(false);
    }

    store
        .create_principal(&NewPrincipal::admin(power.id, admin_name, admin_password))
        .await?;
    tracing::info!(admin = admin_name, "Operator account created");
    Ok(true)
}
