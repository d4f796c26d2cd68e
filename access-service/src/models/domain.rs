//! Domain model - the tenant boundary every record belongs to.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::RecordStatus;

/// Domain entity. Names are unique among active domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    #[serde(skip, default = "active_code")]
    pub status_code: String,
}

fn active_code() -> String {
    RecordStatus::Active.as_str().to_string()
}

impl Domain {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status_code: active_code(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status_code == RecordStatus::Active.as_str()
    }
}

/// Picks the domain a power-admin lands in after login: the first active
/// non-power domain by name, falling back to the power domain itself.
pub fn select_working_domain(domains: &[Domain], power_domain: &Domain) -> Domain {
    let mut candidates: Vec<&Domain> = domains
        .iter()
        .filter(|d| d.is_active() && d.id != power_domain.id)
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    candidates
        .first()
        .map(|d| (*d).clone())
        .unwrap_or_else(|| power_domain.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_domain_prefers_first_tenant_by_name() {
        let power = Domain::new(1, "power");
        let domains = vec![
            power.clone(),
            Domain::new(3, "zeta"),
            Domain::new(2, "acme"),
        ];

        assert_eq!(select_working_domain(&domains, &power).name, "acme");
    }

    #[test]
    fn test_working_domain_skips_inactive() {
        let power = Domain::new(1, "power");
        let mut retired = Domain::new(2, "acme");
        retired.status_code = RecordStatus::Deleted.as_str().to_string();

        let domains = vec![power.clone(), retired, Domain::new(3, "beta")];
        assert_eq!(select_working_domain(&domains, &power).name, "beta");
    }

    #[test]
    fn test_working_domain_falls_back_to_power() {
        let power = Domain::new(1, "power");
        assert_eq!(select_working_domain(&[power.clone()], &power), power);
        assert_eq!(select_working_domain(&[], &power), power);
    }
}
