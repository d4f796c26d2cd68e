//! PostgreSQL-backed directory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Postgres, QueryBuilder};

use super::error::ServiceError;
use super::store::{DirectoryStore, PolicySource};
use crate::models::{
    App, AuthContext, Domain, Grant, GrantSubject, Group, Lookup, NewPrincipal, PolicyRow,
    Principal, PrincipalKind, PrincipalRow, PrincipalUpdate, Session, SessionRow,
};

const POLICY_COLUMNS: &str = "s.name AS service_name, s.wg_key, s.virtual_ip, s.public_ip, \
     s.local_ip, a.name AS app_name, a.allowed_ips";

const ACTIVE_CHAIN: &str =
    "g.status_code = 'A' AND a.status_code = 'A' AND s.status_code = 'A'";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_lookup(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, lookup: &Lookup) {
    match lookup {
        Lookup::Id(id) => {
            qb.push(format!(" AND {alias}.id = ")).push_bind(*id);
        }
        Lookup::Name(name) => {
            qb.push(format!(" AND {alias}.name = ")).push_bind(name.clone());
        }
    }
}

fn principal_select(kind: PrincipalKind) -> String {
    let network = if kind.has_network() {
        "p.wg_key, p.local_ip, p.public_ip, p.virtual_ip"
    } else {
        "NULL::text AS wg_key, NULL::text AS local_ip, NULL::text AS public_ip, NULL::text AS virtual_ip"
    };

    format!(
        "SELECT p.id, p.name, p.password, d.id AS domain_id, d.name AS domain_name, {network} \
         FROM {} p JOIN domains d ON p.domain_id = d.id \
         WHERE p.status_code = 'A' AND d.status_code = 'A'",
        kind.table()
    )
}

fn conflict_on_duplicate(what: String) -> impl FnOnce(sqlx::Error) -> ServiceError {
    move |e| {
        let err = ServiceError::Database(e);
        if err.is_unique_violation() {
            ServiceError::Conflict(what)
        } else {
            err
        }
    }
}

async fn subject_id(
    conn: &mut PgConnection,
    subject: GrantSubject,
    domain_id: i64,
    lookup: &Lookup,
) -> Result<Option<i64>, ServiceError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT t.id FROM {} t WHERE t.status_code = 'A' AND t.domain_id = ",
        subject.subject_table()
    ));
    qb.push_bind(domain_id);
    push_lookup(&mut qb, "t", lookup);

    Ok(qb.build_query_scalar::<i64>().fetch_optional(conn).await?)
}

async fn app_id(
    conn: &mut PgConnection,
    domain_id: i64,
    lookup: &Lookup,
) -> Result<Option<i64>, ServiceError> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT a.id FROM apps a JOIN services s ON a.service_id = s.id \
         WHERE a.status_code = 'A' AND s.status_code = 'A' AND s.domain_id = ",
    );
    qb.push_bind(domain_id);
    push_lookup(&mut qb, "a", lookup);
    qb.push(" ORDER BY a.id LIMIT 1");

    Ok(qb.build_query_scalar::<i64>().fetch_optional(conn).await?)
}

fn policy_query(source: PolicySource) -> (String, Vec<i64>) {
    let user_grants = "FROM user_access_control g JOIN apps a ON g.app_id = a.id \
                       JOIN services s ON a.service_id = s.id \
                       JOIN users u ON g.user_id = u.id AND u.status_code = 'A'";
    let group_grants = "FROM group_access_control g JOIN apps a ON g.app_id = a.id \
                        JOIN services s ON a.service_id = s.id \
                        JOIN user_groups ug ON g.group_id = ug.id AND ug.status_code = 'A'";

    match source {
        PolicySource::UserDirect { domain_id, user_id } => (
            format!(
                "SELECT {POLICY_COLUMNS} {user_grants} \
                 WHERE g.user_id = $1 AND s.domain_id = $2 AND {ACTIVE_CHAIN} ORDER BY g.id"
            ),
            vec![user_id, domain_id],
        ),
        PolicySource::UserGroups { domain_id, user_id } => (
            format!(
                "SELECT {POLICY_COLUMNS} {group_grants} \
                 WHERE g.group_id IN (SELECT m.group_id FROM group_members m \
                     WHERE m.user_id = $1) \
                 AND s.domain_id = $2 AND {ACTIVE_CHAIN} ORDER BY g.id"
            ),
            vec![user_id, domain_id],
        ),
        PolicySource::DomainDirect { domain_id } => (
            format!(
                "SELECT {POLICY_COLUMNS} {user_grants} \
                 WHERE s.domain_id = $1 AND {ACTIVE_CHAIN} ORDER BY g.id"
            ),
            vec![domain_id],
        ),
        PolicySource::DomainGroups { domain_id } => (
            format!(
                "SELECT {POLICY_COLUMNS} {group_grants} \
                 WHERE s.domain_id = $1 AND {ACTIVE_CHAIN} ORDER BY g.id"
            ),
            vec![domain_id],
        ),
    }
}

#[async_trait]
impl DirectoryStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError> {
        let domains = sqlx::query_as::<_, Domain>(
            "SELECT id, name, status_code FROM domains WHERE status_code = 'A' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(domains)
    }

    async fn find_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT d.id, d.name, d.status_code FROM domains d WHERE d.status_code = 'A'",
        );
        push_lookup(&mut qb, "d", lookup);

        Ok(qb.build_query_as::<Domain>().fetch_optional(&self.pool).await?)
    }

    async fn create_domain(&self, name: &str) -> Result<Domain, ServiceError> {
        sqlx::query_as::<_, Domain>(
            "INSERT INTO domains (name) VALUES ($1) RETURNING id, name, status_code",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_duplicate(format!("Domain {name} already exists")))
    }

    async fn delete_domain(&self, lookup: &Lookup) -> Result<Option<Domain>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT d.id, d.name, d.status_code FROM domains d WHERE d.status_code = 'A'",
        );
        push_lookup(&mut qb, "d", lookup);
        qb.push(" FOR UPDATE");

        let Some(domain) = qb.build_query_as::<Domain>().fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };

        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM admins WHERE domain_id = $1 AND status_code = 'A')
                OR EXISTS (SELECT 1 FROM users WHERE domain_id = $1 AND status_code = 'A')
                OR EXISTS (SELECT 1 FROM services WHERE domain_id = $1 AND status_code = 'A')
                OR EXISTS (SELECT 1 FROM user_groups WHERE domain_id = $1 AND status_code = 'A')
                OR EXISTS (SELECT 1 FROM sessions WHERE domain_id = $1 AND status_code = 'A')
            "#,
        )
        .bind(domain.id)
        .fetch_one(&mut *tx)
        .await?;

        if in_use {
            return Err(ServiceError::Conflict(format!(
                "Domain {} still has active members or sessions",
                domain.name
            )));
        }

        let deleted = sqlx::query_as::<_, Domain>(
            "UPDATE domains SET status_code = 'D' WHERE id = $1 RETURNING id, name, status_code",
        )
        .bind(domain.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(deleted))
    }

    async fn create_principal(&self, new: &NewPrincipal) -> Result<Principal, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let domain = sqlx::query_as::<_, Domain>(
            "SELECT id, name, status_code FROM domains WHERE id = $1 AND status_code = 'A'",
        )
        .bind(new.domain_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::UnknownTenant(new.domain_id.to_string()))?;

        let duplicate = format!("{} {} already exists", new.kind, new.name);
        let id: i64 = if new.kind.has_network() {
            sqlx::query_scalar(&format!(
                "INSERT INTO {} (domain_id, name, password, wg_key, local_ip, public_ip, virtual_ip) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                new.kind.table()
            ))
            .bind(domain.id)
            .bind(&new.name)
            .bind(&new.password)
            .bind(&new.network.wg_key)
            .bind(&new.network.local_ip)
            .bind(&new.network.public_ip)
            .bind(&new.network.virtual_ip)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_on_duplicate(duplicate))?
        } else {
            sqlx::query_scalar(
                "INSERT INTO admins (domain_id, name, password) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(domain.id)
            .bind(&new.name)
            .bind(&new.password)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_on_duplicate(duplicate))?
        };

        if new.kind == PrincipalKind::Service {
            sqlx::query("INSERT INTO apps (service_id, name) VALUES ($1, $2)")
                .bind(id)
                .bind(&new.name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let network = new.kind.has_network().then(|| new.network.clone());
        Ok(PrincipalRow {
            id,
            name: new.name.clone(),
            password: new.password.clone(),
            domain_id: domain.id,
            domain_name: domain.name,
            wg_key: network.as_ref().map(|n| n.wg_key.clone()),
            local_ip: network.as_ref().map(|n| n.local_ip.clone()),
            public_ip: network.as_ref().map(|n| n.public_ip.clone()),
            virtual_ip: network.as_ref().map(|n| n.virtual_ip.clone()),
        }
        .into_principal(new.kind))
    }

    async fn find_principal_for_login(
        &self,
        kind: PrincipalKind,
        name: &str,
        domain_name: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let sql = format!("{} AND p.name = $1 AND d.name = $2", principal_select(kind));
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(name)
            .bind(domain_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_principal(kind)))
    }

    async fn find_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
    ) -> Result<Option<Principal>, ServiceError> {
        let mut qb = QueryBuilder::<Postgres>::new(principal_select(kind));
        qb.push(" AND d.id = ").push_bind(domain_id);
        push_lookup(&mut qb, "p", lookup);

        let row = qb
            .build_query_as::<PrincipalRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_principal(kind)))
    }

    async fn update_principal(
        &self,
        kind: PrincipalKind,
        domain_id: i64,
        lookup: &Lookup,
        update: &PrincipalUpdate,
    ) -> Result<Option<Principal>, ServiceError> {
        if !kind.has_network() && update.touches_network() {
            return Err(ServiceError::Validation(format!(
                "{kind} records have no network fields"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT p.id FROM {} p WHERE p.status_code = 'A' AND p.domain_id = ",
            kind.table()
        ));
        qb.push_bind(domain_id);
        push_lookup(&mut qb, "p", lookup);
        qb.push(" FOR UPDATE");

        let Some(id) = qb.build_query_scalar::<i64>().fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };

        let assignments = update.assignments();
        if !assignments.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", kind.table()));
            let mut columns = qb.separated(", ");
            for (column, value) in assignments {
                columns.push(column);
                columns.push_unseparated(" = ");
                columns.push_bind_unseparated(value.to_string());
            }
            qb.push(" WHERE id = ").push_bind(id);

            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(conflict_on_duplicate(format!("{kind} name already in use")))?;
        }

        tx.commit().await?;
        self.find_principal(kind, domain_id, &Lookup::Id(id)).await
    }

    async fn create_group(&self, domain_id: i64, name: &str) -> Result<Group, ServiceError> {
        let domain_active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM domains WHERE id = $1 AND status_code = 'A')",
        )
        .bind(domain_id)
        .fetch_one(&self.pool)
        .await?;
        if !domain_active {
            return Err(ServiceError::UnknownTenant(domain_id.to_string()));
        }

        sqlx::query_as::<_, Group>(
            "INSERT INTO user_groups (domain_id, name) VALUES ($1, $2) \
             RETURNING id, domain_id, name, status_code",
        )
        .bind(domain_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_duplicate(format!("Group {name} already exists")))
    }

    async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_app(
        &self,
        service_id: i64,
        name: &str,
        allowed_ips: Option<&str>,
    ) -> Result<App, ServiceError> {
        let service_active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM services WHERE id = $1 AND status_code = 'A')",
        )
        .bind(service_id)
        .fetch_one(&self.pool)
        .await?;
        if !service_active {
            return Err(ServiceError::NotFound(format!("Service {service_id}")));
        }

        let app = sqlx::query_as::<_, App>(
            "INSERT INTO apps (service_id, name, allowed_ips) VALUES ($1, $2, $3) \
             RETURNING id, service_id, name, allowed_ips, status_code",
        )
        .bind(service_id)
        .bind(name)
        .bind(allowed_ips)
        .fetch_one(&self.pool)
        .await?;
        Ok(app)
    }

    async fn grant_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<Grant, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let subject_id = subject_id(&mut tx, subject, domain_id, subject_lookup)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} {subject_lookup}", subject.as_str())))?;
        let app_id = app_id(&mut tx, domain_id, app_lookup)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("App {app_lookup}")))?;

        let table = subject.grant_table();
        let column = subject.subject_column();

        sqlx::query(&format!(
            "DELETE FROM {table} WHERE {column} = $1 AND app_id = $2"
        ))
        .bind(subject_id)
        .bind(app_id)
        .execute(&mut *tx)
        .await?;

        let grant = sqlx::query_as::<_, Grant>(&format!(
            "INSERT INTO {table} ({column}, app_id) VALUES ($1, $2) \
             RETURNING id, {column} AS subject_id, app_id, status_code"
        ))
        .bind(subject_id)
        .bind(app_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(grant)
    }

    async fn revoke_app(
        &self,
        subject: GrantSubject,
        domain_id: i64,
        subject_lookup: &Lookup,
        app_lookup: &Lookup,
    ) -> Result<u64, ServiceError> {
        let mut conn = self.pool.acquire().await?;

        let Some(subject_id) = subject_id(&mut conn, subject, domain_id, subject_lookup).await?
        else {
            return Ok(0);
        };
        let Some(app_id) = app_id(&mut conn, domain_id, app_lookup).await? else {
            return Ok(0);
        };

        let result = sqlx::query(&format!(
            "UPDATE {} SET status_code = 'D' WHERE {} = $1 AND app_id = $2 AND status_code = 'A'",
            subject.grant_table(),
            subject.subject_column()
        ))
        .bind(subject_id)
        .bind(app_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, principal_id, domain_id, role_code, start_utc, end_utc, status_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.token)
        .bind(session.principal_id)
        .bind(session.domain_id)
        .bind(&session.role_code)
        .bind(session.start_utc)
        .bind(session.end_utc)
        .bind(&session.status_code)
        .execute(&self.pool)
        .await
        .map_err(conflict_on_duplicate("Session token already issued".to_string()))?;
        Ok(())
    }

    async fn find_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Option<AuthContext>, ServiceError> {
        let sql = format!(
            "SELECT s.token, s.role_code, p.id AS principal_id, p.name AS principal_name, \
                    d.id AS domain_id, d.name AS domain_name \
             FROM sessions s \
             JOIN {} p ON s.principal_id = p.id \
             JOIN domains d ON s.domain_id = d.id \
             WHERE s.token = $1 AND s.status_code = 'A' \
               AND p.status_code = 'A' AND d.status_code = 'A'",
            kind.table()
        );

        let Some(row) = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        AuthContext::from_row(kind, row)
            .map(Some)
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Session carries an unknown role code")))
    }

    async fn end_session(&self, token: &str, at: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE sessions SET status_code = 'D', end_utc = $2 WHERE token = $1 AND status_code = 'A'",
        )
        .bind(token)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn rehome_session(&self, token: &str, domain_id: i64) -> Result<u64, ServiceError> {
        // The key-share lock taken through the domains foreign key orders this
        // against a concurrent domain delete.
        let result = sqlx::query(
            r#"
            UPDATE sessions SET domain_id = $2
            WHERE token = $1 AND status_code = 'A'
              AND EXISTS (SELECT 1 FROM domains WHERE id = $2 AND status_code = 'A')
            "#,
        )
        .bind(token)
        .bind(domain_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn policy_rows(&self, source: PolicySource) -> Result<Vec<PolicyRow>, ServiceError> {
        let (sql, binds) = policy_query(source);

        let mut query = sqlx::query_as::<_, PolicyRow>(&sql);
        for value in binds {
            query = query.bind(value);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}
