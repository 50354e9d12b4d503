// src/db/policy_repo.rs

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::PolicyStore,
    models::{
        permissions::{CapabilityMap, Limit, LimitMap, TenantPolicy, UserOverride},
        tenancy::{Tenant, TenantMember},
    },
    services::permission_resolver::resolve,
};

// O repositório de políticas, responsável pelas tabelas 'tenants' e 'tenant_members'
#[derive(Clone)]
pub struct PolicyRepository {
    pool: PgPool,
}

impl PolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PolicyRepository {
    async fn create_tenant(
        &self,
        name: &str,
        policy: &TenantPolicy,
        owner_id: Uuid,
    ) -> Result<Tenant, AppError> {
        // 1. Inicia Transação
        let mut tx = self.pool.begin().await?;

        // 2. Cria o Tenant com a política inicial
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, capabilities, limits)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_at, updated_at
            "#,
        )
            .bind(name)
            .bind(Json(&policy.capabilities))
            .bind(Json(&policy.limits))
            .fetch_one(&mut *tx)
            .await?;

        // 3. Vincula o dono com override vazio
        sqlx::query("INSERT INTO tenant_members (tenant_id, user_id) VALUES ($1, $2)")
            .bind(tenant.id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        // 4. Commit
        tx.commit().await?;

        Ok(tenant)
    }

    async fn find_tenant_policy(&self, tenant_id: Uuid) -> Result<Option<TenantPolicy>, AppError> {
        let row = sqlx::query_as::<_, (Json<CapabilityMap>, Json<LimitMap>)>(
            "SELECT capabilities, limits FROM tenants WHERE id = $1",
        )
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(Json(capabilities), Json(limits))| TenantPolicy { capabilities, limits }))
    }

    async fn update_tenant_policy(
        &self,
        tenant_id: Uuid,
        policy: &TenantPolicy,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET capabilities = $2, limits = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
            .bind(tenant_id)
            .bind(Json(&policy.capabilities))
            .bind(Json(&policy.limits))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_user_override(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserOverride>, AppError> {
        let row = sqlx::query_as::<_, (Json<UserOverride>,)>(
            "SELECT overrides FROM tenant_members WHERE tenant_id = $1 AND user_id = $2",
        )
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(Json(overrides),)| overrides))
    }

    async fn upsert_member_within_limit(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        overrides: &UserOverride,
        limit: Limit,
    ) -> Result<TenantMember, AppError> {
        // 1. Inicia Transação
        let mut tx = self.pool.begin().await?;

        // 2. Trava a linha do tenant: inserções concorrentes na mesma empresa fazem fila aqui
        let row = sqlx::query_as::<_, (Json<CapabilityMap>, Json<LimitMap>)>(
            "SELECT capabilities, limits FROM tenants WHERE id = $1 FOR UPDATE",
        )
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some((Json(capabilities), Json(limits))) = row else {
            return Err(AppError::TenantNotFound);
        };
        let policy = TenantPolicy { capabilities, limits };

        // 3. Membro novo precisa caber no limite
        let existing = sqlx::query_as::<_, (i32,)>(
            "SELECT 1 FROM tenant_members WHERE tenant_id = $1 AND user_id = $2",
        )
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_none() {
            let (count,) = sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM tenant_members WHERE tenant_id = $1",
            )
                .bind(tenant_id)
                .fetch_one(&mut *tx)
                .await?;

            let current = u64::try_from(count).unwrap_or(0);
            if !resolve(&policy, &UserOverride::default()).within_limit(limit, current) {
                // Sem commit: o drop da transação faz o rollback
                return Err(AppError::LimitExceeded(limit));
            }
        }

        // 4. UPSERT (Insert or Update)
        let member = sqlx::query_as::<_, TenantMember>(
            r#"
            INSERT INTO tenant_members (tenant_id, user_id, overrides)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, user_id)
            DO UPDATE SET
                overrides = EXCLUDED.overrides,
                updated_at = NOW()
            RETURNING tenant_id, user_id, overrides, created_at, updated_at
            "#,
        )
            .bind(tenant_id)
            .bind(user_id)
            .bind(Json(overrides))
            .fetch_one(&mut *tx)
            .await?;

        // 5. Commit
        tx.commit().await?;

        Ok(member)
    }

    async fn delete_member(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tenant_members WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<TenantMember>, AppError> {
        let members = sqlx::query_as::<_, TenantMember>(
            r#"
            SELECT tenant_id, user_id, overrides, created_at, updated_at
            FROM tenant_members
            WHERE tenant_id = $1
            ORDER BY created_at
            "#,
        )
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(members)
    }
}
