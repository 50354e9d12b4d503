// src/db/policy_store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        permissions::{Limit, TenantPolicy, UserOverride},
        tenancy::{Tenant, TenantMember},
    },
};

/// Onde moram as duas camadas de permissão (política do tenant e overrides dos usuários).
///
/// `async_trait` porque o serviço guarda um `Arc<dyn PolicyStore>`:
/// Postgres em produção, memória nos testes.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Cria o tenant com a política inicial e vincula o dono (override vazio), atomicamente.
    async fn create_tenant(
        &self,
        name: &str,
        policy: &TenantPolicy,
        owner_id: Uuid,
    ) -> Result<Tenant, AppError>;

    /// `None` quando o tenant não existe.
    async fn find_tenant_policy(&self, tenant_id: Uuid) -> Result<Option<TenantPolicy>, AppError>;

    /// Retorna `false` quando o tenant não existe.
    async fn update_tenant_policy(
        &self,
        tenant_id: Uuid,
        policy: &TenantPolicy,
    ) -> Result<bool, AppError>;

    /// `None` quando o usuário não é membro do tenant.
    async fn find_user_override(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserOverride>, AppError>;

    /// Cria ou substitui o override do membro, atomicamente.
    ///
    /// Um membro novo só entra se o número atual de membros ainda couber em `limit`
    /// (resolvido a partir da política do tenant); senão `AppError::LimitExceeded`.
    /// Quem já é membro nunca é barrado pelo limite.
    async fn upsert_member_within_limit(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        overrides: &UserOverride,
        limit: Limit,
    ) -> Result<TenantMember, AppError>;

    /// Remove o vínculo e o override junto. `false` se não havia vínculo.
    async fn delete_member(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;

    async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<TenantMember>, AppError>;
}
