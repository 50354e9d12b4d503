// src/services/permission_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::PolicyStore,
    models::{
        permissions::{EffectivePermissions, Limit, TenantPolicy, UserOverride},
        tenancy::{Tenant, TenantMember},
    },
    services::permission_resolver::resolve,
};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn PolicyStore>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Calcula as permissões efetivas do usuário dentro do tenant.
    /// Tenant inexistente ou usuário fora dele é erro de busca: o resolver nem é chamado.
    pub async fn effective_for(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<EffectivePermissions, AppError> {
        let policy = self
            .store
            .find_tenant_policy(tenant_id)
            .await?
            .ok_or(AppError::TenantNotFound)?;

        let overrides = self
            .store
            .find_user_override(tenant_id, user_id)
            .await?
            .ok_or(AppError::NotTenantMember)?;

        Ok(resolve(&policy, &overrides))
    }

    /// LÓGICA DE NEGÓCIO: provisiona a empresa e torna o criador o primeiro membro.
    pub async fn provision_tenant(
        &self,
        name: &str,
        policy: &TenantPolicy,
        owner_id: Uuid,
    ) -> Result<Tenant, AppError> {
        let tenant = self.store.create_tenant(name, policy, owner_id).await?;
        tracing::info!(tenant_id = %tenant.id, owner_id = %owner_id, "🏢 Empresa provisionada");
        Ok(tenant)
    }

    /// Lê a política; só membros enxergam.
    pub async fn tenant_policy(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<TenantPolicy, AppError> {
        self.ensure_member(tenant_id, user_id).await?;
        self.store
            .find_tenant_policy(tenant_id)
            .await?
            .ok_or(AppError::TenantNotFound)
    }

    pub async fn replace_tenant_policy(
        &self,
        tenant_id: Uuid,
        policy: &TenantPolicy,
    ) -> Result<TenantPolicy, AppError> {
        if !self.store.update_tenant_policy(tenant_id, policy).await? {
            return Err(AppError::TenantNotFound);
        }
        tracing::info!(tenant_id = %tenant_id, "🔐 Política da empresa atualizada");
        Ok(policy.clone())
    }

    pub async fn list_members(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<TenantMember>, AppError> {
        self.ensure_member(tenant_id, user_id).await?;
        self.store.list_members(tenant_id).await
    }

    /// Cria ou substitui o override de um membro.
    /// Um membro novo precisa caber no `maxUsers` da empresa; o store confere e insere atomicamente.
    pub async fn set_member_override(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        overrides: &UserOverride,
    ) -> Result<TenantMember, AppError> {
        self.store
            .upsert_member_within_limit(tenant_id, member_id, overrides, Limit::MaxUsers)
            .await
            .inspect_err(|e| {
                if let AppError::LimitExceeded(limit) = e {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        limit = %limit,
                        "⛔ Limite de usuários atingido"
                    );
                }
            })
    }

    pub async fn remove_member(&self, tenant_id: Uuid, member_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_member(tenant_id, member_id).await? {
            return Err(AppError::NotTenantMember);
        }
        tracing::info!(tenant_id = %tenant_id, user_id = %member_id, "Membro removido");
        Ok(())
    }

    async fn ensure_member(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        // Distingue "empresa não existe" de "você não é membro"
        if self.store.find_tenant_policy(tenant_id).await?.is_none() {
            return Err(AppError::TenantNotFound);
        }
        match self.store.find_user_override(tenant_id, user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotTenantMember),
        }
    }
}
