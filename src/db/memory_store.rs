// src/db/memory_store.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::PolicyStore,
    models::{
        permissions::{Limit, TenantPolicy, UserOverride},
        tenancy::{Tenant, TenantMember},
    },
    services::permission_resolver::resolve,
};

// Guarda tudo em memória. Usado nos testes e em `POLICY_STORE=memory`.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tenants: HashMap<Uuid, (Tenant, TenantPolicy)>,
    // (tenant_id, user_id) -> vínculo
    members: BTreeMap<(Uuid, Uuid), TenantMember>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create_tenant(
        &self,
        name: &str,
        policy: &TenantPolicy,
        owner_id: Uuid,
    ) -> Result<Tenant, AppError> {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.tenants.insert(tenant.id, (tenant.clone(), policy.clone()));
        state.members.insert(
            (tenant.id, owner_id),
            TenantMember {
                tenant_id: tenant.id,
                user_id: owner_id,
                overrides: UserOverride::default(),
                created_at: now,
                updated_at: now,
            },
        );

        Ok(tenant)
    }

    async fn find_tenant_policy(&self, tenant_id: Uuid) -> Result<Option<TenantPolicy>, AppError> {
        let state = self.state.read().await;
        Ok(state.tenants.get(&tenant_id).map(|(_, policy)| policy.clone()))
    }

    async fn update_tenant_policy(
        &self,
        tenant_id: Uuid,
        policy: &TenantPolicy,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.tenants.get_mut(&tenant_id) {
            Some((tenant, current)) => {
                tenant.updated_at = Utc::now();
                *current = policy.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_user_override(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserOverride>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .get(&(tenant_id, user_id))
            .map(|member| member.overrides.clone()))
    }

    async fn upsert_member_within_limit(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        overrides: &UserOverride,
        limit: Limit,
    ) -> Result<TenantMember, AppError> {
        // Uma única trava de escrita do começo ao fim: contagem e inserção não se intercalam
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let policy = match state.tenants.get(&tenant_id) {
            Some((_, policy)) => policy,
            None => return Err(AppError::TenantNotFound),
        };

        let now = Utc::now();
        if let Some(member) = state.members.get_mut(&(tenant_id, user_id)) {
            member.overrides = overrides.clone();
            member.updated_at = now;
            return Ok(member.clone());
        }

        let current = state
            .members
            .keys()
            .filter(|(tenant, _)| *tenant == tenant_id)
            .count() as u64;
        if !resolve(policy, &UserOverride::default()).within_limit(limit, current) {
            return Err(AppError::LimitExceeded(limit));
        }

        let member = TenantMember {
            tenant_id,
            user_id,
            overrides: overrides.clone(),
            created_at: now,
            updated_at: now,
        };
        state.members.insert((tenant_id, user_id), member.clone());

        Ok(member)
    }

    async fn delete_member(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        Ok(state.members.remove(&(tenant_id, user_id)).is_some())
    }

    async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<TenantMember>, AppError> {
        let state = self.state.read().await;
        let mut members: Vec<TenantMember> = state
            .members
            .values()
            .filter(|member| member.tenant_id == tenant_id)
            .cloned()
            .collect();
        members.sort_by_key(|member| member.created_at);
        Ok(members)
    }
}
