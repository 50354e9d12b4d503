// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
    models::permissions::Capability,
};

/// 1. O Trait que liga um tipo a uma capacidade do esquema
pub trait CapabilityDef: Send + Sync + 'static {
    const CAPABILITY: Capability;
}

/// 2. O Extractor (Guardião): resolve as permissões efetivas e exige a capacidade
pub struct RequireCapability<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequireCapability<T>
where
    T: CapabilityDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        // A. Extrai Usuário (inserido pelo auth_guard)
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        // B. Extrai Tenant
        let tenant = TenantContext::from_request_parts(parts, state).await?;

        // C. Resolve teto do tenant + override do usuário
        let effective = app_state
            .permission_service
            .effective_for(tenant.0, user.0)
            .await?;

        if !effective.allows(T::CAPABILITY) {
            tracing::warn!(
                user_id = %user.0,
                tenant_id = %tenant.0,
                capability = %T::CAPABILITY,
                "⛔ Permissão negada"
            );
            return Err(AppError::MissingCapability(T::CAPABILITY));
        }

        Ok(RequireCapability(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS CAPACIDADES EXIGIDAS PELAS ROTAS
// ---

pub struct CanUpdateCompanies;
impl CapabilityDef for CanUpdateCompanies {
    const CAPABILITY: Capability = Capability::CanUpdateCompanies;
}

pub struct CanCreateUsers;
impl CapabilityDef for CanCreateUsers {
    const CAPABILITY: Capability = Capability::CanCreateUsers;
}
