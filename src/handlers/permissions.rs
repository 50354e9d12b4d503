// src/handlers/permissions.rs

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
    models::permissions::{Capability, Limit},
};

// O esquema fixo, para o frontend montar telas de permissão
#[derive(Debug, Serialize)]
pub struct PermissionSchema {
    pub capabilities: Vec<&'static str>,
    pub limits: Vec<&'static str>,
}

// GET /api/permissions
pub async fn list_permissions() -> Json<PermissionSchema> {
    Json(PermissionSchema {
        capabilities: Capability::ALL.iter().map(|c| c.as_str()).collect(),
        limits: Limit::ALL.iter().map(|l| l.as_str()).collect(),
    })
}

// GET /api/permissions/effective (o que o cache do cliente consome)
pub async fn get_effective_permissions(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let effective = app_state
        .permission_service
        .effective_for(tenant.0, user.0)
        .await?;

    Ok(Json(effective))
}
