// src/handlers/tenancy.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{CanCreateUsers, CanUpdateCompanies, RequireCapability},
        tenancy::TenantContext,
    },
    models::{
        permissions::{TenantPolicy, UserOverride},
        tenancy::{CreateTenantPayload, TenantResponse},
    },
};

// POST /api/tenants
pub async fn create_tenant(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTenantPayload>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validar o payload
    payload.validate()?;

    // 2. Provisiona a empresa e vincula o criador
    let tenant = app_state
        .permission_service
        .provision_tenant(&payload.name, &payload.policy, user.0)
        .await?;

    // 3. Responder com Sucesso
    Ok((
        StatusCode::CREATED,
        Json(TenantResponse {
            tenant,
            policy: payload.policy,
        }),
    ))
}

// GET /api/tenants/policy
pub async fn get_policy(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let policy = app_state
        .permission_service
        .tenant_policy(tenant.0, user.0)
        .await?;

    Ok(Json(policy))
}

// PUT /api/tenants/policy
pub async fn update_policy(
    State(app_state): State<AppState>,
    _guard: RequireCapability<CanUpdateCompanies>,
    tenant: TenantContext,
    Json(policy): Json<TenantPolicy>,
) -> Result<impl IntoResponse, AppError> {
    let updated = app_state
        .permission_service
        .replace_tenant_policy(tenant.0, &policy)
        .await?;

    Ok(Json(updated))
}

// GET /api/tenants/users
pub async fn list_members(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let members = app_state
        .permission_service
        .list_members(tenant.0, user.0)
        .await?;

    Ok(Json(members))
}

// PUT /api/tenants/users/{user_id}
pub async fn set_member_override(
    State(app_state): State<AppState>,
    _guard: RequireCapability<CanCreateUsers>,
    tenant: TenantContext,
    Path(member_id): Path<Uuid>,
    Json(overrides): Json<UserOverride>,
) -> Result<impl IntoResponse, AppError> {
    let member = app_state
        .permission_service
        .set_member_override(tenant.0, member_id, &overrides)
        .await?;

    Ok(Json(member))
}

// DELETE /api/tenants/users/{user_id}
pub async fn remove_member(
    State(app_state): State<AppState>,
    _guard: RequireCapability<CanCreateUsers>,
    tenant: TenantContext,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .permission_service
        .remove_member(tenant.0, member_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
