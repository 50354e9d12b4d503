// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::permissions::{TenantPolicy, UserOverride};

// ---
// 1. Tenant (A "Empresa" cliente)
// ---
// A política (capacidades + tetos) fica na mesma linha, como JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. TenantMember (A "Ponte" Usuário-Tenant + overrides do usuário)
// ---
// O override nasce vazio junto com o vínculo e morre com ele.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantMember {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub overrides: UserOverride,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O que o cliente envia para provisionar um tenant
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantPayload {
    #[validate(length(min = 1, max = 120, message = "O nome da empresa é obrigatório."))]
    pub name: String,

    #[serde(default)]
    pub policy: TenantPolicy,
}

// Resposta completa (Tenant + Política)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub policy: TenantPolicy,
}
