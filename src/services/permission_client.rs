// src/services/permission_client.rs

use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use crate::{
    common::error::FetchError,
    middleware::tenancy::TENANT_ID_HEADER,
    models::permissions::EffectivePermissions,
};

/// A sessão ativa do cliente: token e empresa selecionada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub tenant_id: Uuid,
}

impl Session {
    pub fn new(token: impl Into<String>, tenant_id: Uuid) -> Self {
        Self {
            token: token.into(),
            tenant_id,
        }
    }
}

/// O colaborador que entrega as permissões efetivas já resolvidas pelo backend.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn fetch_effective_permissions(
        &self,
        session: &Session,
    ) -> Result<EffectivePermissions, FetchError>;
}

// Fala com `GET /api/permissions/effective` do backend.
#[derive(Clone)]
pub struct HttpPermissionSource {
    client: Client,
    base_url: String,
}

impl HttpPermissionSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PermissionSource for HttpPermissionSource {
    async fn fetch_effective_permissions(
        &self,
        session: &Session,
    ) -> Result<EffectivePermissions, FetchError> {
        let url = format!("{}/api/permissions/effective", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.token)
            .header(TENANT_ID_HEADER, session.tenant_id.to_string())
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Falha ao enviar GET para {}: {}", url, e);
                FetchError::FetchFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::FetchFailed(format!("{} respondeu HTTP {}", url, status)));
        }

        // Só aceita depois de validar contra o esquema: nada de aplicar pela metade
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::SchemaMismatch(format!("corpo inválido: {}", e)))?;

        EffectivePermissions::from_payload(&payload)
    }
}
