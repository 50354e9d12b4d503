use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::permissions::{Capability, Limit};

// Erros do backend (viram resposta HTTP).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Cabeçalho X-Tenant-ID inválido: {0}")]
    TenantHeader(&'static str),

    #[error("Empresa não encontrada")]
    TenantNotFound,

    #[error("Usuário não pertence a esta empresa")]
    NotTenantMember,

    #[error("Permissão ausente: {0}")]
    MissingCapability(Capability),

    #[error("Limite atingido: {0}")]
    LimitExceeded(Limit),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),
            AppError::TenantHeader(reason) => (StatusCode::BAD_REQUEST, reason.to_string()),
            AppError::TenantNotFound => (StatusCode::NOT_FOUND, "Empresa não encontrada.".to_string()),
            AppError::NotTenantMember => (
                StatusCode::FORBIDDEN,
                "Você não faz parte desta empresa.".to_string(),
            ),
            AppError::MissingCapability(capability) => (
                StatusCode::FORBIDDEN,
                format!("Você precisa da permissão '{}' para realizar esta ação.", capability),
            ),
            AppError::LimitExceeded(limit) => (
                StatusCode::CONFLICT,
                format!("O limite '{}' do plano da empresa foi atingido.", limit),
            ),

            // Todos os outros erros (DatabaseError, InternalServerError, JwtError) viram 500.
            // O `tracing` loga a mensagem detalhada.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

// Erros na fronteira de busca do cache de permissões.
// Nunca chegam a quem chama `get`/`get_limit`: ficam guardados no cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Nenhum token de sessão disponível")]
    AuthMissing,

    #[error("Falha ao buscar permissões: {0}")]
    FetchFailed(String),

    #[error("Resposta de permissões fora do esquema: {0}")]
    SchemaMismatch(String),

    #[error("Busca de permissões excedeu {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Falhas de rede e timeouts valem nova tentativa; o resto não muda sozinho.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::FetchFailed(_) | FetchError::Timeout(_))
    }
}
