// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{InMemoryPolicyStore, PolicyRepository, PolicyStore},
    services::{
        auth::AuthService, permission_cache::CacheSettings,
        permission_service::PermissionService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub permission_service: PermissionService,
}

impl AppState {
    // Monta o gráfico de dependências a partir de um store já pronto
    pub fn with_store(store: Arc<dyn PolicyStore>, jwt_secret: String) -> Self {
        Self {
            auth_service: AuthService::new(jwt_secret),
            permission_service: PermissionService::new(store),
        }
    }

    // Conecta ao banco (se for o caso) e roda as migrações.
    pub async fn connect(config: &ServerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn PolicyStore> = match config.store {
            StoreKind::Memory => {
                tracing::warn!("⚠️ POLICY_STORE=memory: os dados somem quando o processo termina");
                Arc::new(InMemoryPolicyStore::new())
            }
            StoreKind::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL deve ser definida")?;

                // Conecta ao banco de dados, usando '?' para propagar erros
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                sqlx::migrate!()
                    .run(&db_pool)
                    .await
                    .context("Falha ao rodar as migrações do banco de dados.")?;

                tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                Arc::new(PolicyRepository::new(db_pool))
            }
        };

        Ok(Self::with_store(store, config.jwt_secret.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => anyhow::bail!("POLICY_STORE desconhecido: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub store: StoreKind,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            store: env_or("POLICY_STORE", StoreKind::Postgres)?,
        })
    }
}

impl CacheSettings {
    // PERMISSION_FETCH_TIMEOUT_MS, PERMISSION_FETCH_RETRIES, PERMISSION_RETRY_BACKOFF_MS,
    // PERMISSION_MAX_BACKOFF_MS
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = CacheSettings::default();

        Ok(Self {
            fetch_timeout: Duration::from_millis(env_or(
                "PERMISSION_FETCH_TIMEOUT_MS",
                defaults.fetch_timeout.as_millis() as u64,
            )?),
            max_retries: env_or("PERMISSION_FETCH_RETRIES", defaults.max_retries)?,
            retry_backoff: Duration::from_millis(env_or(
                "PERMISSION_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(env_or(
                "PERMISSION_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválido ({}): {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
