#![allow(dead_code)]

use std::sync::Arc;

use accountech::{
    config::AppState,
    db::{InMemoryPolicyStore, PolicyStore},
    models::permissions::TenantPolicy,
    routes::build_router,
    services::auth::AuthService,
};
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "segredo-dos-testes";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryPolicyStore>,
    pub auth: AuthService,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPolicyStore::new());
        let app_state = AppState::with_store(store.clone(), JWT_SECRET.to_string());

        Self {
            router: build_router(app_state),
            store,
            auth: AuthService::new(JWT_SECRET.to_string()),
        }
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.auth.create_token(user_id).unwrap()
    }

    /// Cria um tenant direto no store; `owner` vira o primeiro membro.
    pub async fn tenant_with(&self, policy: TenantPolicy, owner: Uuid) -> Uuid {
        self.store.create_tenant("Acme", &policy, owner).await.unwrap().id
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<Uuid>,
        tenant: Option<Uuid>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        if let Some(tenant) = tenant {
            builder = builder.header("x-tenant-id", tenant.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Envia um `Authorization` cru, sem passar pelo gerador de tokens.
    pub async fn send_with_authorization(
        &self,
        uri: &str,
        authorization: &str,
        tenant: Uuid,
    ) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .header("x-tenant-id", tenant.to_string())
            .body(Body::empty())
            .unwrap();

        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
