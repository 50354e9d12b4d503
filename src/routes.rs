// src/routes.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};

use crate::{config::AppState, handlers, middleware::auth::auth_guard};

pub fn build_router(app_state: AppState) -> Router {
    // Rotas protegidas: todas exigem token; as de tenant também leem o X-Tenant-ID
    let permission_routes = Router::new()
        .route(
            "/api/permissions/effective",
            get(handlers::permissions::get_effective_permissions),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let tenancy_routes = Router::new()
        .route("/", post(handlers::tenancy::create_tenant))
        .route(
            "/policy",
            get(handlers::tenancy::get_policy).put(handlers::tenancy::update_policy),
        )
        .route("/users", get(handlers::tenancy::list_members))
        .route(
            "/users/{user_id}",
            put(handlers::tenancy::set_member_override).delete(handlers::tenancy::remove_member),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/permissions", get(handlers::permissions::list_permissions))
        .merge(permission_routes)
        .nest("/api/tenants", tenancy_routes)
        .with_state(app_state)
}
