pub mod auth;
pub mod permission_cache;
pub mod permission_client;
pub mod permission_resolver;
pub mod permission_service;
