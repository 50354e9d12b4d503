//! AccounTech Pro: resolução de permissões efetivas (teto do tenant + overrides do usuário),
//! o backend que as serve e o cache de sessão que as consome.

pub mod common;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
