// Core modules
pub mod api;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod infra;
pub mod ops;
pub mod services;
pub mod types;

// Re-export key types and functions
pub use api::{AppContext, AppState, create_router};
pub use auth::{AuthConfig, TokenClaims, TokenCodec, UserStore};
pub use config::AppConfig;
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use infra::Infrastructure;
pub use services::Services;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;

/// Build the HTTP application from configuration with production collaborators.
pub fn create_app(config: &AppConfig) -> Result<Router> {
    let infra = Arc::new(Infrastructure::new(
        config.database.clone(),
        config.storage_root.clone(),
    ));
    let services = Services::from_config(&config.models)?;
    let codec = TokenCodec::new(&config.auth);
    let state = Arc::new(AppContext::new(infra, codec, services, &config.cache)?);

    Ok(create_router(
        state,
        &config.api_prefix,
        &config.cors_allow_origins,
    ))
}
