use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::{AuditSink, SqliteAuditLog};
use crate::authz::{Authorizer, AuthzMode, DepartmentPolicyEvaluator};
use crate::config::EngineConfig;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::permissions::{PermissionService, PermissionTemplateService};
use crate::routes::{health, permissions, templates};
use crate::store::{PermissionStore, SqlitePermissionStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub engine: Arc<EngineConfig>,
    pub permissions: PermissionService,
    pub templates: PermissionTemplateService,
    pub authz: Authorizer,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, engine: EngineConfig, mode: AuthzMode) -> Self {
        let store: Arc<dyn PermissionStore> = Arc::new(SqlitePermissionStore::new(pool.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditLog::new(pool.clone()));

        let permissions = PermissionService::new(Arc::clone(&store), Arc::clone(&audit), &engine);
        let templates = PermissionTemplateService::new(store, audit);
        let evaluator = DepartmentPolicyEvaluator::new(permissions.clone(), engine.check_timeout);

        Self {
            pool,
            jwt: Arc::new(jwt),
            engine: Arc::new(engine),
            permissions,
            templates,
            authz: Authorizer::new(mode, Arc::new(evaluator)),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let engine = EngineConfig::from_env()?;
    let mode = AuthzMode::from_env();

    tracing::info!(
        authz_mode = ?mode,
        max_hierarchy_depth = engine.max_hierarchy_depth,
        check_timeout_ms = engine.check_timeout.as_millis() as u64,
        "permission engine configured"
    );

    Ok(router(AppState::new(pool, jwt_config, engine, mode)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/permissions", permissions::routes())
        .nest("/templates", templates::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
