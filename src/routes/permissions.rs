//! Permission query and administration endpoints.
//!
//! Reads only need a valid token. Writes are additionally checked against
//! `(permissions, manage)` in the department they touch.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{guards, ResourceContext};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::{
    Grant, InheritanceRule, NewGrant, OwnerType, PermissionResolution, UpsertInheritanceRule,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/departments/:department_id/effective",
            get(user_effective_permissions),
        )
        .route(
            "/users/:user_id/departments/:department_id/check",
            get(check_user_permission),
        )
        .route(
            "/departments/:department_id/effective",
            get(department_effective_permissions),
        )
        .route("/departments/:department_id/parent-path", get(parent_path))
        .route("/grants", post(create_grant))
        .route("/grants/:grant_id", delete(deactivate_grant))
        .route("/inheritance-rules", put(upsert_inheritance_rule))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionFilter {
    /// Restrict to one resource
    pub resource: Option<String>,
    /// Restrict to one action
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckQuery {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ParentPathResponse {
    pub department_id: Uuid,
    /// Nearest ancestor first
    pub parent_path: Vec<Uuid>,
}

// =============================================================================
// QUERIES
// =============================================================================

/// Consolidated permissions of a user within a department
#[utoipa::path(
    get,
    path = "/permissions/users/{user_id}/departments/{department_id}/effective",
    tag = "Permissions",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("department_id" = Uuid, Path, description = "Department ID"),
        PermissionFilter
    ),
    responses(
        (status = 200, description = "One decision per (resource, action)", body = PermissionResolution),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn user_effective_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((user_id, department_id)): Path<(Uuid, Uuid)>,
    Query(filter): Query<PermissionFilter>,
) -> AppResult<Json<PermissionResolution>> {
    let resolution = state
        .permissions
        .resolve_user_permissions(
            user_id,
            department_id,
            filter.resource.as_deref(),
            filter.action.as_deref(),
        )
        .await?;

    Ok(Json(resolution))
}

/// Allow/deny decision for a single (resource, action)
#[utoipa::path(
    get,
    path = "/permissions/users/{user_id}/departments/{department_id}/check",
    tag = "Permissions",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("department_id" = Uuid, Path, description = "Department ID"),
        CheckQuery
    ),
    responses(
        (status = 200, description = "Decision", body = CheckResponse),
        (status = 401, description = "Unauthorized"),
        (status = 504, description = "Check did not finish in time"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_user_permission(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((user_id, department_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<CheckQuery>,
) -> AppResult<Json<CheckResponse>> {
    let check = state.permissions.check_user_permission(
        user_id,
        department_id,
        &query.resource,
        &query.action,
    );

    let allowed = tokio::time::timeout(state.engine.check_timeout, check)
        .await
        .map_err(|_| AppError::timeout("permission check"))??;

    Ok(Json(CheckResponse { allowed }))
}

/// Direct and inherited department grants, not consolidated
#[utoipa::path(
    get,
    path = "/permissions/departments/{department_id}/effective",
    tag = "Permissions",
    params(
        ("department_id" = Uuid, Path, description = "Department ID"),
        PermissionFilter
    ),
    responses(
        (status = 200, description = "Department grants", body = Vec<Grant>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn department_effective_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(department_id): Path<Uuid>,
    Query(filter): Query<PermissionFilter>,
) -> AppResult<Json<Vec<Grant>>> {
    let grants = state
        .permissions
        .get_department_effective_permissions(
            department_id,
            filter.resource.as_deref(),
            filter.action.as_deref(),
        )
        .await?;

    Ok(Json(grants))
}

/// Ancestors of a department, nearest first
#[utoipa::path(
    get,
    path = "/permissions/departments/{department_id}/parent-path",
    tag = "Permissions",
    params(("department_id" = Uuid, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Ancestor ids", body = ParentPathResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn parent_path(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(department_id): Path<Uuid>,
) -> AppResult<Json<ParentPathResponse>> {
    let parent_path = state.permissions.get_department_parent_path(department_id).await?;

    Ok(Json(ParentPathResponse {
        department_id,
        parent_path,
    }))
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

/// Create a grant for a user, role or department
#[utoipa::path(
    post,
    path = "/permissions/grants",
    tag = "Permissions",
    request_body = NewGrant,
    responses(
        (status = 201, description = "Grant created", body = Grant),
        (status = 400, description = "Invalid grant"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NewGrant>,
) -> AppResult<(StatusCode, Json<Grant>)> {
    let ctx = match req.owner_type {
        OwnerType::Department => ResourceContext::new().with_department(req.owner_id),
        _ => ResourceContext::new(),
    };
    state
        .authz
        .enforce(&auth.principal(), guards::PERMISSIONS, guards::MANAGE, &ctx)
        .await?;

    let grant = state.permissions.create_grant(req, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// Soft-deactivate a grant
#[utoipa::path(
    delete,
    path = "/permissions/grants/{grant_id}",
    tag = "Permissions",
    params(("grant_id" = Uuid, Path, description = "Grant ID")),
    responses(
        (status = 200, description = "Grant deactivated", body = Grant),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No active grant with that id"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn deactivate_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(grant_id): Path<Uuid>,
) -> AppResult<Json<Grant>> {
    state
        .authz
        .enforce(
            &auth.principal(),
            guards::PERMISSIONS,
            guards::MANAGE,
            &ResourceContext::new(),
        )
        .await?;

    let grant = state.permissions.deactivate_grant(grant_id, auth.user_id).await?;
    Ok(Json(grant))
}

/// Create or replace the inheritance rule for a (parent, child, resource, action)
#[utoipa::path(
    put,
    path = "/permissions/inheritance-rules",
    tag = "Permissions",
    request_body = UpsertInheritanceRule,
    responses(
        (status = 200, description = "Rule saved", body = InheritanceRule),
        (status = 400, description = "Invalid rule"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_inheritance_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpsertInheritanceRule>,
) -> AppResult<Json<InheritanceRule>> {
    let ctx = ResourceContext::new().with_department(req.child_department_id);
    state
        .authz
        .enforce(&auth.principal(), guards::PERMISSIONS, guards::MANAGE, &ctx)
        .await?;

    let rule = state.permissions.upsert_inheritance_rule(req, auth.user_id).await?;
    Ok(Json(rule))
}
