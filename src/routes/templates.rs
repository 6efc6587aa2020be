use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::app::AppState;
use crate::authz::{guards, ResourceContext};
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::{
    ApplyTemplateRequest, NewPermissionTemplate, PermissionTemplate, TemplateApplicationResult,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/:template_id/apply", post(apply_template))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TemplateFilter {
    /// Only templates in this category
    pub category: Option<String>,
}

/// List predefined and custom templates
#[utoipa::path(
    get,
    path = "/templates",
    tag = "Templates",
    params(TemplateFilter),
    responses(
        (status = 200, description = "Templates, predefined first", body = Vec<PermissionTemplate>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_templates(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(filter): Query<TemplateFilter>,
) -> AppResult<Json<Vec<PermissionTemplate>>> {
    let templates = state
        .templates
        .get_permission_templates(filter.category.as_deref())
        .await?;
    Ok(Json(templates))
}

/// Create a custom template
#[utoipa::path(
    post,
    path = "/templates",
    tag = "Templates",
    request_body = NewPermissionTemplate,
    responses(
        (status = 201, description = "Template created", body = PermissionTemplate),
        (status = 400, description = "Invalid template"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_template(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NewPermissionTemplate>,
) -> AppResult<(StatusCode, Json<PermissionTemplate>)> {
    state
        .authz
        .enforce(
            &auth.principal(),
            guards::TEMPLATES,
            guards::MANAGE,
            &ResourceContext::new(),
        )
        .await?;

    let template = state.templates.create_custom_template(req, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Apply a template to a department
#[utoipa::path(
    post,
    path = "/templates/{template_id}/apply",
    tag = "Templates",
    params(("template_id" = String, Path, description = "Predefined name or custom template id")),
    request_body = ApplyTemplateRequest,
    responses(
        (status = 200, description = "Template applied", body = TemplateApplicationResult),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Template not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn apply_template(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(template_id): Path<String>,
    Json(req): Json<ApplyTemplateRequest>,
) -> AppResult<Json<TemplateApplicationResult>> {
    let ctx = ResourceContext::new().with_department(req.department_id);
    state
        .authz
        .enforce(&auth.principal(), guards::PERMISSIONS, guards::MANAGE, &ctx)
        .await?;

    let result = state
        .templates
        .apply_template_to_department(
            &template_id,
            req.department_id,
            req.override_existing,
            auth.user_id,
        )
        .await?;
    Ok(Json(result))
}
