use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::permissions::user_effective_permissions,
		routes::permissions::check_user_permission,
		routes::permissions::department_effective_permissions,
		routes::permissions::parent_path,
		routes::permissions::create_grant,
		routes::permissions::deactivate_grant,
		routes::permissions::upsert_inheritance_rule,
		routes::templates::list_templates,
		routes::templates::create_template,
		routes::templates::apply_template
	),
	components(
		schemas(
			routes::health::HealthResponse,
			routes::permissions::CheckResponse,
			routes::permissions::ParentPathResponse,
			models::Grant,
			models::NewGrant,
			models::OwnerType,
			models::PermissionSource,
			models::PermissionKey,
			models::InheritType,
			models::InheritanceRule,
			models::UpsertInheritanceRule,
			models::Conflict,
			models::ConflictType,
			models::ConflictSeverity,
			models::ConflictResolution,
			models::PermissionResolution,
			models::PermissionTemplate,
			models::TemplatePermission,
			models::TemplateKind,
			models::NewPermissionTemplate,
			models::ApplyTemplateRequest,
			models::TemplateApplicationResult
		)
	),
	tags(
		(name = "Health", description = "Liveness and database reachability"),
		(name = "Permissions", description = "Permission resolution and grant administration"),
		(name = "Templates", description = "Permission template bundles")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};
	let Some(components) = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};
	let Some(schemes) = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_global_security(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("security")
			.or_insert_with(|| json!([{ "bearerAuth": [] }]));
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr
				.iter()
				.any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
