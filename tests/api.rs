mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use campus_permissions::app::{router, AppState};
use campus_permissions::authz::AuthzMode;
use campus_permissions::config::EngineConfig;
use campus_permissions::jwt::JwtConfig;
use campus_permissions::models::OwnerType;
use campus_permissions::store::{PermissionStore, SqlitePermissionStore};

fn jwt() -> JwtConfig {
    JwtConfig {
        secret: Arc::new(b"test-secret".to_vec()),
        exp_hours: 1,
    }
}

fn app(pool: &SqlitePool, mode: AuthzMode) -> Router {
    router(AppState::new(pool.clone(), jwt(), EngineConfig::default(), mode))
}

fn bearer(user_id: Uuid, department_id: Option<Uuid>) -> Result<String> {
    Ok(format!("Bearer {}", jwt().encode(user_id, department_id)?))
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)?
    };
    Ok((status, value))
}

fn get(uri: &str, auth: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", auth)
        .body(Body::empty())?)
}

fn with_json(method: &str, uri: &str, auth: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", auth)
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let app = app(&pool, AuthzMode::Off);

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())?;
    let (status, v) = send(&app, req).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["db_ok"], true, "unexpected health body: {}", v);
    Ok(())
}

#[tokio::test]
async fn requests_without_token_are_rejected() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let app = app(&pool, AuthzMode::Off);

    let req = Request::builder()
        .method("GET")
        .uri("/templates")
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn grant_check_and_resolve_flow() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let store = SqlitePermissionStore::new(pool.clone());
    let faculty = store.create_department("Faculty", None).await?;
    let dept = store.create_department("Mathematics", Some(faculty.id)).await?;
    let app = app(&pool, AuthzMode::Off);

    let admin = Uuid::new_v4();
    let user = Uuid::new_v4();
    let auth = bearer(admin, None)?;

    let (status, created) = send(
        &app,
        with_json(
            "POST",
            "/permissions/grants",
            &auth,
            json!({
                "owner_type": "department",
                "owner_id": faculty.id,
                "resource": "reports",
                "action": "read"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "grant create failed: {}", created);
    assert_eq!(created["source"], "department_direct");
    assert_eq!(created["created_by"], admin.to_string());

    let check_uri = format!(
        "/permissions/users/{}/departments/{}/check?resource=reports&action=read",
        user, dept.id
    );
    let (status, body) = send(&app, get(&check_uri, &auth)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (status, body) = send(
        &app,
        get(
            &format!("/permissions/departments/{}/effective?resource=reports", dept.id),
            &auth,
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["source"], "department_inherited");
    assert_eq!(body[0]["inherited_from"], faculty.id.to_string());

    let (status, body) = send(
        &app,
        get(&format!("/permissions/departments/{}/parent-path", dept.id), &auth)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parent_path"], json!([faculty.id]));

    let (status, body) = send(
        &app,
        with_json(
            "PUT",
            "/permissions/inheritance-rules",
            &auth,
            json!({
                "parent_department_id": faculty.id,
                "child_department_id": dept.id,
                "resource": "reports",
                "action": "read",
                "inherit_type": "none"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "rule upsert failed: {}", body);

    let (_, body) = send(&app, get(&check_uri, &auth)?).await?;
    assert_eq!(body["allowed"], false);

    let (status, body) = send(
        &app,
        get(
            &format!("/permissions/users/{}/departments/{}/effective", user, faculty.id),
            &auth,
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permissions"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["conflicts"], json!([]));

    let grant_id = created["id"].as_str().unwrap_or_default();
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/permissions/grants/{}", grant_id))
        .header("authorization", &auth)
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/permissions/grants/{}", grant_id))
        .header("authorization", &auth)
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn invalid_grant_is_a_bad_request() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let app = app(&pool, AuthzMode::Off);
    let auth = bearer(Uuid::new_v4(), None)?;

    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/permissions/grants",
            &auth,
            json!({
                "owner_type": "user",
                "owner_id": Uuid::new_v4(),
                "resource": " ",
                "action": "read"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn templates_list_and_apply() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let store = SqlitePermissionStore::new(pool.clone());
    let dept = store.create_department("Library", None).await?;
    let app = app(&pool, AuthzMode::Off);
    let auth = bearer(Uuid::new_v4(), None)?;

    let (status, body) = send(&app, get("/templates?category=system", &auth)?).await?;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .map(|items| items.iter().filter_map(|t| t["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec!["admin", "readonly"]);

    let (status, body) = send(
        &app,
        with_json(
            "POST",
            "/templates/readonly/apply",
            &auth,
            json!({ "department_id": dept.id }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "apply failed: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["applied_permissions"], 1);

    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/templates/missing/apply",
            &auth,
            json!({ "department_id": dept.id }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        with_json(
            "POST",
            "/templates",
            &auth,
            json!({
                "name": "Lab technician",
                "category": "operations",
                "permissions": [{ "resource": "labs", "action": "maintain", "granted": true }]
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "template create failed: {}", body);
    assert_eq!(body["kind"], "custom");
    Ok(())
}

#[tokio::test]
async fn strict_mode_requires_manage_permission() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let store = SqlitePermissionStore::new(pool.clone());
    let dept = store.create_department("Registry", None).await?;
    let app = app(&pool, AuthzMode::Strict);

    let admin = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    store
        .insert_grant(
            &campus_permissions::models::NewGrant::new(OwnerType::User, admin, "permissions", "manage", true),
            None,
        )
        .await?;

    let body = json!({ "department_id": dept.id, "override_existing": false });

    let (status, _) = send(
        &app,
        with_json("POST", "/templates/readonly/apply", &bearer(outsider, Some(dept.id))?, body.clone())?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        with_json("POST", "/templates/readonly/apply", &bearer(admin, None)?, body)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // without any department in scope the evaluator denies
    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/permissions/grants",
            &bearer(admin, None)?,
            json!({
                "owner_type": "user",
                "owner_id": outsider,
                "resource": "courses",
                "action": "read"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/permissions/grants",
            &bearer(admin, Some(dept.id))?,
            json!({
                "owner_type": "user",
                "owner_id": outsider,
                "resource": "courses",
                "action": "read"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}
