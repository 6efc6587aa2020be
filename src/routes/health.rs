use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<String>,
    pub departments: i64,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let check = query_scalar::<_, i64>("SELECT COUNT(*) FROM departments")
        .fetch_one(&state.pool)
        .await;

    let response = match check {
        Ok(departments) => HealthResponse {
            status: "ok",
            db_ok: true,
            db_error: None,
            departments,
        },
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            HealthResponse {
                status: "degraded",
                db_ok: false,
                db_error: Some(e.to_string()),
                departments: 0,
            }
        }
    };

    Ok(Json(response))
}
