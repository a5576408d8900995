use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, get_row, list_rows, update_row},
    rows::{json_map, value_str},
    schemas::{validate_input, CreateReportTypeInput, UpdateReportTypeInput},
    services::reports::ReportKind,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/report-types",
            axum::routing::get(list_report_types).post(create_report_type),
        )
        .route(
            "/report-types/{report_type_id}",
            axum::routing::get(get_report_type).put(update_report_type),
        )
}

async fn list_report_types(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = state.require_db()?;
    let rows = list_rows(pool, "report_types", None, 200, 0, "title", true).await?;
    Ok(Json(json!({"report_types": rows})))
}

async fn get_report_type(
    State(state): State<AppState>,
    Path(report_type_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = state.require_db()?;
    let row = get_row(pool, "report_types", &report_type_id, "id").await?;
    Ok(Json(row))
}

async fn create_report_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateReportTypeInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&input)?;
    // Reject codes the dispatcher cannot serve.
    ReportKind::from_code(&input.r#type)
        .map_err(|_| AppError::Validation(format!("Unknown report type code '{}'.", input.r#type)))?;

    let pool = state.require_db()?;
    let existing = list_rows(
        pool,
        "report_types",
        Some(&json_map(&[("type", json!(input.r#type))])),
        1,
        0,
        "date_created",
        false,
    )
    .await?;
    if !existing.is_empty() {
        return Err(AppError::Conflict(format!(
            "A report type with code '{}' already exists.",
            input.r#type
        )));
    }

    let payload = json_map(&[
        ("id", json!(Uuid::new_v4().to_string())),
        ("title", json!(input.title)),
        ("type", json!(input.r#type)),
        ("description", json!(input.description)),
        ("parameters", json!(input.parameters)),
        ("active", json!(input.active)),
        ("created_by", json!(user_id)),
        ("date_created", json!(chrono::Utc::now().to_rfc3339())),
    ]);
    let row = create_row(pool, "report_types", &payload).await?;
    Ok(Json(row))
}

async fn update_report_type(
    State(state): State<AppState>,
    Path(report_type_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateReportTypeInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = state.require_db()?;
    // 404 before attempting the write.
    let existing = get_row(pool, "report_types", &report_type_id, "id").await?;

    let mut payload = serde_json::Map::new();
    if let Some(title) = input.title {
        payload.insert("title".to_string(), json!(title));
    }
    if let Some(description) = input.description {
        payload.insert("description".to_string(), json!(description));
    }
    if let Some(parameters) = input.parameters {
        payload.insert("parameters".to_string(), json!(parameters));
    }
    if let Some(active) = input.active {
        payload.insert("active".to_string(), json!(active));
    }
    if payload.is_empty() {
        return Ok(Json(existing));
    }
    payload.insert(
        "date_modified".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );

    let row = update_row(pool, "report_types", &value_str(&existing, "id"), &payload).await?;
    Ok(Json(row))
}
