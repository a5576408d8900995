use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde_json::Value;

use crate::{
    auth::require_user_id,
    error::AppResult,
    repository::table_service::get_row,
    rows::value_str,
    services::audit,
    services::filters::supplied_from_query,
    services::rendering::{convert_pdf, render_docx},
    services::reports::compute_report,
    state::AppState,
};

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/reports/{report_type_id}",
            axum::routing::get(report_json),
        )
        .route(
            "/reports/{report_type_id}/docx",
            axum::routing::get(report_docx),
        )
        .route(
            "/reports/{report_type_id}/pdf",
            axum::routing::get(report_pdf),
        )
}

async fn report_json(
    State(state): State<AppState>,
    Path(report_type_id): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let (result, _) = computed(&state, &report_type_id, &query, &headers).await?;
    Ok(Json(result))
}

async fn report_docx(
    State(state): State<AppState>,
    Path(report_type_id): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> AppResult<([(header::HeaderName, String); 2], Vec<u8>)> {
    let (result, report_type) = computed(&state, &report_type_id, &query, &headers).await?;
    let docx = render_docx(&state, &value_str(&report_type, "type"), &result["data"]).await?;
    Ok((
        document_headers(&report_type, "docx", DOCX_MIME),
        docx,
    ))
}

async fn report_pdf(
    State(state): State<AppState>,
    Path(report_type_id): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> AppResult<([(header::HeaderName, String); 2], Vec<u8>)> {
    let (result, report_type) = computed(&state, &report_type_id, &query, &headers).await?;
    let docx = render_docx(&state, &value_str(&report_type, "type"), &result["data"]).await?;
    let pdf = convert_pdf(&state, docx).await?;
    Ok((
        document_headers(&report_type, "pdf", "application/pdf"),
        pdf,
    ))
}

async fn computed(
    state: &AppState,
    report_type_id: &str,
    query: &BTreeMap<String, String>,
    headers: &HeaderMap,
) -> AppResult<(Value, Value)> {
    let user_id = require_user_id(state, headers).await?;
    let pool = state.require_db()?;
    let report_type = get_row(pool, "report_types", report_type_id, "id").await?;
    let supplied = supplied_from_query(query);

    let result = compute_report(state, &user_id, &report_type, &supplied).await?;

    let audit_state = state.clone();
    let actor = user_id.clone();
    let title = value_str(&report_type, "title");
    tokio::spawn(async move {
        audit::track(
            &audit_state,
            "REPORT_VIEWED",
            &actor,
            &format!("Viewed report '{title}'."),
        )
        .await;
    });

    Ok((result, report_type))
}

fn document_headers(
    report_type: &Value,
    extension: &str,
    mime: &str,
) -> [(header::HeaderName, String); 2] {
    let title = value_str(report_type, "title");
    let stem = if title.is_empty() {
        "report"
    } else {
        title.as_str()
    };
    let filename = format!("{}.{extension}", slugify(stem));
    [
        (header::CONTENT_TYPE, mime.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ]
}

fn slugify(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_flattens_punctuation_and_case() {
        assert_eq!(slugify("Clients by Gender"), "clients_by_gender");
        assert_eq!(slugify("Loan data (by crop)!"), "loan_data_by_crop");
    }
}
