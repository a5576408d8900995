//! Adapters for the document render service and the PDF converter.
//!
//! Both are opaque HTTP collaborators; the report payload goes out as
//! JSON and bytes come back.

use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub async fn render_docx(state: &AppState, template: &str, data: &Value) -> AppResult<Vec<u8>> {
    let base = state.config.render_service_url.as_deref().ok_or_else(|| {
        AppError::Dependency("Render service is not configured. Set RENDER_SERVICE_URL.".to_string())
    })?;

    let response = state
        .http
        .post(format!("{}/render", base.trim_end_matches('/')))
        .json(&json!({"template": template, "data": data}))
        .send()
        .await
        .map_err(|error| AppError::Dependency(format!("Render service unreachable: {error}")))?;

    read_document(response, "Render service").await
}

pub async fn convert_pdf(state: &AppState, docx: Vec<u8>) -> AppResult<Vec<u8>> {
    let base = state.config.pdf_converter_url.as_deref().ok_or_else(|| {
        AppError::Dependency("PDF converter is not configured. Set PDF_CONVERTER_URL.".to_string())
    })?;

    let response = state
        .http
        .post(format!("{}/convert", base.trim_end_matches('/')))
        .header(http::header::CONTENT_TYPE, DOCX_MIME)
        .body(docx)
        .send()
        .await
        .map_err(|error| AppError::Dependency(format!("PDF converter unreachable: {error}")))?;

    read_document(response, "PDF converter").await
}

async fn read_document(response: reqwest::Response, service: &str) -> AppResult<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Dependency(format!(
            "{service} returned {status}."
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|error| AppError::Dependency(format!("{service} body read failed: {error}")))?;
    Ok(bytes.to_vec())
}
