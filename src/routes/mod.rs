use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod lists;
pub mod report_types;
pub mod reports;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(reports::router())
        .merge(report_types::router())
        .merge(lists::router())
}
