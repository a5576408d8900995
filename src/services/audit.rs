//! Append-only audit trail and report snapshots.
//!
//! Writes here never fail a user-visible response; failures are logged
//! and dropped.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::repository::table_service::create_row;
use crate::rows::json_map;
use crate::state::AppState;

pub async fn track(state: &AppState, event: &str, actor: &str, message: &str) {
    let Ok(pool) = state.require_db() else {
        return;
    };
    let payload = json_map(&[
        ("id", json!(Uuid::new_v4().to_string())),
        ("actor", json!(actor)),
        ("event", json!(event)),
        ("message", json!(message)),
        ("date_created", json!(chrono::Utc::now().to_rfc3339())),
    ]);
    if let Err(error) = create_row(pool, "audit_logs", &payload).await {
        tracing::warn!(event, %error, "audit log write failed");
    }
}

/// Persists an immutable `{type, data}` copy of a computed report.
pub async fn snapshot_report(state: &AppState, report_type_id: &str, data: &Value) {
    let Ok(pool) = state.require_db() else {
        return;
    };
    let payload = json_map(&[
        ("id", json!(Uuid::new_v4().to_string())),
        ("type", json!(report_type_id)),
        ("data", data.clone()),
        ("date_created", json!(chrono::Utc::now().to_rfc3339())),
    ]);
    if let Err(error) = create_row(pool, "reports", &payload).await {
        tracing::warn!(report_type_id, %error, "report snapshot write failed");
    }
}
