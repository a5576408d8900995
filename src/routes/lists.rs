//! `{send, display}` option lists for the report parameter pickers.

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    rows::{value_array, value_bool, value_str},
    scoping::{self, Capability},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/lists/branches", axum::routing::get(branch_options))
        .route("/lists/crops", axum::routing::get(crop_options))
}

/// Branches the actor may report over. Accounts tied to specific
/// branches only see those.
async fn branch_options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let account = scoping::load_account(&state, &user_id).await?;
    if !scoping::is_permitted(account.as_ref(), Capability::View) {
        return Err(AppError::Forbidden(
            "You are not permitted to view reports.".to_string(),
        ));
    }

    let pool = state.require_db()?;
    let mut branches = list_rows(pool, "branches", None, 500, 0, "name", true).await?;

    if let Some(account) = &account {
        if !value_bool(account, "multi_branches") {
            let mut visible: Vec<String> = value_array(account, "access_branches")
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect();
            let default_branch = value_str(account, "default_branch");
            if !default_branch.is_empty() {
                visible.push(default_branch);
            }
            if !visible.is_empty() {
                branches.retain(|branch| visible.contains(&value_str(branch, "id")));
            }
        }
    }

    Ok(Json(json!({"options": options(&branches)})))
}

async fn crop_options(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = state.require_db()?;
    let crops = list_rows(pool, "crops", None, 500, 0, "name", true).await?;
    Ok(Json(json!({"options": options(&crops)})))
}

fn options(rows: &[Value]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            json!({
                "send": value_str(row, "id"),
                "display": value_str(row, "name"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::options;

    #[test]
    fn options_pair_id_with_name() {
        let rows = vec![json!({"id": "b1", "name": "Meki"})];
        let opts = options(&rows);
        assert_eq!(opts[0]["send"], "b1");
        assert_eq!(opts[0]["display"], "Meki");
    }
}
