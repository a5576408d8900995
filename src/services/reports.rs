//! Report dispatch: one enum variant per report type, one computation
//! each, with a shared result envelope.

use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::rows::{value_array, value_str};
use crate::scoping::{self, AccessScope, Capability};
use crate::services::audit;
use crate::services::dataset::ReportDataset;
use crate::services::filters::{filtered_clients, require_date_pair, SuppliedParams};
use crate::services::loan_cycles::client_loan_cycle_stats;
use crate::services::rollups::{clients_by_branch, crop_stats, loan_data_by_crop, stage_stats};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    ClientsByGender,
    ClientsByBranch,
    ClientsByStage,
    ClientsByCrops,
    ActiveClientsList,
    CropStats,
    LoanDataByCrop,
    LoanCycleStagesStats,
    ClientLoanCycleStats,
}

impl ReportKind {
    pub fn from_code(code: &str) -> AppResult<Self> {
        match code {
            "CLIENTS_BY_GENDER" => Ok(Self::ClientsByGender),
            "CLIENTS_BY_BRANCH" => Ok(Self::ClientsByBranch),
            "CLIENTS_BY_STAGE" => Ok(Self::ClientsByStage),
            "CLIENTS_BY_CROPS" => Ok(Self::ClientsByCrops),
            "ACTIVE_CLIENTS_LIST" => Ok(Self::ActiveClientsList),
            "CROP_STATS" => Ok(Self::CropStats),
            "LOAN_DATA_BY_CROP" => Ok(Self::LoanDataByCrop),
            "LOAN_CYCLE_STAGES_STATS" => Ok(Self::LoanCycleStagesStats),
            "CLIENT_LOAN_CYCLE_STATS" => Ok(Self::ClientLoanCycleStats),
            other => Err(AppError::NotImplemented(format!(
                "Report type '{other}' has no registered handler."
            ))),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::ClientsByGender => "CLIENTS_BY_GENDER",
            Self::ClientsByBranch => "CLIENTS_BY_BRANCH",
            Self::ClientsByStage => "CLIENTS_BY_STAGE",
            Self::ClientsByCrops => "CLIENTS_BY_CROPS",
            Self::ActiveClientsList => "ACTIVE_CLIENTS_LIST",
            Self::CropStats => "CROP_STATS",
            Self::LoanDataByCrop => "LOAN_DATA_BY_CROP",
            Self::LoanCycleStagesStats => "LOAN_CYCLE_STAGES_STATS",
            Self::ClientLoanCycleStats => "CLIENT_LOAN_CYCLE_STATS",
        }
    }
}

/// Computes a report for the actor: scope resolution, a bounded-deadline
/// data load + computation, a fire-and-forget snapshot, and the result
/// envelope. Identical inputs against unchanged data reuse the short-TTL
/// cached response.
pub async fn compute_report(
    state: &AppState,
    actor: &str,
    report_type: &Value,
    supplied: &SuppliedParams,
) -> AppResult<Value> {
    let report_type_id = value_str(report_type, "id");
    let kind = ReportKind::from_code(&value_str(report_type, "type"))?;

    let cache_key = cache_key(&report_type_id, actor, supplied);
    if let Some(cached) = state.report_cache.get(&cache_key).await {
        return Ok(cached);
    }

    let account = scoping::load_account(state, actor).await?;
    if !scoping::is_permitted(account.as_ref(), Capability::View) {
        return Err(AppError::Forbidden(
            "You are not permitted to view reports.".to_string(),
        ));
    }
    let scope = scoping::resolve_scope(account.as_ref(), actor);

    let pool = state.require_db()?.clone();
    let deadline = Duration::from_secs(state.config.report_timeout_seconds);
    let declared = value_array(report_type, "parameters").to_vec();

    let data = tokio::time::timeout(deadline, async {
        let dataset = ReportDataset::load(&pool).await?;
        compute_data(kind, &dataset, &scope, &declared, supplied)
    })
    .await
    .map_err(|_| {
        AppError::Timeout(format!(
            "Report '{}' did not finish within {}s.",
            kind.code(),
            deadline.as_secs()
        ))
    })??;

    let user = match &account {
        Some(_) => actor_display_name(state, actor).await,
        None => "Super Admin".to_string(),
    };
    let result = json!({
        "date": format_today(),
        "user": user,
        "data": data,
    });

    let snapshot_state = state.clone();
    let snapshot = json!({"type": kind.code(), "data": result["data"].clone()});
    let snapshot_type_id = report_type_id.clone();
    tokio::spawn(async move {
        audit::snapshot_report(&snapshot_state, &snapshot_type_id, &snapshot).await;
    });

    state.report_cache.insert(cache_key, result.clone()).await;
    Ok(result)
}

/// Pure dispatch over an already-loaded dataset.
pub fn compute_data(
    kind: ReportKind,
    dataset: &ReportDataset,
    scope: &AccessScope,
    declared: &[Value],
    supplied: &SuppliedParams,
) -> AppResult<Value> {
    match kind {
        ReportKind::ClientsByGender
        | ReportKind::ClientsByBranch
        | ReportKind::ClientsByStage
        | ReportKind::ClientsByCrops
        | ReportKind::ActiveClientsList => {
            let result = filtered_clients(dataset, scope, declared, supplied)?;
            Ok(json!({
                "parameters": result.parameters,
                "clients": result.clients,
            }))
        }
        ReportKind::CropStats => Ok(json!({
            "parameters": [],
            "crops": crop_stats(dataset, scope),
        })),
        ReportKind::LoanDataByCrop => {
            let window = require_date_pair(supplied)?;
            let for_group = client_type_filter(supplied)?;
            Ok(json!({
                "parameters": loan_data_parameters(supplied, window.is_some()),
                "crops": loan_data_by_crop(dataset, scope, window, for_group),
            }))
        }
        ReportKind::LoanCycleStagesStats => Ok(json!({
            "parameters": [],
            "stages": stage_stats(dataset, scope),
        })),
        ReportKind::ClientLoanCycleStats => {
            let last_n = match supplied.get("lastLoanCycles") {
                Some(value) => value.send.trim().parse::<i64>().map_err(|_| {
                    AppError::Validation(format!(
                        "lastLoanCycles '{}' is not a number.",
                        value.send
                    ))
                })?,
                None => 0,
            };

            let Some(client_id) = supplied.get("client").map(|value| value.send.clone()) else {
                // No client requested: stats for every client in scope.
                let mut rows = dataset
                    .clients
                    .iter()
                    .filter(|client| scope.permits(client))
                    .map(|client| client_loan_cycle_stats(dataset, &value_str(client, "id"), last_n))
                    .collect::<Result<Vec<_>, _>>()?;
                rows.sort_by_key(|stats| value_str(stats, "client"));
                return Ok(json!({
                    "parameters": [{"label": "Client", "value": "All clients"}],
                    "clients": rows,
                }));
            };

            // Clients outside the actor's scope are indistinguishable
            // from clients that do not exist.
            let visible = dataset
                .clients
                .iter()
                .any(|client| value_str(client, "id") == client_id && scope.permits(client));
            if !visible {
                return Err(AppError::NotFound(format!(
                    "Client '{client_id}' does not exist."
                )));
            }

            let stats = client_loan_cycle_stats(dataset, &client_id, last_n)?;
            let mut data = Map::new();
            data.insert(
                "parameters".to_string(),
                json!([{"label": "Client", "value": supplied_display(supplied, "client")}]),
            );
            if let Some(fields) = stats.as_object() {
                data.extend(fields.clone());
            }
            Ok(Value::Object(data))
        }
    }
}

fn client_type_filter(supplied: &SuppliedParams) -> AppResult<Option<bool>> {
    match supplied.get("clientType").map(|value| value.send.as_str()) {
        None => Ok(None),
        Some("group") => Ok(Some(true)),
        Some("individual") => Ok(Some(false)),
        Some(other) => Err(AppError::Validation(format!(
            "clientType must be 'individual' or 'group', got '{other}'."
        ))),
    }
}

fn loan_data_parameters(supplied: &SuppliedParams, dated: bool) -> Vec<Value> {
    let date_value = if dated {
        format!(
            "{} - {}",
            supplied_display(supplied, "fromDate"),
            supplied_display(supplied, "toDate")
        )
    } else {
        "Not specified".to_string()
    };
    vec![
        json!({"label": "Date range", "value": date_value}),
        json!({"label": "Client type", "value": supplied_display(supplied, "clientType")}),
    ]
}

fn supplied_display(supplied: &SuppliedParams, code: &str) -> String {
    supplied
        .get(code)
        .map(|value| value.display.clone().unwrap_or_else(|| value.send.clone()))
        .unwrap_or_else(|| "Not specified".to_string())
}

fn cache_key(report_type_id: &str, actor: &str, supplied: &SuppliedParams) -> String {
    let mut key = format!("{report_type_id}:{actor}");
    for (code, value) in supplied {
        key.push_str(&format!(":{code}={}", value.send));
    }
    key
}

async fn actor_display_name(state: &AppState, actor: &str) -> String {
    let Ok(pool) = state.require_db() else {
        return actor.to_string();
    };
    match crate::repository::table_service::get_row(pool, "users", actor, "id").await {
        Ok(user) => {
            let first = value_str(&user, "first_name");
            let last = value_str(&user, "last_name");
            let name = format!("{first} {last}").trim().to_string();
            if name.is_empty() {
                actor.to_string()
            } else {
                name
            }
        }
        Err(_) => actor.to_string(),
    }
}

fn format_today() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{compute_data, format_today, ReportKind};
    use crate::error::AppError;
    use crate::scoping::AccessScope;
    use crate::services::dataset::fixtures::dataset;
    use crate::services::filters::{ParamValue, SuppliedParams};

    fn supplied(pairs: &[(&str, &str)]) -> SuppliedParams {
        pairs
            .iter()
            .map(|(code, send)| {
                (
                    code.to_string(),
                    ParamValue {
                        send: send.to_string(),
                        display: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn every_registered_code_round_trips() {
        for code in [
            "CLIENTS_BY_GENDER",
            "CLIENTS_BY_BRANCH",
            "CLIENTS_BY_STAGE",
            "CLIENTS_BY_CROPS",
            "ACTIVE_CLIENTS_LIST",
            "CROP_STATS",
            "LOAN_DATA_BY_CROP",
            "LOAN_CYCLE_STAGES_STATS",
            "CLIENT_LOAN_CYCLE_STATS",
        ] {
            let kind = ReportKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn unknown_code_is_not_implemented() {
        assert!(matches!(
            ReportKind::from_code("CLIENTS_BY_SHOE_SIZE"),
            Err(AppError::NotImplemented(_))
        ));
    }

    #[test]
    fn recomputation_with_identical_inputs_is_idempotent() {
        let data = dataset();
        let declared = vec![json!({"name": "Gender", "code": "gender", "remark": ""})];
        let params = supplied(&[("gender", "Female")]);

        let first = compute_data(
            ReportKind::ClientsByGender,
            &data,
            &AccessScope::Unrestricted,
            &declared,
            &params,
        )
        .unwrap();
        let second = compute_data(
            ReportKind::ClientsByGender,
            &data,
            &AccessScope::Unrestricted,
            &declared,
            &params,
        )
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(first["clients"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn client_stats_hide_clients_outside_the_scope() {
        let data = dataset();
        // c1 belongs to officer-1; officer-2's scope must not reach it.
        let outcome = compute_data(
            ReportKind::ClientLoanCycleStats,
            &data,
            &AccessScope::OwnedBy("officer-2".to_string()),
            &[],
            &supplied(&[("client", "c1")]),
        );
        assert!(matches!(outcome, Err(AppError::NotFound(_))));

        let allowed = compute_data(
            ReportKind::ClientLoanCycleStats,
            &data,
            &AccessScope::OwnedBy("officer-1".to_string()),
            &[],
            &supplied(&[("client", "c1")]),
        )
        .unwrap();
        assert_eq!(allowed["client"], "Debela Ibssa Gutema");
    }

    #[test]
    fn client_stats_without_a_client_cover_every_client_in_scope() {
        let data = dataset();
        let result = compute_data(
            ReportKind::ClientLoanCycleStats,
            &data,
            &AccessScope::OwnedBy("officer-1".to_string()),
            &[],
            &SuppliedParams::new(),
        )
        .unwrap();
        let rows = result["clients"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        // Sorted by client display name.
        assert_eq!(rows[0]["client"], "Debela Ibssa Gutema");
        assert_eq!(rows[1]["client"], "Hana Tesfaye Bekele");
    }

    #[test]
    fn client_stats_merges_aggregate_fields() {
        let data = dataset();
        let result = compute_data(
            ReportKind::ClientLoanCycleStats,
            &data,
            &AccessScope::Unrestricted,
            &[],
            &supplied(&[("client", "c1"), ("lastLoanCycles", "1")]),
        )
        .unwrap();
        assert_eq!(result["client"], "Debela Ibssa Gutema");
        assert_eq!(result["loan_cycles"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn loan_data_rejects_unknown_client_type() {
        let data = dataset();
        let outcome = compute_data(
            ReportKind::LoanDataByCrop,
            &data,
            &AccessScope::Unrestricted,
            &[],
            &supplied(&[("clientType", "cooperative")]),
        );
        assert!(matches!(outcome, Err(AppError::Validation(_))));
    }

    #[test]
    fn today_is_formatted_with_full_month_name() {
        let formatted = format_today();
        // "August 30, 2026" style: one comma, no leading digit.
        assert!(formatted.contains(", "));
        assert!(formatted.chars().next().unwrap().is_alphabetic());
    }
}
