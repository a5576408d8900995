//! Per-client loan-cycle history aggregation.

use serde_json::{json, Value};

use crate::error::AppError;
use crate::rows::{value_array, value_f64, value_i64, value_str};
use crate::services::dataset::ReportDataset;
use crate::services::filters::full_name;
use crate::services::taxonomy;

/// Walks a client's history and emits one row per loan cycle, oldest
/// first. `last_n` keeps only the most recent cycles when nonzero.
pub fn client_loan_cycle_stats(
    data: &ReportDataset,
    client_id: &str,
    last_n: i64,
) -> Result<Value, AppError> {
    let client = data
        .clients
        .iter()
        .find(|row| value_str(row, "id") == client_id)
        .ok_or_else(|| AppError::NotFound(format!("Client '{client_id}' does not exist.")))?;

    let loan_cycle_number = value_i64(client, "loan_cycle_number");
    let status = value_str(client, "status");
    let (stage, label) = match taxonomy::stage_of(&status) {
        Some(info) => (info.stage.to_string(), info.label.to_string()),
        None => ("Unclassified".to_string(), status.clone()),
    };

    let mut cycles: Vec<(i64, Value)> = Vec::new();
    if let Some(history) = data.history_for(client_id) {
        for cycle in value_array(history, "cycles") {
            let cycle_number = value_i64(cycle, "cycle_number");
            if skip_for_last_n(cycle_number, loan_cycle_number, last_n) {
                continue;
            }
            cycles.push((cycle_number, cycle_row(data, cycle, cycle_number)));
        }
    }
    cycles.sort_by_key(|(cycle_number, _)| *cycle_number);

    Ok(json!({
        "client": full_name(client),
        "total_loan_cycles": loan_cycle_number,
        "branch": data.branch_name(&value_str(client, "branch")),
        "stage": stage,
        "status": label,
        "loan_cycles": cycles.into_iter().map(|(_, row)| row).collect::<Vec<_>>(),
    }))
}

fn skip_for_last_n(cycle_number: i64, loan_cycle_number: i64, last_n: i64) -> bool {
    last_n != 0 && loan_cycle_number > last_n && cycle_number <= loan_cycle_number - last_n
}

fn cycle_row(data: &ReportDataset, cycle: &Value, cycle_number: i64) -> Value {
    let acat_id = value_str(cycle, "acat");
    let Some(client_acat) = data.client_acat(&acat_id) else {
        // Cycle never reached the ACAT workflow.
        return json!({
            "loan_cycle_no": cycle_number,
            "status": value_str(cycle, "status"),
            "crops": ["Not specified yet"],
            "loan_requested": "-",
            "loan_approved": "-",
            "estimated_total_cost": "-",
            "estimated_total_revenue": "-",
            "estimated_net_profit": "-",
            "actual_total_cost": "-",
            "actual_total_revenue": "-",
            "actual_net_profit": "-",
        });
    };

    let estimated = &client_acat["estimated"];
    let achieved = &client_acat["achieved"];
    let estimated_cost = value_f64(estimated, "total_cost");
    let estimated_revenue = value_f64(estimated, "total_revenue");
    let achieved_cost = value_f64(achieved, "total_cost");
    let achieved_revenue = value_f64(achieved, "total_revenue");

    let (requested, approved) = match data.proposal_for_client_acat(&acat_id) {
        Some(proposal) => (
            value_f64(proposal, "loan_requested"),
            value_f64(proposal, "loan_approved"),
        ),
        None => (0.0, 0.0),
    };

    let crops: Vec<String> = value_array(client_acat, "acats")
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|id| data.acat(id))
        .map(|acat| data.crop_name(&value_str(acat, "crop")))
        .filter(|name| !name.is_empty())
        .collect();

    json!({
        "loan_cycle_no": cycle_number,
        "status": value_str(cycle, "status"),
        "crops": crops,
        "loan_requested": requested,
        "loan_approved": approved,
        "estimated_total_cost": estimated_cost,
        "estimated_total_revenue": estimated_revenue,
        "estimated_net_profit": estimated_revenue - estimated_cost,
        "actual_total_cost": achieved_cost,
        "actual_total_revenue": achieved_revenue,
        "actual_net_profit": achieved_revenue - achieved_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::client_loan_cycle_stats;
    use crate::error::AppError;
    use crate::services::dataset::fixtures::dataset;

    #[test]
    fn full_history_lists_cycles_ascending() {
        let data = dataset();
        let stats = client_loan_cycle_stats(&data, "c1", 0).unwrap();

        assert_eq!(stats["client"], "Debela Ibssa Gutema");
        assert_eq!(stats["total_loan_cycles"], 2);
        assert_eq!(stats["branch"], "Meki");
        assert_eq!(stats["stage"], "A-CAT");
        assert_eq!(stats["status"], "A-CAT Authorized");

        let cycles = stats["loan_cycles"].as_array().unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0]["loan_cycle_no"], 1);
        assert_eq!(cycles[1]["loan_cycle_no"], 2);

        // Cycle 1 numbers come from ca1 and p1.
        assert_eq!(cycles[0]["loan_approved"], 15000.0);
        assert_eq!(cycles[0]["estimated_net_profit"], 15000.0);
        assert_eq!(cycles[0]["actual_net_profit"], 12000.0);
        assert_eq!(cycles[0]["crops"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn last_n_keeps_only_most_recent_cycles() {
        let data = dataset();
        let stats = client_loan_cycle_stats(&data, "c1", 1).unwrap();
        let cycles = stats["loan_cycles"].as_array().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0]["loan_cycle_no"], 2);
    }

    #[test]
    fn last_n_larger_than_history_keeps_everything() {
        let data = dataset();
        let stats = client_loan_cycle_stats(&data, "c1", 5).unwrap();
        assert_eq!(stats["loan_cycles"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn cycle_without_acat_emits_placeholders() {
        let data = dataset();
        let stats = client_loan_cycle_stats(&data, "c2", 0).unwrap();
        let cycles = stats["loan_cycles"].as_array().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0]["loan_approved"], "-");
        assert_eq!(cycles[0]["estimated_net_profit"], "-");
        assert_eq!(cycles[0]["crops"], serde_json::json!(["Not specified yet"]));
    }

    #[test]
    fn unknown_client_is_not_found() {
        let data = dataset();
        assert!(matches!(
            client_loan_cycle_stats(&data, "nope", 0),
            Err(AppError::NotFound(_))
        ));
    }
}
