//! Branch, crop and stage rollups.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::rows::{value_array, value_bool, value_date, value_f64, value_str};
use crate::scoping::AccessScope;
use crate::services::dataset::ReportDataset;
use crate::services::taxonomy::STAGES;

/// Per-branch client counts. Branches with no clients are still listed.
pub fn clients_by_branch(data: &ReportDataset, scope: &AccessScope) -> Vec<Value> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for client in scoped_clients(data, scope) {
        *counts.entry(value_str(client, "branch")).or_insert(0) += 1;
    }
    data.branches
        .iter()
        .map(|branch| {
            let id = value_str(branch, "id");
            json!({
                "branch": value_str(branch, "name"),
                "no_of_clients": counts.get(&id).copied().unwrap_or(0),
            })
        })
        .collect()
}

/// Per-stage client counts derived from the status taxonomy. Clients
/// with an unrecognized status fall into an "Unclassified" bucket.
pub fn stage_stats(data: &ReportDataset, scope: &AccessScope) -> Vec<Value> {
    let mut unclassified = 0;
    let clients = scoped_clients(data, scope);
    let mut rows: Vec<Value> = STAGES
        .iter()
        .map(|stage| {
            let codes: HashSet<&str> = stage.statuses.iter().map(|(code, _)| *code).collect();
            let count = clients
                .iter()
                .filter(|client| codes.contains(value_str(client, "status").as_str()))
                .count();
            json!({"stage": stage.name, "no_of_clients": count})
        })
        .collect();
    for client in &clients {
        let status = value_str(client, "status");
        if !STAGES
            .iter()
            .any(|stage| stage.statuses.iter().any(|(code, _)| *code == status))
        {
            unclassified += 1;
        }
    }
    if unclassified > 0 {
        rows.push(json!({"stage": "Unclassified", "no_of_clients": unclassified}));
    }
    rows
}

/// All-time per-crop totals. Client counts come from the ACAT records
/// themselves so a client without a proposal yet is still counted;
/// loan totals come from proposals, whatever their status.
pub fn crop_stats(data: &ReportDataset, scope: &AccessScope) -> Vec<Value> {
    let permitted = permitted_clients(data, scope);

    let mut client_sets: HashMap<String, HashSet<String>> = HashMap::new();
    for acat in &data.acats {
        let client_id = value_str(acat, "client");
        if !permitted.contains_key(&client_id) {
            continue;
        }
        let crop_id = value_str(acat, "crop");
        if crop_id.is_empty() {
            continue;
        }
        client_sets.entry(crop_id).or_default().insert(client_id);
    }

    let mut totals: HashMap<String, f64> = HashMap::new();
    for proposal in &data.loan_proposals {
        if !permitted.contains_key(&value_str(proposal, "client")) {
            continue;
        }
        let Some(client_acat) = data.client_acat(&value_str(proposal, "client_acat")) else {
            continue;
        };
        let approved = value_f64(proposal, "loan_approved");
        for acat in value_array(client_acat, "acats")
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|id| data.acat(id))
        {
            let crop_id = value_str(acat, "crop");
            if !crop_id.is_empty() {
                *totals.entry(crop_id).or_insert(0.0) += approved;
            }
        }
    }

    crop_rows(data, &client_sets, &totals)
}

/// Loan disbursement per crop, optionally windowed on the proposal date
/// and restricted to individual or group clients. Proposals still in
/// the `new` or `inprogress` states carry no disbursed money and are
/// left out.
pub fn loan_data_by_crop(
    data: &ReportDataset,
    scope: &AccessScope,
    window: Option<(NaiveDate, NaiveDate)>,
    for_group: Option<bool>,
) -> Vec<Value> {
    let permitted = permitted_clients(data, scope);

    let mut totals: HashMap<String, f64> = HashMap::new();
    let mut client_sets: HashMap<String, HashSet<String>> = HashMap::new();

    for proposal in &data.loan_proposals {
        let status = value_str(proposal, "status");
        if status == "new" || status == "inprogress" {
            continue;
        }
        if let Some((from, to)) = window {
            match value_date(proposal, "date_created") {
                Some(created) if created >= from && created <= to => {}
                _ => continue,
            }
        }
        let client_id = value_str(proposal, "client");
        let Some(client) = permitted.get(&client_id) else {
            continue;
        };
        if let Some(wanted) = for_group {
            if value_bool(client, "for_group") != wanted {
                continue;
            }
        }
        let Some(client_acat) = data.client_acat(&value_str(proposal, "client_acat")) else {
            continue;
        };
        let approved = value_f64(proposal, "loan_approved");
        for acat in value_array(client_acat, "acats")
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|id| data.acat(id))
        {
            let crop_id = value_str(acat, "crop");
            if crop_id.is_empty() {
                continue;
            }
            *totals.entry(crop_id.clone()).or_insert(0.0) += approved;
            client_sets
                .entry(crop_id)
                .or_default()
                .insert(client_id.clone());
        }
    }

    crop_rows(data, &client_sets, &totals)
}

fn crop_rows(
    data: &ReportDataset,
    client_sets: &HashMap<String, HashSet<String>>,
    totals: &HashMap<String, f64>,
) -> Vec<Value> {
    data.crops
        .iter()
        .map(|crop| {
            let id = value_str(crop, "id");
            json!({
                "crop": value_str(crop, "name"),
                "no_of_clients": client_sets.get(&id).map(HashSet::len).unwrap_or(0),
                "total_loan_amount": totals.get(&id).copied().unwrap_or(0.0),
            })
        })
        .collect()
}

fn scoped_clients<'a>(data: &'a ReportDataset, scope: &AccessScope) -> Vec<&'a Value> {
    data.clients
        .iter()
        .filter(|client| scope.permits(client))
        .collect()
}

fn permitted_clients<'a>(data: &'a ReportDataset, scope: &AccessScope) -> HashMap<String, &'a Value> {
    scoped_clients(data, scope)
        .into_iter()
        .map(|client| (value_str(client, "id"), client))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{clients_by_branch, crop_stats, loan_data_by_crop, stage_stats};
    use crate::scoping::AccessScope;
    use crate::services::dataset::fixtures::dataset;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    #[test]
    fn branch_counts_cover_every_branch() {
        let data = dataset();
        let rows = clients_by_branch(&data, &AccessScope::Unrestricted);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["branch"], "Meki");
        assert_eq!(rows[0]["no_of_clients"], 2);
        assert_eq!(rows[1]["no_of_clients"], 1);
    }

    #[test]
    fn branch_counts_respect_scope() {
        let data = dataset();
        let rows = clients_by_branch(&data, &AccessScope::BranchEq("b2".to_string()));
        assert_eq!(rows[0]["no_of_clients"], 0);
        assert_eq!(rows[1]["no_of_clients"], 1);
    }

    #[test]
    fn open_proposals_are_excluded_from_loan_data() {
        let data = dataset();
        let rows = loan_data_by_crop(&data, &AccessScope::Unrestricted, None, None);
        // p3 (Onion) is inprogress, so Onion stays at zero but is listed.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["crop"], "Tomato");
        assert_eq!(rows[0]["total_loan_amount"], 40500.0);
        assert_eq!(rows[0]["no_of_clients"], 1);
        assert_eq!(rows[1]["crop"], "Maize");
        assert_eq!(rows[1]["total_loan_amount"], 25500.0);
        assert_eq!(rows[2]["crop"], "Onion");
        assert_eq!(rows[2]["total_loan_amount"], 0.0);
        assert_eq!(rows[2]["no_of_clients"], 0);
    }

    #[test]
    fn date_window_restricts_proposals() {
        let data = dataset();
        let window = Some((date("2024-01-01"), date("2024-12-31")));
        let rows = loan_data_by_crop(&data, &AccessScope::Unrestricted, window, None);
        // Only p2 falls inside the window.
        assert_eq!(rows[0]["total_loan_amount"], 25500.0);
        assert_eq!(rows[1]["total_loan_amount"], 25500.0);
    }

    #[test]
    fn client_type_filter_drops_individual_clients() {
        let data = dataset();
        let rows = loan_data_by_crop(&data, &AccessScope::Unrestricted, None, Some(true));
        // The only group client's proposal is still inprogress.
        assert!(rows.iter().all(|row| row["total_loan_amount"] == 0.0));
    }

    #[test]
    fn crop_stats_count_open_proposals_too() {
        let data = dataset();
        let rows = crop_stats(&data, &AccessScope::Unrestricted);
        assert_eq!(rows[2]["crop"], "Onion");
        assert_eq!(rows[2]["total_loan_amount"], 7000.0);
        assert_eq!(rows[2]["no_of_clients"], 1);
    }

    #[test]
    fn crop_stats_count_clients_before_any_proposal_exists() {
        let mut data = dataset();
        // c2 gets an Onion ACAT with no loan proposal attached yet.
        data.acats
            .push(serde_json::json!({"id": "a5", "crop": "crop-onion", "client": "c2"}));

        let rows = crop_stats(&data, &AccessScope::Unrestricted);
        assert_eq!(rows[2]["crop"], "Onion");
        assert_eq!(rows[2]["no_of_clients"], 2);
        // The loan total still only reflects proposals.
        assert_eq!(rows[2]["total_loan_amount"], 7000.0);
    }

    #[test]
    fn stage_stats_bucket_by_taxonomy() {
        let data = dataset();
        let rows = stage_stats(&data, &AccessScope::Unrestricted);
        let find = |name: &str| {
            rows.iter()
                .find(|row| row["stage"] == name)
                .unwrap()["no_of_clients"]
                .as_i64()
                .unwrap()
        };
        assert_eq!(find("Screening"), 1);
        assert_eq!(find("A-CAT"), 1);
        assert_eq!(find("Loan Granted"), 1);
        assert_eq!(find("New"), 0);
    }
}
