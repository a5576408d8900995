//! Dimension filters and the set-intersection engine behind the filtered
//! client-list reports.
//!
//! Every filter is a pure function from the scoped base set to a set of
//! client ids; supplied dimensions are combined by intersection, so the
//! order in which parameters arrive never changes the result membership.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::rows::{parse_date, value_array, value_date, value_i64, value_str};
use crate::scoping::AccessScope;
use crate::services::dataset::ReportDataset;
use crate::services::taxonomy;

/// One request parameter: the raw `send` value plus the optional human
/// label the UI chose for it.
#[derive(Debug, Clone)]
pub struct ParamValue {
    pub send: String,
    pub display: Option<String>,
}

pub type SuppliedParams = BTreeMap<String, ParamValue>;

const CONTROL_KEYS: &[&str] = &["page", "per_page", "sort_by", "format"];

/// Folds raw query pairs into supplied parameters. `<code>_display`
/// companions attach to their base code.
pub fn supplied_from_query(query: &BTreeMap<String, String>) -> SuppliedParams {
    let mut supplied = SuppliedParams::new();
    for (key, raw) in query {
        let value = raw.trim();
        if value.is_empty() || CONTROL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(code) = key.strip_suffix("_display") {
            supplied
                .entry(code.to_string())
                .or_insert_with(|| ParamValue {
                    send: String::new(),
                    display: None,
                })
                .display = Some(value.to_string());
            continue;
        }
        supplied
            .entry(key.clone())
            .or_insert_with(|| ParamValue {
                send: String::new(),
                display: None,
            })
            .send = value.to_string();
    }
    supplied.retain(|_, value| !value.send.is_empty());
    supplied
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Gender,
    Status,
    Branch,
    LoanOfficer,
    LoanCycle,
    Stage,
    Crop,
    DateRange,
}

impl Dimension {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "gender" => Some(Self::Gender),
            "status" => Some(Self::Status),
            "branch" => Some(Self::Branch),
            "loanOfficer" => Some(Self::LoanOfficer),
            "loanCycle" => Some(Self::LoanCycle),
            "stage" => Some(Self::Stage),
            "crop" => Some(Self::Crop),
            "fromDate" | "toDate" => Some(Self::DateRange),
            _ => None,
        }
    }
}

pub struct FilteredClients {
    pub parameters: Vec<Value>,
    pub clients: Vec<Value>,
}

/// Both bounds or neither; a single date is a validation error raised
/// before any filter executes.
pub fn require_date_pair(
    supplied: &SuppliedParams,
) -> Result<Option<(NaiveDate, NaiveDate)>, AppError> {
    let from = supplied.get("fromDate");
    let to = supplied.get("toDate");
    match (from, to) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(AppError::Validation(
            "fromDate was supplied without toDate.".to_string(),
        )),
        (None, Some(_)) => Err(AppError::Validation(
            "toDate was supplied without fromDate.".to_string(),
        )),
        (Some(from), Some(to)) => {
            let from = parse_date(&from.send).ok_or_else(|| {
                AppError::Validation(format!("fromDate '{}' is not a valid date.", from.send))
            })?;
            let to = parse_date(&to.send).ok_or_else(|| {
                AppError::Validation(format!("toDate '{}' is not a valid date.", to.send))
            })?;
            if from > to {
                return Err(AppError::Validation(
                    "fromDate must not be after toDate.".to_string(),
                ));
            }
            Ok(Some((from, to)))
        }
    }
}

/// Runs the declared parameters of a report type against the supplied
/// request values: scope first, then one set per supplied dimension,
/// intersected, then enrichment and a stable ordering.
pub fn filtered_clients(
    data: &ReportDataset,
    scope: &AccessScope,
    declared: &[Value],
    supplied: &SuppliedParams,
) -> Result<FilteredClients, AppError> {
    let date_range = require_date_pair(supplied)?;

    let base: Vec<&Value> = data
        .clients
        .iter()
        .filter(|client| scope.permits(client))
        .collect();

    let mut parameters = Vec::new();
    let mut sets: Vec<HashSet<String>> = Vec::new();
    let mut date_handled = false;

    for param in declared {
        let code = value_str(param, "code");
        let name = value_str(param, "name");
        let remark = value_str(param, "remark");
        let Some(dimension) = Dimension::from_code(&code) else {
            // Declared but not a filterable dimension (TEXT/SELECT
            // parameters the per-report computations read themselves):
            // it still shows up in the summary.
            match supplied.get(&code) {
                Some(value) => {
                    let shown = value.display.clone().unwrap_or_else(|| value.send.clone());
                    parameters.push(parameter_entry(&name_or(&name, &code), &shown, &remark));
                }
                None => parameters.push(not_specified(&name_or(&name, &code), &remark)),
            }
            continue;
        };

        if dimension == Dimension::DateRange {
            if date_handled {
                continue;
            }
            date_handled = true;
            match date_range {
                Some((from, to)) => {
                    sets.push(date_range_set(data, &base, from, to));
                    parameters.push(parameter_entry(
                        "Date range",
                        &format!("{from} - {to}"),
                        &remark,
                    ));
                }
                None => parameters.push(not_specified(&name_or(&name, "Date range"), &remark)),
            }
            continue;
        }

        match supplied.get(&code) {
            Some(value) => {
                sets.push(dimension_set(data, &base, dimension, &value.send)?);
                let shown = value.display.clone().unwrap_or_else(|| value.send.clone());
                parameters.push(parameter_entry(&name_or(&name, &code), &shown, &remark));
            }
            None => parameters.push(not_specified(&name_or(&name, &code), &remark)),
        }
    }

    let selected: HashSet<String> = match sets.split_first() {
        None => base.iter().map(|client| value_str(client, "id")).collect(),
        Some((first, rest)) => rest.iter().fold(first.clone(), |acc, set| {
            acc.intersection(set).cloned().collect()
        }),
    };

    let mut enriched: Vec<(Option<NaiveDate>, Value)> = base
        .iter()
        .filter(|client| selected.contains(&value_str(client, "id")))
        .map(|client| enrich_client(data, client))
        .collect();

    // Ascending by cycle start date; clients without one go last.
    enriched.sort_by(|left, right| match (left.0, right.0) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let clients = enriched
        .into_iter()
        .enumerate()
        .map(|(index, (_, mut row))| {
            if let Some(object) = row.as_object_mut() {
                object.insert("no".to_string(), json!(index as i64 + 1));
            }
            row
        })
        .collect();

    Ok(FilteredClients {
        parameters,
        clients,
    })
}

fn dimension_set(
    data: &ReportDataset,
    base: &[&Value],
    dimension: Dimension,
    value: &str,
) -> Result<HashSet<String>, AppError> {
    let set = match dimension {
        Dimension::Gender => collect(base, |client| value_str(client, "gender") == value),
        Dimension::Status => {
            let needle = value.to_lowercase();
            collect(base, |client| {
                value_str(client, "status").to_lowercase().contains(&needle)
            })
        }
        Dimension::Branch => collect(base, |client| value_str(client, "branch") == value),
        Dimension::LoanOfficer => collect(base, |client| value_str(client, "created_by") == value),
        Dimension::LoanCycle => {
            let cycle = value.trim().parse::<i64>().map_err(|_| {
                AppError::Validation(format!("loanCycle '{value}' is not a number."))
            })?;
            collect(base, |client| {
                value_i64(client, "loan_cycle_number") == cycle
            })
        }
        Dimension::Stage => {
            if !taxonomy::is_stage_key(value) {
                return Err(AppError::Validation(format!(
                    "Unknown loan cycle stage '{value}'."
                )));
            }
            let codes: HashSet<&str> = taxonomy::status_codes_of(value)
                .iter()
                .map(|(code, _)| *code)
                .collect();
            collect(base, |client| {
                codes.contains(value_str(client, "status").as_str())
            })
        }
        Dimension::Crop => collect(base, |client| {
            current_cycle_crops(data, client)
                .iter()
                .any(|crop_id| crop_id == value)
        }),
        Dimension::DateRange => HashSet::new(),
    };
    Ok(set)
}

fn collect(base: &[&Value], keep: impl Fn(&Value) -> bool) -> HashSet<String> {
    base.iter()
        .filter(|client| keep(client))
        .map(|client| value_str(client, "id"))
        .collect()
}

fn date_range_set(
    data: &ReportDataset,
    base: &[&Value],
    from: NaiveDate,
    to: NaiveDate,
) -> HashSet<String> {
    collect(base, |client| {
        current_cycle_start(data, client)
            .is_some_and(|started| started >= from && started <= to)
    })
}

/// Crop ids allocated in the client's current cycle (the cycle whose
/// number matches loan_cycle_number and that has an ACAT).
fn current_cycle_crops(data: &ReportDataset, client: &Value) -> Vec<String> {
    let client_id = value_str(client, "id");
    let cycle_number = value_i64(client, "loan_cycle_number");
    let Some(history) = data.history_for(&client_id) else {
        return Vec::new();
    };
    let Some(cycle) = data.current_cycle(history, cycle_number) else {
        return Vec::new();
    };
    let acat_id = value_str(cycle, "acat");
    let Some(client_acat) = data.client_acat(&acat_id) else {
        return Vec::new();
    };
    value_array(client_acat, "acats")
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|id| data.acat(id))
        .map(|acat| value_str(acat, "crop"))
        .filter(|crop| !crop.is_empty())
        .collect()
}

fn current_cycle_start(data: &ReportDataset, client: &Value) -> Option<NaiveDate> {
    let client_id = value_str(client, "id");
    let cycle_number = value_i64(client, "loan_cycle_number");
    let history = data.history_for(&client_id)?;
    let cycle = data.current_cycle(history, cycle_number)?;
    let screening = data.screening(&value_str(cycle, "screening"))?;
    value_date(screening, "date_created")
}

fn enrich_client(data: &ReportDataset, client: &Value) -> (Option<NaiveDate>, Value) {
    let status = value_str(client, "status");
    let (stage, label) = match taxonomy::stage_of(&status) {
        Some(info) => (info.stage.to_string(), info.label.to_string()),
        None => ("Unclassified".to_string(), status.clone()),
    };
    let started = current_cycle_start(data, client);
    let crops: Vec<String> = current_cycle_crops(data, client)
        .iter()
        .map(|crop_id| data.crop_name(crop_id))
        .filter(|name| !name.is_empty())
        .collect();

    let row = json!({
        "client": full_name(client),
        "gender": value_str(client, "gender"),
        "branch": data.branch_name(&value_str(client, "branch")),
        "loan_officer": data.user_display_name(&value_str(client, "created_by")),
        "stage": stage,
        "status": label,
        "loan_cycle_no": value_i64(client, "loan_cycle_number"),
        "loan_cycle_started_at": started
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string()),
        "crops": crops,
    });
    (started, row)
}

pub fn full_name(client: &Value) -> String {
    let parts = [
        value_str(client, "first_name"),
        value_str(client, "last_name"),
        value_str(client, "grandfather_name"),
    ];
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parameter_entry(label: &str, value: &str, remark: &str) -> Value {
    if remark.is_empty() {
        json!({"label": label, "value": value})
    } else {
        json!({"label": label, "value": value, "remark": remark})
    }
}

fn not_specified(label: &str, remark: &str) -> Value {
    parameter_entry(label, "Not specified", remark)
}

fn name_or(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}
