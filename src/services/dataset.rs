//! In-memory snapshot of the entities one report computation reads.
//!
//! Aggregations walk client -> history -> cycle -> ACAT -> proposal chains
//! repeatedly, so everything is fetched once per computation and joined in
//! memory instead of issuing a query per hop.

use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppError;
use crate::repository::table_service::list_rows;
use crate::rows::{value_array, value_i64, value_str};

const FETCH_LIMIT: i64 = 10_000;

#[derive(Debug, Default)]
pub struct ReportDataset {
    pub clients: Vec<Value>,
    pub histories: Vec<Value>,
    pub screenings: Vec<Value>,
    pub client_acats: Vec<Value>,
    pub acats: Vec<Value>,
    pub loan_proposals: Vec<Value>,
    pub crops: Vec<Value>,
    pub branches: Vec<Value>,
    pub users: Vec<Value>,
}

impl ReportDataset {
    pub async fn load(pool: &PgPool) -> Result<Self, AppError> {
        Ok(Self {
            clients: fetch(pool, "clients").await?,
            histories: fetch(pool, "histories").await?,
            screenings: fetch(pool, "screenings").await?,
            client_acats: fetch(pool, "client_acats").await?,
            acats: fetch(pool, "acats").await?,
            loan_proposals: fetch(pool, "loan_proposals").await?,
            crops: fetch(pool, "crops").await?,
            branches: fetch(pool, "branches").await?,
            users: fetch(pool, "users").await?,
        })
    }

    pub fn history_for(&self, client_id: &str) -> Option<&Value> {
        self.histories
            .iter()
            .find(|row| value_str(row, "client") == client_id)
    }

    /// The cycle a client is currently in: cycle_number equal to the
    /// client's loan_cycle_number.
    pub fn current_cycle<'a>(&self, history: &'a Value, loan_cycle_number: i64) -> Option<&'a Value> {
        value_array(history, "cycles")
            .iter()
            .find(|cycle| value_i64(cycle, "cycle_number") == loan_cycle_number)
    }

    pub fn screening(&self, screening_id: &str) -> Option<&Value> {
        find_by_id(&self.screenings, screening_id)
    }

    pub fn client_acat(&self, client_acat_id: &str) -> Option<&Value> {
        find_by_id(&self.client_acats, client_acat_id)
    }

    pub fn acat(&self, acat_id: &str) -> Option<&Value> {
        find_by_id(&self.acats, acat_id)
    }

    pub fn proposal_for_client_acat(&self, client_acat_id: &str) -> Option<&Value> {
        self.loan_proposals
            .iter()
            .find(|row| value_str(row, "client_acat") == client_acat_id)
    }

    pub fn crop_name(&self, crop_id: &str) -> String {
        find_by_id(&self.crops, crop_id)
            .map(|row| value_str(row, "name"))
            .unwrap_or_default()
    }

    pub fn branch_name(&self, branch_id: &str) -> String {
        find_by_id(&self.branches, branch_id)
            .map(|row| value_str(row, "name"))
            .unwrap_or_default()
    }

    pub fn user_display_name(&self, user_id: &str) -> String {
        find_by_id(&self.users, user_id)
            .map(|row| {
                let first = value_str(row, "first_name");
                let last = value_str(row, "last_name");
                format!("{first} {last}").trim().to_string()
            })
            .unwrap_or_default()
    }
}

fn find_by_id<'a>(rows: &'a [Value], id: &str) -> Option<&'a Value> {
    if id.is_empty() {
        return None;
    }
    rows.iter().find(|row| value_str(row, "id") == id)
}

async fn fetch(pool: &PgPool, table: &str) -> Result<Vec<Value>, AppError> {
    list_rows(pool, table, None, FETCH_LIMIT, 0, "date_created", true).await
}

#[cfg(test)]
pub mod fixtures {
    use serde_json::json;

    use super::ReportDataset;

    /// Two branches, three clients, one full loan history. Used across the
    /// filter and aggregator tests.
    pub fn dataset() -> ReportDataset {
        ReportDataset {
            branches: vec![
                json!({"id": "b1", "name": "Meki"}),
                json!({"id": "b2", "name": "Ziway"}),
            ],
            crops: vec![
                json!({"id": "crop-tomato", "name": "Tomato"}),
                json!({"id": "crop-maize", "name": "Maize"}),
                json!({"id": "crop-onion", "name": "Onion"}),
            ],
            users: vec![
                json!({"id": "officer-1", "first_name": "Abebe", "last_name": "Kebede"}),
                json!({"id": "officer-2", "first_name": "Sara", "last_name": "Lemma"}),
            ],
            clients: vec![
                json!({
                    "id": "c1", "first_name": "Debela", "last_name": "Ibssa",
                    "grandfather_name": "Gutema", "gender": "Male", "branch": "b1",
                    "created_by": "officer-1", "status": "ACAT-AUTHORIZED",
                    "loan_cycle_number": 2, "for_group": false,
                }),
                json!({
                    "id": "c2", "first_name": "Mary", "last_name": "Jane",
                    "grandfather_name": "Doe", "gender": "Female", "branch": "b1",
                    "created_by": "officer-2", "status": "eligible",
                    "loan_cycle_number": 1, "for_group": false,
                }),
                json!({
                    "id": "c3", "first_name": "Hana", "last_name": "Tesfaye",
                    "grandfather_name": "Bekele", "gender": "Female", "branch": "b2",
                    "created_by": "officer-1", "status": "loan_granted",
                    "loan_cycle_number": 1, "for_group": true,
                }),
            ],
            histories: vec![
                json!({
                    "id": "h1", "client": "c1", "cycle_number": 2,
                    "cycles": [
                        {"cycle_number": 1, "screening": "s1", "loan": "l1", "acat": "ca1", "status": "loan_paid"},
                        {"cycle_number": 2, "screening": "s2", "loan": "l2", "acat": "ca2", "status": "ACAT-AUTHORIZED"},
                    ],
                }),
                json!({
                    "id": "h2", "client": "c2", "cycle_number": 1,
                    "cycles": [
                        {"cycle_number": 1, "screening": "s3", "loan": null, "acat": null, "status": "eligible"},
                    ],
                }),
                json!({
                    "id": "h3", "client": "c3", "cycle_number": 1,
                    "cycles": [
                        {"cycle_number": 1, "screening": "s4", "loan": "l3", "acat": "ca3", "status": "loan_granted"},
                    ],
                }),
            ],
            screenings: vec![
                json!({"id": "s1", "client": "c1", "date_created": "2023-02-01"}),
                json!({"id": "s2", "client": "c1", "date_created": "2024-03-15"}),
                json!({"id": "s3", "client": "c2", "date_created": "2024-01-10"}),
                json!({"id": "s4", "client": "c3", "date_created": "2024-05-20"}),
            ],
            client_acats: vec![
                json!({
                    "id": "ca1", "client": "c1",
                    "estimated": {"total_cost": 25000.0, "total_revenue": 40000.0},
                    "achieved": {"total_cost": 30000.0, "total_revenue": 42000.0},
                    "acats": ["a1"],
                }),
                json!({
                    "id": "ca2", "client": "c1",
                    "estimated": {"total_cost": 10000.0, "total_revenue": 30000.0},
                    "achieved": {"total_cost": 0.0, "total_revenue": 0.0},
                    "acats": ["a2", "a3"],
                }),
                json!({
                    "id": "ca3", "client": "c3",
                    "estimated": {"total_cost": 5000.0, "total_revenue": 9000.0},
                    "achieved": {"total_cost": 4000.0, "total_revenue": 8000.0},
                    "acats": ["a4"],
                }),
            ],
            acats: vec![
                json!({"id": "a1", "crop": "crop-tomato", "client": "c1"}),
                json!({"id": "a2", "crop": "crop-tomato", "client": "c1"}),
                json!({"id": "a3", "crop": "crop-maize", "client": "c1"}),
                json!({"id": "a4", "crop": "crop-onion", "client": "c3"}),
            ],
            loan_proposals: vec![
                json!({
                    "id": "p1", "client": "c1", "client_acat": "ca1",
                    "loan_requested": 20000.0, "loan_approved": 15000.0,
                    "status": "loan_paid", "date_created": "2023-02-20",
                }),
                json!({
                    "id": "p2", "client": "c1", "client_acat": "ca2",
                    "loan_requested": 30000.0, "loan_approved": 25500.0,
                    "status": "loan_granted", "date_created": "2024-04-01",
                }),
                json!({
                    "id": "p3", "client": "c3", "client_acat": "ca3",
                    "loan_requested": 8000.0, "loan_approved": 7000.0,
                    "status": "inprogress", "date_created": "2024-06-02",
                }),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::dataset;
    use crate::rows::value_str;

    #[test]
    fn resolves_history_and_current_cycle() {
        let data = dataset();
        let history = data.history_for("c1").expect("c1 has a history");
        let cycle = data.current_cycle(history, 2).expect("current cycle");
        assert_eq!(value_str(cycle, "acat"), "ca2");
        assert!(data.current_cycle(history, 9).is_none());
    }

    #[test]
    fn resolves_display_names() {
        let data = dataset();
        assert_eq!(data.crop_name("crop-tomato"), "Tomato");
        assert_eq!(data.branch_name("b2"), "Ziway");
        assert_eq!(data.user_display_name("officer-1"), "Abebe Kebede");
        assert_eq!(data.user_display_name("missing"), "");
    }

    #[test]
    fn resolves_proposals_by_client_acat() {
        let data = dataset();
        let proposal = data.proposal_for_client_acat("ca2").expect("proposal");
        assert_eq!(value_str(proposal, "status"), "loan_granted");
        assert!(data.proposal_for_client_acat("ca9").is_none());
    }
}
