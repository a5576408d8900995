//! Row-level visibility derived from an actor's branch-access account.

use serde_json::Value;

use crate::error::AppError;
use crate::repository::table_service::list_rows;
use crate::rows::{json_map, value_array, value_bool, value_str};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    ViewAll,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "VIEW",
            Self::ViewAll => "VIEW_ALL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Unrestricted,
    BranchIn(Vec<String>),
    BranchEq(String),
    OwnedBy(String),
}

impl AccessScope {
    /// Whether a client row is visible under this scope.
    pub fn permits(&self, client: &Value) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::BranchIn(branches) => {
                let branch = value_str(client, "branch");
                branches.iter().any(|id| id == &branch)
            }
            Self::BranchEq(branch) => value_str(client, "branch") == *branch,
            Self::OwnedBy(owner) => value_str(client, "created_by") == *owner,
        }
    }
}

/// A missing account row is the super admin and is permitted everything.
pub fn is_permitted(account: Option<&Value>, capability: Capability) -> bool {
    let Some(account) = account else {
        return true;
    };
    value_array(account, "permissions")
        .iter()
        .filter_map(Value::as_str)
        .any(|granted| granted == capability.as_str())
}

/// Resolve the visibility restriction for one report computation.
/// Priority order, first match wins.
pub fn resolve_scope(account: Option<&Value>, user_id: &str) -> AccessScope {
    let Some(account) = account else {
        return AccessScope::Unrestricted;
    };
    let can_view_all = is_permitted(Some(account), Capability::ViewAll);

    if value_bool(account, "multi_branches") && can_view_all {
        return AccessScope::Unrestricted;
    }

    if can_view_all {
        let access_branches = value_array(account, "access_branches")
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        if !access_branches.is_empty() {
            return AccessScope::BranchIn(access_branches);
        }
        let default_branch = value_str(account, "default_branch");
        if !default_branch.is_empty() {
            return AccessScope::BranchEq(default_branch);
        }
    }

    AccessScope::OwnedBy(user_id.to_string())
}

/// Fetch the actor's branch-access account, if one exists.
pub async fn load_account(state: &AppState, user_id: &str) -> Result<Option<Value>, AppError> {
    let pool = state.require_db()?;
    let filters = json_map(&[("user_id", Value::String(user_id.to_string()))]);
    let mut rows = list_rows(pool, "accounts", Some(&filters), 1, 0, "date_created", false).await?;
    Ok(rows.pop())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{is_permitted, resolve_scope, AccessScope, Capability};

    #[test]
    fn missing_account_is_super_admin() {
        assert_eq!(resolve_scope(None, "u1"), AccessScope::Unrestricted);
        assert!(is_permitted(None, Capability::ViewAll));
    }

    #[test]
    fn multi_branch_view_all_is_unrestricted() {
        let account = json!({
            "multi_branches": true,
            "permissions": ["VIEW", "VIEW_ALL"],
            "access_branches": ["b1"],
        });
        assert_eq!(resolve_scope(Some(&account), "u1"), AccessScope::Unrestricted);
    }

    #[test]
    fn view_all_prefers_access_branches_over_default() {
        let account = json!({
            "multi_branches": false,
            "permissions": ["VIEW_ALL"],
            "access_branches": ["b1", "b2"],
            "default_branch": "b3",
        });
        assert_eq!(
            resolve_scope(Some(&account), "u1"),
            AccessScope::BranchIn(vec!["b1".to_string(), "b2".to_string()])
        );
    }

    #[test]
    fn view_all_falls_back_to_default_branch() {
        let account = json!({
            "multi_branches": false,
            "permissions": ["VIEW_ALL"],
            "access_branches": [],
            "default_branch": "b3",
        });
        assert_eq!(
            resolve_scope(Some(&account), "u1"),
            AccessScope::BranchEq("b3".to_string())
        );
    }

    #[test]
    fn plain_view_owns_only_its_clients() {
        let account = json!({
            "multi_branches": false,
            "permissions": ["VIEW"],
            "access_branches": ["b1"],
        });
        assert_eq!(
            resolve_scope(Some(&account), "u1"),
            AccessScope::OwnedBy("u1".to_string())
        );
    }

    #[test]
    fn scope_predicates_match_client_rows() {
        let client = json!({"branch": "b2", "created_by": "officer-1"});
        assert!(AccessScope::Unrestricted.permits(&client));
        assert!(AccessScope::BranchIn(vec!["b1".into(), "b2".into()]).permits(&client));
        assert!(!AccessScope::BranchIn(vec!["b9".into()]).permits(&client));
        assert!(AccessScope::BranchEq("b2".into()).permits(&client));
        assert!(AccessScope::OwnedBy("officer-1".into()).permits(&client));
        assert!(!AccessScope::OwnedBy("officer-2".into()).permits(&client));
    }
}
