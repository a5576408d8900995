use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateReportTypeInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    /// Dispatch code, e.g. `CLIENTS_BY_GENDER`.
    #[validate(length(min = 1, max = 100))]
    pub r#type: String,
    pub description: Option<String>,
    /// Declared parameters: `[{name, code, remark}]`.
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateReportTypeInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<Vec<Value>>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::{validate_input, CreateReportTypeInput};

    #[test]
    fn empty_title_fails_validation() {
        let input: CreateReportTypeInput = serde_json::from_value(serde_json::json!({
            "title": "",
            "type": "CROP_STATS",
        }))
        .unwrap();
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn defaults_apply_on_deserialize() {
        let input: CreateReportTypeInput = serde_json::from_value(serde_json::json!({
            "title": "Crop statistics",
            "type": "CROP_STATS",
        }))
        .unwrap();
        assert!(input.active);
        assert!(input.parameters.is_empty());
        assert!(validate_input(&input).is_ok());
    }
}
