use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ActivatorError, Result};

/// Security id the portfolio API uses for the cash-equivalent sleeve
pub const CASH_SECURITY_ID: i64 = 1_000_000_000;

/// Portfolio aggregate owned by the remote API.
///
/// Unknown fields are preserved so the aggregate can be written back with
/// `PUT` without dropping anything the server sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Owning advisor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsk_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<ModelVersion>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A model is a portfolio of type `MODEL`
pub type Model = Portfolio;

pub const MODEL_KIND: &str = "MODEL";

impl Portfolio {
    pub fn primary_account(&self) -> Option<&Account> {
        self.accounts.first()
    }

    pub fn primary_account_mut(&mut self) -> Option<&mut Account> {
        self.accounts.first_mut()
    }

    pub fn is_model(&self) -> bool {
        self.kind.as_deref() == Some(MODEL_KIND)
    }

    /// Eligibility of the primary account, as reported by the server
    pub fn is_autopilot_eligible(&self) -> bool {
        self.primary_account()
            .and_then(|a| a.is_autopilot_eligible)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<i64>,
    /// Absent, 0 (disabled) or 1 (enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_autopilot_enabled: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_autopilot_eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<Allocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    pub fn autopilot_enabled(&self) -> bool {
        self.is_autopilot_enabled == Some(1)
    }

    pub fn enable_autopilot(&mut self) {
        self.is_autopilot_enabled = Some(1);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(default)]
    pub sec_id: Option<i64>,
    /// Notional amount used when the model was sampled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eligibility: Vec<Eligibility>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Allocation {
    pub fn is_cash(&self) -> bool {
        self.sec_id == Some(CASH_SECURITY_ID)
    }

    /// An allocation without an eligibility report counts as eligible
    pub fn is_eligible(&self) -> bool {
        self.eligibility.first().map_or(true, |e| e.is_eligible)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    #[serde(default)]
    pub is_eligible: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Model + version a target's model sleeve points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReference {
    pub model_id: i64,
    pub model_version_id: i64,
}

impl ModelReference {
    pub fn new(model_id: i64, model_version_id: i64) -> Self {
        Self {
            model_id,
            model_version_id,
        }
    }

    pub fn from_model(model: &Model) -> Result<Self> {
        let model_id = model
            .id
            .ok_or_else(|| ActivatorError::Data("model has no id".to_string()))?;
        let version = model.model_version.as_ref().ok_or_else(|| {
            ActivatorError::Data(format!("model {model_id} has no model_version"))
        })?;
        Ok(Self::new(model_id, version.id))
    }
}

impl std::fmt::Display for ModelReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model {} v{}", self.model_id, self.model_version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "id": 9,
            "type": "CLIENT",
            "rsk_user_id": 300,
            "name": "Household",
            "accounts": [{
                "id": 42,
                "portfolio_id": 9,
                "is_autopilot_enabled": 0,
                "custodian": "SCHW",
            }]
        });

        let mut portfolio: Portfolio = serde_json::from_value(raw).unwrap();
        assert!(!portfolio.primary_account().unwrap().autopilot_enabled());
        portfolio.primary_account_mut().unwrap().enable_autopilot();

        let written = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(written["name"], "Household");
        assert_eq!(written["accounts"][0]["custodian"], "SCHW");
        assert_eq!(written["accounts"][0]["is_autopilot_enabled"], 1);
    }

    #[test]
    fn test_model_reference_requires_version() {
        let model: Model = serde_json::from_value(json!({"id": 7, "type": "MODEL"})).unwrap();
        assert!(model.is_model());
        assert!(matches!(
            ModelReference::from_model(&model),
            Err(ActivatorError::Data(_))
        ));

        let versioned: Model =
            serde_json::from_value(json!({"id": 7, "model_version": {"id": 3}})).unwrap();
        assert_eq!(
            ModelReference::from_model(&versioned).unwrap(),
            ModelReference::new(7, 3)
        );
    }

    #[test]
    fn test_allocation_eligibility_defaults_to_eligible() {
        let allocation = Allocation {
            sec_id: Some(10),
            ..Allocation::default()
        };
        assert!(allocation.is_eligible());

        let blocked: Allocation = serde_json::from_value(
            json!({"sec_id": 10, "eligibility": [{"is_eligible": false, "reason": "illiquid"}]}),
        )
        .unwrap();
        assert!(!blocked.is_eligible());
    }
}
