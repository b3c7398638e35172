use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::portfolio::{Account, ModelReference, CASH_SECURITY_ID};
use crate::error::{ActivatorError, Result};

/// Weight of the unlocked cash sleeve
pub const CASH_SLEEVE_PERCENT: f64 = 0.02;
/// Weight of the sleeve that tracks the model
pub const MODEL_SLEEVE_PERCENT: f64 = 0.98;

/// Allocation instruction posted to the target service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub portfolio_id: i64,
    pub account_id: i64,
    pub advisor_id: Option<i64>,
    pub autopilot_activated: bool,
    pub status: String,
    pub allocations: Vec<TargetAllocation>,
    pub suppress_trading_evaluation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub sec_id: Option<i64>,
    pub model_id: Option<i64>,
    pub model_version_id: Option<i64>,
    pub percent: f64,
    pub is_locked: bool,
}

impl TargetAllocation {
    fn cash() -> Self {
        Self {
            sec_id: Some(CASH_SECURITY_ID),
            model_id: None,
            model_version_id: None,
            percent: CASH_SLEEVE_PERCENT,
            is_locked: false,
        }
    }

    fn model(model: &ModelReference) -> Self {
        Self {
            sec_id: None,
            model_id: Some(model.model_id),
            model_version_id: Some(model.model_version_id),
            percent: MODEL_SLEEVE_PERCENT,
            is_locked: false,
        }
    }

    /// Zero-weight locked row the target service expects as the last entry
    fn placeholder() -> Self {
        Self {
            sec_id: Some(0),
            model_id: None,
            model_version_id: None,
            percent: 0.0,
            is_locked: true,
        }
    }
}

impl Target {
    pub fn total_percent(&self) -> f64 {
        self.allocations.iter().map(|a| a.percent).sum()
    }
}

/// Build the target that puts `account` on `model`.
///
/// `fallback_portfolio_id` and `fallback_advisor_id` come from the enclosing
/// portfolio and are used when the account itself does not carry them.
pub fn build_target(
    account: &Account,
    fallback_portfolio_id: Option<i64>,
    fallback_advisor_id: Option<i64>,
    model: &ModelReference,
) -> Result<Target> {
    let portfolio_id = account
        .portfolio_id
        .or(fallback_portfolio_id)
        .ok_or_else(|| ActivatorError::Data("account has no portfolio_id".to_string()))?;
    let account_id = account.id.ok_or_else(|| {
        ActivatorError::Data(format!("account in portfolio {portfolio_id} has no id"))
    })?;

    Ok(Target {
        portfolio_id,
        account_id,
        advisor_id: account.advisor_id.or(fallback_advisor_id),
        autopilot_activated: false,
        status: "active".to_string(),
        allocations: vec![
            TargetAllocation::cash(),
            TargetAllocation::model(model),
            TargetAllocation::placeholder(),
        ],
        suppress_trading_evaluation: true,
    })
}

/// Whatever the target service echoes back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
