use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Randomly drawn tradable security with a random notional amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledSecurity {
    pub sec_id: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisor {
    pub id: i64,
    pub email: String,
}

/// Advisor's link to an external integration (CRM, custodian feed, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExApiLink {
    pub id: i64,
    pub user_id: i64,
    pub service: String,
    /// Stored as JSON text, parsed on read
    pub data: Value,
}
