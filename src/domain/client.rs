use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One entry of the client list handed to an activation run.
///
/// Only `id` is interpreted; every other field is carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// External identifier, if present and non-blank
    pub fn client_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Client as returned by `GET /clients/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientDetail {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub portfolios: Vec<PortfolioLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientDetail {
    /// Id of the first linked portfolio
    pub fn primary_portfolio_id(&self) -> Option<i64> {
        self.portfolios.first().and_then(|p| p.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioLink {
    #[serde(default)]
    pub id: Option<i64>,
}

/// Accept identifiers sent either as JSON strings or numbers.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_ids() {
        let clients: Vec<ClientRecord> =
            serde_json::from_value(json!([{"id": 17}, {"id": "abc"}, {"id": "  "}, {"name": "x"}]))
                .unwrap();

        assert_eq!(clients[0].client_id(), Some("17"));
        assert_eq!(clients[1].client_id(), Some("abc"));
        assert_eq!(clients[2].client_id(), None);
        assert_eq!(clients[3].client_id(), None);
    }

    #[test]
    fn test_primary_portfolio() {
        let detail: ClientDetail =
            serde_json::from_value(json!({"id": 5, "portfolios": [{"id": 81}, {"id": 82}]}))
                .unwrap();
        assert_eq!(detail.primary_portfolio_id(), Some(81));

        let empty: ClientDetail = serde_json::from_value(json!({"id": 5})).unwrap();
        assert_eq!(empty.primary_portfolio_id(), None);
    }
}
