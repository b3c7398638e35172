use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::Session;
use crate::remote::PortfolioClient;

/// Result of posting one client record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported { response: Value },
    Failed {
        client: Value,
        status: Option<u16>,
        message: String,
    },
}

impl ImportOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }
}

/// Posts client records one at a time; a failed record is reported, never
/// raised, so one bad row does not stop the batch.
pub struct ClientImporter {
    portfolios: Arc<dyn PortfolioClient>,
}

impl ClientImporter {
    pub fn new(portfolios: Arc<dyn PortfolioClient>) -> Self {
        Self { portfolios }
    }

    pub async fn import_all(&self, records: &[Value], session: &Session) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let outcome = match self.portfolios.import_client(record, session).await {
                Ok(response) => ImportOutcome::Imported { response },
                Err(e) => {
                    let client_id = record.get("id").unwrap_or(&Value::Null);
                    warn!(
                        client_id = %client_id,
                        status = ?e.status(),
                        error = %e,
                        "import failed"
                    );
                    ImportOutcome::Failed {
                        client: record.clone(),
                        status: e.status(),
                        message: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let imported = outcomes.iter().filter(|o| o.is_imported()).count();
        info!(imported, total = records.len(), "client import finished");
        outcomes
    }
}
