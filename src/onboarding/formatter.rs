use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ActivatorError, Result};
use crate::remote::RemoteCatalog;

/// Contact exported from an external CRM
#[derive(Debug, Clone, Deserialize)]
pub struct ContactEntry {
    pub id: Value,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where the contacts came from and who they belong to
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    pub advisor_id: String,
    pub database_id: String,
    pub link_id: String,
    pub integration_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportExtras {
    pub contact_id: Value,
    pub database_id: String,
    pub ex_api_link_id: String,
    #[serde(rename = "type")]
    pub integration_type: String,
}

/// Body accepted by `POST /clients`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRecord {
    pub id: Value,
    pub name: String,
    pub value: String,
    pub tag: String,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub advisor_id: String,
    pub previous_review_date: DateTime<Utc>,
    pub extras: ImportExtras,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Turn CRM contacts into import records stamped with `reviewed_at`.
pub fn format_clients(
    contacts: Vec<ContactEntry>,
    options: &FormatOptions,
    reviewed_at: DateTime<Utc>,
) -> Vec<ImportRecord> {
    contacts
        .into_iter()
        .map(|contact| {
            let mut names = contact.name.split_whitespace().map(str::to_string);
            let fname = names.next();
            let lname = names.next();

            // Fields the record sets itself win over same-named contact fields
            let mut extra = contact.extra;
            for key in [
                "value",
                "tag",
                "fname",
                "lname",
                "advisor_id",
                "previous_review_date",
                "extras",
            ] {
                extra.remove(key);
            }

            ImportRecord {
                id: contact.id.clone(),
                value: contact.name.clone(),
                name: contact.name,
                tag: "ACTIVE".to_string(),
                fname,
                lname,
                advisor_id: options.advisor_id.clone(),
                previous_review_date: reviewed_at,
                extras: ImportExtras {
                    contact_id: contact.id,
                    database_id: options.database_id.clone(),
                    ex_api_link_id: options.link_id.clone(),
                    integration_type: options.integration_type.clone(),
                },
                extra,
            }
        })
        .collect()
}

/// Resolve the advisor id and integration link id from the catalog by
/// advisor email.
pub async fn resolve_advisor_link(
    catalog: &dyn RemoteCatalog,
    email: &str,
    integration_type: &str,
) -> Result<(String, String)> {
    let advisor = catalog
        .get_advisor(email)
        .await?
        .ok_or_else(|| ActivatorError::Data(format!("no advisor with email {email}")))?;

    let link = catalog
        .get_ex_api_link(advisor.id, integration_type)
        .await?
        .ok_or_else(|| {
            ActivatorError::Data(format!(
                "advisor {} has no {} integration link",
                advisor.id, integration_type
            ))
        })?;

    Ok((advisor.id.to_string(), link.id.to_string()))
}
