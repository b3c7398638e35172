//! Reading and writing the JSON files the commands consume and produce.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::domain::ClientRecord;
use crate::error::{ActivatorError, Result};

/// Parse a JSON array file into `T`s
pub async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    serde_json::from_str(&raw).map_err(|e| {
        ActivatorError::Validation(format!(
            "{} is not a JSON array of the expected shape: {}",
            path.display(),
            e
        ))
    })
}

pub async fn load_clients(path: &Path) -> Result<Vec<ClientRecord>> {
    read_json_array(path).await
}

/// Write `value` as JSON to `output`, or to stdout when no path is given
pub async fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    match output {
        Some(path) => tokio::fs::write(path, body).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&body).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
