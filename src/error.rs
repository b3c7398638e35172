use thiserror::Error;

/// Main error type for the activation tooling
#[derive(Error, Debug)]
pub enum ActivatorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    // Remote API errors
    #[error("Remote error for {entity}{}: {message}", status_suffix(.status))]
    Remote {
        entity: String,
        status: Option<u16>,
        message: String,
    },

    // Database errors
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    // Missing linkage in remote payloads
    #[error("Data error: {0}")]
    Data(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Model synthesis did not converge after {attempts} attempts")]
    NotConverged { attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),

    // Errors carrying attached context; the alternate form prints the chain
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl ActivatorError {
    /// Build a remote error from a non-success response.
    pub fn remote(entity: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            entity: entity.into(),
            status,
            message: message.into(),
        }
    }

    /// Map a transport failure (connect, timeout, body decode) onto the
    /// entity it was issued for.
    pub fn transport(entity: impl Into<String>, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Remote {
            entity: entity.into(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Upstream HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Result type alias for ActivatorError
pub type Result<T> = std::result::Result<T, ActivatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_mentions_entity_and_status() {
        let err = ActivatorError::remote("portfolio 12", Some(404), "not found");
        let msg = err.to_string();
        assert!(msg.contains("portfolio 12"), "got: {msg}");
        assert!(msg.contains("status 404"), "got: {msg}");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn remote_error_without_status_omits_it() {
        let err = ActivatorError::remote("client abc", None, "connection refused");
        assert_eq!(
            err.to_string(),
            "Remote error for client abc: connection refused"
        );
        assert_eq!(err.status(), None);
    }
}
