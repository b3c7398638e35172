use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::TargetServiceConfig;
use crate::domain::{Receipt, Target};
use crate::error::{ActivatorError, Result};
use crate::remote::TargetSubmitter;

/// Client for `POST /v1/targets`
#[derive(Clone)]
pub struct TargetServiceClient {
    http: Client,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl TargetServiceClient {
    pub fn new(
        config: &TargetServiceConfig,
        authorization: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ActivatorError::Internal(format!("failed to build target service client: {}", e))
            })?;

        let authorization = match authorization {
            "" => None,
            raw => Some(HeaderValue::from_str(raw).map_err(|e| {
                ActivatorError::Validation(format!("invalid authorization header: {}", e))
            })?),
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }
}

#[async_trait]
impl TargetSubmitter for TargetServiceClient {
    #[instrument(skip(self, target), fields(portfolio_id = target.portfolio_id, account_id = target.account_id))]
    async fn post_target(&self, target: &Target) -> Result<Receipt> {
        let entity = format!("target {}:{}", target.portfolio_id, target.account_id);
        let mut req = self
            .http
            .post(format!("{}/v1/targets", self.base_url))
            .json(target);
        if let Some(auth) = &self.authorization {
            req = req.header(AUTHORIZATION, auth.clone());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ActivatorError::transport(&entity, e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ActivatorError::transport(&entity, e))?;

        if !status.is_success() {
            return Err(ActivatorError::remote(
                entity,
                Some(status.as_u16()),
                format!("error creating target: {}", text.trim()),
            ));
        }

        debug!(status = status.as_u16(), "target accepted");

        if text.trim().is_empty() {
            return Ok(Receipt::default());
        }

        // Non-object acknowledgements still count as accepted
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }
}
