//! REST adapter for the portfolio API.
//!
//! Payloads are deserialized into the typed shapes in `crate::domain`; every
//! failure is reported against the entity the call was about.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{AdvisorConfig, ApiConfig};
use crate::domain::{Account, Allocation, ClientDetail, Model, Portfolio, Session, MODEL_KIND};
use crate::error::{ActivatorError, Result};
use crate::remote::PortfolioClient;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPortfolio {
    id: i64,
}

#[derive(Clone)]
pub struct PortfolioApiClient {
    http: Client,
    base_url: Url,
    authorization: Option<HeaderValue>,
    session_header: HeaderName,
    advisor: AdvisorConfig,
}

impl PortfolioApiClient {
    pub fn new(api: &ApiConfig, advisor: AdvisorConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(api.user_agent.as_str())
            .timeout(api.request_timeout())
            .build()
            .map_err(|e| {
                ActivatorError::Internal(format!("failed to build portfolio API client: {}", e))
            })?;

        let authorization = if api.authorization.is_empty() {
            None
        } else {
            Some(HeaderValue::from_str(&api.authorization).map_err(|e| {
                ActivatorError::Validation(format!("invalid api.authorization header: {}", e))
            })?)
        };

        let session_header = HeaderName::from_bytes(api.session_header.as_bytes()).map_err(|e| {
            ActivatorError::Validation(format!("invalid api.session_header: {}", e))
        })?;

        let base_url = Url::parse(api.base_url.trim_end_matches('/')).map_err(|e| {
            ActivatorError::Validation(format!("invalid api.base_url {}: {}", api.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ActivatorError::Validation(format!(
                "api.base_url {} cannot carry a path",
                api.base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            authorization,
            session_header,
            advisor,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append `segments` to the base path. Each segment is percent-encoded, so
    /// an id carrying `/`, `?` or `#` stays inside its own segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "." | "..")) {
            return Err(ActivatorError::Validation(format!(
                "refusing path segment {:?}",
                bad
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ActivatorError::Internal("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn headers(&self, session: Option<&Session>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &self.authorization {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        if let Some(session) = session {
            let value = HeaderValue::from_str(session.token())
                .map_err(|e| ActivatorError::Auth(format!("invalid session token: {}", e)))?;
            headers.insert(self.session_header.clone(), value);
        }
        Ok(headers)
    }

    /// Issue a request and return the raw body, mapping failures onto `entity`.
    async fn send(
        &self,
        method: Method,
        url: Url,
        entity: &str,
        body: Option<&Value>,
        session: Option<&Session>,
    ) -> Result<String> {
        let path = url.path().to_string();
        let mut req = self
            .http
            .request(method.clone(), url)
            .headers(self.headers(session)?);

        if let Some(body) = body {
            req = req.json(body);
        }

        debug!(%method, %path, "portfolio API request");
        let resp = req
            .send()
            .await
            .map_err(|e| ActivatorError::transport(entity, e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ActivatorError::transport(entity, e))?;

        if !status.is_success() {
            return Err(ActivatorError::remote(
                entity,
                Some(status.as_u16()),
                format!("{} {} failed: {}", method, path, text.trim()),
            ));
        }

        Ok(text)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        entity: &str,
        body: Option<&Value>,
        session: Option<&Session>,
    ) -> Result<T> {
        let text = self.send(method, url, entity, body, session).await?;
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(body).map_err(|e| {
            ActivatorError::remote(entity, None, format!("invalid JSON response: {}", e))
        })
    }
}

#[async_trait]
impl PortfolioClient for PortfolioApiClient {
    #[instrument(skip(self))]
    async fn login(&self) -> Result<Session> {
        if self.advisor.email.is_empty() || self.advisor.password.is_empty() {
            return Err(ActivatorError::Auth(
                "advisor.email and advisor.password are required to log in".to_string(),
            ));
        }

        let body = json!({
            "email": self.advisor.email,
            "password": self.advisor.password,
            "app_id": self.advisor.app_id,
        });

        let resp: LoginResponse = self
            .request_json(
                Method::POST,
                self.endpoint(&["v1", "auth", "login"])?,
                "login",
                Some(&body),
                None,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "unable to get session");
                ActivatorError::Auth(e.to_string())
            })?;

        resp.token
            .filter(|t| !t.is_empty())
            .map(Session::new)
            .ok_or_else(|| ActivatorError::Auth("login response carried no token".to_string()))
    }

    async fn get_client(&self, client_id: &str, session: &Session) -> Result<ClientDetail> {
        self.request_json(
            Method::GET,
            self.endpoint(&["clients", client_id])?,
            &format!("client {}", client_id),
            None,
            Some(session),
        )
        .await
    }

    async fn get_portfolio(&self, portfolio_id: i64, session: &Session) -> Result<Portfolio> {
        self.request_json(
            Method::GET,
            self.endpoint(&["v1", "portfolios", &portfolio_id.to_string()])?,
            &format!("portfolio {}", portfolio_id),
            None,
            Some(session),
        )
        .await
    }

    async fn update_portfolio(
        &self,
        portfolio: &Portfolio,
        session: &Session,
    ) -> Result<Portfolio> {
        let id = portfolio.id.ok_or_else(|| {
            ActivatorError::Data("cannot update a portfolio without an id".to_string())
        })?;
        let body = serde_json::to_value(portfolio)?;
        self.request_json(
            Method::PUT,
            self.endpoint(&["v1", "portfolios", &id.to_string()])?,
            &format!("portfolio {}", id),
            Some(&body),
            Some(session),
        )
        .await
    }

    #[instrument(skip(self, allocations, session), fields(allocations = allocations.len()))]
    async fn create_model(&self, allocations: Vec<Allocation>, session: &Session) -> Result<Model> {
        let body = json!({
            "type": MODEL_KIND,
            "status": "active",
            "name": chrono::Utc::now().to_rfc3339(),
        });

        let created: CreatedPortfolio = self
            .request_json(
                Method::POST,
                self.endpoint(&["v1", "portfolios", ""])?,
                "new model",
                Some(&body),
                Some(session),
            )
            .await?;

        let mut model = self.get_model(created.id, session).await?;
        model.accounts = vec![Account {
            allocations,
            ..Default::default()
        }];

        self.update_model(&model, session).await
    }

    async fn sync_client(&self, client_id: &str, session: &Session) -> Result<()> {
        self.send(
            Method::GET,
            self.endpoint(&["integration", "sync_client_generic", client_id])?,
            &format!("client {} sync", client_id),
            None,
            Some(session),
        )
        .await
        .map(|_| ())
    }

    async fn import_client(&self, record: &Value, session: &Session) -> Result<Value> {
        let entity = match record.get("id") {
            Some(id) => format!("client import {}", id),
            None => "client import".to_string(),
        };
        self.request_json(
            Method::POST,
            self.endpoint(&["clients"])?,
            &entity,
            Some(record),
            Some(session),
        )
        .await
    }
}
