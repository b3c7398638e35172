use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    Advisor, Allocation, ClientDetail, ExApiLink, Model, Portfolio, Receipt, SampledSecurity,
    Session, Target,
};
use crate::error::Result;

/// Typed operations against the remote portfolio API.
///
/// Every call fails with `ActivatorError::Remote` carrying the upstream
/// status and the entity id on a non-2xx response or transport failure.
#[async_trait]
pub trait PortfolioClient: Send + Sync {
    /// Obtain a session for the configured advisor; `ActivatorError::Auth` on failure.
    async fn login(&self) -> Result<Session>;

    async fn get_client(&self, client_id: &str, session: &Session) -> Result<ClientDetail>;

    async fn get_portfolio(&self, portfolio_id: i64, session: &Session) -> Result<Portfolio>;

    /// Full replace of the aggregate
    async fn update_portfolio(&self, portfolio: &Portfolio, session: &Session)
        -> Result<Portfolio>;

    async fn get_model(&self, model_id: i64, session: &Session) -> Result<Model> {
        self.get_portfolio(model_id, session).await
    }

    /// Create an empty model, re-fetch it for server-assigned ids, then
    /// attach `allocations` and update.
    async fn create_model(&self, allocations: Vec<Allocation>, session: &Session) -> Result<Model>;

    async fn update_model(&self, model: &Model, session: &Session) -> Result<Model> {
        self.update_portfolio(model, session).await
    }

    async fn sync_client(&self, client_id: &str, session: &Session) -> Result<()>;

    async fn import_client(&self, record: &Value, session: &Session) -> Result<Value>;
}

/// Target service
#[async_trait]
pub trait TargetSubmitter: Send + Sync {
    async fn post_target(&self, target: &Target) -> Result<Receipt>;
}

/// Read-only queries against the relational catalog
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn get_advisor(&self, email: &str) -> Result<Option<Advisor>>;

    async fn get_ex_api_link(&self, advisor_id: i64, service: &str) -> Result<Option<ExApiLink>>;

    /// Best-effort random sample; may return fewer than `count` rows.
    async fn sample_securities(&self, count: usize) -> Result<Vec<SampledSecurity>>;
}
