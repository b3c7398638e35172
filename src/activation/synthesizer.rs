//! Builds a throwaway model from randomly sampled securities and resubmits it
//! until the portfolio API reports it eligible for autopilot.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::SynthesisConfig;
use crate::domain::{Allocation, Model, SampledSecurity, Session, CASH_SECURITY_ID};
use crate::error::{ActivatorError, Result};
use crate::remote::{PortfolioClient, RemoteCatalog};

/// Share of the model held in the cash-equivalent sleeve
pub const CASH_SHARE: f64 = 0.05;

/// Turn sampled securities into a complete allocation set.
///
/// A cash row worth `total / 0.95 * 0.05` is appended so cash is 5% of the
/// sleeve; each row's `percent` is its amount over the grand total.
pub fn build_allocations(samples: &[SampledSecurity]) -> Vec<Allocation> {
    let securities_total: f64 = samples.iter().map(|s| s.amount).sum();
    let cash = securities_total / (1.0 - CASH_SHARE) * CASH_SHARE;
    let grand_total = securities_total + cash;

    samples
        .iter()
        .map(|s| (s.sec_id, s.amount))
        .chain(std::iter::once((CASH_SECURITY_ID, cash)))
        .map(|(sec_id, amount)| Allocation {
            sec_id: Some(sec_id),
            amount: Some(amount),
            percent: Some(if grand_total > 0.0 {
                amount / grand_total
            } else {
                0.0
            }),
            ..Allocation::default()
        })
        .collect()
}

pub struct ModelSynthesizer {
    portfolios: Arc<dyn PortfolioClient>,
    catalog: Arc<dyn RemoteCatalog>,
    config: SynthesisConfig,
}

impl ModelSynthesizer {
    pub fn new(
        portfolios: Arc<dyn PortfolioClient>,
        catalog: Arc<dyn RemoteCatalog>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            portfolios,
            catalog,
            config,
        }
    }

    /// Create a model and drive it to an eligible state.
    #[instrument(skip(self, session))]
    pub async fn synthesize_model(&self, session: &Session) -> Result<Model> {
        let samples = self.sample(self.config.securities).await?;
        if samples.is_empty() {
            return Err(ActivatorError::Data(
                "catalog returned no securities to build a model from".to_string(),
            ));
        }

        let allocations = build_allocations(&samples);
        let model = self.portfolios.create_model(allocations, session).await?;
        info!(model_id = ?model.id, "model created");

        self.converge(model, session).await
    }

    /// Swap ineligible securities and resubmit until the model is eligible,
    /// giving up after `max_attempts` resubmissions.
    pub async fn converge(&self, mut model: Model, session: &Session) -> Result<Model> {
        let mut attempts = 0u32;

        while !model.is_autopilot_eligible() {
            if attempts >= self.config.max_attempts {
                warn!(model_id = ?model.id, attempts, "model never became eligible");
                return Err(ActivatorError::NotConverged { attempts });
            }
            attempts += 1;

            let account = model.primary_account_mut().ok_or_else(|| {
                ActivatorError::Data("model has no account to hold allocations".to_string())
            })?;

            let mut replaced = 0usize;
            for allocation in account.allocations.iter_mut() {
                if allocation.is_cash() || allocation.is_eligible() {
                    continue;
                }
                let fresh = self.sample_one().await?;
                debug!(old = ?allocation.sec_id, new = fresh.sec_id, "replacing ineligible security");
                allocation.sec_id = Some(fresh.sec_id);
                allocation.eligibility.clear();
                replaced += 1;
            }

            info!(model_id = ?model.id, attempt = attempts, replaced, "resubmitting model");
            model = self.portfolios.update_model(&model, session).await?;
        }

        info!(model_id = ?model.id, attempts, "model eligible for autopilot");
        Ok(model)
    }

    async fn sample_one(&self) -> Result<SampledSecurity> {
        self.sample(1).await?.into_iter().next().ok_or_else(|| {
            ActivatorError::Data("catalog returned no replacement security".to_string())
        })
    }

    /// Catalog sample; storage errors are retried with jittered backoff.
    async fn sample(&self, count: usize) -> Result<Vec<SampledSecurity>> {
        let mut retries = 0u32;
        loop {
            match self.catalog.sample_securities(count).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_storage() && retries < self.config.sample_retries => {
                    retries += 1;
                    let jitter = rand::thread_rng().gen_range(0..=self.config.retry_backoff_ms / 2);
                    let delay = self.config.retry_backoff_ms * u64::from(retries) + jitter;
                    warn!(error = %e, retries, delay_ms = delay, "catalog sample failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
