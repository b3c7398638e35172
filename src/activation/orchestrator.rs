use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::counters::{ActivationFailure, RunCounters};
use crate::config::ActivationConfig;
use crate::domain::{build_target, ClientRecord, ModelReference, Session};
use crate::error::ActivatorError;
use crate::remote::{PortfolioClient, TargetSubmitter};

/// Step of the per-client workflow, reported with every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    FetchClient,
    FetchPortfolio,
    SubmitTarget,
    UpdatePortfolio,
    Sync,
    /// The workflow task died before reporting a stage
    Internal,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchClient => "fetch_client",
            Self::FetchPortfolio => "fetch_portfolio",
            Self::SubmitTarget => "submit_target",
            Self::UpdatePortfolio => "update_portfolio",
            Self::Sync => "sync",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a successful workflow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Target submitted, flag written, client synced
    Activated,
    /// Flag was already set; only the sync ran
    AlreadyActive,
}

#[derive(Debug)]
struct StageError {
    stage: WorkflowStage,
    source: ActivatorError,
}

fn at(stage: WorkflowStage) -> impl FnOnce(ActivatorError) -> StageError {
    move |source| StageError { stage, source }
}

/// Final counts of one `activate_all` call, read from that run's counters
/// after the drain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Workflows launched (records with a non-empty id)
    pub processed: usize,
    /// Workflows that completed, including already-active accounts
    pub activated: usize,
    pub already_active: usize,
    pub failed: usize,
    pub peak_in_flight: usize,
    pub failures: Vec<ActivationFailure>,
}

impl RunSummary {
    pub async fn from_counters(counters: &RunCounters) -> Self {
        let processed = counters.launched();
        let activated = counters.activated();
        Self {
            processed,
            activated,
            already_active: counters.already_active(),
            failed: processed.saturating_sub(activated),
            peak_in_flight: counters.peak_in_flight(),
            failures: counters.failures().await,
        }
    }
}

/// Drives one activation workflow per client under a concurrency ceiling
#[derive(Clone)]
pub struct ActivationOrchestrator {
    portfolios: Arc<dyn PortfolioClient>,
    targets: Arc<dyn TargetSubmitter>,
    status_interval: Duration,
}

impl ActivationOrchestrator {
    pub fn new(
        portfolios: Arc<dyn PortfolioClient>,
        targets: Arc<dyn TargetSubmitter>,
        config: &ActivationConfig,
    ) -> Self {
        Self {
            portfolios,
            targets,
            status_interval: Duration::from_millis(config.status_interval_ms.max(1)),
        }
    }

    /// Activate every client with an id, at most `concurrency_limit` at a time.
    ///
    /// Clients are launched in input order; completion order is unspecified.
    /// Returns once every launched workflow has finished. Every call starts
    /// from fresh counters.
    pub async fn activate_all(
        &self,
        clients: &[ClientRecord],
        model: ModelReference,
        session: &Session,
        concurrency_limit: usize,
    ) -> RunSummary {
        let limit = concurrency_limit.max(1);
        let total = clients.len();
        let counters = Arc::new(RunCounters::new());
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        info!(clients = total, limit, %model, "starting activation run");

        for record in clients {
            let Some(client_id) = record.client_id() else {
                debug!("skipping client record without an id");
                continue;
            };

            let Some(permit) = self.acquire_slot(&semaphore, &counters, limit).await else {
                error!("concurrency semaphore closed, stopping launches");
                break;
            };

            let guard = counters.begin();
            let this = self.clone();
            let counters = Arc::clone(&counters);
            let client_id = client_id.to_string();
            let session = session.clone();

            tasks.spawn(async move {
                let _slot = (permit, guard);
                // Own task so a panic surfaces as a JoinError tied to this client
                let workflow = {
                    let client_id = client_id.clone();
                    tokio::spawn(async move { this.activate_one(&client_id, model, &session).await })
                };

                match workflow.await {
                    Ok(Ok(outcome)) => {
                        let activated = counters
                            .record_activated(outcome == ActivationOutcome::AlreadyActive);
                        info!(client_id = %client_id, "activated {} / {}", activated, total);
                    }
                    Ok(Err(failure)) => counters.record_failure(failure).await,
                    Err(e) => {
                        error!(client_id = %client_id, error = %e, "activation task aborted");
                        counters
                            .record_failure(ActivationFailure {
                                client_id,
                                stage: WorkflowStage::Internal,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "activation task aborted");
            }
        }

        debug_assert_eq!(counters.in_flight(), 0);
        let summary = RunSummary::from_counters(&counters).await;
        info!(
            processed = summary.processed,
            activated = summary.activated,
            failed = summary.failed,
            "activated {} clients",
            summary.activated
        );
        summary
    }

    /// Wait for a free slot, reporting status at a coarse interval while the
    /// ceiling is reached.
    async fn acquire_slot(
        &self,
        semaphore: &Arc<Semaphore>,
        counters: &RunCounters,
        limit: usize,
    ) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => return Some(permit),
            Err(TryAcquireError::Closed) => return None,
            Err(TryAcquireError::NoPermits) => {}
        }

        info!(
            in_flight = counters.in_flight(),
            limit, "hit concurrency ceiling, waiting for a free slot"
        );

        let acquire = Arc::clone(semaphore).acquire_owned();
        tokio::pin!(acquire);
        let mut ticker = tokio::time::interval(self.status_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                permit = &mut acquire => return permit.ok(),
                _ = ticker.tick() => {
                    info!("thread status: {} / {}", counters.in_flight(), limit);
                }
            }
        }
    }

    /// Run the workflow for one client. Errors are logged with the client id
    /// and stage and handed back as an `ActivationFailure`; counting is left
    /// to the caller.
    pub async fn activate_one(
        &self,
        client_id: &str,
        model: ModelReference,
        session: &Session,
    ) -> std::result::Result<ActivationOutcome, ActivationFailure> {
        self.run_workflow(client_id, model, session)
            .await
            .map_err(|StageError { stage, source }| {
                warn!(
                    client_id = %client_id,
                    stage = %stage,
                    error = %source,
                    "error activating client"
                );
                ActivationFailure {
                    client_id: client_id.to_string(),
                    stage,
                    error: source.to_string(),
                }
            })
    }

    async fn run_workflow(
        &self,
        client_id: &str,
        model: ModelReference,
        session: &Session,
    ) -> std::result::Result<ActivationOutcome, StageError> {
        let client = self
            .portfolios
            .get_client(client_id, session)
            .await
            .map_err(at(WorkflowStage::FetchClient))?;
        let portfolio_id = client
            .primary_portfolio_id()
            .ok_or_else(|| {
                ActivatorError::Data(format!("client {client_id} has no linked portfolio"))
            })
            .map_err(at(WorkflowStage::FetchClient))?;

        let mut portfolio = self
            .portfolios
            .get_portfolio(portfolio_id, session)
            .await
            .map_err(at(WorkflowStage::FetchPortfolio))?;
        let fallback_portfolio_id = portfolio.id.or(Some(portfolio_id));
        let advisor_id = portfolio.rsk_user_id;
        let account = portfolio
            .primary_account_mut()
            .ok_or_else(|| {
                ActivatorError::Data(format!("portfolio {portfolio_id} has no accounts"))
            })
            .map_err(at(WorkflowStage::FetchPortfolio))?;

        if account.autopilot_enabled() {
            debug!(client_id, portfolio_id, "autopilot already enabled, syncing only");
            self.sync(client_id, session).await?;
            return Ok(ActivationOutcome::AlreadyActive);
        }

        // Target goes out before the flag is written so a failed submission
        // leaves the account untouched.
        let target = build_target(account, fallback_portfolio_id, advisor_id, &model)
            .map_err(at(WorkflowStage::SubmitTarget))?;
        self.targets
            .post_target(&target)
            .await
            .map_err(at(WorkflowStage::SubmitTarget))?;

        account.enable_autopilot();
        self.portfolios
            .update_portfolio(&portfolio, session)
            .await
            .map_err(at(WorkflowStage::UpdatePortfolio))?;

        self.sync(client_id, session).await?;
        Ok(ActivationOutcome::Activated)
    }

    async fn sync(
        &self,
        client_id: &str,
        session: &Session,
    ) -> std::result::Result<(), StageError> {
        self.portfolios
            .sync_client(client_id, session)
            .await
            .map_err(at(WorkflowStage::Sync))
    }
}
