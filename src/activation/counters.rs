use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::WorkflowStage;

/// Structured record of one failed workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationFailure {
    pub client_id: String,
    pub stage: WorkflowStage,
    pub error: String,
}

/// Shared state of one activation run.
///
/// Created fresh by every `activate_all` call and handed to its workflows by
/// `Arc`; nothing here outlives the run.
#[derive(Debug, Default)]
pub struct RunCounters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    launched: AtomicUsize,
    activated: AtomicUsize,
    already_active: AtomicUsize,
    failures: Mutex<Vec<ActivationFailure>>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a workflow as launched. The returned guard releases the
    /// in-flight slot when dropped, including on panic.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.launched.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            counters: Arc::clone(self),
        }
    }

    /// Record a completed workflow; returns the activated total so far
    pub fn record_activated(&self, already_active: bool) -> usize {
        if already_active {
            self.already_active.fetch_add(1, Ordering::SeqCst);
        }
        self.activated.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn record_failure(&self, failure: ActivationFailure) {
        self.failures.lock().await.push(failure);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn activated(&self) -> usize {
        self.activated.load(Ordering::SeqCst)
    }

    pub fn already_active(&self) -> usize {
        self.already_active.load(Ordering::SeqCst)
    }

    pub async fn failures(&self) -> Vec<ActivationFailure> {
        self.failures.lock().await.clone()
    }
}

/// Holds one in-flight slot
#[derive(Debug)]
pub struct InFlightGuard {
    counters: Arc<RunCounters>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
