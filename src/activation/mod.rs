pub mod counters;
pub mod orchestrator;
pub mod synthesizer;

pub use counters::{ActivationFailure, InFlightGuard, RunCounters};
pub use orchestrator::{ActivationOrchestrator, ActivationOutcome, RunSummary, WorkflowStage};
pub use synthesizer::{build_allocations, ModelSynthesizer};
