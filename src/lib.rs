pub mod activation;
pub mod adapters;
pub mod cli;
pub mod client_list;
pub mod config;
pub mod domain;
pub mod error;
pub mod onboarding;
pub mod remote;

pub use activation::{ActivationOrchestrator, ModelSynthesizer, RunCounters, RunSummary};
pub use config::AppConfig;
pub use error::{ActivatorError, Result};
