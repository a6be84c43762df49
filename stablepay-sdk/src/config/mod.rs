//! Configuration types for stablepay.
//!
//! These types represent the validated runtime configuration used by the
//! orchestrator. Loading and parsing the TOML file is handled by the CLI crate.

mod gas;
mod monitor;
mod payment;

pub use gas::GasPolicy;
pub use monitor::MonitorPolicy;
pub use payment::PaymentConfig;

/// Everything the submitter and monitor need besides the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub payment: PaymentConfig,
    pub gas: GasPolicy,
    pub monitor: MonitorPolicy,
}

impl OrchestratorConfig {
    pub fn new(payment: PaymentConfig, gas: GasPolicy, monitor: MonitorPolicy) -> Self {
        Self {
            payment,
            gas,
            monitor,
        }
    }
}
