#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod contract;
pub mod error;
pub mod events;
pub mod monitor;
pub mod provider;
pub mod rate;
pub mod session;
pub mod submitter;
pub mod switcher;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{
    ConnectionError, FundsError, MonitorError, NetworkError, PaymentError, SubmissionError,
};
pub use monitor::{MonitorHandle, MonitorOutcome, MonitorSet, MonitorUpdate, TransactionMonitor};
pub use provider::{ChainRpc, ProviderError, ProviderEvent, WalletProvider};
pub use rate::{ExchangeRate, RateFeed};
pub use session::WalletSession;
pub use submitter::{PaymentCallbacks, PaymentQuote, PaymentSubmitter, SubmittedPayment};
pub use switcher::NetworkSwitcher;
