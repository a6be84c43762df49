//! Error taxonomy of the payment flow.
//!
//! Each stage has its own enum; [`PaymentError`] wraps them all and maps
//! every failure onto exactly one [`PaymentOutcome`].

use crate::provider::ProviderError;
use stablepay_sdk::TxHash;
use stablepay_sdk::objects::PaymentOutcome;
use stablepay_sdk::units::ConversionError;

/// Failures while establishing or using the wallet connection.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// No wallet is present in the host.
    #[error("no wallet provider detected")]
    NoProviderDetected,
    #[error("user rejected the connection request")]
    UserRejected,
    /// A connect prompt is already open, in the wallet or locally.
    #[error("a connection request is already pending")]
    RequestAlreadyPending,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("wallet is not connected")]
    NotConnected,
    /// The session was disconnected while the connection was being set up.
    #[error("connection attempt was cancelled")]
    Cancelled,
    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for ConnectionError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UserRejected => ConnectionError::UserRejected,
            ProviderError::RequestPending => ConnectionError::RequestAlreadyPending,
            other => ConnectionError::Provider(other),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NetworkError {
    /// The chain has no stablecoin deployment in the registry.
    #[error("unsupported network{}", .chain_id.map(|id| format!(" (chain {id})")).unwrap_or_default())]
    UnsupportedNetwork { chain_id: Option<u64> },
    #[error("network switch failed: {message}")]
    NetworkSwitchFailed { message: String },
    /// The wallet moved to another chain while an operation was in flight.
    #[error("chain changed during the operation (epoch {expected} -> {current})")]
    StaleChain { expected: u64, current: u64 },
}

/// Balance checks that stop a payment before anything is signed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FundsError {
    #[error("insufficient {symbol} balance: required {required}, available {available}")]
    InsufficientStablecoin {
        required: String,
        available: String,
        symbol: String,
    },
    #[error("insufficient {symbol} for gas: required {required}, available {available}")]
    InsufficientGasCurrency {
        symbol: String,
        required: String,
        available: String,
    },
}

/// Failures reported when the transaction is handed to the wallet.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("user rejected the transaction")]
    UserRejected,
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),
    #[error("transaction failed: {0}")]
    Unknown(String),
}

impl From<ProviderError> for SubmissionError {
    fn from(e: ProviderError) -> Self {
        if e == ProviderError::UserRejected {
            return SubmissionError::UserRejected;
        }
        let message = e.message_lower();
        if message.contains("user denied") || message.contains("user rejected") {
            SubmissionError::UserRejected
        } else if message.contains("insufficient funds") {
            SubmissionError::InsufficientFunds(e.to_string())
        } else if message.contains("execution reverted") {
            SubmissionError::ExecutionReverted(e.to_string())
        } else {
            SubmissionError::Unknown(e.to_string())
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("transaction {0:#x} is already being monitored")]
    AlreadyMonitoring(TxHash),
    #[error("transaction {0:#x} reverted")]
    Reverted(TxHash),
    #[error("transaction {tx_hash:#x} not confirmed after {attempts} attempts")]
    Timeout { tx_hash: TxHash, attempts: u32 },
}

/// Any failure of a payment attempt or a session query.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Funds(#[from] FundsError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    /// A read issued to the provider failed.
    #[error("provider query failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("payment amount converts to zero token units")]
    AmountTooSmall,
    #[error("exchange rate is quoted in {rate}, order is in {order}")]
    CurrencyMismatch { rate: String, order: String },
}

impl PaymentError {
    pub fn outcome(&self) -> PaymentOutcome {
        match self {
            PaymentError::Connection(ConnectionError::UserRejected) => PaymentOutcome::Rejected,
            PaymentError::Connection(_) => PaymentOutcome::NetworkError,
            PaymentError::Network(_) => PaymentOutcome::NetworkError,
            PaymentError::Funds(_) => PaymentOutcome::InsufficientFunds,
            PaymentError::Submission(SubmissionError::UserRejected) => PaymentOutcome::Rejected,
            PaymentError::Submission(SubmissionError::InsufficientFunds(_)) => {
                PaymentOutcome::InsufficientFunds
            }
            PaymentError::Submission(_) => PaymentOutcome::Failed,
            PaymentError::Monitor(MonitorError::Timeout { .. }) => PaymentOutcome::Timeout,
            PaymentError::Monitor(_) => PaymentOutcome::Failed,
            PaymentError::Provider(_) => PaymentOutcome::NetworkError,
            PaymentError::Conversion(_)
            | PaymentError::AmountTooSmall
            | PaymentError::CurrencyMismatch { .. } => PaymentOutcome::Failed,
        }
    }
}
