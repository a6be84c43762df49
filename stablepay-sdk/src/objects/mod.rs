pub mod blockchains;
pub mod networks;
pub mod payment;
pub mod session;

pub use blockchains::{GasLevel, Stablecoin};
pub use networks::{AddChainParams, NativeCurrency, NetworkProfile, NetworkRegistry, RegistryError};
pub use payment::{PaymentOutcome, PaymentRequest, PaymentResult};
pub use session::{ConnectionState, ConnectionSummary, FeeQuote, SessionSnapshot, WalletKind};
