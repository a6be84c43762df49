//! Event type definitions.

use stablepay_sdk::Address;

/// Change notifications published by the wallet session.
///
/// Events are ephemeral: they carry identifiers, and observers read the
/// full picture from a fresh session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { account: Address, chain_id: u64 },
    AccountChanged(Address),
    /// The session is now bound to `chain_id`.
    ChainChanged { chain_id: u64, supported: bool },
    Disconnected,
}
