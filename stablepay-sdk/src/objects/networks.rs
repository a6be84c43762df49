//! Network registry.
//!
//! The static catalogue of chains the payment flow can run on, together with
//! the stablecoin contract deployed on each of them. Both tables are small, so
//! they are stored as `Vec`s and searched linearly.

use super::blockchains::{GasLevel, Stablecoin};
use crate::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decimals of every supported chain's native currency.
pub const NATIVE_DECIMALS: u32 = 18;

/// Chain-specific configuration for one supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub rpc_url: String,
    pub explorer_url: String,
    /// Decimals of the stablecoin contract on this chain.
    pub token_decimals: u32,
    /// Depth at which a transfer is treated as final.
    pub min_confirmations: u64,
    pub is_testnet: bool,
    #[serde(default)]
    pub gas_level: GasLevel,
}

impl NetworkProfile {
    /// Explorer page of a transaction.
    pub fn explorer_tx_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }

    /// The `wallet_addEthereumChain` payload describing this network.
    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams {
            chain_id: format!("{:#x}", self.chain_id),
            chain_name: self.name.clone(),
            native_currency: NativeCurrency {
                name: self.native_symbol.clone(),
                symbol: self.native_symbol.clone(),
                decimals: NATIVE_DECIMALS,
            },
            rpc_urls: vec![self.rpc_url.clone()],
            block_explorer_urls: vec![self.explorer_url.clone()],
        }
    }
}

/// Parameters a wallet needs to register a chain it has never seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex encoded chain id (`0x89` for Polygon).
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Errors raised while assembling a registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("chain {0} has a stablecoin address but no network profile")]
    MissingProfile(u64),
    #[error("chain {0} has a network profile but no stablecoin address")]
    MissingStablecoin(u64),
    #[error("chain {0} is defined more than once")]
    Duplicate(u64),
    #[error("invalid stablecoin address for chain {chain_id}: {address}")]
    InvalidAddress { chain_id: u64, address: String },
    #[error("chain {0} must require at least one confirmation and declare token decimals")]
    InvalidProfile(u64),
}

/// Supported networks plus the stablecoin address table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRegistry {
    stablecoin: Stablecoin,
    profiles: Vec<NetworkProfile>,
    addresses: Vec<(u64, Address)>,
}

impl NetworkRegistry {
    /// Build a registry, enforcing that every chain in the address table has a
    /// profile and vice versa.
    pub fn new(
        stablecoin: Stablecoin,
        mut profiles: Vec<NetworkProfile>,
        addresses: Vec<(u64, String)>,
    ) -> Result<Self, RegistryError> {
        profiles.sort_by_key(|p| p.chain_id);

        let mut parsed = Vec::with_capacity(addresses.len());
        for (chain_id, address) in addresses {
            if parsed.iter().any(|(id, _)| *id == chain_id) {
                return Err(RegistryError::Duplicate(chain_id));
            }
            let addr = Address::from_str(&address)
                .map_err(|_| RegistryError::InvalidAddress { chain_id, address })?;
            parsed.push((chain_id, addr));
        }

        let registry = Self {
            stablecoin,
            profiles,
            addresses: parsed,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// The catalogue shipped with the orchestrator (USDT on five mainnets and
    /// three testnets). Goes through the same checks as [`NetworkRegistry::new`].
    pub fn builtin() -> Result<Self, RegistryError> {
        let addresses = BUILTIN_USDT
            .iter()
            .map(|(id, addr)| (*id, addr.to_string()))
            .collect();
        Self::new(Stablecoin::Usdt, builtin_profiles(), addresses)
    }

    /// Check the table/profile bijection and profile sanity.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for pair in self.profiles.windows(2) {
            if pair[0].chain_id == pair[1].chain_id {
                return Err(RegistryError::Duplicate(pair[0].chain_id));
            }
        }
        for (chain_id, _) in &self.addresses {
            if self.profile(*chain_id).is_none() {
                return Err(RegistryError::MissingProfile(*chain_id));
            }
        }
        for profile in &self.profiles {
            if !self.addresses.iter().any(|(id, _)| *id == profile.chain_id) {
                return Err(RegistryError::MissingStablecoin(profile.chain_id));
            }
            if profile.min_confirmations == 0 || profile.token_decimals == 0 {
                return Err(RegistryError::InvalidProfile(profile.chain_id));
            }
        }
        Ok(())
    }

    /// Return a copy of this registry with `profile` added, or replacing the
    /// existing profile for the same chain.
    pub fn with_network(
        &self,
        profile: NetworkProfile,
        stablecoin_address: &str,
    ) -> Result<Self, RegistryError> {
        let chain_id = profile.chain_id;
        let address =
            Address::from_str(stablecoin_address).map_err(|_| RegistryError::InvalidAddress {
                chain_id,
                address: stablecoin_address.to_string(),
            })?;

        let mut next = self.clone();
        next.profiles.retain(|p| p.chain_id != chain_id);
        next.addresses.retain(|(id, _)| *id != chain_id);
        next.profiles.push(profile);
        next.profiles.sort_by_key(|p| p.chain_id);
        next.addresses.push((chain_id, address));
        next.validate()?;
        Ok(next)
    }

    pub fn stablecoin(&self) -> Stablecoin {
        self.stablecoin
    }

    pub fn profile(&self, chain_id: u64) -> Option<&NetworkProfile> {
        self.profiles.iter().find(|p| p.chain_id == chain_id)
    }

    pub fn stablecoin_address(&self, chain_id: u64) -> Option<Address> {
        self.addresses
            .iter()
            .find(|(id, _)| *id == chain_id)
            .map(|(_, addr)| *addr)
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.stablecoin_address(chain_id).is_some()
    }

    /// All profiles ordered by chain id.
    pub fn profiles(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.iter()
    }

    pub fn mainnets(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.iter().filter(|p| !p.is_testnet)
    }

    pub fn testnets(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.iter().filter(|p| p.is_testnet)
    }
}

const BUILTIN_USDT: &[(u64, &str)] = &[
    (1, "0xdac17f958d2ee523a2206206994597c13d831ec7"),
    (56, "0x55d398326f99059fF775485246999027B3197955"),
    (137, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    (42161, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
    (10, "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
    (11155111, "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
    (97, "0x337610d27c682E347C9cD60BD4b3b107C9d34dDd"),
    (80001, "0x3813e82e6f7098b9583FC0F33a962D02018B6803"),
];

#[allow(clippy::too_many_arguments)]
fn profile(
    chain_id: u64,
    name: &str,
    native_symbol: &str,
    rpc_url: &str,
    explorer_url: &str,
    token_decimals: u32,
    min_confirmations: u64,
    gas_level: GasLevel,
    is_testnet: bool,
) -> NetworkProfile {
    NetworkProfile {
        chain_id,
        name: name.to_string(),
        native_symbol: native_symbol.to_string(),
        rpc_url: rpc_url.to_string(),
        explorer_url: explorer_url.to_string(),
        token_decimals,
        min_confirmations,
        is_testnet,
        gas_level,
    }
}

fn builtin_profiles() -> Vec<NetworkProfile> {
    use GasLevel::*;
    vec![
        profile(1, "Ethereum Mainnet", "ETH", "https://eth.llamarpc.com", "https://etherscan.io", 6, 12, High, false),
        profile(56, "BNB Smart Chain", "BNB", "https://bsc-dataseed1.binance.org", "https://bscscan.com", 18, 15, Medium, false),
        profile(137, "Polygon", "MATIC", "https://polygon-rpc.com", "https://polygonscan.com", 6, 128, Low, false),
        profile(42161, "Arbitrum One", "ETH", "https://arb1.arbitrum.io/rpc", "https://arbiscan.io", 6, 10, Low, false),
        profile(10, "Optimism", "ETH", "https://mainnet.optimism.io", "https://optimistic.etherscan.io", 6, 10, Low, false),
        profile(11155111, "Sepolia Testnet", "ETH", "https://rpc.sepolia.org", "https://sepolia.etherscan.io", 6, 3, Low, true),
        profile(97, "BSC Testnet", "tBNB", "https://data-seed-prebsc-1-s1.binance.org:8545", "https://testnet.bscscan.com", 18, 3, Low, true),
        profile(80001, "Mumbai Testnet", "MATIC", "https://rpc-mumbai.maticvigil.com", "https://mumbai.polygonscan.com", 6, 3, Low, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_consistent() {
        let registry = NetworkRegistry::builtin().unwrap();
        assert_eq!(registry.profiles().count(), BUILTIN_USDT.len());
        for (chain_id, _) in BUILTIN_USDT {
            assert!(registry.profile(*chain_id).is_some(), "missing {chain_id}");
            assert!(registry.stablecoin_address(*chain_id).is_some());
        }
    }

    #[test]
    fn test_lookup_and_filters() {
        let registry = NetworkRegistry::builtin().unwrap();
        let polygon = registry.profile(137).unwrap();
        assert_eq!(polygon.name, "Polygon");
        assert_eq!(polygon.min_confirmations, 128);
        assert_eq!(registry.profile(56).unwrap().token_decimals, 18);
        assert!(!registry.is_supported(8453));
        assert_eq!(registry.mainnets().count(), 5);
        assert_eq!(registry.testnets().count(), 3);

        let ids: Vec<u64> = registry.profiles().map(|p| p.chain_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_explorer_link_and_add_chain_params() {
        let registry = NetworkRegistry::builtin().unwrap();
        let polygon = registry.profile(137).unwrap();
        assert_eq!(
            polygon.explorer_tx_link("0xabc"),
            "https://polygonscan.com/tx/0xabc"
        );

        let params = polygon.add_chain_params();
        assert_eq!(params.chain_id, "0x89");
        assert_eq!(params.native_currency.symbol, "MATIC");
        assert_eq!(params.native_currency.decimals, 18);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chainId"], "0x89");
        assert_eq!(json["rpcUrls"][0], "https://polygon-rpc.com");
        assert_eq!(json["blockExplorerUrls"][0], "https://polygonscan.com");
    }

    #[test]
    fn test_new_rejects_unpaired_entries() {
        let registry = NetworkRegistry::builtin().unwrap();
        let profiles: Vec<NetworkProfile> = registry.profiles().cloned().collect();

        let err = NetworkRegistry::new(Stablecoin::Usdt, profiles.clone(), vec![]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingStablecoin(_)));

        let mut addresses: Vec<(u64, String)> = BUILTIN_USDT
            .iter()
            .map(|(id, a)| (*id, a.to_string()))
            .collect();
        addresses.push((8453, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string()));
        let err = NetworkRegistry::new(Stablecoin::Usdt, profiles, addresses).unwrap_err();
        assert_eq!(err, RegistryError::MissingProfile(8453));
    }

    #[test]
    fn test_malformed_address_is_an_error() {
        let profiles = builtin_profiles();
        let mut addresses: Vec<(u64, String)> = BUILTIN_USDT
            .iter()
            .map(|(id, a)| (*id, a.to_string()))
            .collect();
        addresses[2].1 = "0xc2132D05D31c914a87C6611C10748AEb04B58e8".to_string();

        let err = NetworkRegistry::new(Stablecoin::Usdt, profiles, addresses).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAddress { chain_id: 137, .. }));
    }

    #[test]
    fn test_with_network_adds_local_chain() {
        let registry = NetworkRegistry::builtin().unwrap();
        let local = NetworkProfile {
            chain_id: 31337,
            name: "Local Devnet".to_string(),
            native_symbol: "ETH".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            explorer_url: "http://127.0.0.1:8545".to_string(),
            token_decimals: 6,
            min_confirmations: 1,
            is_testnet: true,
            gas_level: GasLevel::Low,
        };
        let extended = registry
            .with_network(local, "0x5FbDB2315678afecb367f032d93F642f64180aa3")
            .unwrap();
        assert!(extended.is_supported(31337));
        assert!(!registry.is_supported(31337));

        let err = registry
            .with_network(extended.profile(31337).unwrap().clone(), "not-an-address")
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAddress { chain_id: 31337, .. }));
    }
}
