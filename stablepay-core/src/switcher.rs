//! Network switch controller.
//!
//! Asks the wallet to activate a registry chain. When the wallet has never
//! heard of the chain (EIP-1193 code 4902) the full network profile is sent
//! first and the activation retried once. Any other failure is reported as
//! `NetworkSwitchFailed`.

use crate::error::NetworkError;
use crate::provider::{ProviderError, WalletProvider};
use crate::session::WalletSession;
use stablepay_sdk::objects::NetworkProfile;
use std::sync::Arc;
use tracing::{info, warn};

pub struct NetworkSwitcher {
    session: WalletSession,
}

impl NetworkSwitcher {
    pub fn new(session: WalletSession) -> Self {
        Self { session }
    }

    /// Activate `chain_id` in the wallet and rebind the session to it.
    pub async fn switch_to(&self, chain_id: u64) -> Result<NetworkProfile, NetworkError> {
        let profile = self.profile(chain_id)?;
        let provider = self.provider()?;

        info!(chain_id, network = %profile.name, "Requesting network switch");
        match provider.switch_chain(chain_id).await {
            Ok(()) => {}
            Err(ProviderError::ChainNotConfigured) => {
                info!(chain_id, "Chain unknown to wallet, registering it first");
                return self.register_and_switch(chain_id).await;
            }
            Err(e) => return Err(switch_failed(chain_id, e)),
        }

        self.session.rebind_chain(chain_id).await;
        Ok(profile)
    }

    /// Send the chain's profile to the wallet, then activate it.
    pub async fn register_and_switch(&self, chain_id: u64) -> Result<NetworkProfile, NetworkError> {
        let profile = self.profile(chain_id)?;
        let provider = self.provider()?;

        provider
            .add_chain(&profile.add_chain_params())
            .await
            .map_err(|e| switch_failed(chain_id, e))?;
        provider
            .switch_chain(chain_id)
            .await
            .map_err(|e| switch_failed(chain_id, e))?;

        info!(chain_id, network = %profile.name, "Network registered and activated");
        self.session.rebind_chain(chain_id).await;
        Ok(profile)
    }

    fn profile(&self, chain_id: u64) -> Result<NetworkProfile, NetworkError> {
        let registry = self.session.registry();
        match registry.profile(chain_id) {
            Some(profile) if registry.is_supported(chain_id) => Ok(profile.clone()),
            _ => Err(NetworkError::UnsupportedNetwork {
                chain_id: Some(chain_id),
            }),
        }
    }

    fn provider(&self) -> Result<Arc<dyn WalletProvider>, NetworkError> {
        self.session
            .provider()
            .ok_or_else(|| NetworkError::NetworkSwitchFailed {
                message: "no wallet provider detected".to_string(),
            })
    }
}

fn switch_failed(chain_id: u64, e: ProviderError) -> NetworkError {
    warn!(chain_id, error = %e, "Network switch failed");
    NetworkError::NetworkSwitchFailed {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvent;
    use crate::testing::MockWallet;
    use stablepay_sdk::objects::NetworkRegistry;

    async fn connected(chain_id: u64) -> (MockWallet, WalletSession) {
        let wallet = MockWallet::new(chain_id);
        let registry = Arc::new(NetworkRegistry::builtin().unwrap());
        let session = WalletSession::new(Some(wallet.arc()), registry);
        session.connect(None).await.unwrap();
        (wallet, session)
    }

    #[tokio::test]
    async fn test_switch_registers_unknown_chain_first() {
        let (wallet, session) = connected(1).await;
        let switcher = NetworkSwitcher::new(session.clone());

        let profile = switcher.switch_to(137).await.unwrap();
        assert_eq!(profile.chain_id, 137);

        let calls: Vec<String> = wallet
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("wallet_"))
            .collect();
        assert_eq!(
            calls,
            vec![
                "wallet_switchEthereumChain(137)",
                "wallet_addEthereumChain(0x89)",
                "wallet_switchEthereumChain(137)",
            ]
        );
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.chain_id, Some(137));
        assert_eq!(snapshot.contract, session.registry().stablecoin_address(137));
    }

    #[tokio::test]
    async fn test_switch_to_known_chain() {
        let (wallet, session) = connected(137).await;
        let mut events = session.subscribe();
        let switcher = NetworkSwitcher::new(session.clone());

        switcher.switch_to(1).await.unwrap();
        assert_eq!(wallet.count("wallet_addEthereumChain"), 0);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ChainChanged {
                chain_id: 1,
                supported: true
            }
        );
        assert_eq!(wallet.current_chain(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_chain_never_reaches_wallet() {
        let (wallet, session) = connected(1).await;
        let switcher = NetworkSwitcher::new(session);

        let err = switcher.switch_to(8453).await.unwrap_err();
        assert_eq!(
            err,
            NetworkError::UnsupportedNetwork {
                chain_id: Some(8453)
            }
        );
        assert_eq!(wallet.count("wallet_"), 0);
    }

    #[tokio::test]
    async fn test_other_errors_fail_the_switch() {
        let (wallet, session) = connected(1).await;
        let switcher = NetworkSwitcher::new(session.clone());

        wallet.set_switch_error(Some(ProviderError::UserRejected));
        let err = switcher.switch_to(56).await.unwrap_err();
        assert!(matches!(err, NetworkError::NetworkSwitchFailed { .. }));
        assert_eq!(wallet.count("wallet_addEthereumChain"), 0);
        assert_eq!(session.snapshot().await.chain_id, Some(1));

        wallet.set_switch_error(None);
        wallet.set_add_error(Some(ProviderError::from_rpc(-32603, "invalid rpc url")));
        let err = switcher.switch_to(137).await.unwrap_err();
        assert_eq!(
            err,
            NetworkError::NetworkSwitchFailed {
                message: "rpc error -32603: invalid rpc url".to_string()
            }
        );
    }
}
