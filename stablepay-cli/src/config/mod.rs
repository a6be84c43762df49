//! Configuration module for the stablepay CLI.
//!
//! Loads `stablepay.toml`, applies command-line overrides, validates the
//! result and converts it into the runtime types the orchestrator consumes.

pub mod file;

use crate::config::file::{FileConfig, NetworkSection, RateSourceSection};
use stablepay_core::ExchangeRate;
use stablepay_sdk::Address;
use stablepay_sdk::config::{GasPolicy, MonitorPolicy, OrchestratorConfig, PaymentConfig};
use stablepay_sdk::objects::{NetworkProfile, NetworkRegistry, RegistryError, WalletKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid network catalogue: {0}")]
    RegistryError(#[from] RegistryError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Wallet endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub url: url::Url,
    pub wallet: WalletKind,
    pub poll_interval: Duration,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub orchestrator: OrchestratorConfig,
    pub rate: ExchangeRate,
    pub rate_source: RateSourceSection,
    pub provider: ProviderSettings,
    pub registry: NetworkRegistry,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    provider_override: Option<url::Url>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, provider_override: Option<url::Url>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            provider_override,
        }
    }

    /// Read, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let file_config: FileConfig = toml::from_str(content)?;
        self.validate(&file_config)?;
        self.build_loaded_config(file_config)
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let gas = &config.gas;
        if !(GasPolicy::MIN_BUFFER_PERCENT..=GasPolicy::MAX_BUFFER_PERCENT)
            .contains(&gas.buffer_percent)
        {
            return Err(ConfigError::ValidationError(format!(
                "gas.buffer_percent must be between {} and {}, got {}",
                GasPolicy::MIN_BUFFER_PERCENT,
                GasPolicy::MAX_BUFFER_PERCENT,
                gas.buffer_percent
            )));
        }
        if gas.fallback_gas_limit == 0 {
            return Err(ConfigError::ValidationError(
                "gas.fallback_gas_limit must be positive".to_string(),
            ));
        }
        if gas.min_native_balance.is_sign_negative() {
            return Err(ConfigError::ValidationError(
                "gas.min_native_balance must not be negative".to_string(),
            ));
        }
        if config.payment.rate <= rust_decimal::Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "payment.rate must be positive, got {}",
                config.payment.rate
            )));
        }
        if config.payment.fiat_currency.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "payment.fiat_currency must not be empty".to_string(),
            ));
        }
        if config.monitor.interval_secs == 0 || config.monitor.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.interval_secs and monitor.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn build_loaded_config(&self, file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let recipient = Address::from_str(&file_config.payment.recipient).map_err(|_| {
            ConfigError::ValidationError(format!(
                "payment.recipient is not an address: {}",
                file_config.payment.recipient
            ))
        })?;

        let url = match &self.provider_override {
            Some(url) => url.clone(),
            None => url::Url::parse(&file_config.provider.url).map_err(|e| {
                ConfigError::ValidationError(format!("provider.url is invalid: {e}"))
            })?,
        };

        let mut registry = NetworkRegistry::builtin()?;
        for network in file_config.networks {
            let address = network.stablecoin_address.clone();
            registry = registry.with_network(convert_network(network), &address)?;
        }

        let gas = file_config.gas;
        let orchestrator = OrchestratorConfig::new(
            PaymentConfig::new(recipient, file_config.payment.fiat_currency.trim()),
            GasPolicy {
                buffer_percent: gas.buffer_percent,
                fallback_gas_limit: gas.fallback_gas_limit,
                min_native_balance: gas.min_native_balance,
                typical_transfer_gas: gas.typical_transfer_gas,
            },
            MonitorPolicy::new(
                Duration::from_secs(file_config.monitor.interval_secs),
                file_config.monitor.max_attempts,
            ),
        );
        let rate = ExchangeRate::new(
            file_config.payment.rate,
            orchestrator.payment.fiat_currency.clone(),
        );

        Ok(LoadedConfig {
            orchestrator,
            rate,
            rate_source: file_config.rate_source,
            provider: ProviderSettings {
                url,
                wallet: file_config.provider.wallet.unwrap_or(WalletKind::Injected),
                poll_interval: Duration::from_secs(file_config.provider.poll_secs.max(1)),
            },
            registry,
        })
    }
}

fn convert_network(n: NetworkSection) -> NetworkProfile {
    NetworkProfile {
        chain_id: n.chain_id,
        name: n.name,
        native_symbol: n.native_symbol,
        rpc_url: n.rpc_url,
        explorer_url: n.explorer_url,
        token_decimals: n.token_decimals,
        min_confirmations: n.min_confirmations,
        is_testnet: n.is_testnet,
        gas_level: n.gas_level,
    }
}
