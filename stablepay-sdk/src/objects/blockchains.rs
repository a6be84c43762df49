use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Stablecoins the orchestrator knows how to pay with.
#[serde(rename_all = "UPPERCASE")]
pub enum Stablecoin {
    Usdt,
    Usdc,
}

impl Stablecoin {
    pub fn symbol(&self) -> &'static str {
        match self {
            Stablecoin::Usdt => "USDT",
            Stablecoin::Usdc => "USDC",
        }
    }
}

impl std::fmt::Display for Stablecoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
/// Rough fee level of a chain, shown next to the network picker.
#[serde(rename_all = "lowercase")]
pub enum GasLevel {
    #[default]
    Low,
    Medium,
    High,
}
