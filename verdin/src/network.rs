//! Network descriptors.
//!
//! Network definitions live in an external registry; this type is the
//! interface boundary the wallet layer depends on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Stable identifier, e.g. "mainnet" or "liquid".
    pub id: String,
    /// Human readable name, e.g. "Bitcoin".
    pub name: String,
    /// Whether this is a Liquid network carrying on-chain asset metadata.
    pub liquid: bool,
    pub mainnet: bool,
    /// The asset id of the network's policy asset, for Liquid networks.
    pub policy_asset: Option<String>,
}

impl Network {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            liquid: false,
            mainnet: true,
            policy_asset: None,
        }
    }

    pub fn liquid(mut self, policy_asset: impl Into<String>) -> Self {
        self.liquid = true;
        self.policy_asset = Some(policy_asset.into());
        self
    }

    pub fn testnet(mut self) -> Self {
        self.mainnet = false;
        self
    }

    pub fn is_liquid(&self) -> bool {
        self.liquid
    }

    /// Map the engine's "btc" shorthand onto the policy asset id. Other
    /// asset identifiers are already canonical.
    pub fn canonical_asset_id<'a>(&'a self, id: &'a str) -> &'a str {
        match (id, self.policy_asset.as_deref()) {
            ("btc", Some(policy_asset)) => policy_asset,
            _ => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_ASSET: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";

    #[test]
    fn canonical_asset_id() {
        let liquid = Network::new("liquid", "Liquid").liquid(POLICY_ASSET);
        assert_eq!(liquid.canonical_asset_id("btc"), POLICY_ASSET);
        assert_eq!(liquid.canonical_asset_id("abcd"), "abcd");

        let bitcoin = Network::new("mainnet", "Bitcoin");
        assert!(!bitcoin.is_liquid());
        assert_eq!(bitcoin.canonical_asset_id("btc"), "btc");
    }
}
