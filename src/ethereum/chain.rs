// Network configurations
//
// Known networks the fleet is deployed to, with the manifest name used for
// the persisted deployment and the currency used in cost reports.

use std::collections::HashMap;

/// Chain configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,

    /// Short name used on the command line and in fleet configuration
    pub name: String,

    /// File stem of the deployment manifest
    pub manifest_name: String,

    /// Native currency symbol
    pub currency_symbol: String,
}

impl ChainConfig {
    /// Create a new chain configuration
    pub fn new(chain_id: u64, name: &str, manifest_name: &str, currency_symbol: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            manifest_name: manifest_name.to_string(),
            currency_symbol: currency_symbol.to_string(),
        }
    }

    /// Ethereum Mainnet
    pub fn ethereum() -> Self {
        Self::new(1, "mainnet", "ethereum-mainnet", "ETH")
    }

    /// Goerli testnet
    pub fn goerli() -> Self {
        Self::new(5, "goerli", "ethereum-goerli", "ETH")
    }

    /// Sepolia testnet
    pub fn sepolia() -> Self {
        Self::new(11_155_111, "sepolia", "ethereum-sepolia", "ETH")
    }

    /// Polygon PoS
    pub fn polygon() -> Self {
        Self::new(137, "polygon", "polygon-mainnet", "MATIC")
    }

    /// Local development node (ganache, anvil, hardhat)
    pub fn development() -> Self {
        Self::new(1337, "development", "development", "ETH")
    }

    /// Default manifest location for this network
    pub fn manifest_path(&self) -> std::path::PathBuf {
        std::path::Path::new("deployments").join(format!("{}.json", self.manifest_name))
    }
}

/// Chain registry for looking up chain configurations
pub struct ChainRegistry {
    /// Map of chain ID to chain configuration
    configs: HashMap<u64, ChainConfig>,
}

impl ChainRegistry {
    /// Create a new chain registry with default configurations
    pub fn new() -> Self {
        let mut configs = HashMap::new();
        for config in [
            ChainConfig::ethereum(),
            ChainConfig::goerli(),
            ChainConfig::sepolia(),
            ChainConfig::polygon(),
            ChainConfig::development(),
        ] {
            configs.insert(config.chain_id, config);
        }
        Self { configs }
    }

    /// Get chain configuration by chain ID
    pub fn get_config(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.configs.get(&chain_id)
    }

    /// Get chain configuration by short name
    pub fn by_name(&self, name: &str) -> Option<&ChainConfig> {
        self.configs.values().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Add or update a chain configuration
    pub fn add_config(&mut self, config: ChainConfig) {
        self.configs.insert(config.chain_id, config);
    }

    /// Configuration for a chain ID, falling back to a generic entry
    pub fn resolve(&self, chain_id: u64) -> ChainConfig {
        match self.get_config(chain_id) {
            Some(config) => config.clone(),
            None => ChainConfig::new(chain_id, &chain_id.to_string(), &format!("chain-{}", chain_id), "ETH"),
        }
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_id() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.by_name("Mainnet").map(|c| c.chain_id), Some(1));
        assert_eq!(registry.get_config(137).map(|c| c.currency_symbol.as_str()), Some("MATIC"));
        assert!(registry.by_name("bridge").is_none());
    }

    #[test]
    fn test_unknown_chain_gets_generic_manifest() {
        let registry = ChainRegistry::new();
        let config = registry.resolve(31337);
        assert_eq!(config.manifest_path(), std::path::Path::new("deployments/chain-31337.json"));
    }
}
