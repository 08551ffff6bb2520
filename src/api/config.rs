// Configuration for Rentable Deploy
//
// Loading, validation and building of fleet configurations and governance
// policies.

use crate::api::types::{CollectionConfig, FleetConfig};
use crate::auditor::GovernancePolicy;
use crate::deployer::TokenFamily;
use crate::registry::names;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration manager for Rentable Deploy
pub struct ConfigManager;

impl ConfigManager {
    /// Load and validate a fleet configuration
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<FleetConfig> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: FleetConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Self::validate(&config).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save a fleet configuration
    pub fn save_to_file<P: AsRef<Path>>(config: &FleetConfig, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Load a governance policy
    pub fn load_policy<P: AsRef<Path>>(path: P) -> Result<GovernancePolicy> {
        let path = path.as_ref();
        let policy_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy {}", path.display()))?;
        let policy: GovernancePolicy = serde_json::from_str(&policy_str)
            .with_context(|| format!("Failed to parse policy {}", path.display()))?;
        if policy.governance.is_zero() {
            bail!("policy governance must not be the zero address");
        }
        Ok(policy)
    }

    /// Save a governance policy
    pub fn save_policy<P: AsRef<Path>>(policy: &GovernancePolicy, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(policy)?)?;
        Ok(())
    }

    /// Check a configuration for values no deployment can use
    pub fn validate(config: &FleetConfig) -> Result<()> {
        if config.governance.is_zero() {
            bail!("governance must not be the zero address");
        }
        if config.operator.is_zero() {
            bail!("operator must not be the zero address");
        }
        if config.gas_price_gwei == 0 {
            bail!("gas price must be positive");
        }
        let mut seen = HashSet::new();
        for collection in &config.collections {
            if collection.name.is_empty() {
                bail!("collection at {:?} has no name", collection.address);
            }
            if !seen.insert(collection.name.as_str()) {
                bail!("collection {} is configured twice", collection.name);
            }
            for family in [TokenFamily::O, TokenFamily::W] {
                let proxy = family.proxy_name(&collection.name);
                if names::PLATFORM.contains(&proxy.as_str()) {
                    bail!("collection {} would be deployed as {}, a platform resource", collection.name, proxy);
                }
            }
            for call in &collection.proxy_calls {
                if call.selector.len() != 4 {
                    bail!(
                        "proxy call selector {} of collection {} is not 4 bytes",
                        call.selector,
                        collection.name
                    );
                }
            }
        }
        Ok(())
    }

    /// Create a builder for configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: FleetConfig,
}

impl ConfigBuilder {
    /// Set the network short name
    pub fn network(mut self, value: &str) -> Self {
        self.config.network = value.to_string();
        self
    }

    /// Set the JSON-RPC endpoint
    pub fn rpc_url(mut self, value: &str) -> Self {
        self.config.rpc_url = value.to_string();
        self
    }

    /// Set the gas price in gwei
    pub fn gas_price_gwei(mut self, value: u64) -> Self {
        self.config.gas_price_gwei = value;
        self
    }

    pub fn governance(mut self, value: Address) -> Self {
        self.config.governance = value;
        self
    }

    pub fn operator(mut self, value: Address) -> Self {
        self.config.operator = value;
        self
    }

    pub fn fee_collector(mut self, value: Address) -> Self {
        self.config.fee_collector = Some(value);
        self
    }

    /// Set the artifact directory
    pub fn artifacts_dir(mut self, value: PathBuf) -> Self {
        self.config.artifacts_dir = value;
        self
    }

    /// Set an explicit manifest path
    pub fn manifest(mut self, value: PathBuf) -> Self {
        self.config.manifest = Some(value);
        self
    }

    /// Set whether to deploy the wallet stack
    pub fn wallet(mut self, value: bool) -> Self {
        self.config.wallet = value;
        self
    }

    /// Replace the enabled payment tokens
    pub fn payment_tokens(mut self, value: Vec<Address>) -> Self {
        self.config.payment_tokens = value;
        self
    }

    /// Add a collection
    pub fn collection(mut self, value: CollectionConfig) -> Self {
        self.config.collections.push(value);
        self
    }

    pub fn confirmation_timeout_secs(mut self, value: u64) -> Self {
        self.config.confirmation_timeout_secs = value;
        self
    }

    /// Build the configuration
    pub fn build(self) -> FleetConfig {
        self.config
    }
}
