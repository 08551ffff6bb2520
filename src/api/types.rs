// API Types for Rentable Deploy
//
// Fleet configuration read from disk and the reports produced by a run.

use crate::ethereum::chain::ChainConfig;
use crate::gas::{GasEntry, GasLedger};
use crate::registry::Deployment;
use chrono::{DateTime, Utc};
use common::{AuditFinding, DeployedResource, FindingStatus};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of a fleet deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Network short name (`mainnet`, `goerli`, `development`, ...)
    pub network: String,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Gas price used for every transaction, in gwei
    pub gas_price_gwei: u64,

    /// Governance of the router and owner of the collection tokens
    pub governance: Address,

    /// Router operator
    pub operator: Address,

    /// Fee collector configured on the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_collector: Option<Address>,

    /// Directory of compiled contract artifacts
    pub artifacts_dir: PathBuf,

    /// Manifest path; defaults to `deployments/<network>.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Deploy the wallet logic, beacon and factory
    #[serde(default = "default_wallet")]
    pub wallet: bool,

    /// Payment tokens enabled on the router; the zero address is ether
    #[serde(default)]
    pub payment_tokens: Vec<Address>,

    /// Asset collections to tokenize
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,

    /// How long to wait for a transaction to be included
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_wallet() -> bool {
    true
}

fn default_confirmation_timeout() -> u64 {
    300
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            network: "development".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            gas_price_gwei: 10,
            governance: Address::zero(),
            operator: Address::zero(),
            fee_collector: None,
            artifacts_dir: PathBuf::from("build/contracts"),
            manifest: None,
            wallet: default_wallet(),
            payment_tokens: vec![Address::zero()],
            collections: Vec::new(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

impl FleetConfig {
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// An asset collection supported by the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Short name used in resource names, e.g. `Land` gives `OLand` and `WLand`
    pub name: String,

    /// Address of the collection contract
    pub address: Address,

    /// Artifact of the collection-specific library, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,

    /// Calls the router may forward to the collection on behalf of holders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_calls: Vec<ProxyCallConfig>,
}

/// One entry of a collection's proxy-call allowlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCallConfig {
    /// 4-byte function selector, e.g. `0xb0b02c60`
    pub selector: Bytes,
    pub enabled: bool,
}

impl CollectionConfig {
    pub fn new(name: &str, address: Address) -> Self {
        Self {
            name: name.to_string(),
            address,
            library: None,
            proxy_calls: Vec::new(),
        }
    }

    pub fn with_library(mut self, artifact: &str) -> Self {
        self.library = Some(artifact.to_string());
        self
    }

    pub fn with_proxy_call(mut self, selector: [u8; 4], enabled: bool) -> Self {
        self.proxy_calls.push(ProxyCallConfig {
            selector: Bytes::from(selector.to_vec()),
            enabled,
        });
        self
    }
}

/// Report of a deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    /// Timestamp when the run finished
    pub timestamp: DateTime<Utc>,

    pub network: String,
    pub network_id: u64,

    /// Every resource of the deployment, in creation order
    pub resources: Vec<DeployedResource>,

    /// Configuration calls applied so far
    pub completed_calls: Vec<String>,

    /// Transactions submitted by this run
    pub transactions: Vec<GasEntry>,

    pub total_gas: U256,

    /// Gas price in wei
    pub gas_price: U256,

    /// Estimated cost in the chain currency
    pub estimated_cost: String,
}

impl DeploymentReport {
    pub fn new(chain: &ChainConfig, deployment: &Deployment, gas: &GasLedger, gas_price: U256) -> Self {
        Self {
            timestamp: Utc::now(),
            network: chain.name.clone(),
            network_id: deployment.network_id,
            resources: deployment.resources().to_vec(),
            completed_calls: deployment.completed_calls().map(String::from).collect(),
            transactions: gas.entries().to_vec(),
            total_gas: gas.total(),
            gas_price,
            estimated_cost: gas.format_cost(gas_price, &chain.currency_symbol),
        }
    }
}

/// Report of an ownership audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Timestamp when the audit finished
    pub timestamp: DateTime<Utc>,

    pub network: String,
    pub network_id: u64,

    /// One finding per expectation, in policy order
    pub findings: Vec<AuditFinding>,

    /// Whether corrective transactions were allowed
    pub reconciled: bool,

    /// Corrective transactions submitted
    pub transactions: Vec<GasEntry>,

    pub total_gas: U256,
    pub gas_price: U256,
    pub estimated_cost: String,
}

impl AuditReport {
    pub fn new(
        chain: &ChainConfig,
        findings: Vec<AuditFinding>,
        reconciled: bool,
        gas: &GasLedger,
        gas_price: U256,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            network: chain.name.clone(),
            network_id: chain.chain_id,
            findings,
            reconciled,
            transactions: gas.entries().to_vec(),
            total_gas: gas.total(),
            gas_price,
            estimated_cost: gas.format_cost(gas_price, &chain.currency_symbol),
        }
    }

    /// Number of findings with the given status
    pub fn count(&self, status: FindingStatus) -> usize {
        self.findings.iter().filter(|f| f.status == status).count()
    }

    /// Whether every expectation holds
    pub fn is_clean(&self) -> bool {
        self.findings.iter().all(|f| f.status == FindingStatus::Ok)
    }
}
