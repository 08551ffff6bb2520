// Rentable Deploy API Module
//
// A unified interface over the deployer and the auditor. It binds a ledger
// client to the gas ledger of a run, handles the manifest and produces the
// reports shown to the operator.

mod config;
mod report;
mod types;

pub use config::*;
pub use report::*;
pub use types::*;

use crate::auditor::OwnershipAuditor;
use crate::deployer::{ArtifactSet, Deployer, FleetPlan};
use crate::ethereum::chain::{ChainConfig, ChainRegistry};
use crate::gas::GasLedger;
use crate::ledger::LedgerClient;
use crate::registry::{Deployment, ManifestStore};
use anyhow::{Context, Result};
use common::OwnershipExpectation;
use ethers::types::U256;
use log::{error, info};

/// Main API for Rentable Deploy
///
/// Runs plans and audits against one ledger and reports their gas.
///
/// # Examples
///
/// ```
/// use rentable_deploy::api::{ConfigManager, FleetOperator};
/// use rentable_deploy::deployer::{ArtifactSet, FleetPlan};
/// use rentable_deploy::ledger::MemoryLedger;
/// use ethers::types::{Address, U256};
///
/// let deployer = Address::from_low_u64_be(0xd0);
/// let config = ConfigManager::builder().governance(deployer).operator(deployer).build();
/// let artifacts = ArtifactSet::simulated();
/// let mut ledger = MemoryLedger::for_artifacts(1337, deployer, &artifacts);
///
/// let mut operator = FleetOperator::new(&mut ledger, U256::from(10_000_000_000u64));
/// let (_, report) = operator.deploy(&FleetPlan::platform(&config), &artifacts, None).unwrap();
/// assert!(!report.resources.is_empty());
/// ```
pub struct FleetOperator<'a> {
    ledger: &'a mut dyn LedgerClient,
    chain: ChainConfig,
    gas_price: U256,
}

impl<'a> FleetOperator<'a> {
    /// Create an operator for the network the ledger is connected to
    pub fn new(ledger: &'a mut dyn LedgerClient, gas_price: U256) -> Self {
        let chain = ChainRegistry::new().resolve(ledger.network_id());
        Self { ledger, chain, gas_price }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Run a plan, resuming from and checkpointing to `store` when given
    pub fn deploy(
        &mut self,
        plan: &FleetPlan,
        artifacts: &ArtifactSet,
        store: Option<&ManifestStore>,
    ) -> Result<(Deployment, DeploymentReport)> {
        let resume = match store {
            Some(store) => store.load()?,
            None => None,
        };

        let mut gas = GasLedger::new();
        let outcome = {
            let mut deployer = Deployer::new(&mut *self.ledger, &mut gas, artifacts);
            if let Some(store) = store {
                deployer = deployer.with_checkpoint(store);
            }
            deployer.deploy_fleet(plan, resume)
        };

        let deployment = match outcome {
            Ok(deployment) => deployment,
            Err(e) => {
                error!(
                    "run stopped after {} transactions using {} gas ({})",
                    gas.len(),
                    gas.total(),
                    gas.format_cost(self.gas_price, &self.chain.currency_symbol)
                );
                let hint = if e.halts_run() {
                    "completed steps are in the manifest; re-run to resume"
                } else {
                    "nothing was submitted for the failing step"
                };
                return Err(e).context(hint);
            }
        };

        if let Some(store) = store {
            store.save(&deployment)?;
            info!("manifest written to {}", store.path().display());
        }
        let report = DeploymentReport::new(&self.chain, &deployment, &gas, self.gas_price);
        Ok((deployment, report))
    }

    /// Audit a deployment, reconciling when `fix` is set
    pub fn audit(
        &mut self,
        deployment: &Deployment,
        expectations: &[OwnershipExpectation],
        fix: bool,
    ) -> Result<AuditReport> {
        let mut gas = GasLedger::new();
        let findings = {
            let mut auditor = OwnershipAuditor::new(&mut *self.ledger, &mut gas, deployment);
            let findings = auditor.audit(expectations);
            if fix {
                auditor
                    .reconcile(&findings)
                    .context("reconciliation stopped; re-run the audit to see the current state")?
            } else {
                findings
            }
        };
        Ok(AuditReport::new(&self.chain, findings, fix, &gas, self.gas_price))
    }
}
