// Dependency-ordered deployer
//
// Executes a `FleetPlan` step by step against a ledger. Every creation of a
// proxy or beacon is read back before the next step runs, every resource
// already present in the deployment is attached to instead of re-created,
// and the manifest is checkpointed after each step so that an interrupted
// run resumes where it stopped.

pub mod artifacts;
pub mod plan;

pub use artifacts::ArtifactSet;
pub use plan::{Arg, Expect, FleetPlan, ReadBack, Step, TokenFamily};

use crate::ethereum::abi::{encode_call, encode_creation, signatures};
use crate::gas::GasLedger;
use crate::ledger::{LedgerClient, Session};
use crate::registry::{kinds, Deployment, ManifestStore};
use common::{DeployedResource, FleetError, ResourceKind, Result};
use ethers::abi::Token;
use ethers::types::Address;
use log::{error, info, warn};
use plan::resolve_all;

/// Runs fleet plans against a ledger
pub struct Deployer<'a> {
    session: Session<'a>,
    artifacts: &'a ArtifactSet,
    checkpoint: Option<&'a ManifestStore>,
}

impl<'a> Deployer<'a> {
    pub fn new(ledger: &'a mut dyn LedgerClient, gas: &'a mut GasLedger, artifacts: &'a ArtifactSet) -> Self {
        Self {
            session: Session::new(ledger, gas),
            artifacts,
            checkpoint: None,
        }
    }

    /// Save the deployment to `store` after every step
    pub fn with_checkpoint(mut self, store: &'a ManifestStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Execute `plan`, continuing `resume` when given
    ///
    /// Stops at the first failed step; everything completed before it is
    /// already in the checkpointed manifest.
    pub fn deploy_fleet(&mut self, plan: &FleetPlan, resume: Option<Deployment>) -> Result<Deployment> {
        let network_id = self.session.network_id();
        let mut deployment = match resume {
            Some(deployment) if deployment.network_id != network_id => {
                return Err(FleetError::NetworkMismatch {
                    expected: deployment.network_id,
                    actual: network_id,
                });
            }
            Some(deployment) => {
                info!("resuming deployment with {} resources", deployment.len());
                deployment
            }
            None => Deployment::new(network_id),
        };

        info!("executing plan of {} steps on network {}", plan.len(), network_id);
        for step in plan.steps() {
            let outcome = match step {
                Step::Create {
                    name,
                    kind,
                    artifact,
                    args,
                    implementation,
                } => self.create(&mut deployment, step, name, *kind, artifact, args, implementation.as_deref()),
                Step::Call {
                    id,
                    target,
                    signature,
                    args,
                    verify,
                } => self.configure(&mut deployment, step, id, target, signature, args, verify.as_ref()),
                Step::Repoint { id, proxy, to } => self.repoint(&mut deployment, step, id, proxy, to),
            };
            if let Err(e) = outcome {
                error!("step {} failed: {}", step.label(), e);
                return Err(e);
            }
            self.save_checkpoint(&deployment);
        }

        info!(
            "plan complete: {} resources, {} transactions",
            deployment.len(),
            self.session.gas().len()
        );
        Ok(deployment)
    }

    fn save_checkpoint(&self, deployment: &Deployment) {
        if let Some(store) = self.checkpoint {
            if let Err(e) = store.save(deployment) {
                warn!("could not checkpoint manifest {}: {:#}", store.path().display(), e);
            }
        }
    }

    fn check_dependencies(step: &Step, deployment: &Deployment) -> Result<()> {
        for dependency in step.dependencies() {
            if !deployment.contains(dependency) {
                return Err(FleetError::MissingDependency {
                    resource: step.label().to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        deployment: &mut Deployment,
        step: &Step,
        name: &str,
        kind: ResourceKind,
        artifact: &str,
        args: &[Arg],
        implementation: Option<&str>,
    ) -> Result<()> {
        if let Some(existing) = deployment.get(name).cloned() {
            if existing.kind != kind {
                return Err(FleetError::KindMismatch {
                    name: name.to_string(),
                    expected: kind,
                    actual: existing.kind,
                });
            }
            info!("attaching to {} {} at {:?}", existing.kind, name, existing.address);
            if let Some(recorded) = existing.implementation {
                self.verify_implementation(deployment, &existing, recorded)?;
            }
            return Ok(());
        }

        Self::check_dependencies(step, deployment)?;
        let expected = match implementation {
            Some(source) => Some(self.logic_behind(deployment, source)?),
            None => None,
        };
        let code = self.artifacts.get(artifact)?;
        let tokens = resolve_all(args, deployment)?;

        let receipt = self.session.submit(name, None, encode_creation(code, &tokens))?;
        let address = receipt
            .contract_address
            .ok_or_else(|| FleetError::SubmissionFailure {
                step: name.to_string(),
                reason: "receipt carries no contract address".to_string(),
            })?;

        let mut resource = DeployedResource::new(name, address, kind);
        if let Some(logic) = expected {
            resource = resource.with_implementation(logic);
        }
        deployment.insert(resource.clone())?;

        if let Some(logic) = expected {
            if let Err(e) = self.verify_implementation(deployment, &resource, logic) {
                // Left on the ledger but never used by later steps
                deployment.remove(name);
                warn!("abandoning {} at {:?}", name, address);
                return Err(e);
            }
        }
        info!("deployed {} {} at {:?}", kind, name, address);
        Ok(())
    }

    /// Logic address a new proxy or beacon must resolve to
    fn logic_behind(&self, deployment: &Deployment, source: &str) -> Result<Address> {
        let resource = deployment.require(source)?;
        match resource.kind {
            ResourceKind::Logic => Ok(resource.address),
            ResourceKind::Beacon => match resource.implementation {
                Some(logic) => Ok(logic),
                None => deployment
                    .handle::<kinds::Beacon>(source)?
                    .implementation(&self.session),
            },
            other => Err(FleetError::KindMismatch {
                name: source.to_string(),
                expected: ResourceKind::Logic,
                actual: other,
            }),
        }
    }

    /// Read back the logic a proxy or beacon resolves to
    fn observed_implementation(&self, deployment: &Deployment, resource: &DeployedResource) -> Result<Option<(Address, &'static str)>> {
        let observed = match resource.kind {
            ResourceKind::Beacon => Some((
                deployment
                    .handle::<kinds::Beacon>(&resource.name)?
                    .implementation(&self.session)?,
                signatures::IMPLEMENTATION,
            )),
            ResourceKind::Proxy | ResourceKind::Router => Some((
                deployment
                    .proxy_admin()?
                    .proxy_implementation(&self.session, resource.address)?,
                signatures::GET_PROXY_IMPLEMENTATION,
            )),
            ResourceKind::Logic | ResourceKind::Registry => None,
        };
        Ok(observed)
    }

    fn verify_implementation(&self, deployment: &Deployment, resource: &DeployedResource, expected: Address) -> Result<()> {
        if let Some((actual, check)) = self.observed_implementation(deployment, resource)? {
            if actual != expected {
                return Err(FleetError::VerificationFailure {
                    resource: resource.name.clone(),
                    check: check.to_string(),
                    expected,
                    actual,
                });
            }
            info!("verified {} resolves to {:?}", resource.name, actual);
        }
        Ok(())
    }

    /// Compare a read-back against the ledger
    ///
    /// The outer error is a failed query; the inner one describes a value
    /// that differs from the expected one.
    fn check(&self, deployment: &Deployment, target: &str, address: Address, read_back: &ReadBack) -> Result<Result<()>> {
        let tokens: Vec<Token> = resolve_all(&read_back.args, deployment)?;
        let check = read_back.signature.clone();
        let outcome = match &read_back.expect {
            Expect::Address(expect) => {
                let expected = expect.address(deployment)?;
                let actual = self.session.read_address(address, &read_back.signature, &tokens)?;
                if actual == expected {
                    Ok(())
                } else {
                    Err(FleetError::VerificationFailure {
                        resource: target.to_string(),
                        check,
                        expected,
                        actual,
                    })
                }
            }
            Expect::Flag(expected) => {
                let actual = self.session.read_bool(address, &read_back.signature, &tokens)?;
                if actual == *expected {
                    Ok(())
                } else {
                    Err(FleetError::StateMismatch {
                        resource: target.to_string(),
                        check,
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    })
                }
            }
        };
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn configure(
        &mut self,
        deployment: &mut Deployment,
        step: &Step,
        id: &str,
        target: &str,
        signature: &str,
        args: &[Arg],
        verify: Option<&ReadBack>,
    ) -> Result<()> {
        if deployment.is_completed(id) {
            info!("skipping {}: already applied", id);
            return Ok(());
        }
        Self::check_dependencies(step, deployment)?;
        let target_address = deployment.require(target)?.address;

        if let Some(read_back) = verify {
            if self.check(deployment, target, target_address, read_back)?.is_ok() {
                info!("skipping {}: {} already holds", id, read_back.signature);
                deployment.mark_completed(id);
                return Ok(());
            }
        }

        let tokens = resolve_all(args, deployment)?;
        self.session
            .submit(id, Some(target_address), encode_call(signature, &tokens))?;

        if let Some(read_back) = verify {
            self.check(deployment, target, target_address, read_back)??;
            info!("verified {}", id);
        }
        deployment.mark_completed(id);
        Ok(())
    }

    fn repoint(&mut self, deployment: &mut Deployment, step: &Step, id: &str, proxy: &str, to: &str) -> Result<()> {
        if deployment.is_completed(id) {
            info!("skipping {}: already applied", id);
            return Ok(());
        }
        Self::check_dependencies(step, deployment)?;
        let proxy_handle = deployment.handle::<kinds::Proxy>(proxy)?;
        let admin = deployment.proxy_admin()?;
        let destination = deployment.require(to)?.address;
        let expected = self.logic_behind(deployment, to)?;

        let current = admin.proxy_implementation(&self.session, proxy_handle.address())?;
        if current == expected {
            info!("skipping {}: {} already resolves to {:?}", id, proxy, expected);
        } else {
            let payload = encode_call(
                signatures::UPGRADE,
                &[Token::Address(proxy_handle.address()), Token::Address(destination)],
            );
            self.session.submit(id, Some(admin.address()), payload)?;

            let actual = admin.proxy_implementation(&self.session, proxy_handle.address())?;
            if actual != expected {
                return Err(FleetError::VerificationFailure {
                    resource: proxy.to_string(),
                    check: signatures::GET_PROXY_IMPLEMENTATION.to_string(),
                    expected,
                    actual,
                });
            }
            info!("verified {} resolves to {:?}", proxy, actual);
        }

        deployment.set_implementation(proxy, expected)?;
        deployment.mark_completed(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CollectionConfig, ConfigManager};
    use crate::ledger::{Fault, MemoryLedger};
    use crate::registry::names;

    fn deployer_address() -> Address {
        Address::from_low_u64_be(0xd0)
    }

    fn small_config() -> crate::api::FleetConfig {
        ConfigManager::builder()
            .governance(deployer_address())
            .operator(deployer_address())
            .wallet(false)
            .payment_tokens(vec![])
            .collection(CollectionConfig::new("Land", Address::from_low_u64_be(0x1a)))
            .build()
    }

    #[test]
    fn test_missing_dependency_stops_before_submission() {
        let artifacts = ArtifactSet::simulated();
        let mut ledger = MemoryLedger::for_artifacts(1337, deployer_address(), &artifacts);
        let mut gas = GasLedger::new();

        let plan = FleetPlan::collections(&small_config(), &[]).unwrap();
        let err = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&plan, None)
            .unwrap_err();

        assert!(matches!(err, FleetError::MissingDependency { .. }));
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn test_network_mismatch_on_resume() {
        let artifacts = ArtifactSet::simulated();
        let mut ledger = MemoryLedger::for_artifacts(1337, deployer_address(), &artifacts);
        let mut gas = GasLedger::new();

        let err = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&FleetPlan::platform(&small_config()), Some(Deployment::new(1)))
            .unwrap_err();
        assert!(matches!(err, FleetError::NetworkMismatch { expected: 1, actual: 1337 }));
    }

    #[test]
    fn test_misreported_beacon_aborts_before_next_creation() {
        let artifacts = ArtifactSet::simulated();
        let bogus = Address::from_low_u64_be(0xbad);
        let mut ledger = MemoryLedger::for_artifacts(1337, deployer_address(), &artifacts)
            .with_fault(Fault::MisreportImplementation(bogus));
        let mut gas = GasLedger::new();

        let mut plan = FleetPlan::new();
        plan.push(Step::create(names::O_LOGIC, ResourceKind::Logic, artifacts::names::ORENTABLE, vec![]));
        plan.push(Step::create_verified(
            names::O_BEACON,
            ResourceKind::Beacon,
            artifacts::names::UPGRADEABLE_BEACON,
            vec![Arg::resource(names::O_LOGIC)],
            names::O_LOGIC,
        ));
        plan.push(Step::create(names::W_LOGIC, ResourceKind::Logic, artifacts::names::WRENTABLE, vec![]));

        let err = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&plan, None)
            .unwrap_err();

        match err {
            FleetError::VerificationFailure { resource, actual, .. } => {
                assert_eq!(resource, names::O_BEACON);
                assert_eq!(actual, bogus);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(ledger.creations().len(), 2);
    }

    #[test]
    fn test_satisfied_read_back_skips_submission() {
        let artifacts = ArtifactSet::simulated();
        let mut ledger = MemoryLedger::for_artifacts(1337, deployer_address(), &artifacts);
        let mut gas = GasLedger::new();
        let config = small_config();

        let deployment = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&FleetPlan::platform(&config), None)
            .unwrap();
        let submitted = ledger.transactions().len();

        // Forget that the registrations were applied; the ledger still shows them
        let mut forgetful = Deployment::new(deployment.network_id);
        for resource in deployment.resources() {
            forgetful.insert(resource.clone()).unwrap();
        }
        forgetful.mark_completed("RentableLogic.SCRAM");

        let mut gas = GasLedger::new();
        let replayed = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&FleetPlan::platform(&config), Some(forgetful))
            .unwrap();

        assert_eq!(ledger.transactions().len(), submitted);
        assert!(replayed.is_completed("Rentable.setORentable(Land)"));
        assert!(replayed.is_completed("Rentable.setWRentable(Land)"));
    }
}
