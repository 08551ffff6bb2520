// Ownership auditor
//
// Compares who actually controls each resource of a deployment with who is
// expected to, and optionally submits the transactions that move control to
// the expected party. Every resource is audited independently: one failed
// read never hides the findings of the others.

pub mod policy;

pub use policy::GovernancePolicy;

use crate::ethereum::abi::{encode_call, signatures};
use crate::gas::GasLedger;
use crate::ledger::{LedgerClient, Session};
use crate::registry::Deployment;
use common::{AuditFinding, ControlKind, FindingStatus, OwnershipExpectation, Result, TransferModel};
use ethers::abi::Token;
use ethers::types::{Address, Bytes};
use log::{debug, info, warn};

/// Contract a control function lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Via {
    /// The audited resource itself
    Resource,
    /// The proxy admin, with the resource as first argument
    ProxyAdmin,
}

#[derive(Debug, Clone, Copy)]
struct Function {
    signature: &'static str,
    via: Via,
}

impl Function {
    const fn on_resource(signature: &'static str) -> Self {
        Self { signature, via: Via::Resource }
    }

    const fn on_proxy_admin(signature: &'static str) -> Self {
        Self { signature, via: Via::ProxyAdmin }
    }
}

/// Functions reading and moving one kind of control
#[derive(Debug, Clone, Copy)]
struct ControlSurface {
    read: Function,
    pending: Option<Function>,
    transfer: Option<Function>,
    accept: Option<&'static str>,
}

impl ControlSurface {
    fn of(kind: ControlKind, model: TransferModel) -> Self {
        let two_step = model == TransferModel::ProposeAccept;
        let movable = model != TransferModel::ReportOnly;
        match kind {
            ControlKind::Owner => Self {
                read: Function::on_resource(signatures::OWNER),
                pending: two_step.then_some(Function::on_resource(signatures::PENDING_OWNER)),
                transfer: movable.then_some(Function::on_resource(signatures::TRANSFER_OWNERSHIP)),
                accept: two_step.then_some(signatures::ACCEPT_OWNERSHIP),
            },
            ControlKind::Governance => Self {
                read: Function::on_resource(signatures::GET_GOVERNANCE),
                pending: two_step.then_some(Function::on_resource(signatures::GET_PENDING_GOVERNANCE)),
                transfer: movable.then_some(Function::on_resource(signatures::SET_GOVERNANCE)),
                accept: two_step.then_some(signatures::ACCEPT_GOVERNANCE),
            },
            ControlKind::Admin if two_step => Self {
                read: Function::on_resource(signatures::ADMIN),
                pending: Some(Function::on_resource(signatures::PENDING_ADMIN)),
                transfer: Some(Function::on_resource(signatures::SET_PENDING_ADMIN)),
                accept: Some(signatures::ACCEPT_ADMIN),
            },
            ControlKind::Admin => Self {
                read: Function::on_proxy_admin(signatures::GET_PROXY_ADMIN),
                pending: None,
                transfer: movable.then_some(Function::on_proxy_admin(signatures::CHANGE_PROXY_ADMIN)),
                accept: None,
            },
        }
    }
}

/// Classify an observed controller against the expected one
pub fn classify(actual: Address, pending: Option<Address>, expected: Address) -> FindingStatus {
    if actual == expected {
        FindingStatus::Ok
    } else if actual.is_zero() {
        FindingStatus::Uninitialized
    } else if pending == Some(expected) {
        FindingStatus::PendingAcceptance
    } else {
        FindingStatus::Mismatch
    }
}

/// Audits and reconciles control over the resources of a deployment
pub struct OwnershipAuditor<'a> {
    session: Session<'a>,
    deployment: &'a Deployment,
}

impl<'a> OwnershipAuditor<'a> {
    pub fn new(ledger: &'a mut dyn LedgerClient, gas: &'a mut GasLedger, deployment: &'a Deployment) -> Self {
        Self {
            session: Session::new(ledger, gas),
            deployment,
        }
    }

    /// One finding per expectation, in order; never submits anything
    pub fn audit(&self, expectations: &[OwnershipExpectation]) -> Vec<AuditFinding> {
        let findings: Vec<AuditFinding> = expectations
            .iter()
            .map(|e| {
                self.inspect(
                    &e.resource_name,
                    e.control_kind,
                    e.transfer_model(),
                    e.expected_controller,
                )
            })
            .collect();
        let problems = findings.iter().filter(|f| f.status != FindingStatus::Ok).count();
        info!("audited {} expectations, {} need attention", findings.len(), problems);
        findings
    }

    /// Correct every actionable finding, then re-read all of them
    ///
    /// A failed corrective transaction stops reconciliation.
    pub fn reconcile(&mut self, findings: &[AuditFinding]) -> Result<Vec<AuditFinding>> {
        for finding in findings {
            if finding.is_actionable() {
                self.correct(finding)?;
            } else if finding.status == FindingStatus::Mismatch {
                warn!(
                    "{} of {} cannot be changed from here; left as {:?}",
                    finding.control_kind,
                    finding.resource_name,
                    finding.actual_controller
                );
            }
        }

        Ok(findings
            .iter()
            .map(|f| self.inspect(&f.resource_name, f.control_kind, f.transfer, f.expected_controller))
            .collect())
    }

    fn inspect(&self, name: &str, kind: ControlKind, transfer: TransferModel, expected: Address) -> AuditFinding {
        let mut finding = AuditFinding {
            resource_name: name.to_string(),
            control_kind: kind,
            transfer,
            actual_controller: None,
            expected_controller: expected,
            status: FindingStatus::Unreadable,
            note: None,
        };

        let surface = ControlSurface::of(kind, transfer);
        match self.observe(name, &surface) {
            Ok((actual, pending)) => {
                finding.actual_controller = Some(actual);
                finding.status = classify(actual, pending, expected);
                finding.note = match finding.status {
                    FindingStatus::PendingAcceptance => surface
                        .accept
                        .map(|accept| format!("{:?} must call {} on {}", expected, accept, name)),
                    FindingStatus::Mismatch if transfer == TransferModel::ReportOnly => Some(format!(
                        "{} is fixed for the lifetime of {}; redeploy to change it",
                        kind, name
                    )),
                    _ => None,
                };
                if finding.status == FindingStatus::Mismatch {
                    warn!("{} of {} is {:?}, expected {:?}", kind, name, actual, expected);
                }
            }
            Err(e) => {
                warn!("could not read {} of {}: {}", kind, name, e);
                finding.note = Some(e.to_string());
            }
        }
        finding
    }

    fn observe(&self, name: &str, surface: &ControlSurface) -> Result<(Address, Option<Address>)> {
        let resource = self.deployment.require(name)?;
        let actual = self.read(resource.address, surface.read)?;
        let pending = match surface.pending {
            Some(function) => match self.read(resource.address, function) {
                Ok(pending) => Some(pending),
                Err(e) => {
                    debug!("no pending controller readable on {}: {}", name, e);
                    None
                }
            },
            None => None,
        };
        Ok((actual, pending))
    }

    fn read(&self, resource: Address, function: Function) -> Result<Address> {
        match function.via {
            Via::Resource => self.session.read_address(resource, function.signature, &[]),
            Via::ProxyAdmin => {
                let admin = self.deployment.proxy_admin()?;
                self.session
                    .read_address(admin.address(), function.signature, &[Token::Address(resource)])
            }
        }
    }

    fn correct(&mut self, finding: &AuditFinding) -> Result<()> {
        let resource = self.deployment.require(&finding.resource_name)?;
        let surface = ControlSurface::of(finding.control_kind, finding.transfer);
        let function = match surface.transfer {
            Some(function) => function,
            None => return Ok(()),
        };
        let expected = finding.expected_controller;

        let (target, payload): (Address, Bytes) = match function.via {
            Via::Resource => (
                resource.address,
                encode_call(function.signature, &[Token::Address(expected)]),
            ),
            Via::ProxyAdmin => (
                self.deployment.proxy_admin()?.address(),
                encode_call(
                    function.signature,
                    &[Token::Address(resource.address), Token::Address(expected)],
                ),
            ),
        };

        info!(
            "moving {} of {} from {:?} to {:?}",
            finding.control_kind, finding.resource_name, finding.actual_controller, expected
        );
        let label = format!("{}.{}", finding.resource_name, function.signature);
        self.session.submit(&label, Some(target), payload)?;

        if let Some(accept) = surface.accept {
            info!("{:?} must now call {} on {}", expected, accept, finding.resource_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        let expected = Address::from_low_u64_be(2);
        let other = Address::from_low_u64_be(3);

        assert_eq!(classify(expected, None, expected), FindingStatus::Ok);
        assert_eq!(classify(Address::zero(), Some(expected), expected), FindingStatus::Uninitialized);
        assert_eq!(classify(other, Some(expected), expected), FindingStatus::PendingAcceptance);
        assert_eq!(classify(other, Some(other), expected), FindingStatus::Mismatch);
        assert_eq!(classify(other, None, expected), FindingStatus::Mismatch);
    }

    #[test]
    fn test_surfaces_per_transfer_model() {
        let single = ControlSurface::of(ControlKind::Owner, TransferModel::SingleStep);
        assert_eq!(single.read.signature, signatures::OWNER);
        assert!(single.pending.is_none());
        assert!(single.accept.is_none());

        let governed = ControlSurface::of(ControlKind::Governance, TransferModel::ProposeAccept);
        assert_eq!(governed.transfer.map(|f| f.signature), Some(signatures::SET_GOVERNANCE));
        assert_eq!(governed.accept, Some(signatures::ACCEPT_GOVERNANCE));

        let immutable = ControlSurface::of(ControlKind::Admin, TransferModel::ReportOnly);
        assert_eq!(immutable.read.via, Via::ProxyAdmin);
        assert!(immutable.transfer.is_none());

        let two_step_admin = ControlSurface::of(ControlKind::Admin, TransferModel::ProposeAccept);
        assert_eq!(two_step_admin.transfer.map(|f| f.signature), Some(signatures::SET_PENDING_ADMIN));
    }
}
