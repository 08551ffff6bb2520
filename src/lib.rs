//! Deployment and governance tooling for the Rentable contract fleet.
//!
//! The [`deployer`] creates the fleet in dependency order with read-after-write
//! verification, the [`auditor`] checks and corrects who controls each
//! contract, and [`gas`] accounts for every transaction either of them sends.
//! Both talk to the chain only through a [`ledger::LedgerClient`].

pub mod api;
pub mod auditor;
pub mod deployer;
pub mod ethereum;
pub mod gas;
pub mod ledger;
pub mod registry;

pub use auditor::{GovernancePolicy, OwnershipAuditor};
pub use common::{
    AuditFinding, ControlKind, DeployedResource, FindingStatus, FleetError, OwnershipExpectation, ResourceKind,
    TransferModel,
};
pub use deployer::{ArtifactSet, Deployer, FleetPlan};
pub use gas::GasLedger;
pub use registry::{Deployment, ManifestStore};
