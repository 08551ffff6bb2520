// Governance policy
//
// Shorthand for the expectations of a fleet handed over to its long-term
// governance: who owns the proxy admin, which resources are ownable, which
// proxies have an (immutable) admin and which contracts are governed.

use crate::registry::{names, Deployment};
use common::{ControlKind, OwnershipExpectation, ResourceKind, TransferModel};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Expected controllers of a fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    /// Owner and governor of everything
    pub governance: Address,

    /// Expected admin of every proxy
    pub admin: Address,

    /// Check that the proxy admin is owned by `governance`
    #[serde(default = "default_proxy_admin_owner")]
    pub proxy_admin_owner: bool,

    /// Resources whose owner must be `governance`
    #[serde(default)]
    pub ownable: Vec<String>,

    /// Proxies whose admin must be `admin`; reported only
    #[serde(default)]
    pub adminable: Vec<String>,

    /// Resources whose governance must be `governance`
    #[serde(default)]
    pub governed: Vec<String>,

    /// Additional explicit expectations
    #[serde(default)]
    pub expectations: Vec<OwnershipExpectation>,
}

fn default_proxy_admin_owner() -> bool {
    true
}

impl GovernancePolicy {
    pub fn new(governance: Address, admin: Address) -> Self {
        Self {
            governance,
            admin,
            proxy_admin_owner: true,
            ownable: Vec::new(),
            adminable: Vec::new(),
            governed: Vec::new(),
            expectations: Vec::new(),
        }
    }

    /// Policy covering every resource of a deployment
    ///
    /// Beacons, token logic, token proxies and the wallet factory are
    /// ownable; proxies and the router have the proxy admin as admin; the
    /// router is governed. The halted router logic is left out.
    pub fn for_deployment(governance: Address, admin: Address, deployment: &Deployment) -> Self {
        let mut policy = Self::new(governance, admin);
        for resource in deployment.resources() {
            let name = resource.name.clone();
            match resource.kind {
                ResourceKind::Beacon => policy.ownable.push(name),
                ResourceKind::Proxy => {
                    policy.ownable.push(name.clone());
                    policy.adminable.push(name);
                }
                ResourceKind::Router => {
                    policy.adminable.push(name.clone());
                    policy.governed.push(name);
                }
                ResourceKind::Logic if name == names::RENTABLE_LOGIC || name == names::SIMPLE_WALLET_LOGIC => {}
                ResourceKind::Logic => policy.ownable.push(name),
                // Replacement factories keep the prefix, e.g. `WalletFactoryV2`
                ResourceKind::Registry if name.starts_with(names::WALLET_FACTORY) => policy.ownable.push(name),
                ResourceKind::Registry => {}
            }
        }
        policy
    }

    /// Flatten into individual expectations, in a stable order
    pub fn expectations(&self) -> Vec<OwnershipExpectation> {
        let mut expectations = Vec::new();
        if self.proxy_admin_owner {
            expectations.push(OwnershipExpectation::new(
                names::PROXY_ADMIN,
                ControlKind::Owner,
                self.governance,
            ));
        }
        for name in &self.ownable {
            expectations.push(OwnershipExpectation::new(name.as_str(), ControlKind::Owner, self.governance));
        }
        for name in &self.adminable {
            expectations.push(
                OwnershipExpectation::new(name.as_str(), ControlKind::Admin, self.admin)
                    .with_transfer(TransferModel::ReportOnly),
            );
        }
        for name in &self.governed {
            expectations.push(OwnershipExpectation::new(
                name.as_str(),
                ControlKind::Governance,
                self.governance,
            ));
        }
        expectations.extend(self.expectations.iter().cloned());
        expectations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DeployedResource;

    #[test]
    fn test_policy_expands_in_order() {
        let governance = Address::from_low_u64_be(0x60);
        let admin = Address::from_low_u64_be(0xad);
        let json = format!(
            r#"{{
                "governance": "{:?}",
                "admin": "{:?}",
                "ownable": ["OBeacon", "OLand"],
                "adminable": ["OLand"],
                "governed": ["Rentable"]
            }}"#,
            governance, admin
        );
        let policy: GovernancePolicy = serde_json::from_str(&json).unwrap();
        let expectations = policy.expectations();

        assert_eq!(expectations.len(), 5);
        assert_eq!(expectations[0].resource_name, names::PROXY_ADMIN);
        assert_eq!(expectations[3].control_kind, ControlKind::Admin);
        assert_eq!(expectations[3].transfer_model(), TransferModel::ReportOnly);
        assert_eq!(expectations[3].expected_controller, admin);
        assert_eq!(expectations[4].transfer_model(), TransferModel::ProposeAccept);
    }

    #[test]
    fn test_policy_for_deployment_classifies_resources() {
        let mut deployment = Deployment::new(1);
        let resources = [
            (names::PROXY_ADMIN, ResourceKind::Registry),
            (names::RENTABLE_LOGIC, ResourceKind::Logic),
            (names::ROUTER, ResourceKind::Router),
            (names::O_LOGIC, ResourceKind::Logic),
            (names::O_BEACON, ResourceKind::Beacon),
            (names::SIMPLE_WALLET_LOGIC, ResourceKind::Logic),
            (names::WALLET_FACTORY, ResourceKind::Registry),
            ("OLand", ResourceKind::Proxy),
            ("LandLibrary", ResourceKind::Registry),
            ("WalletFactoryV2", ResourceKind::Registry),
        ];
        for (i, (name, kind)) in resources.iter().enumerate() {
            deployment
                .insert(DeployedResource::new(*name, Address::from_low_u64_be(i as u64 + 1), *kind))
                .unwrap();
        }

        let policy = GovernancePolicy::for_deployment(Address::from_low_u64_be(0x60), Address::zero(), &deployment);
        assert_eq!(
            policy.ownable,
            vec!["OLogic", "OBeacon", "WalletFactory", "OLand", "WalletFactoryV2"]
        );
        assert_eq!(policy.adminable, vec!["Rentable", "OLand"]);
        assert_eq!(policy.governed, vec!["Rentable"]);
    }
}
