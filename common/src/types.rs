use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a deployed resource plays in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Contract holding executable behavior
    Logic,
    /// Upgradeable beacon shared by several proxies
    Beacon,
    /// Proxy forwarding to a logic contract, directly or through a beacon
    Proxy,
    /// Central routing contract (itself a transparent proxy)
    Router,
    /// Standalone bookkeeping contract (proxy admin, wallet factory, libraries)
    Registry,
}

impl ResourceKind {
    /// Whether the resource delegates to a logic contract and must be verified
    /// against it after creation
    pub fn delegates(&self) -> bool {
        matches!(self, Self::Beacon | Self::Proxy | Self::Router)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Logic => "logic",
            Self::Beacon => "beacon",
            Self::Proxy => "proxy",
            Self::Router => "router",
            Self::Registry => "registry",
        };
        f.write_str(name)
    }
}

/// A resource known to a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedResource {
    /// Stable name, unique within a deployment
    pub name: String,
    /// Address on the ledger
    pub address: Address,
    /// Role of the resource
    pub kind: ResourceKind,
    /// Logic address the resource currently points at (proxies and beacons)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
}

impl DeployedResource {
    pub fn new(name: impl Into<String>, address: Address, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            address,
            kind,
            implementation: None,
        }
    }

    pub fn with_implementation(mut self, implementation: Address) -> Self {
        self.implementation = Some(implementation);
        self
    }
}

/// Controlling role checked by the auditor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Owner,
    Admin,
    Governance,
}

impl ControlKind {
    /// Transfer protocol used when an expectation does not name one
    pub fn default_transfer(&self) -> TransferModel {
        match self {
            Self::Owner => TransferModel::SingleStep,
            Self::Admin => TransferModel::SingleStep,
            Self::Governance => TransferModel::ProposeAccept,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Governance => "governance",
        };
        f.write_str(name)
    }
}

/// How control over a resource changes hands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferModel {
    /// The current controller hands control over in one transaction
    SingleStep,
    /// The current controller proposes, the new controller accepts
    ProposeAccept,
    /// Control is fixed for the lifetime of the resource
    ReportOnly,
}

/// Expected controlling party for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipExpectation {
    pub resource_name: String,
    pub control_kind: ControlKind,
    pub expected_controller: Address,
    /// Overrides the control kind's default transfer protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferModel>,
}

impl OwnershipExpectation {
    pub fn new(resource_name: impl Into<String>, control_kind: ControlKind, expected_controller: Address) -> Self {
        Self {
            resource_name: resource_name.into(),
            control_kind,
            expected_controller,
            transfer: None,
        }
    }

    pub fn with_transfer(mut self, transfer: TransferModel) -> Self {
        self.transfer = Some(transfer);
        self
    }

    /// Effective transfer protocol
    pub fn transfer_model(&self) -> TransferModel {
        self.transfer.unwrap_or_else(|| self.control_kind.default_transfer())
    }
}

/// Outcome of checking one expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Ok,
    Mismatch,
    Uninitialized,
    PendingAcceptance,
    /// The controller could not be read; no action is possible
    Unreadable,
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Mismatch => "MISMATCH",
            Self::Uninitialized => "UNINITIALIZED",
            Self::PendingAcceptance => "PENDING",
            Self::Unreadable => "UNREADABLE",
        };
        f.write_str(name)
    }
}

/// Result of auditing a single expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub resource_name: String,
    pub control_kind: ControlKind,
    pub transfer: TransferModel,
    /// Controller observed on the ledger, if it could be read
    pub actual_controller: Option<Address>,
    pub expected_controller: Address,
    pub status: FindingStatus,
    /// Action the operator has to take by hand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AuditFinding {
    /// Whether `reconcile` may submit a corrective transaction for this finding
    pub fn is_actionable(&self) -> bool {
        self.status == FindingStatus::Mismatch && self.transfer != TransferModel::ReportOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transfer_models() {
        assert_eq!(ControlKind::Owner.default_transfer(), TransferModel::SingleStep);
        assert_eq!(ControlKind::Admin.default_transfer(), TransferModel::SingleStep);
        assert_eq!(ControlKind::Governance.default_transfer(), TransferModel::ProposeAccept);

        let expectation = OwnershipExpectation::new("OLand", ControlKind::Admin, Address::zero())
            .with_transfer(TransferModel::ReportOnly);
        assert_eq!(expectation.transfer_model(), TransferModel::ReportOnly);
    }

    #[test]
    fn test_only_mismatches_are_actionable() {
        let mut finding = AuditFinding {
            resource_name: "Rentable".to_string(),
            control_kind: ControlKind::Governance,
            transfer: TransferModel::ProposeAccept,
            actual_controller: Some(Address::from_low_u64_be(1)),
            expected_controller: Address::from_low_u64_be(2),
            status: FindingStatus::Mismatch,
            note: None,
        };
        assert!(finding.is_actionable());

        finding.status = FindingStatus::PendingAcceptance;
        assert!(!finding.is_actionable());

        finding.status = FindingStatus::Mismatch;
        finding.transfer = TransferModel::ReportOnly;
        assert!(!finding.is_actionable());
    }

    #[test]
    fn test_expectation_json_uses_snake_case() {
        let json = r#"{
            "resource_name": "Rentable",
            "control_kind": "governance",
            "expected_controller": "0xc08618375bb20ac1c4bb806baa027a4362156fe6",
            "transfer": "propose_accept"
        }"#;
        let expectation: OwnershipExpectation = serde_json::from_str(json).unwrap();
        assert_eq!(expectation.control_kind, ControlKind::Governance);
        assert_eq!(expectation.transfer_model(), TransferModel::ProposeAccept);
    }
}
