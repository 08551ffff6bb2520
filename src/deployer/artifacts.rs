// Compiled artifacts
//
// Creation code for every contract the fleet deploys, keyed by contract name.
// Artifacts are read from a build directory holding one JSON file per
// contract, in either Brownie (`"bytecode": "0x.."`) or Foundry
// (`"bytecode": {"object": "0x.."}`) layout.

use anyhow::{Context, Result};
use common::FleetError;
use ethers::types::Bytes;
use ethers::utils::keccak256;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Contract names of the standard fleet artifacts
pub mod names {
    pub const PROXY_ADMIN: &str = "ProxyAdmin";
    pub const UPGRADEABLE_BEACON: &str = "UpgradeableBeacon";
    pub const TRANSPARENT_PROXY: &str = "ImmutableAdminTransparentUpgradeableProxy";
    pub const BEACON_PROXY: &str = "ImmutableAdminUpgradeableBeaconProxy";
    pub const RENTABLE: &str = "Rentable";
    pub const ORENTABLE: &str = "ORentable";
    pub const WRENTABLE: &str = "WRentable";
    pub const SIMPLE_WALLET: &str = "SimpleWallet";
    pub const WALLET_FACTORY: &str = "WalletFactory";

    pub const STANDARD: [&str; 9] = [
        PROXY_ADMIN,
        UPGRADEABLE_BEACON,
        TRANSPARENT_PROXY,
        BEACON_PROXY,
        RENTABLE,
        ORENTABLE,
        WRENTABLE,
        SIMPLE_WALLET,
        WALLET_FACTORY,
    ];
}

/// Creation code by contract name
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    codes: BTreeMap<String, Bytes>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every artifact with non-empty bytecode from a build directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut set = Self::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read artifact directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read artifact {}", path.display()))?;
            let json: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

            match creation_code(&json) {
                Some(hex_code) => {
                    let code = hex::decode(hex_code.trim_start_matches("0x"))
                        .with_context(|| format!("Invalid bytecode in artifact {}", path.display()))?;
                    if code.is_empty() {
                        debug!("skipping {}: no creation code", name);
                        continue;
                    }
                    set.insert(&name, Bytes::from(code));
                }
                None => debug!("skipping {}: no bytecode field", name),
            }
        }

        info!("loaded {} artifacts from {}", set.len(), dir.display());
        Ok(set)
    }

    /// Placeholder creation code for the standard artifacts
    ///
    /// Only meaningful against a `MemoryLedger`, which maps each placeholder
    /// back to the contract it stands for.
    pub fn simulated() -> Self {
        let mut set = Self::new();
        for name in names::STANDARD {
            set.simulate(name);
        }
        set
    }

    /// Add placeholder creation code for `name` unless real code is present
    pub fn simulate(&mut self, name: &str) {
        if !self.codes.contains_key(name) {
            let code = keccak256(format!("simulated:{}", name).as_bytes());
            self.insert(name, Bytes::from(code.to_vec()));
        }
    }

    pub fn insert(&mut self, name: &str, code: Bytes) {
        self.codes.insert(name.to_string(), code);
    }

    pub fn with(mut self, name: &str, code: Bytes) -> Self {
        self.insert(name, code);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Bytes, FleetError> {
        self.codes
            .get(name)
            .ok_or_else(|| FleetError::MissingArtifact(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.codes.iter().map(|(name, code)| (name.as_str(), code))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn creation_code(json: &Value) -> Option<&str> {
    match json.get("bytecode")? {
        Value::String(code) => Some(code.as_str()),
        Value::Object(fields) => fields.get("object")?.as_str(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_brownie_and_foundry_layouts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ProxyAdmin.json"), r#"{"contractName":"ProxyAdmin","bytecode":"0x6080"}"#).unwrap();
        fs::write(dir.path().join("Rentable.json"), r#"{"bytecode":{"object":"0x60806040"}}"#).unwrap();
        fs::write(dir.path().join("IERC721.json"), r#"{"bytecode":"0x"}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an artifact").unwrap();

        let set = ArtifactSet::load_dir(dir.path()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("ProxyAdmin").unwrap().to_vec(), vec![0x60, 0x80]);
        assert_eq!(set.get("Rentable").unwrap().len(), 4);
        assert!(!set.contains("IERC721"));
    }

    #[test]
    fn test_missing_artifact_is_reported_by_name() {
        let set = ArtifactSet::simulated();
        assert_eq!(set.len(), names::STANDARD.len());
        match set.get("DecentralandCollectionLibrary") {
            Err(FleetError::MissingArtifact(name)) => assert_eq!(name, "DecentralandCollectionLibrary"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_simulate_keeps_real_code() {
        let mut set = ArtifactSet::new().with("OLandRegistry", Bytes::from(vec![1, 2, 3]));
        set.simulate("OLandRegistry");
        assert_eq!(set.get("OLandRegistry").unwrap().len(), 3);
    }
}
