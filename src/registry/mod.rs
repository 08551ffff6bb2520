// Deployment registry
//
// A `Deployment` is the named record of every resource created for one
// network, in creation order, together with the configuration calls already
// applied. It is the manifest persisted between runs and the only source of
// addresses for the deployer and the auditor.

use crate::ethereum::abi::signatures;
use crate::ledger::Session;
use anyhow::{Context, Result as AnyResult};
use common::{DeployedResource, FleetError, Result};
use ethers::abi::Token;
use ethers::types::Address;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Resource names of the platform contracts
pub mod names {
    pub const PROXY_ADMIN: &str = "ProxyAdmin";
    pub const RENTABLE_LOGIC: &str = "RentableLogic";
    pub const ROUTER: &str = "Rentable";
    pub const O_LOGIC: &str = "OLogic";
    pub const O_BEACON: &str = "OBeacon";
    pub const W_LOGIC: &str = "WLogic";
    pub const W_BEACON: &str = "WBeacon";
    pub const SIMPLE_WALLET_LOGIC: &str = "SimpleWalletLogic";
    pub const SIMPLE_WALLET_BEACON: &str = "SimpleWalletBeacon";
    pub const WALLET_FACTORY: &str = "WalletFactory";

    /// Names the platform reserves for itself
    pub const PLATFORM: [&str; 10] = [
        PROXY_ADMIN,
        RENTABLE_LOGIC,
        ROUTER,
        O_LOGIC,
        O_BEACON,
        W_LOGIC,
        W_BEACON,
        SIMPLE_WALLET_LOGIC,
        SIMPLE_WALLET_BEACON,
        WALLET_FACTORY,
    ];
}

/// Type-level resource kinds for `Handle`
pub mod kinds {
    use common::ResourceKind;

    pub trait Kind {
        const KIND: ResourceKind;

        fn accepts(kind: ResourceKind) -> bool {
            kind == Self::KIND
        }
    }

    #[derive(Debug)]
    pub struct Logic;
    #[derive(Debug)]
    pub struct Beacon;
    #[derive(Debug)]
    pub struct Proxy;
    #[derive(Debug)]
    pub struct Router;
    #[derive(Debug)]
    pub struct Registry;

    impl Kind for Logic {
        const KIND: ResourceKind = ResourceKind::Logic;
    }

    impl Kind for Beacon {
        const KIND: ResourceKind = ResourceKind::Beacon;
    }

    impl Kind for Proxy {
        const KIND: ResourceKind = ResourceKind::Proxy;

        // The router is itself a transparent proxy
        fn accepts(kind: ResourceKind) -> bool {
            matches!(kind, ResourceKind::Proxy | ResourceKind::Router)
        }
    }

    impl Kind for Router {
        const KIND: ResourceKind = ResourceKind::Router;
    }

    impl Kind for Registry {
        const KIND: ResourceKind = ResourceKind::Registry;
    }
}

/// Typed reference to a resource of a deployment
///
/// Only obtainable through `Deployment::handle`, which checks the kind.
#[derive(Debug)]
pub struct Handle<K> {
    name: String,
    address: Address,
    _kind: PhantomData<K>,
}

impl<K> Handle<K> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl Handle<kinds::Beacon> {
    /// Logic address the beacon currently serves
    pub fn implementation(&self, session: &Session) -> Result<Address> {
        session.read_address(self.address, signatures::IMPLEMENTATION, &[])
    }
}

impl Handle<kinds::Registry> {
    /// Implementation behind a proxy managed by this proxy admin
    pub fn proxy_implementation(&self, session: &Session, proxy: Address) -> Result<Address> {
        session.read_address(
            self.address,
            signatures::GET_PROXY_IMPLEMENTATION,
            &[Token::Address(proxy)],
        )
    }

    /// Admin of a proxy, as seen by this proxy admin
    pub fn proxy_admin_of(&self, session: &Session, proxy: Address) -> Result<Address> {
        session.read_address(self.address, signatures::GET_PROXY_ADMIN, &[Token::Address(proxy)])
    }
}

/// Named record of the resources created for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub network_id: u64,
    #[serde(default)]
    resources: Vec<DeployedResource>,
    #[serde(default)]
    completed_calls: BTreeSet<String>,
}

impl Deployment {
    pub fn new(network_id: u64) -> Self {
        Self {
            network_id,
            resources: Vec::new(),
            completed_calls: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in creation order
    pub fn resources(&self) -> &[DeployedResource] {
        &self.resources
    }

    /// Record a new resource; names are unique
    pub fn insert(&mut self, resource: DeployedResource) -> Result<()> {
        if self.contains(&resource.name) {
            return Err(FleetError::DuplicateResource(resource.name));
        }
        debug!("registered {} {} at {:?}", resource.kind, resource.name, resource.address);
        self.resources.push(resource);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<DeployedResource> {
        let index = self.resources.iter().position(|r| r.name == name)?;
        Some(self.resources.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&DeployedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&DeployedResource> {
        self.get(name)
            .ok_or_else(|| FleetError::UnknownResource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Record the logic a proxy or beacon now points at
    pub fn set_implementation(&mut self, name: &str, implementation: Address) -> Result<()> {
        let resource = self
            .resources
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| FleetError::UnknownResource(name.to_string()))?;
        resource.implementation = Some(implementation);
        Ok(())
    }

    /// Typed handle to a resource, checked against its recorded kind
    pub fn handle<K: kinds::Kind>(&self, name: &str) -> Result<Handle<K>> {
        let resource = self.require(name)?;
        if !K::accepts(resource.kind) {
            return Err(FleetError::KindMismatch {
                name: name.to_string(),
                expected: K::KIND,
                actual: resource.kind,
            });
        }
        Ok(Handle {
            name: resource.name.clone(),
            address: resource.address,
            _kind: PhantomData,
        })
    }

    /// The routing contract of the fleet
    pub fn router(&self) -> Result<Handle<kinds::Router>> {
        self.handle(names::ROUTER)
    }

    /// The proxy admin managing every proxy of the fleet
    pub fn proxy_admin(&self) -> Result<Handle<kinds::Registry>> {
        self.handle(names::PROXY_ADMIN)
    }

    pub fn mark_completed(&mut self, call_id: &str) {
        self.completed_calls.insert(call_id.to_string());
    }

    pub fn is_completed(&self, call_id: &str) -> bool {
        self.completed_calls.contains(call_id)
    }

    pub fn completed_calls(&self) -> impl Iterator<Item = &str> {
        self.completed_calls.iter().map(|id| id.as_str())
    }

    /// Check a deserialized deployment for duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(FleetError::DuplicateResource(resource.name.clone()));
            }
        }
        Ok(())
    }
}

/// JSON manifest of a deployment on disk
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest; `None` when no deployment was recorded yet
    pub fn load(&self) -> AnyResult<Option<Deployment>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read manifest {}", self.path.display()))?;
        let deployment: Deployment = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", self.path.display()))?;
        deployment.validate()?;
        info!(
            "loaded manifest {} with {} resources",
            self.path.display(),
            deployment.len()
        );
        Ok(Some(deployment))
    }

    /// Write the manifest, replacing the previous one atomically
    pub fn save(&self, deployment: &Deployment) -> AnyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(deployment)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to replace manifest {}", self.path.display()))?;
        debug!("saved manifest {}", self.path.display());
        Ok(())
    }
}
