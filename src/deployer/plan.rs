// Fleet plans
//
// A plan is the ordered list of steps that brings a fleet into existence.
// Steps refer to each other by resource name; the deployer resolves names
// against the deployment as it goes, so a plan is plain data and the same
// plan can be replayed against a partially completed deployment.

use crate::api::{CollectionConfig, FleetConfig};
use crate::deployer::artifacts::names as artifact;
use crate::ethereum::abi::{encode_call, signatures as sig};
use crate::registry::{names, Deployment};
use common::{FleetError, ResourceKind, Result};
use ethers::abi::Token;
use ethers::types::{Address, Bytes};
use std::fmt;
use std::str::FromStr;

/// Argument of a constructor or call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Address(Address),
    /// Address of an earlier resource
    Resource(String),
    /// ABI-encoded call passed as `bytes`, e.g. a proxy initializer
    Initializer { signature: String, args: Vec<Arg> },
    Bool(bool),
    /// Fixed-size bytes, e.g. a function selector passed as `bytes4`
    FixedBytes(Bytes),
}

impl Arg {
    pub fn resource(name: &str) -> Self {
        Self::Resource(name.to_string())
    }

    pub fn initializer(signature: &str, args: Vec<Arg>) -> Self {
        Self::Initializer {
            signature: signature.to_string(),
            args,
        }
    }

    fn dependencies<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Address(_) | Self::Bool(_) | Self::FixedBytes(_) => {}
            Self::Resource(name) => out.push(name),
            Self::Initializer { args, .. } => args.iter().for_each(|a| a.dependencies(out)),
        }
    }

    pub fn resolve(&self, deployment: &Deployment) -> Result<Token> {
        Ok(match self {
            Self::Address(address) => Token::Address(*address),
            Self::Resource(name) => Token::Address(deployment.require(name)?.address),
            Self::Initializer { signature, args } => {
                let tokens = resolve_all(args, deployment)?;
                Token::Bytes(encode_call(signature, &tokens).to_vec())
            }
            Self::Bool(value) => Token::Bool(*value),
            Self::FixedBytes(bytes) => Token::FixedBytes(bytes.to_vec()),
        })
    }

    /// Resolve an argument that must denote a single address
    pub fn address(&self, deployment: &Deployment) -> Result<Address> {
        match self {
            Self::Address(address) => Ok(*address),
            Self::Resource(name) => Ok(deployment.require(name)?.address),
            Self::Initializer { signature, .. } => Err(FleetError::Decode {
                call: signature.clone(),
                reason: "an initializer does not denote an address".to_string(),
            }),
            other => Err(FleetError::Decode {
                call: format!("{:?}", other),
                reason: "argument does not denote an address".to_string(),
            }),
        }
    }
}

pub fn resolve_all(args: &[Arg], deployment: &Deployment) -> Result<Vec<Token>> {
    args.iter().map(|arg| arg.resolve(deployment)).collect()
}

/// Value a read-back must return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    Address(Arg),
    Flag(bool),
}

/// Read-back check of a configuration call
///
/// `signature(args)` is called on the step's target and must return `expect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBack {
    pub signature: String,
    pub args: Vec<Arg>,
    pub expect: Expect,
}

impl ReadBack {
    /// Read-back of a view returning an address
    pub fn new(signature: &str, args: Vec<Arg>, expect: Arg) -> Self {
        Self {
            signature: signature.to_string(),
            args,
            expect: Expect::Address(expect),
        }
    }

    /// Read-back of a view returning a bool
    pub fn flag(signature: &str, args: Vec<Arg>, expect: bool) -> Self {
        Self {
            signature: signature.to_string(),
            args,
            expect: Expect::Flag(expect),
        }
    }
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Create a contract; skipped when `name` is already deployed
    Create {
        name: String,
        kind: ResourceKind,
        artifact: String,
        args: Vec<Arg>,
        /// Logic (or beacon) the new resource must resolve to
        implementation: Option<String>,
    },
    /// Submit a configuration call, at most once per deployment
    Call {
        id: String,
        target: String,
        signature: String,
        args: Vec<Arg>,
        verify: Option<ReadBack>,
    },
    /// Point a proxy at another logic or beacon through the proxy admin
    Repoint { id: String, proxy: String, to: String },
}

impl Step {
    pub fn create(name: &str, kind: ResourceKind, artifact: &str, args: Vec<Arg>) -> Self {
        Self::Create {
            name: name.to_string(),
            kind,
            artifact: artifact.to_string(),
            args,
            implementation: None,
        }
    }

    /// Create a proxy or beacon whose implementation is verified after creation
    pub fn create_verified(name: &str, kind: ResourceKind, artifact: &str, args: Vec<Arg>, implementation: &str) -> Self {
        Self::Create {
            name: name.to_string(),
            kind,
            artifact: artifact.to_string(),
            args,
            implementation: Some(implementation.to_string()),
        }
    }

    pub fn call(target: &str, signature: &str, args: Vec<Arg>) -> Self {
        let function = signature.split('(').next().unwrap_or(signature);
        Self::Call {
            id: format!("{}.{}", target, function),
            target: target.to_string(),
            signature: signature.to_string(),
            args,
            verify: None,
        }
    }

    /// Override the identifier a call is remembered by
    pub fn with_id(mut self, new_id: String) -> Self {
        if let Self::Call { id, .. } | Self::Repoint { id, .. } = &mut self {
            *id = new_id;
        }
        self
    }

    pub fn verified_by(mut self, read_back: ReadBack) -> Self {
        if let Self::Call { verify, .. } = &mut self {
            *verify = Some(read_back);
        }
        self
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Create { name, .. } => name,
            Self::Call { id, .. } | Self::Repoint { id, .. } => id,
        }
    }

    /// Resources that must exist before this step runs
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = Vec::new();
        match self {
            Self::Create { args, implementation, .. } => {
                args.iter().for_each(|a| a.dependencies(&mut deps));
                if let Some(implementation) = implementation {
                    deps.push(implementation.as_str());
                }
            }
            Self::Call { target, args, verify, .. } => {
                deps.push(target.as_str());
                args.iter().for_each(|a| a.dependencies(&mut deps));
                if let Some(read_back) = verify {
                    read_back.args.iter().for_each(|a| a.dependencies(&mut deps));
                    if let Expect::Address(expect) = &read_back.expect {
                        expect.dependencies(&mut deps);
                    }
                }
            }
            Self::Repoint { proxy, to, .. } => {
                deps.push(names::PROXY_ADMIN);
                deps.push(proxy.as_str());
                deps.push(to.as_str());
            }
        }
        deps.dedup();
        deps
    }
}

/// The two token families minted for every collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFamily {
    /// Ownership tokens (ORentable)
    O,
    /// Wrapped tokens (WRentable)
    W,
}

impl TokenFamily {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::O => "O",
            Self::W => "W",
        }
    }

    pub fn logic_name(&self) -> &'static str {
        match self {
            Self::O => names::O_LOGIC,
            Self::W => names::W_LOGIC,
        }
    }

    pub fn beacon_name(&self) -> &'static str {
        match self {
            Self::O => names::O_BEACON,
            Self::W => names::W_BEACON,
        }
    }

    pub fn artifact(&self) -> &'static str {
        match self {
            Self::O => artifact::ORENTABLE,
            Self::W => artifact::WRENTABLE,
        }
    }

    fn setter(&self) -> &'static str {
        match self {
            Self::O => sig::SET_ORENTABLE,
            Self::W => sig::SET_WRENTABLE,
        }
    }

    fn getter(&self) -> &'static str {
        match self {
            Self::O => sig::GET_ORENTABLE,
            Self::W => sig::GET_WRENTABLE,
        }
    }

    /// Resource name of the collection's token proxy, e.g. `OLand`
    pub fn proxy_name(&self, collection: &str) -> String {
        format!("{}{}", self.prefix(), collection)
    }
}

impl fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact())
    }
}

impl FromStr for TokenFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "o" | "orentable" => Ok(Self::O),
            "w" | "wrentable" => Ok(Self::W),
            other => Err(format!("unknown token family: {}", other)),
        }
    }
}

/// Ordered steps of a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetPlan {
    steps: Vec<Step>,
}

impl FleetPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The whole platform: proxy admin, router, token beacons, wallets,
    /// router configuration and every configured collection
    pub fn platform(config: &FleetConfig) -> Self {
        let mut plan = Self::new();
        let governance = Arg::Address(config.governance);
        let operator = Arg::Address(config.operator);

        plan.push(Step::create(names::PROXY_ADMIN, ResourceKind::Registry, artifact::PROXY_ADMIN, vec![]));

        plan.push(Step::create(
            names::RENTABLE_LOGIC,
            ResourceKind::Logic,
            artifact::RENTABLE,
            vec![governance.clone(), operator.clone()],
        ));
        // The bare logic must never be usable directly
        plan.push(
            Step::call(names::RENTABLE_LOGIC, sig::SCRAM, vec![])
                .verified_by(ReadBack::flag(sig::PAUSED, vec![], true)),
        );

        plan.push(Step::create_verified(
            names::ROUTER,
            ResourceKind::Router,
            artifact::TRANSPARENT_PROXY,
            vec![
                Arg::resource(names::RENTABLE_LOGIC),
                Arg::resource(names::PROXY_ADMIN),
                Arg::initializer(sig::INITIALIZE_ROUTER, vec![governance, operator]),
            ],
            names::RENTABLE_LOGIC,
        ));

        // Token logic is constructed against the first collection, as proxies
        // are initialized with their own collection anyway
        let sample = config
            .collections
            .first()
            .map(|c| c.address)
            .unwrap_or_else(Address::zero);
        for family in [TokenFamily::O, TokenFamily::W] {
            plan.push(Step::create(
                family.logic_name(),
                ResourceKind::Logic,
                family.artifact(),
                vec![
                    Arg::Address(sample),
                    Arg::Address(Address::zero()),
                    Arg::Address(Address::zero()),
                ],
            ));
            plan.push(Step::create_verified(
                family.beacon_name(),
                ResourceKind::Beacon,
                artifact::UPGRADEABLE_BEACON,
                vec![Arg::resource(family.logic_name())],
                family.logic_name(),
            ));
        }

        if config.wallet {
            plan.push(Step::create(
                names::SIMPLE_WALLET_LOGIC,
                ResourceKind::Logic,
                artifact::SIMPLE_WALLET,
                vec![Arg::resource(names::ROUTER), Arg::Address(Address::zero())],
            ));
            plan.push(Step::create_verified(
                names::SIMPLE_WALLET_BEACON,
                ResourceKind::Beacon,
                artifact::UPGRADEABLE_BEACON,
                vec![Arg::resource(names::SIMPLE_WALLET_LOGIC)],
                names::SIMPLE_WALLET_LOGIC,
            ));
            plan.push(Step::create(
                names::WALLET_FACTORY,
                ResourceKind::Registry,
                artifact::WALLET_FACTORY,
                vec![Arg::resource(names::SIMPLE_WALLET_BEACON)],
            ));
            plan.push(
                Step::call(names::ROUTER, sig::SET_WALLET_FACTORY, vec![Arg::resource(names::WALLET_FACTORY)])
                    .verified_by(ReadBack::new(sig::GET_WALLET_FACTORY, vec![], Arg::resource(names::WALLET_FACTORY))),
            );
        }

        for token in &config.payment_tokens {
            plan.push(
                Step::call(names::ROUTER, sig::ENABLE_PAYMENT_TOKEN, vec![Arg::Address(*token)])
                    .with_id(format!("{}.enablePaymentToken({:?})", names::ROUTER, token)),
            );
        }

        if let Some(fee_collector) = config.fee_collector {
            plan.push(
                Step::call(names::ROUTER, sig::SET_FEE_COLLECTOR, vec![Arg::Address(fee_collector)])
                    .verified_by(ReadBack::new(sig::GET_FEE_COLLECTOR, vec![], Arg::Address(fee_collector))),
            );
        }

        for collection in &config.collections {
            plan.push_collection(config.governance, collection);
        }
        plan
    }

    /// Tokenize further collections of an existing platform
    ///
    /// An empty `selected` list means every configured collection.
    pub fn collections(config: &FleetConfig, selected: &[String]) -> Result<Self> {
        let mut plan = Self::new();
        if selected.is_empty() {
            for collection in &config.collections {
                plan.push_collection(config.governance, collection);
            }
            return Ok(plan);
        }
        for name in selected {
            let collection = config
                .collection(name)
                .ok_or_else(|| FleetError::UnknownResource(format!("collection {}", name)))?;
            plan.push_collection(config.governance, collection);
        }
        Ok(plan)
    }

    /// Replace the router's wallet factory with a new one named `name`
    pub fn wallet_factory(name: &str) -> Self {
        let mut plan = Self::new();
        plan.push(Step::create(
            name,
            ResourceKind::Registry,
            artifact::WALLET_FACTORY,
            vec![Arg::resource(names::SIMPLE_WALLET_BEACON)],
        ));
        plan.push(
            Step::call(names::ROUTER, sig::SET_WALLET_FACTORY, vec![Arg::resource(name)])
                .with_id(format!("{}.setWalletFactory({})", names::ROUTER, name))
                .verified_by(ReadBack::new(sig::GET_WALLET_FACTORY, vec![], Arg::resource(name))),
        );
        plan
    }

    /// Move one collection's token proxy to a new logic behind a new beacon
    ///
    /// The logic is constructed for this collection, so its resource names
    /// carry the collection name, e.g. `OLandRegistryLandLogic`.
    pub fn beacon_upgrade(family: TokenFamily, collection: &CollectionConfig, logic_artifact: &str) -> Self {
        let mut plan = Self::new();
        let logic = format!("{}{}Logic", logic_artifact, collection.name);
        let beacon = format!("{}{}Beacon", logic_artifact, collection.name);
        let proxy = family.proxy_name(&collection.name);

        plan.push(Step::create(
            &logic,
            ResourceKind::Logic,
            logic_artifact,
            vec![
                Arg::Address(collection.address),
                Arg::Address(Address::zero()),
                Arg::Address(Address::zero()),
            ],
        ));
        plan.push(Step::create_verified(
            &beacon,
            ResourceKind::Beacon,
            artifact::UPGRADEABLE_BEACON,
            vec![Arg::resource(&logic)],
            &logic,
        ));
        plan.push(Step::Repoint {
            id: format!("{}.upgrade({},{})", names::PROXY_ADMIN, proxy, beacon),
            proxy,
            to: beacon,
        });
        plan
    }

    fn push_collection(&mut self, governance: Address, collection: &CollectionConfig) {
        for family in [TokenFamily::O, TokenFamily::W] {
            let proxy = family.proxy_name(&collection.name);
            self.push(Step::create_verified(
                &proxy,
                ResourceKind::Proxy,
                artifact::BEACON_PROXY,
                vec![
                    Arg::resource(family.beacon_name()),
                    Arg::resource(names::PROXY_ADMIN),
                    Arg::initializer(
                        sig::INITIALIZE_COLLECTION,
                        vec![
                            Arg::Address(collection.address),
                            Arg::Address(governance),
                            Arg::resource(names::ROUTER),
                        ],
                    ),
                ],
                family.beacon_name(),
            ));
            self.push(
                Step::call(
                    names::ROUTER,
                    family.setter(),
                    vec![Arg::Address(collection.address), Arg::resource(&proxy)],
                )
                .with_id(format!("{}.set{}Rentable({})", names::ROUTER, family.prefix(), collection.name))
                .verified_by(ReadBack::new(
                    family.getter(),
                    vec![Arg::Address(collection.address)],
                    Arg::resource(&proxy),
                )),
            );
        }

        let owner_token = TokenFamily::O.proxy_name(&collection.name);
        for call in &collection.proxy_calls {
            self.push(
                Step::call(
                    names::ROUTER,
                    sig::ENABLE_PROXY_CALL,
                    vec![
                        Arg::resource(&owner_token),
                        Arg::FixedBytes(call.selector.clone()),
                        Arg::Bool(call.enabled),
                    ],
                )
                .with_id(format!(
                    "{}.enableProxyCall({},0x{},{})",
                    names::ROUTER,
                    owner_token,
                    hex::encode(&call.selector),
                    call.enabled
                )),
            );
        }

        if let Some(library) = &collection.library {
            let name = format!("{}Library", collection.name);
            self.push(Step::create(&name, ResourceKind::Registry, library, vec![]));
            self.push(
                Step::call(
                    names::ROUTER,
                    sig::SET_LIBRARY,
                    vec![Arg::Address(collection.address), Arg::resource(&name)],
                )
                .with_id(format!("{}.setLibrary({})", names::ROUTER, collection.name))
                .verified_by(ReadBack::new(
                    sig::GET_LIBRARY,
                    vec![Arg::Address(collection.address)],
                    Arg::resource(&name),
                )),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ConfigManager;

    fn config() -> FleetConfig {
        ConfigManager::builder()
            .governance(Address::from_low_u64_be(0x60))
            .operator(Address::from_low_u64_be(0x0e))
            .fee_collector(Address::from_low_u64_be(0xfe))
            .collection(
                CollectionConfig::new("Land", Address::from_low_u64_be(0x1a))
                    .with_library("DecentralandCollectionLibrary")
                    .with_proxy_call([0x9d, 0x40, 0xb8, 0x50], false)
                    .with_proxy_call([0xb0, 0xb0, 0x2c, 0x60], true),
            )
            .collection(CollectionConfig::new("Meebits", Address::from_low_u64_be(0x3b)))
            .build()
    }

    /// Every dependency of every step is created by an earlier step
    #[test]
    fn test_platform_plan_is_dependency_ordered() {
        let plan = FleetPlan::platform(&config());
        let mut created: Vec<&str> = Vec::new();
        for step in plan.steps() {
            for dep in step.dependencies() {
                assert!(created.contains(&dep), "{} needs {} first", step.label(), dep);
            }
            if let Step::Create { name, .. } = step {
                created.push(name);
            }
        }
        assert_eq!(created[0], names::PROXY_ADMIN);
        assert!(created.contains(&"OLand"));
        assert!(created.contains(&"WMeebits"));
        assert!(created.contains(&"LandLibrary"));
    }

    #[test]
    fn test_call_ids_are_unique() {
        let plan = FleetPlan::platform(&config());
        let mut ids: Vec<&str> = plan
            .steps()
            .iter()
            .filter(|s| matches!(s, Step::Call { .. }))
            .map(|s| s.label())
            .collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert!(ids.contains(&"Rentable.setORentable(Land)"));
        assert!(ids.contains(&"RentableLogic.SCRAM"));
        assert!(ids.contains(&"Rentable.enableProxyCall(OLand,0x9d40b850,false)"));
        assert!(ids.contains(&"Rentable.enableProxyCall(OLand,0xb0b02c60,true)"));
    }

    #[test]
    fn test_scram_is_checked_through_paused() {
        let plan = FleetPlan::platform(&config());
        let scram = plan
            .steps()
            .iter()
            .find(|s| s.label() == "RentableLogic.SCRAM")
            .unwrap();
        match scram {
            Step::Call { verify: Some(read_back), .. } => {
                assert_eq!(read_back.signature, sig::PAUSED);
                assert_eq!(read_back.expect, Expect::Flag(true));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_proxy_calls_follow_collection_registration() {
        let plan = FleetPlan::collections(&config(), &["Land".to_string()]).unwrap();
        let labels: Vec<&str> = plan.steps().iter().map(|s| s.label()).collect();
        let registered = labels.iter().position(|l| *l == "Rentable.setWRentable(Land)").unwrap();
        let disabled = labels
            .iter()
            .position(|l| *l == "Rentable.enableProxyCall(OLand,0x9d40b850,false)")
            .unwrap();
        assert!(disabled > registered);

        match &plan.steps()[disabled] {
            Step::Call { args, .. } => {
                assert_eq!(args[0], Arg::resource("OLand"));
                assert_eq!(args[1], Arg::FixedBytes(vec![0x9d, 0x40, 0xb8, 0x50].into()));
                assert_eq!(args[2], Arg::Bool(false));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_wallet_factory_replacement_plan() {
        let plan = FleetPlan::wallet_factory("WalletFactory2");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].label(), "WalletFactory2");
        assert_eq!(plan.steps()[1].label(), "Rentable.setWalletFactory(WalletFactory2)");
        assert_eq!(
            plan.steps()[0].dependencies(),
            vec![names::SIMPLE_WALLET_BEACON]
        );
    }

    #[test]
    fn test_collection_plan_rejects_unknown_names() {
        let err = FleetPlan::collections(&config(), &["Punks".to_string()]).unwrap_err();
        assert!(matches!(err, FleetError::UnknownResource(_)));

        let plan = FleetPlan::collections(&config(), &["Meebits".to_string()]).unwrap();
        // O and W proxies, each with its registration
        assert_eq!(plan.len(), 4);

        // Land adds its library with registration and two proxy calls
        let plan = FleetPlan::collections(&config(), &["Land".to_string()]).unwrap();
        assert_eq!(plan.len(), 8);
    }

    #[test]
    fn test_beacon_upgrade_repoints_collection_proxy() {
        let land = CollectionConfig::new("Land", Address::from_low_u64_be(0x1a));
        let plan = FleetPlan::beacon_upgrade(TokenFamily::O, &land, "OLandRegistry");
        assert_eq!(plan.steps()[0].label(), "OLandRegistryLandLogic");
        match &plan.steps()[2] {
            Step::Repoint { proxy, to, .. } => {
                assert_eq!(proxy, "OLand");
                assert_eq!(to, "OLandRegistryLandBeacon");
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!("w".parse::<TokenFamily>(), Ok(TokenFamily::W));
    }
}
