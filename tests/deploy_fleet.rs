use ethers::abi::Token;
use ethers::types::{Address, U256};

use rentable_deploy::api::{CollectionConfig, ConfigManager, FleetConfig, FleetOperator};
use rentable_deploy::deployer::{ArtifactSet, Deployer, FleetPlan, TokenFamily};
use rentable_deploy::ethereum::abi::{encode_call, selector, signatures};
use rentable_deploy::gas::GasLedger;
use rentable_deploy::ledger::{Fault, LedgerClient, MemoryLedger};
use rentable_deploy::registry::{names, Deployment, ManifestStore};
use rentable_deploy::{FleetError, ResourceKind};
use common::utils::address_from_word;

const CHAIN_ID: u64 = 1337;
const LIBRARY: &str = "DecentralandCollectionLibrary";

fn deployer() -> Address {
    Address::from_low_u64_be(0xd0)
}

fn land() -> Address {
    Address::from_low_u64_be(0x1a)
}

// Helper function to create a fleet configuration governed by the deployer
fn fleet_config() -> FleetConfig {
    ConfigManager::builder()
        .governance(deployer())
        .operator(deployer())
        .fee_collector(Address::from_low_u64_be(0xfe))
        .collection(CollectionConfig::new("Land", land()).with_library(LIBRARY))
        .collection(CollectionConfig::new("Meebits", Address::from_low_u64_be(0x3b)))
        .build()
}

// Helper function to create artifacts for every contract the fleet uses
fn artifacts() -> ArtifactSet {
    let mut artifacts = ArtifactSet::simulated();
    artifacts.simulate(LIBRARY);
    artifacts.simulate("OLandRegistry");
    artifacts
}

// Helper function to read an address through the simulated ledger
fn read(ledger: &MemoryLedger, target: Address, signature: &str, args: &[Token]) -> Address {
    let data = ledger.call(target, &encode_call(signature, args)).unwrap();
    address_from_word(&data).unwrap()
}

#[test]
fn test_platform_deploys_in_dependency_order() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let mut gas = GasLedger::new();

    let deployment = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&FleetPlan::platform(&fleet_config()), None)
        .unwrap();

    let position = |name: &str| {
        deployment
            .resources()
            .iter()
            .position(|r| r.name == name)
            .unwrap_or_else(|| panic!("{} was not deployed", name))
    };
    assert_eq!(position(names::PROXY_ADMIN), 0);
    assert!(position(names::RENTABLE_LOGIC) < position(names::ROUTER));
    assert!(position(names::O_BEACON) < position("OLand"));
    assert!(position(names::W_BEACON) < position("WMeebits"));
    assert!(position(names::SIMPLE_WALLET_BEACON) < position(names::WALLET_FACTORY));

    // Every transaction sent is accounted for
    assert_eq!(gas.len(), ledger.transactions().len());
    assert!(ledger.transactions().iter().all(|tx| tx.success));

    let router = deployment.router().unwrap().address();
    let oland = deployment.require("OLand").unwrap();
    assert_eq!(read(&ledger, router, signatures::GET_ORENTABLE, &[Token::Address(land())]), oland.address);
    assert_eq!(
        read(&ledger, router, signatures::GET_LIBRARY, &[Token::Address(land())]),
        deployment.require("LandLibrary").unwrap().address
    );
    assert_eq!(oland.implementation, Some(deployment.require(names::O_LOGIC).unwrap().address));
    assert!(ledger.contract(deployment.require(names::RENTABLE_LOGIC).unwrap().address).unwrap().scrammed);
}

#[test]
fn test_second_run_attaches_without_submitting() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let plan = FleetPlan::platform(&fleet_config());

    let mut gas = GasLedger::new();
    let first = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, None)
        .unwrap();
    let sent = ledger.transactions().len();

    let mut gas = GasLedger::new();
    let second = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, Some(first.clone()))
        .unwrap();

    assert_eq!(ledger.transactions().len(), sent);
    assert!(gas.is_empty());
    assert_eq!(second, first);
}

#[test]
fn test_misreported_router_stops_the_run() {
    let artifacts = artifacts();
    let bogus = Address::from_low_u64_be(0xbad);
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts)
        .with_fault(Fault::MisreportImplementation(bogus));
    let mut gas = GasLedger::new();

    let err = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&FleetPlan::platform(&fleet_config()), None)
        .unwrap_err();

    match err {
        FleetError::VerificationFailure { resource, expected, actual, .. } => {
            assert_eq!(resource, names::ROUTER);
            assert_eq!(actual, bogus);
            assert_ne!(expected, bogus);
        }
        other => panic!("unexpected error {:?}", other),
    }
    // ProxyAdmin, RentableLogic and the router itself; nothing after it
    assert_eq!(ledger.creations().len(), 3);
}

#[test]
fn test_resume_after_dropped_submission() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::new(dir.path().join("development.json"));
    let artifacts = artifacts();
    let plan = FleetPlan::platform(&fleet_config());

    // The fifth submission (OLogic) never lands
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts)
        .with_fault(Fault::DropSubmission(5));
    let err = FleetOperator::new(&mut ledger, U256::from(10))
        .deploy(&plan, &artifacts, Some(&store))
        .unwrap_err();
    assert!(err
        .downcast_ref::<FleetError>()
        .map(FleetError::halts_run)
        .unwrap_or(false));

    let partial = store.load().unwrap().unwrap();
    assert_eq!(partial.len(), 3);
    assert!(partial.contains(names::ROUTER));
    assert!(partial.is_completed("RentableLogic.SCRAM"));

    ledger.set_fault(None);
    let (deployment, report) = FleetOperator::new(&mut ledger, U256::from(10))
        .deploy(&plan, &artifacts, Some(&store))
        .unwrap();

    // No resource was created twice
    assert_eq!(ledger.creations().len(), deployment.len());
    assert_eq!(report.resources.len(), deployment.len());
    assert_eq!(store.load().unwrap().unwrap(), deployment);
}

#[test]
fn test_extension_requires_platform() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let mut gas = GasLedger::new();

    let plan = FleetPlan::collections(&fleet_config(), &["Meebits".to_string()]).unwrap();
    let err = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, None)
        .unwrap_err();

    assert!(matches!(err, FleetError::MissingDependency { .. }));
    assert!(ledger.transactions().is_empty());
}

#[test]
fn test_beacon_upgrade_repoints_collection() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let config = fleet_config();

    let mut gas = GasLedger::new();
    let platform = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&FleetPlan::platform(&config), None)
        .unwrap();

    let land_config = config.collection("Land").unwrap();
    let upgrade = FleetPlan::beacon_upgrade(TokenFamily::O, land_config, "OLandRegistry");
    let mut gas = GasLedger::new();
    let upgraded = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&upgrade, Some(platform))
        .unwrap();

    let new_logic = upgraded.require("OLandRegistryLandLogic").unwrap().address;
    let oland = upgraded.require("OLand").unwrap();
    assert_eq!(oland.kind, ResourceKind::Proxy);
    assert_eq!(oland.implementation, Some(new_logic));

    let admin = upgraded.proxy_admin().unwrap().address();
    assert_eq!(
        read(&ledger, admin, signatures::GET_PROXY_IMPLEMENTATION, &[Token::Address(oland.address)]),
        new_logic
    );
    // WLand still follows the shared beacon
    assert_eq!(
        upgraded.require("WLand").unwrap().implementation,
        Some(upgraded.require(names::W_LOGIC).unwrap().address)
    );

    // Re-running the upgrade is a no-op
    let sent = ledger.transactions().len();
    let mut gas = GasLedger::new();
    Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&upgrade, Some(upgraded))
        .unwrap();
    assert_eq!(ledger.transactions().len(), sent);
}

#[test]
fn test_resume_does_not_repeat_a_landed_scram() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let plan = FleetPlan::platform(&fleet_config());

    let mut gas = GasLedger::new();
    let full = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, None)
        .unwrap();

    // The halt landed but its receipt was lost, so the manifest never recorded it
    let mut lost = Deployment::new(full.network_id);
    for name in [names::PROXY_ADMIN, names::RENTABLE_LOGIC] {
        lost.insert(full.require(name).unwrap().clone()).unwrap();
    }
    assert!(!lost.is_completed("RentableLogic.SCRAM"));

    let mut gas = GasLedger::new();
    let resumed = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, Some(lost))
        .unwrap();

    let scram = selector(signatures::SCRAM);
    let halts = ledger
        .transactions()
        .iter()
        .filter(|tx| tx.selector == Some(scram))
        .count();
    assert_eq!(halts, 1);
    assert!(resumed.is_completed("RentableLogic.SCRAM"));
    assert!(ledger.transactions().iter().all(|tx| tx.success));
}

#[test]
fn test_proxy_calls_are_applied_once() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let config = ConfigManager::builder()
        .governance(deployer())
        .operator(deployer())
        .collection(
            CollectionConfig::new("Land", land())
                .with_proxy_call([0x9d, 0x40, 0xb8, 0x50], false)
                .with_proxy_call([0xb0, 0xb0, 0x2c, 0x60], true),
        )
        .build();
    let plan = FleetPlan::platform(&config);

    let mut gas = GasLedger::new();
    let deployment = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, None)
        .unwrap();

    let router = ledger.contract(deployment.router().unwrap().address()).unwrap();
    let oland = deployment.require("OLand").unwrap().address;
    assert_eq!(router.proxy_call_enabled(oland, [0x9d, 0x40, 0xb8, 0x50]), Some(false));
    assert_eq!(router.proxy_call_enabled(oland, [0xb0, 0xb0, 0x2c, 0x60]), Some(true));
    assert!(deployment.is_completed("Rentable.enableProxyCall(OLand,0xb0b02c60,true)"));

    let sent = ledger.transactions().len();
    let mut gas = GasLedger::new();
    Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&plan, Some(deployment))
        .unwrap();
    assert_eq!(ledger.transactions().len(), sent);
}

#[test]
fn test_wallet_factory_is_replaced() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);

    let mut gas = GasLedger::new();
    let platform = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&FleetPlan::platform(&fleet_config()), None)
        .unwrap();
    let previous = platform.require(names::WALLET_FACTORY).unwrap().address;

    let replacement = FleetPlan::wallet_factory("WalletFactoryV2");
    let mut gas = GasLedger::new();
    let replaced = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&replacement, Some(platform))
        .unwrap();

    let factory = replaced.require("WalletFactoryV2").unwrap();
    assert_eq!(factory.kind, ResourceKind::Registry);
    assert_ne!(factory.address, previous);
    let router = replaced.router().unwrap().address();
    assert_eq!(read(&ledger, router, signatures::GET_WALLET_FACTORY, &[]), factory.address);
    // The old factory stays on record
    assert!(replaced.contains(names::WALLET_FACTORY));
    assert_eq!(gas.len(), 2);

    let sent = ledger.transactions().len();
    let mut gas = GasLedger::new();
    Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&replacement, Some(replaced))
        .unwrap();
    assert_eq!(ledger.transactions().len(), sent);
}

#[test]
fn test_upgrading_two_collections_builds_logic_for_each() {
    let artifacts = artifacts();
    let mut ledger = MemoryLedger::for_artifacts(CHAIN_ID, deployer(), &artifacts);
    let config = fleet_config();

    let mut gas = GasLedger::new();
    let mut deployment = Deployer::new(&mut ledger, &mut gas, &artifacts)
        .deploy_fleet(&FleetPlan::platform(&config), None)
        .unwrap();

    for name in ["Land", "Meebits"] {
        let upgrade = FleetPlan::beacon_upgrade(TokenFamily::O, config.collection(name).unwrap(), "OLandRegistry");
        let mut gas = GasLedger::new();
        deployment = Deployer::new(&mut ledger, &mut gas, &artifacts)
            .deploy_fleet(&upgrade, Some(deployment))
            .unwrap();
    }

    let land_logic = deployment.require("OLandRegistryLandLogic").unwrap().address;
    let meebits_logic = deployment.require("OLandRegistryMeebitsLogic").unwrap().address;
    assert_ne!(land_logic, meebits_logic);
    assert_eq!(deployment.require("OLand").unwrap().implementation, Some(land_logic));
    assert_eq!(deployment.require("OMeebits").unwrap().implementation, Some(meebits_logic));
}
