// Simulated ledger
//
// An in-process ledger that understands the handful of contracts the fleet is
// made of: the proxy admin, upgradeable beacons, immutable-admin transparent
// and beacon proxies, the router and its collection tokens, plus two-step
// ownable and adminable contracts. Creation code is
// matched against registered templates, so any `ArtifactSet` can be replayed
// against it. Used by the test-suite and by the CLI rehearsal mode.

use super::{LedgerClient, LedgerError, Receipt};
use crate::deployer::artifacts::{names, ArtifactSet};
use crate::ethereum::abi::{decode_args, selector, signatures as sig, split_call};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{get_contract_address, keccak256};
use log::debug;
use std::collections::{BTreeSet, HashMap};

const CREATE_GAS: u64 = 1_200_000;
const CALL_GAS: u64 = 45_000;

/// Behavior a piece of creation code is simulated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    ProxyAdmin,
    Beacon,
    TransparentProxy,
    BeaconProxy,
    /// Rentable logic: governed, holds the collection registry
    Router,
    /// ORentable / WRentable logic
    Collection,
    /// Any other ownable contract
    Ownable,
    /// Ownable whose transfers wait for `acceptOwnership`
    Ownable2Step,
    /// Controlled by `admin()`; transfers via `_setPendingAdmin` / `_acceptAdmin`
    Adminable,
}

impl Template {
    /// Template used for an artifact of the given name
    pub fn for_artifact(name: &str) -> Self {
        match name {
            names::PROXY_ADMIN => Self::ProxyAdmin,
            names::UPGRADEABLE_BEACON => Self::Beacon,
            names::TRANSPARENT_PROXY => Self::TransparentProxy,
            names::BEACON_PROXY => Self::BeaconProxy,
            names::RENTABLE => Self::Router,
            names::ORENTABLE | names::WRENTABLE => Self::Collection,
            _ => Self::Ownable,
        }
    }

    fn is_proxy(&self) -> bool {
        matches!(self, Self::TransparentProxy | Self::BeaconProxy)
    }
}

/// Injected misbehavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The n-th submission after installing the fault is never included
    DropSubmission(usize),
    /// Implementation reads report this address instead of the real one
    MisreportImplementation(Address),
}

/// State of one simulated contract
#[derive(Debug, Clone)]
pub struct SimContract {
    pub template: Template,
    pub owner: Address,
    pub pending_owner: Address,
    pub governance: Address,
    pub pending_governance: Address,
    pub admin: Address,
    pub pending_admin: Address,
    /// Beacon target, or transparent proxy logic
    pub implementation: Address,
    /// Beacon of a beacon proxy
    pub beacon: Address,
    /// Admin of a proxy; fixed at construction
    pub proxy_admin: Address,
    pub initialized: bool,
    pub scrammed: bool,
    settings: HashMap<&'static str, Address>,
    lookups: HashMap<(&'static str, Address), Address>,
    payment_tokens: BTreeSet<Address>,
    proxy_calls: HashMap<(Address, [u8; 4]), bool>,
}

impl SimContract {
    fn new(template: Template) -> Self {
        Self {
            template,
            owner: Address::zero(),
            pending_owner: Address::zero(),
            governance: Address::zero(),
            pending_governance: Address::zero(),
            admin: Address::zero(),
            pending_admin: Address::zero(),
            implementation: Address::zero(),
            beacon: Address::zero(),
            proxy_admin: Address::zero(),
            initialized: false,
            scrammed: false,
            settings: HashMap::new(),
            lookups: HashMap::new(),
            payment_tokens: BTreeSet::new(),
            proxy_calls: HashMap::new(),
        }
    }

    pub fn payment_tokens(&self) -> &BTreeSet<Address> {
        &self.payment_tokens
    }

    /// Proxy call flag set for `selector` on `collection`, if any
    pub fn proxy_call_enabled(&self, collection: Address, selector: [u8; 4]) -> Option<bool> {
        self.proxy_calls.get(&(collection, selector)).copied()
    }

    fn only_owner(&self, from: Address) -> Result<(), String> {
        if self.owner != from || from.is_zero() {
            return Err("Ownable: caller is not the owner".to_string());
        }
        Ok(())
    }

    fn only_governance(&self, from: Address) -> Result<(), String> {
        if self.governance != from || from.is_zero() {
            return Err("caller is not governance".to_string());
        }
        if self.scrammed {
            return Err("contract is halted".to_string());
        }
        Ok(())
    }

    fn initialize(&mut self, data: &[u8]) -> Result<(), String> {
        if self.initialized {
            return Err("Initializable: contract is already initialized".to_string());
        }
        let (sel, args) = split_call(data).ok_or("malformed initializer")?;
        if sel == selector(sig::INITIALIZE_ROUTER) {
            let tokens = decode_args(&[ParamType::Address, ParamType::Address], args)?;
            self.governance = token_address(&tokens, 0)?;
            self.settings.insert("operator", token_address(&tokens, 1)?);
        } else if sel == selector(sig::INITIALIZE_COLLECTION) {
            let tokens = decode_args(&[ParamType::Address, ParamType::Address, ParamType::Address], args)?;
            self.settings.insert("collection", token_address(&tokens, 0)?);
            self.owner = token_address(&tokens, 1)?;
            self.settings.insert("router", token_address(&tokens, 2)?);
        } else {
            return Err("unknown initializer".to_string());
        }
        self.initialized = true;
        Ok(())
    }
}

/// Record of one simulated transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTransaction {
    pub from: Address,
    pub to: Option<Address>,
    /// Template of the contract created, for successful creations
    pub template: Option<Template>,
    pub created: Option<Address>,
    pub selector: Option<[u8; 4]>,
    pub success: bool,
    pub error: Option<String>,
}

impl SimTransaction {
    pub fn is_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// In-memory ledger
pub struct MemoryLedger {
    chain_id: u64,
    sender: Address,
    nonces: HashMap<Address, u64>,
    templates: Vec<(Bytes, Template)>,
    contracts: HashMap<Address, SimContract>,
    transactions: Vec<SimTransaction>,
    fault: Option<Fault>,
    submissions_since_fault: usize,
}

impl MemoryLedger {
    /// Empty ledger submitting as `sender`
    pub fn new(chain_id: u64, sender: Address) -> Self {
        Self {
            chain_id,
            sender,
            nonces: HashMap::new(),
            templates: Vec::new(),
            contracts: HashMap::new(),
            transactions: Vec::new(),
            fault: None,
            submissions_since_fault: 0,
        }
    }

    /// Ledger that recognises the creation code of every artifact in the set
    pub fn for_artifacts(chain_id: u64, sender: Address, artifacts: &ArtifactSet) -> Self {
        let mut ledger = Self::new(chain_id, sender);
        for (name, code) in artifacts.iter() {
            ledger.register_template(code.clone(), Template::for_artifact(name));
        }
        ledger
    }

    /// Simulate `creation_code` as `template`, replacing any earlier registration
    pub fn register_template(&mut self, creation_code: Bytes, template: Template) {
        match self.templates.iter_mut().find(|(code, _)| *code == creation_code) {
            Some(entry) => entry.1 = template,
            None => self.templates.push((creation_code, template)),
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.set_fault(Some(fault));
        self
    }

    pub fn set_fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
        self.submissions_since_fault = 0;
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn contract(&self, address: Address) -> Option<&SimContract> {
        self.contracts.get(&address)
    }

    pub fn transactions(&self) -> &[SimTransaction] {
        &self.transactions
    }

    /// Successful contract creations, in order
    pub fn creations(&self) -> Vec<&SimTransaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.is_creation() && tx.success)
            .collect()
    }

    /// Submit on behalf of another account, e.g. a new governor accepting
    pub fn submit_as(&mut self, from: Address, to: Option<Address>, payload: Bytes) -> Receipt {
        self.execute(from, to, &payload)
    }

    fn next_nonce(&mut self, account: Address) -> u64 {
        let nonce = self.nonces.entry(account).or_insert(0);
        let current = *nonce;
        *nonce += 1;
        current
    }

    fn execute(&mut self, from: Address, to: Option<Address>, payload: &[u8]) -> Receipt {
        let nonce = self.next_nonce(from);
        let mut preimage = from.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = H256::from(keccak256(preimage));

        let outcome = match to {
            None => self
                .create(from, nonce, payload)
                .map(|(address, template)| (Some(address), Some(template))),
            Some(target) => self.invoke(from, target, payload).map(|_| (None, None)),
        };
        let (success, created, template, error) = match outcome {
            Ok((created, template)) => (true, created, template, None),
            Err(reason) => {
                debug!("simulated transaction reverted: {}", reason);
                (false, None, None, Some(reason))
            }
        };

        let base = if to.is_none() { CREATE_GAS } else { CALL_GAS };
        self.transactions.push(SimTransaction {
            from,
            to,
            template,
            created,
            selector: to.and_then(|_| split_call(payload).map(|(sel, _)| sel)),
            success,
            error,
        });

        Receipt {
            tx_hash,
            included: true,
            success,
            gas_used: U256::from(base + 16 * payload.len() as u64),
            contract_address: created,
            return_data: Bytes::new(),
        }
    }

    fn require_code(&self, address: Address, reason: &str) -> Result<&SimContract, String> {
        self.contracts.get(&address).ok_or_else(|| reason.to_string())
    }

    fn create(&mut self, from: Address, nonce: u64, payload: &[u8]) -> Result<(Address, Template), String> {
        let (code_len, template) = self
            .templates
            .iter()
            .find(|(code, _)| !code.is_empty() && payload.starts_with(code))
            .map(|(code, template)| (code.len(), *template))
            .ok_or("unknown creation code")?;
        let args = &payload[code_len..];
        let mut contract = SimContract::new(template);

        match template {
            Template::ProxyAdmin | Template::Ownable | Template::Ownable2Step | Template::Collection => {
                contract.owner = from
            }
            Template::Adminable => contract.admin = from,
            Template::Beacon => {
                let tokens = decode_args(&[ParamType::Address], args)?;
                let logic = token_address(&tokens, 0)?;
                self.require_code(logic, "UpgradeableBeacon: implementation is not a contract")?;
                contract.owner = from;
                contract.implementation = logic;
            }
            Template::TransparentProxy => {
                let tokens = decode_args(&[ParamType::Address, ParamType::Address, ParamType::Bytes], args)?;
                let logic = token_address(&tokens, 0)?;
                self.require_code(logic, "ERC1967: new implementation is not a contract")?;
                contract.implementation = logic;
                contract.proxy_admin = token_address(&tokens, 1)?;
                let data = token_bytes(&tokens, 2)?;
                if !data.is_empty() {
                    contract.initialize(&data)?;
                }
            }
            Template::BeaconProxy => {
                let tokens = decode_args(&[ParamType::Address, ParamType::Address, ParamType::Bytes], args)?;
                let beacon = token_address(&tokens, 0)?;
                let target = self.require_code(beacon, "ERC1967: new beacon is not a contract")?;
                if target.template != Template::Beacon {
                    return Err("ERC1967: beacon implementation is not a contract".to_string());
                }
                contract.beacon = beacon;
                contract.proxy_admin = token_address(&tokens, 1)?;
                let data = token_bytes(&tokens, 2)?;
                if !data.is_empty() {
                    contract.initialize(&data)?;
                }
            }
            Template::Router => {
                let tokens = decode_args(&[ParamType::Address, ParamType::Address], args)?;
                contract.governance = token_address(&tokens, 0)?;
            }
        }

        let address = get_contract_address(from, nonce);
        self.contracts.insert(address, contract);
        Ok((address, template))
    }

    /// A proxy managed by the proxy admin at `admin`
    fn managed_proxy(&self, admin: Address, proxy: Address) -> Result<&SimContract, String> {
        let contract = self.contracts.get(&proxy).ok_or("proxy does not exist")?;
        if !contract.template.is_proxy() || contract.proxy_admin != admin {
            return Err("ProxyAdmin: not the admin of this proxy".to_string());
        }
        Ok(contract)
    }

    fn invoke(&mut self, from: Address, target: Address, data: &[u8]) -> Result<(), String> {
        let (sel, args) = split_call(data).ok_or("missing function selector")?;
        let mut contract = self
            .contracts
            .get(&target)
            .cloned()
            .ok_or("call to an address without code")?;

        if sel == selector(sig::TRANSFER_OWNERSHIP) {
            contract.only_owner(from)?;
            let new_owner = single_address(args)?;
            if new_owner.is_zero() {
                return Err("Ownable: new owner is the zero address".to_string());
            }
            if contract.template == Template::Ownable2Step {
                contract.pending_owner = new_owner;
            } else {
                contract.owner = new_owner;
            }
        } else if sel == selector(sig::RENOUNCE_OWNERSHIP) {
            contract.only_owner(from)?;
            contract.owner = Address::zero();
        } else if sel == selector(sig::ACCEPT_OWNERSHIP) {
            if contract.pending_owner != from || from.is_zero() {
                return Err("caller is not the new owner".to_string());
            }
            contract.owner = from;
            contract.pending_owner = Address::zero();
        } else if sel == selector(sig::SET_GOVERNANCE) {
            contract.only_governance(from)?;
            contract.pending_governance = single_address(args)?;
        } else if sel == selector(sig::ACCEPT_GOVERNANCE) {
            if contract.pending_governance != from || from.is_zero() {
                return Err("caller is not the proposed governance".to_string());
            }
            contract.governance = from;
            contract.pending_governance = Address::zero();
        } else if sel == selector(sig::SET_PENDING_ADMIN) {
            if contract.admin != from || from.is_zero() {
                return Err("caller is not the admin".to_string());
            }
            contract.pending_admin = single_address(args)?;
        } else if sel == selector(sig::ACCEPT_ADMIN) {
            if contract.pending_admin != from || from.is_zero() {
                return Err("caller is not the pending admin".to_string());
            }
            contract.admin = from;
            contract.pending_admin = Address::zero();
        } else if sel == selector(sig::UPGRADE_TO) {
            if contract.template != Template::Beacon {
                return Err("function selector was not recognized".to_string());
            }
            contract.only_owner(from)?;
            let logic = single_address(args)?;
            self.require_code(logic, "UpgradeableBeacon: implementation is not a contract")?;
            contract.implementation = logic;
        } else if sel == selector(sig::UPGRADE) {
            if contract.template != Template::ProxyAdmin {
                return Err("function selector was not recognized".to_string());
            }
            contract.only_owner(from)?;
            let tokens = decode_args(&[ParamType::Address, ParamType::Address], args)?;
            let proxy = token_address(&tokens, 0)?;
            let destination = token_address(&tokens, 1)?;
            let mut managed = self.managed_proxy(target, proxy)?.clone();
            let destination_template = self
                .require_code(destination, "ERC1967: new implementation is not a contract")?
                .template;
            match managed.template {
                Template::BeaconProxy if destination_template == Template::Beacon => managed.beacon = destination,
                Template::BeaconProxy => return Err("ERC1967: new beacon is not a beacon".to_string()),
                _ => managed.implementation = destination,
            }
            self.contracts.insert(proxy, managed);
        } else if sel == selector(sig::CHANGE_PROXY_ADMIN) {
            if contract.template != Template::ProxyAdmin {
                return Err("function selector was not recognized".to_string());
            }
            contract.only_owner(from)?;
            let tokens = decode_args(&[ParamType::Address, ParamType::Address], args)?;
            self.managed_proxy(target, token_address(&tokens, 0)?)?;
            return Err("ImmutableAdmin: admin cannot be changed".to_string());
        } else if sel == selector(sig::SCRAM) {
            contract.only_governance(from)?;
            contract.scrammed = true;
        } else if sel == selector(sig::ENABLE_PROXY_CALL) {
            contract.only_governance(from)?;
            let tokens = decode_args(&[ParamType::Address, ParamType::FixedBytes(4), ParamType::Bool], args)?;
            let collection = token_address(&tokens, 0)?;
            let call = match tokens.get(1) {
                Some(Token::FixedBytes(bytes)) if bytes.len() == 4 => [bytes[0], bytes[1], bytes[2], bytes[3]],
                _ => return Err("argument 1 is not a bytes4".to_string()),
            };
            let enabled = match tokens.get(2) {
                Some(Token::Bool(enabled)) => *enabled,
                _ => return Err("argument 2 is not a bool".to_string()),
            };
            contract.proxy_calls.insert((collection, call), enabled);
        } else if let Some(key) = lookup_setter(sel) {
            contract.only_governance(from)?;
            let tokens = decode_args(&[ParamType::Address, ParamType::Address], args)?;
            let collection = token_address(&tokens, 0)?;
            let registered = contract.lookups.get(&(key, collection)).copied().unwrap_or_default();
            if !registered.is_zero() {
                return Err("collection already registered".to_string());
            }
            contract.lookups.insert((key, collection), token_address(&tokens, 1)?);
        } else if let Some(key) = setting_setter(sel) {
            contract.only_governance(from)?;
            contract.settings.insert(key, single_address(args)?);
        } else if sel == selector(sig::ENABLE_PAYMENT_TOKEN) {
            contract.only_governance(from)?;
            contract.payment_tokens.insert(single_address(args)?);
        } else {
            return Err("function selector was not recognized".to_string());
        }

        self.contracts.insert(target, contract);
        Ok(())
    }

    fn view(&self, target: Address, data: &[u8]) -> Result<Token, String> {
        let (sel, args) = split_call(data).ok_or("missing function selector")?;
        let contract = self.contracts.get(&target).ok_or("call to an address without code")?;
        let misreport = match self.fault {
            Some(Fault::MisreportImplementation(address)) => Some(address),
            _ => None,
        };

        if sel == selector(sig::PAUSED) {
            return Ok(Token::Bool(contract.scrammed));
        }
        let value = if sel == selector(sig::OWNER) {
            contract.owner
        } else if sel == selector(sig::PENDING_OWNER) {
            contract.pending_owner
        } else if sel == selector(sig::GET_GOVERNANCE) {
            contract.governance
        } else if sel == selector(sig::GET_PENDING_GOVERNANCE) {
            contract.pending_governance
        } else if sel == selector(sig::ADMIN) {
            contract.admin
        } else if sel == selector(sig::PENDING_ADMIN) {
            contract.pending_admin
        } else if sel == selector(sig::IMPLEMENTATION) && contract.template == Template::Beacon {
            misreport.unwrap_or(contract.implementation)
        } else if sel == selector(sig::GET_PROXY_IMPLEMENTATION) && contract.template == Template::ProxyAdmin {
            let proxy = self.managed_proxy(target, single_address(args)?)?;
            let actual = match proxy.template {
                Template::BeaconProxy => self
                    .contracts
                    .get(&proxy.beacon)
                    .map(|beacon| beacon.implementation)
                    .unwrap_or_default(),
                _ => proxy.implementation,
            };
            misreport.unwrap_or(actual)
        } else if sel == selector(sig::GET_PROXY_ADMIN) && contract.template == Template::ProxyAdmin {
            self.managed_proxy(target, single_address(args)?)?.proxy_admin
        } else if let Some(key) = lookup_getter(sel) {
            let collection = single_address(args)?;
            contract.lookups.get(&(key, collection)).copied().unwrap_or_default()
        } else if let Some(key) = setting_getter(sel) {
            contract.settings.get(key).copied().unwrap_or_default()
        } else {
            return Err("function selector was not recognized".to_string());
        };
        Ok(Token::Address(value))
    }
}

impl LedgerClient for MemoryLedger {
    fn network_id(&self) -> u64 {
        self.chain_id
    }

    fn submit(&mut self, to: Option<Address>, payload: Bytes, _value: U256) -> Result<Receipt, LedgerError> {
        if let Some(Fault::DropSubmission(n)) = self.fault {
            self.submissions_since_fault += 1;
            if self.submissions_since_fault == n {
                return Err(LedgerError::NotIncluded("dropped by the simulated node".to_string()));
            }
        }
        let from = self.sender;
        Ok(self.execute(from, to, &payload))
    }

    fn call(&self, to: Address, payload: &Bytes) -> Result<Bytes, LedgerError> {
        self.view(to, payload)
            .map(|value| Bytes::from(abi::encode(&[value])))
            .map_err(LedgerError::Reverted)
    }
}

fn lookup_setter(sel: [u8; 4]) -> Option<&'static str> {
    if sel == selector(sig::SET_ORENTABLE) {
        Some("orentable")
    } else if sel == selector(sig::SET_WRENTABLE) {
        Some("wrentable")
    } else if sel == selector(sig::SET_LIBRARY) {
        Some("library")
    } else {
        None
    }
}

fn lookup_getter(sel: [u8; 4]) -> Option<&'static str> {
    if sel == selector(sig::GET_ORENTABLE) {
        Some("orentable")
    } else if sel == selector(sig::GET_WRENTABLE) {
        Some("wrentable")
    } else if sel == selector(sig::GET_LIBRARY) {
        Some("library")
    } else {
        None
    }
}

fn setting_setter(sel: [u8; 4]) -> Option<&'static str> {
    if sel == selector(sig::SET_WALLET_FACTORY) {
        Some("wallet_factory")
    } else if sel == selector(sig::SET_FEE_COLLECTOR) {
        Some("fee_collector")
    } else {
        None
    }
}

fn setting_getter(sel: [u8; 4]) -> Option<&'static str> {
    if sel == selector(sig::GET_WALLET_FACTORY) {
        Some("wallet_factory")
    } else if sel == selector(sig::GET_FEE_COLLECTOR) {
        Some("fee_collector")
    } else {
        None
    }
}

fn single_address(args: &[u8]) -> Result<Address, String> {
    let tokens = decode_args(&[ParamType::Address], args)?;
    token_address(&tokens, 0)
}

fn token_address(tokens: &[Token], index: usize) -> Result<Address, String> {
    match tokens.get(index) {
        Some(Token::Address(address)) => Ok(*address),
        _ => Err(format!("argument {} is not an address", index)),
    }
}

fn token_bytes(tokens: &[Token], index: usize) -> Result<Vec<u8>, String> {
    match tokens.get(index) {
        Some(Token::Bytes(bytes)) => Ok(bytes.clone()),
        _ => Err(format!("argument {} is not bytes", index)),
    }
}
