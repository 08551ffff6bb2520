// Function signatures and ABI helpers
//
// Every call the deployer and the auditor make is described by its canonical
// Solidity signature; the selector is derived from it at call time.

use common::utils::address_from_word;
use common::{FleetError, Result};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes};
use ethers::utils::id;

/// Canonical signatures of the functions used by the fleet
pub mod signatures {
    // Proxy admin
    pub const GET_PROXY_IMPLEMENTATION: &str = "getProxyImplementation(address)";
    pub const GET_PROXY_ADMIN: &str = "getProxyAdmin(address)";
    pub const CHANGE_PROXY_ADMIN: &str = "changeProxyAdmin(address,address)";
    pub const UPGRADE: &str = "upgrade(address,address)";

    // Beacon
    pub const IMPLEMENTATION: &str = "implementation()";
    pub const UPGRADE_TO: &str = "upgradeTo(address)";

    // Ownable
    pub const OWNER: &str = "owner()";
    pub const PENDING_OWNER: &str = "pendingOwner()";
    pub const TRANSFER_OWNERSHIP: &str = "transferOwnership(address)";
    pub const ACCEPT_OWNERSHIP: &str = "acceptOwnership()";
    pub const RENOUNCE_OWNERSHIP: &str = "renounceOwnership()";

    // Governable
    pub const GET_GOVERNANCE: &str = "getGovernance()";
    pub const GET_PENDING_GOVERNANCE: &str = "getPendingGovernance()";
    pub const SET_GOVERNANCE: &str = "setGovernance(address)";
    pub const ACCEPT_GOVERNANCE: &str = "acceptGovernance()";

    // Two-step admin
    pub const ADMIN: &str = "admin()";
    pub const PENDING_ADMIN: &str = "pendingAdmin()";
    pub const SET_PENDING_ADMIN: &str = "_setPendingAdmin(address)";
    pub const ACCEPT_ADMIN: &str = "_acceptAdmin()";

    // Initializers
    pub const INITIALIZE_ROUTER: &str = "initialize(address,address)";
    pub const INITIALIZE_COLLECTION: &str = "initialize(address,address,address)";

    // Router
    pub const SCRAM: &str = "SCRAM()";
    pub const PAUSED: &str = "paused()";
    pub const SET_ORENTABLE: &str = "setORentable(address,address)";
    pub const GET_ORENTABLE: &str = "getORentable(address)";
    pub const SET_WRENTABLE: &str = "setWRentable(address,address)";
    pub const GET_WRENTABLE: &str = "getWRentable(address)";
    pub const SET_LIBRARY: &str = "setLibrary(address,address)";
    pub const GET_LIBRARY: &str = "getLibrary(address)";
    pub const SET_WALLET_FACTORY: &str = "setWalletFactory(address)";
    pub const GET_WALLET_FACTORY: &str = "getWalletFactory()";
    pub const SET_FEE_COLLECTOR: &str = "setFeeCollector(address)";
    pub const GET_FEE_COLLECTOR: &str = "getFeeCollector()";
    pub const ENABLE_PAYMENT_TOKEN: &str = "enablePaymentToken(address)";
    pub const ENABLE_PROXY_CALL: &str = "enableProxyCall(address,bytes4,bool)";
}

/// Four-byte function selector
pub fn selector(signature: &str) -> [u8; 4] {
    id(signature)
}

/// Encode a function call
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

/// Append ABI-encoded constructor arguments to creation code
pub fn encode_creation(creation_code: &Bytes, args: &[Token]) -> Bytes {
    let mut data = creation_code.to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

/// Decode a single address return value
pub fn decode_address(call: &str, data: &[u8]) -> Result<Address> {
    address_from_word(data).ok_or_else(|| FleetError::Decode {
        call: call.to_string(),
        reason: format!("expected one address word, got {} bytes", data.len()),
    })
}

/// Decode a single boolean return value
pub fn decode_bool(call: &str, data: &[u8]) -> Result<bool> {
    let malformed = || FleetError::Decode {
        call: call.to_string(),
        reason: format!("expected one bool word, got {} bytes", data.len()),
    };
    if data.len() != 32 {
        return Err(malformed());
    }
    match abi::decode(&[ParamType::Bool], data).map_err(|_| malformed())?.pop() {
        Some(Token::Bool(value)) => Ok(value),
        _ => Err(malformed()),
    }
}

/// Split call data into selector and argument bytes
pub fn split_call(data: &[u8]) -> Option<([u8; 4], &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Some((sel, &data[4..]))
}

/// Decode arguments of known types
pub fn decode_args(types: &[ParamType], data: &[u8]) -> std::result::Result<Vec<Token>, String> {
    abi::decode(types, data).map_err(|e| e.to_string())
}
