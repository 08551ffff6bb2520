// Ledger access
//
// The core never talks to a node directly. It consumes a `LedgerClient`,
// which submits transactions and answers read-only calls, and wraps it in a
// `Session` that records the gas of every submitted transaction.

pub mod memory;

pub use memory::{Fault, MemoryLedger, SimTransaction, Template};

use crate::ethereum::abi::{decode_address, decode_bool, encode_call};
use crate::gas::GasLedger;
use common::{FleetError, Result};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use log::{debug, info};
use thiserror::Error;

/// Transport-level failures reported by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The node refused the transaction
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// Inclusion was never observed
    #[error("transaction not included: {0}")]
    NotIncluded(String),
    /// A read-only call reverted
    #[error("call reverted: {0}")]
    Reverted(String),
    /// Connection or encoding failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Inclusion receipt of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    /// Transaction landed in a block
    pub included: bool,
    /// Execution did not revert
    pub success: bool,
    pub gas_used: U256,
    /// Address of the created contract, for creation transactions
    pub contract_address: Option<Address>,
    pub return_data: Bytes,
}

/// Submit signed calls and query state on a ledger
///
/// Each submission blocks until inclusion is observed or the client gives up.
pub trait LedgerClient {
    /// Network the client is connected to
    fn network_id(&self) -> u64;

    /// Submit a transaction; `to == None` creates a contract from `payload`
    fn submit(&mut self, to: Option<Address>, payload: Bytes, value: U256) -> std::result::Result<Receipt, LedgerError>;

    /// Read-only call
    fn call(&self, to: Address, payload: &Bytes) -> std::result::Result<Bytes, LedgerError>;
}

/// A ledger client bound to the gas ledger of the current run
pub struct Session<'a> {
    ledger: &'a mut dyn LedgerClient,
    gas: &'a mut GasLedger,
}

impl<'a> Session<'a> {
    pub fn new(ledger: &'a mut dyn LedgerClient, gas: &'a mut GasLedger) -> Self {
        Self { ledger, gas }
    }

    pub fn network_id(&self) -> u64 {
        self.ledger.network_id()
    }

    pub fn gas(&self) -> &GasLedger {
        self.gas
    }

    /// Submit a transaction and wait for a successful receipt
    pub fn submit(&mut self, step: &str, to: Option<Address>, payload: Bytes) -> Result<Receipt> {
        info!("submitting {}", step);
        let receipt = self
            .ledger
            .submit(to, payload, U256::zero())
            .map_err(|e| FleetError::SubmissionFailure {
                step: step.to_string(),
                reason: e.to_string(),
            })?;

        if receipt.included {
            self.gas.record(step, &receipt);
        }
        if !receipt.included {
            return Err(FleetError::SubmissionFailure {
                step: step.to_string(),
                reason: format!("transaction {:?} was not included", receipt.tx_hash),
            });
        }
        if !receipt.success {
            return Err(FleetError::SubmissionFailure {
                step: step.to_string(),
                reason: format!("transaction {:?} reverted", receipt.tx_hash),
            });
        }
        debug!("{} included in {:?} using {} gas", step, receipt.tx_hash, receipt.gas_used);
        Ok(receipt)
    }

    fn query(&self, to: Address, signature: &str, args: &[Token]) -> Result<Bytes> {
        self.ledger
            .call(to, &encode_call(signature, args))
            .map_err(|e| FleetError::Query {
                call: format!("{} on {:?}", signature, to),
                reason: e.to_string(),
            })
    }

    /// Call a view function returning a single address
    pub fn read_address(&self, to: Address, signature: &str, args: &[Token]) -> Result<Address> {
        let data = self.query(to, signature, args)?;
        let address = decode_address(signature, &data)?;
        debug!("{} on {:?} -> {:?}", signature, to, address);
        Ok(address)
    }

    /// Call a view function returning a single bool
    pub fn read_bool(&self, to: Address, signature: &str, args: &[Token]) -> Result<bool> {
        let data = self.query(to, signature, args)?;
        let value = decode_bool(signature, &data)?;
        debug!("{} on {:?} -> {}", signature, to, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::abi::signatures;

    #[test]
    fn test_reverted_submission_is_recorded_then_rejected() {
        let deployer = Address::from_low_u64_be(0xd0);
        let mut ledger = MemoryLedger::new(1337, deployer);
        let mut gas = GasLedger::new();
        let mut session = Session::new(&mut ledger, &mut gas);

        // No contract lives at this address, so the call reverts on-chain
        let payload = encode_call(signatures::SCRAM, &[]);
        let err = session
            .submit("SCRAM", Some(Address::from_low_u64_be(0x99)), payload)
            .unwrap_err();

        assert!(matches!(err, FleetError::SubmissionFailure { .. }));
        assert_eq!(gas.len(), 1);
    }

    #[test]
    fn test_dropped_submission_is_not_recorded() {
        let deployer = Address::from_low_u64_be(0xd0);
        let mut ledger = MemoryLedger::new(1337, deployer).with_fault(Fault::DropSubmission(1));
        let mut gas = GasLedger::new();
        let mut session = Session::new(&mut ledger, &mut gas);

        let err = session
            .submit("SCRAM", Some(Address::from_low_u64_be(0x99)), Bytes::new())
            .unwrap_err();

        assert!(err.halts_run());
        assert!(gas.is_empty());
    }
}
