// Gas accounting
//
// Every transaction submitted during a run is recorded here; the ledger is
// passed by reference into the deployer and the auditor and only read back
// for reporting.

use crate::ledger::Receipt;
use ethers::types::{H256, U256, U512};
use ethers::utils::format_units;
use serde::{Deserialize, Serialize};

/// One recorded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEntry {
    /// Transaction hash
    pub tx_hash: H256,
    /// Step that produced the transaction
    pub label: String,
    /// Gas consumed
    pub gas_used: U256,
}

/// Ordered record of the gas consumed by a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GasLedger {
    entries: Vec<GasEntry>,
}

impl GasLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an included transaction
    pub fn record(&mut self, label: &str, receipt: &Receipt) {
        self.entries.push(GasEntry {
            tx_hash: receipt.tx_hash,
            label: label.to_string(),
            gas_used: receipt.gas_used,
        });
    }

    pub fn entries(&self) -> &[GasEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total gas consumed
    pub fn total(&self) -> U256 {
        self.entries
            .iter()
            .fold(U256::zero(), |acc, e| acc.saturating_add(e.gas_used))
    }

    /// Cost in wei at the given gas price
    pub fn estimated_cost(&self, gas_price: U256) -> U512 {
        self.total().full_mul(gas_price)
    }

    /// Cost rendered in whole currency units, e.g. `0.0042 ETH`
    pub fn format_cost(&self, gas_price: U256, symbol: &str) -> String {
        let wei = self.estimated_cost(gas_price);
        match U256::try_from(wei) {
            Ok(wei) => match format_units(wei, "ether") {
                Ok(amount) => format!("{} {}", amount, symbol),
                Err(_) => format!("{} wei", wei),
            },
            Err(_) => format!("{} wei", wei),
        }
    }
}

/// Convert a gas price in gwei to wei
pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * U256::exp10(9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, Bytes};

    fn receipt(n: u64, gas: U256) -> Receipt {
        Receipt {
            tx_hash: H256::from_low_u64_be(n),
            included: true,
            success: true,
            gas_used: gas,
            contract_address: None::<Address>,
            return_data: Bytes::new(),
        }
    }

    #[test]
    fn test_total_and_cost() {
        let mut gas = GasLedger::new();
        assert_eq!(gas.total(), U256::zero());

        gas.record("ProxyAdmin", &receipt(1, U256::from(500_000)));
        gas.record("Rentable", &receipt(2, U256::from(1_500_000)));

        assert_eq!(gas.len(), 2);
        assert_eq!(gas.total(), U256::from(2_000_000));
        assert_eq!(gas.estimated_cost(gwei_to_wei(10)), U512::from(20_000_000_000_000_000u64));
        let formatted = gas.format_cost(gwei_to_wei(10), "ETH");
        assert!(formatted.starts_with("0.02"));
        assert!(formatted.ends_with(" ETH"));
    }

    #[test]
    fn test_cost_does_not_overflow_native_width() {
        let mut gas = GasLedger::new();
        gas.record("huge", &receipt(1, U256::MAX));

        let cost = gas.estimated_cost(U256::from(2));
        assert!(cost > U512::from(U256::MAX));
        assert!(gas.format_cost(U256::from(2), "ETH").ends_with("wei"));
    }
}
