pub mod abi;
pub mod chain;

use crate::ledger::{LedgerClient, LedgerError, Receipt};
use anyhow::{Context, Result};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256, U64},
};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Interface to an Ethereum node, signing with a local key
///
/// Every call blocks on a private runtime, so the deployer and the auditor
/// stay synchronous.
pub struct EthereumConnector {
    client: Arc<SignerClient>,
    runtime: Runtime,
    chain_id: u64,
    gas_price: U256,
    timeout: Duration,
}

impl EthereumConnector {
    /// Connect to `rpc_url` and sign with `private_key` (hex)
    pub fn connect(rpc_url: &str, private_key: &str, gas_price: U256, timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL {}", rpc_url))?;
        let runtime = Runtime::new().context("Failed to start async runtime")?;

        let chain_id = runtime
            .block_on(provider.get_chainid())
            .context("Failed to query chain id")?
            .as_u64();
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("Invalid deployer private key")?
            .with_chain_id(chain_id);
        info!("connected to chain {} as {:?}", chain_id, wallet.address());

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            runtime,
            chain_id,
            gas_price,
            timeout,
        })
    }

    /// Address transactions are sent from
    pub fn address(&self) -> Address {
        self.client.address()
    }
}

impl LedgerClient for EthereumConnector {
    fn network_id(&self) -> u64 {
        self.chain_id
    }

    fn submit(&mut self, to: Option<Address>, payload: Bytes, value: U256) -> std::result::Result<Receipt, LedgerError> {
        let mut request = TransactionRequest::new()
            .data(payload)
            .value(value)
            .gas_price(self.gas_price);
        if let Some(to) = to {
            request = request.to(to);
        }

        let client = self.client.clone();
        let timeout = self.timeout;
        self.runtime.block_on(async move {
            let pending = client
                .send_transaction(request, None)
                .await
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
            let tx_hash = *pending;
            debug!("sent {:?}", tx_hash);

            let receipt = match tokio::time::timeout(timeout, pending.confirmations(1)).await {
                Err(_) => {
                    return Err(LedgerError::NotIncluded(format!(
                        "{:?} not mined within {}s",
                        tx_hash,
                        timeout.as_secs()
                    )))
                }
                Ok(Err(e)) => return Err(LedgerError::Transport(e.to_string())),
                Ok(Ok(None)) => return Err(LedgerError::NotIncluded(format!("{:?} was dropped", tx_hash))),
                Ok(Ok(Some(receipt))) => receipt,
            };

            Ok(Receipt {
                tx_hash,
                included: receipt.block_number.is_some(),
                success: receipt.status == Some(U64::from(1)),
                gas_used: receipt.gas_used.unwrap_or_default(),
                contract_address: receipt.contract_address,
                return_data: Bytes::new(),
            })
        })
    }

    fn call(&self, to: Address, payload: &Bytes) -> std::result::Result<Bytes, LedgerError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(payload.clone()).into();
        self.runtime
            .block_on(self.client.call(&tx, None))
            .map_err(|e| LedgerError::Reverted(e.to_string()))
    }
}
