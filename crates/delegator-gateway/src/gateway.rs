//! The Chain Gateway: JSON-RPC to a chain node and a bundler (design §4.4).
//! Holds no durable state of its own -- the Coordinator persists
//! `chainConfig`/`bundlerConfig` and replays `configure` at startup.

use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use delegator_codec::error::{WalletError, WalletResult};
use delegator_codec::userop::UserOperation;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::rpc::{call_json_rpc, parse_hex_u256, parse_hex_u64, RpcEndpoint};

sol! {
    function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
}

const GWEI: u128 = 1_000_000_000;
const FALLBACK_PRIORITY_FEE: u128 = GWEI;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

pub struct ChainGateway {
    http: reqwest::Client,
    node: RwLock<Option<Url>>,
}

impl Default for ChainGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainGateway {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            node: RwLock::new(None),
        }
    }

    /// `configure(chainConfig)`: sets the JSON-RPC endpoint.
    pub async fn configure(&self, rpc_url: Url) {
        *self.node.write().await = Some(rpc_url);
    }

    async fn node_endpoint(&self) -> WalletResult<Url> {
        self.node
            .read()
            .await
            .clone()
            .ok_or_else(|| WalletError::NotInitialised("chain gateway has no configured RPC endpoint".to_string()))
    }

    /// `request(method, params)`: a thin JSON-RPC wrapper against the
    /// configured node.
    pub async fn request(&self, method: &str, params: Value) -> WalletResult<Value> {
        let endpoint = self.node_endpoint().await?;
        call_json_rpc(&self.http, &endpoint, RpcEndpoint::Node, method, params).await
    }

    pub async fn broadcast_transaction(&self, signed_tx: &Bytes) -> WalletResult<B256> {
        let result = self.request("eth_sendRawTransaction", json!([signed_tx])).await?;
        let hash = result.as_str().ok_or_else(|| {
            WalletError::NetworkFatal("eth_sendRawTransaction returned a non-string hash".to_string())
        })?;
        hash.parse()
            .map_err(|e| WalletError::NetworkFatal(format!("parsing transaction hash {hash}: {e}")))
    }

    pub async fn get_balance(&self, address: Address) -> WalletResult<U256> {
        let result = self.request("eth_getBalance", json!([address, "latest"])).await?;
        parse_hex_u256(&result)
    }

    pub async fn get_chain_id(&self) -> WalletResult<u64> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_hex_u64(&result)
    }

    /// The EOA nonce, via `eth_getTransactionCount`.
    pub async fn get_nonce(&self, address: Address) -> WalletResult<u64> {
        let result = self
            .request("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        parse_hex_u64(&result)
    }

    /// `getEntryPointNonce(entryPoint, sender, key?)`: ABI-encodes
    /// `getNonce(address,uint192)` and issues `eth_call`.
    pub async fn get_entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: Option<U192>,
    ) -> WalletResult<U256> {
        let call = getNonceCall {
            sender,
            key: key.unwrap_or_default(),
        };
        let data = Bytes::from(call.abi_encode());
        let result = self
            .request("eth_call", json!([{"to": entry_point, "data": data}, "latest"]))
            .await?;
        parse_hex_u256(&result)
    }

    /// `submitUserOp(bundlerUrl, entryPoint, userOp)`: `eth_sendUserOperation`.
    pub async fn submit_user_op(
        &self,
        bundler_url: &Url,
        entry_point: Address,
        user_op: &UserOperation,
    ) -> WalletResult<B256> {
        let params = json!([user_op, entry_point]);
        let result = call_json_rpc(&self.http, bundler_url, RpcEndpoint::Bundler, "eth_sendUserOperation", params).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| WalletError::NetworkFatal("eth_sendUserOperation returned a non-string hash".to_string()))?;
        hash.parse()
            .map_err(|e| WalletError::NetworkFatal(format!("parsing UserOp hash {hash}: {e}")))
    }

    /// `estimateUserOpGas(...)`: `eth_estimateUserOperationGas`.
    pub async fn estimate_user_op_gas(
        &self,
        bundler_url: &Url,
        entry_point: Address,
        user_op: &UserOperation,
    ) -> WalletResult<GasEstimate> {
        let params = json!([user_op, entry_point]);
        let result = call_json_rpc(&self.http, bundler_url, RpcEndpoint::Bundler, "eth_estimateUserOperationGas", params).await?;
        serde_json::from_value(result).map_err(|e| WalletError::NetworkFatal(format!("decoding gas estimate: {e}")))
    }

    /// `getUserOpReceipt(...)`: `eth_getUserOperationReceipt`. `None` until
    /// the bundler has included the operation.
    pub async fn get_user_op_receipt(&self, bundler_url: &Url, user_op_hash: B256) -> WalletResult<Option<Value>> {
        let result = call_json_rpc(
            &self.http,
            bundler_url,
            RpcEndpoint::Bundler,
            "eth_getUserOperationReceipt",
            json!([user_op_hash]),
        )
        .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    /// `getGasFees()`: `maxFeePerGas = 2 * baseFee + priority`, falling back
    /// to a conservative 1 gwei priority fee if `eth_maxPriorityFeePerGas`
    /// fails.
    pub async fn get_gas_fees(&self) -> WalletResult<GasFees> {
        let block = self.request("eth_getBlockByNumber", json!(["latest", false])).await?;
        let base_fee = block
            .get("baseFeePerGas")
            .ok_or_else(|| WalletError::NetworkFatal("latest block has no baseFeePerGas".to_string()))
            .and_then(parse_hex_u256)?;

        let priority = match self.request("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(value) => parse_hex_u256(&value).unwrap_or(U256::from(FALLBACK_PRIORITY_FEE)),
            Err(e) => {
                debug!(error = %e, "eth_maxPriorityFeePerGas failed, falling back to 1 gwei");
                U256::from(FALLBACK_PRIORITY_FEE)
            }
        };

        Ok(GasFees {
            max_fee_per_gas: base_fee * U256::from(2u64) + priority,
            max_priority_fee_per_gas: priority,
        })
    }
}
