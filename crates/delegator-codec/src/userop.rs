//! ERC-4337 v0.7 `UserOperation` representation and canonical hash (design
//! §3, §6).

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// The canonical ERC-4337 v0.7 `EntryPoint` address.
pub const ENTRY_POINT_V07: Address = alloy_primitives::address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// An unsigned or signed ERC-4337 v0.7 `UserOperation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

impl UserOperation {
    /// `initCode` is `factory || factoryData` when a factory is set, empty
    /// otherwise.
    fn init_code(&self) -> Vec<u8> {
        match (&self.factory, &self.factory_data) {
            (Some(factory), Some(data)) => {
                let mut out = factory.as_slice().to_vec();
                out.extend_from_slice(data);
                out
            }
            (Some(factory), None) => factory.as_slice().to_vec(),
            _ => Vec::new(),
        }
    }

    /// `paymasterAndData` is `paymaster || paymasterVerificationGasLimit(16)
    /// || paymasterPostOpGasLimit(16) || paymasterData`, empty when no
    /// paymaster is set.
    fn paymaster_and_data(&self) -> Vec<u8> {
        let Some(paymaster) = self.paymaster else {
            return Vec::new();
        };
        let mut out = paymaster.as_slice().to_vec();
        out.extend_from_slice(&pack_uint128(
            self.paymaster_verification_gas_limit.unwrap_or(U256::ZERO),
        ));
        out.extend_from_slice(&pack_uint128(
            self.paymaster_post_op_gas_limit.unwrap_or(U256::ZERO),
        ));
        if let Some(data) = &self.paymaster_data {
            out.extend_from_slice(data);
        }
        out
    }
}

/// Pack a `U256` into its low 16 bytes, big-endian -- the representation
/// used for each half of a packed `(uint128, uint128)` pair.
fn pack_uint128(value: U256) -> [u8; 16] {
    let bytes = value.to_be_bytes::<32>();
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes[16..32]);
    out
}

/// Pack two `U256` gas values as `(uint128, uint128)`, concatenated
/// big-endian -- 32 bytes total. The order given by the caller is
/// significant; it is part of the binary contract (design §4.5 step 7).
fn pack_uint128_pair(a: U256, b: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[0..16].copy_from_slice(&pack_uint128(a));
    out[16..32].copy_from_slice(&pack_uint128(b));
    out
}

/// Compute the ERC-4337 v0.7 UserOperation hash: a nested keccak over the
/// packed fields, then folded with `entryPoint` and `chainId` (design
/// §4.5 step 7). Deterministic for fixed inputs; changes if any field,
/// `entry_point`, or `chain_id` changes.
pub fn compute_user_op_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> B256 {
    let init_code_hash = keccak256(op.init_code());
    let call_data_hash = keccak256(&op.call_data);
    let gas_limits = pack_uint128_pair(op.verification_gas_limit, op.call_gas_limit);
    let gas_fees = pack_uint128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas);
    let paymaster_and_data_hash = keccak256(op.paymaster_and_data());

    // UserOperationLib packs `sender` as a bare 20-byte address, not padded
    // to a 32-byte word, immediately followed by the 32-byte nonce.
    let mut inner = Vec::with_capacity(20 + 32 * 6);
    inner.extend_from_slice(op.sender.as_slice());
    inner.extend_from_slice(&op.nonce.to_be_bytes::<32>());
    inner.extend_from_slice(init_code_hash.as_slice());
    inner.extend_from_slice(call_data_hash.as_slice());
    inner.extend_from_slice(&gas_limits);
    inner.extend_from_slice(&op.pre_verification_gas.to_be_bytes::<32>());
    inner.extend_from_slice(&gas_fees);
    inner.extend_from_slice(paymaster_and_data_hash.as_slice());
    let inner_hash = keccak256(inner);

    let mut outer = Vec::with_capacity(32 + 20 + 32);
    outer.extend_from_slice(inner_hash.as_slice());
    outer.extend_from_slice(entry_point.as_slice());
    outer.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    keccak256(outer)
}
