//! Transaction-request dispatch: legacy / EIP-1559 / EIP-7702 serialization
//! selected by inspecting which fields the caller populated (design §4.3).

use alloy_consensus::{SignableTransaction, TxEip1559, TxEip7702, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_eips::eip2930::AccessList;
use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Address, Bytes, ChainId, Signature, TxKind, B256, U256};
use serde::{Deserialize, Serialize};

use delegator_codec::error::WalletError;

/// A transaction request as handed to [`crate::keyholder::KeyHolder::sign_transaction`].
/// Presence of `authorization_list` selects type-4 (EIP-7702); otherwise
/// presence of `max_fee_per_gas` selects type-2 (EIP-1559); otherwise the
/// request is serialized as a legacy (EIP-155) transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    pub nonce: u64,
    pub chain_id: ChainId,
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: Option<u128>,
    #[serde(default)]
    pub max_fee_per_gas: Option<u128>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<u128>,
    #[serde(default)]
    pub authorization_list: Option<Vec<SignedAuthorization>>,
}

impl TransactionRequest {
    /// A short label for the serialization this request will select, used
    /// only for logging.
    pub fn kind_label(&self) -> &'static str {
        if self.authorization_list.is_some() {
            "eip7702"
        } else if self.max_fee_per_gas.is_some() {
            "eip1559"
        } else {
            "legacy"
        }
    }

    pub fn into_unsigned(self) -> Result<UnsignedTransaction, WalletError> {
        if let Some(authorization_list) = self.authorization_list {
            let to = self
                .to
                .ok_or_else(|| WalletError::ValidationFailed("EIP-7702 transactions require `to`".to_string()))?;
            return Ok(UnsignedTransaction::Eip7702(TxEip7702 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_limit: self.gas_limit,
                max_fee_per_gas: self.max_fee_per_gas.unwrap_or_default(),
                max_priority_fee_per_gas: self.max_priority_fee_per_gas.unwrap_or_default(),
                to,
                value: self.value,
                access_list: AccessList::default(),
                authorization_list,
                input: self.data,
            }));
        }
        if let Some(max_fee_per_gas) = self.max_fee_per_gas {
            return Ok(UnsignedTransaction::Eip1559(TxEip1559 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_limit: self.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas: self.max_priority_fee_per_gas.unwrap_or_default(),
                to: to_kind(self.to),
                value: self.value,
                access_list: AccessList::default(),
                input: self.data,
            }));
        }
        Ok(UnsignedTransaction::Legacy(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price.unwrap_or_default(),
            gas_limit: self.gas_limit,
            to: to_kind(self.to),
            value: self.value,
            input: self.data,
        }))
    }
}

fn to_kind(to: Option<Address>) -> TxKind {
    match to {
        Some(address) => TxKind::Call(address),
        None => TxKind::Create,
    }
}

/// An unsigned transaction of one of the three serializations the Key
/// Holder dispatches between.
pub enum UnsignedTransaction {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
    Eip7702(TxEip7702),
}

impl UnsignedTransaction {
    /// The digest the Key Holder signs -- raw ECDSA, no EIP-191 envelope;
    /// each variant already folds its own EIP-2718 type byte into the hash.
    pub fn signature_hash(&self) -> B256 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.signature_hash(),
            UnsignedTransaction::Eip1559(tx) => tx.signature_hash(),
            UnsignedTransaction::Eip7702(tx) => tx.signature_hash(),
        }
    }

    /// Attach `signature` and produce the EIP-2718 encoded raw transaction.
    pub fn into_raw(self, signature: Signature) -> Bytes {
        match self {
            UnsignedTransaction::Legacy(tx) => Bytes::from(tx.into_signed(signature).encoded_2718()),
            UnsignedTransaction::Eip1559(tx) => Bytes::from(tx.into_signed(signature).encoded_2718()),
            UnsignedTransaction::Eip7702(tx) => Bytes::from(tx.into_signed(signature).encoded_2718()),
        }
    }
}

/// The result of [`crate::keyholder::KeyHolder::sign_transaction`]: the raw
/// EIP-2718 bytes ready for `eth_sendRawTransaction`, plus their hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

impl SignedTransaction {
    pub fn from_raw(raw: Bytes) -> Self {
        let hash = keccak256(&raw);
        Self { raw, hash }
    }
}
