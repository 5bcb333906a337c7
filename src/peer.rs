//! Capability traits for the two remote signing strategies (design §4.5a,
//! §9 "Capability-passing replacing prototype chains"): an external signer
//! (e.g. a browser extension or hardware wallet the host bridges in) and a
//! peer wallet (another instance of this same system, reached over
//! whatever transport the host wires up). The Coordinator never knows or
//! cares how either is implemented -- it holds a trait object and calls it.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use delegator_codec::error::WalletResult;
use delegator_keyholder::TransactionRequest;
use serde::{Deserialize, Serialize};

/// The uniform shape a remote signer (external or peer) is asked to satisfy.
/// Mirrors the four signing-request kinds from design §4.5a; a raw-hash
/// request that falls through to an external signer or peer is represented
/// as a [`SigningRequest::Message`] carrying the hash's hex text, since
/// neither remote surface is assumed to expose a raw, EIP-191-less signing
/// primitive (design §4.5a "Raw hash ... via message path").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SigningRequest {
    Transaction(TransactionRequest),
    TypedData { signing_hash: B256 },
    Message { text: String, from: Option<Address> },
}

/// A remote signing authority reached through some host-provided bridge
/// (e.g. a browser wallet's injected provider). Priority-2 in every signing
/// table (design §4.5a).
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    async fn accounts(&self) -> WalletResult<Vec<Address>>;
    async fn sign_transaction(&self, tx: TransactionRequest) -> WalletResult<Bytes>;
    async fn sign_typed_data(&self, signing_hash: B256) -> WalletResult<Bytes>;
    async fn sign_message(&self, text: &str, from: Option<Address>) -> WalletResult<Bytes>;
}

/// Another wallet instance, reached over whatever transport the host wires
/// up. Priority-3 (last resort before failing) in every signing table.
#[async_trait]
pub trait PeerWallet: Send + Sync {
    async fn accounts(&self) -> WalletResult<Vec<Address>>;
    async fn handle_signing_request(&self, request: SigningRequest) -> WalletResult<Bytes>;
}

/// `getCapabilities()`: a snapshot of what this Coordinator can currently do,
/// for a host UI to decide which operations to offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub keyring_initialised: bool,
    pub local_account_count: usize,
    pub provider_configured: bool,
    pub bundler_configured: bool,
    pub smart_account_configured: bool,
    pub external_signer_connected: bool,
    pub peer_connected: bool,
}
