//! Client-side capability wallet: manufactures, evaluates, and redeems
//! ERC-7710-style delegations, and drives the ERC-4337 v0.7 UserOperation
//! pipeline that submits redemptions to a bundler.
//!
//! This crate is the root of a small workspace, composed leaves-first:
//! `delegator-codec` (caveat codec, delegation identity, UserOp hashing, the
//! shared error taxonomy) underlies `delegator-keyholder` (key material and
//! signing), `delegator-authority` (the delegation set), and
//! `delegator-gateway` (JSON-RPC to a chain node and a bundler). This crate
//! composes all three behind [`coordinator::Coordinator`], the single public
//! entrypoint a host embeds.

pub mod config;
pub mod coordinator;
pub mod peer;
pub mod telemetry;

pub use config::{
    BundlerConfig, ChainConfig, LiteralOrEnv, PersistedCoordinatorState, SmartAccountConfig, SmartAccountKind,
    WalletConfig,
};
pub use coordinator::{Coordinator, RedeemRequest, SendTransactionOutcome};
pub use peer::{Capabilities, ExternalSigner, PeerWallet, SigningRequest};

pub use delegator_authority::AuthorityStore;
pub use delegator_codec::{
    Action, Caveat, CaveatKind, Delegation, DelegationStatus, DelegationTypedData, DurableStore, Execution,
    WalletError, WalletResult, ROOT_AUTHORITY,
};
pub use delegator_gateway::{ChainGateway, GasEstimate, GasFees};
pub use delegator_keyholder::{InitOptions, KeyHolder, SignedTransaction, TransactionRequest};
