//! Shared codec library: caveat ABI encoding/matching, delegation identity
//! and EIP-712 signing payloads, the `redeemDelegations` permission-context
//! encoding, and the ERC-4337 v0.7 UserOperation hash.
//!
//! This crate has no opinion about transport, persistence backends beyond
//! the [`storage::DurableStore`] trait, or signing strategy -- those live in
//! `delegator-keyholder`, `delegator-authority`, `delegator-gateway`, and
//! the root `delegator-wallet` crate, all of which depend on this one.

pub mod action;
pub mod caveat;
pub mod delegation;
pub mod error;
pub mod redeem;
pub mod storage;
pub mod time;
pub mod userop;

pub use action::{Action, Execution};
pub use caveat::{matches_action, Caveat, CaveatKind, CaveatVerdict, MatchFailure, MatchResult};
pub use delegation::{Delegation, DelegationStatus, DelegationTypedData, ROOT_AUTHORITY};
pub use error::{ErrorKind, WalletError, WalletResult};
pub use storage::DurableStore;
pub use time::Clock;
pub use userop::{UserOperation, ENTRY_POINT_V07};

/// Generate a cryptographically strong 32-byte salt. Two consecutive calls
/// are, with overwhelming probability, distinct (design §8).
pub fn generate_salt() -> alloy_primitives::U256 {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    alloy_primitives::U256::from_be_bytes(bytes)
}
