//! Key Holder state representation (design §3, §4.3).
//!
//! `KeyHolderState` is both the runtime discriminant and the exact shape
//! persisted under `"keyholder:state"` -- the seed-based case is
//! reconstructable from `derived_account_count` alone, and the ephemeral
//! case simply carries the one key it generated at initialisation.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Input to [`crate::keyholder::KeyHolder::initialize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InitOptions {
    Seed { mnemonic: String },
    Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KeyHolderState {
    Uninitialised,
    SeedBased {
        mnemonic: String,
        derived_account_count: u32,
    },
    Ephemeral {
        private_key: B256,
    },
}

impl Default for KeyHolderState {
    fn default() -> Self {
        KeyHolderState::Uninitialised
    }
}

impl KeyHolderState {
    pub fn is_initialised(&self) -> bool {
        !matches!(self, KeyHolderState::Uninitialised)
    }
}
