//! Coordinator-owned configuration (design §3, §6 "Persisted layout").
//!
//! The Key Holder and Authority Store each own their own durable record; the
//! Coordinator's record is the remaining slice of wallet state: which chain
//! node and bundler it talks to, and which smart account it acts as. `peerRef`
//! and `externalSignerRef` are deliberately *not* part of this record --
//! design §9 notes that handles to other components "may be stale after
//! restart and are reconnected explicitly", so a live `Arc<dyn ExternalSigner>`
//! or `Arc<dyn PeerWallet>` is never a byte-serializable value; the host
//! reconnects them via [`crate::coordinator::Coordinator::connect_external_signer`]
//! and [`crate::coordinator::Coordinator::connect_peer`] after reload.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use delegator_codec::error::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// `configure(chainConfig)`: the JSON-RPC node endpoint and the chain it
/// serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub rpc_url: Url,
    pub chain_id: u64,
    /// The `DelegationManager` address embedded in every EIP-712 payload and
    /// targeted by redemption callData (design §4.2, §4.5 step 5).
    pub delegation_manager: Address,
}

/// `configureBundler(bundlerConfig)`: the ERC-4337 bundler endpoint and the
/// EntryPoint it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
    pub bundler_url: Url,
    pub entry_point: Address,
}

/// The two smart-account implementation kinds named in the glossary. Neither
/// changes the redemption callData shape (§4.5 targets the single-execution
/// `execute` entrypoint shared by both); the distinction only matters for
/// how a host derives `address` and whether an EIP-7702 authorization
/// accompanies deployment, both of which are the host's concern, not this
/// wallet's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SmartAccountKind {
    Hybrid,
    Stateless7702,
}

/// `createSmartAccount(kind, owner, salt)`: the configured smart-account
/// delegator/sender used by `createDelegation` and `submitDelegationUserOp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountConfig {
    pub kind: SmartAccountKind,
    pub owner: Address,
    pub salt: U256,
    pub address: Address,
}

/// The Coordinator's persisted record (design §6 "Persisted layout"):
/// `{chainConfig, bundlerConfig, smartAccountConfig}`. `peerRef` and
/// `externalSignerRef` are runtime-only and excluded, see the module doc.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCoordinatorState {
    #[serde(default)]
    pub chain_config: Option<ChainConfig>,
    #[serde(default)]
    pub bundler_config: Option<BundlerConfig>,
    #[serde(default)]
    pub smart_account_config: Option<SmartAccountConfig>,
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during
/// deserialization, the same pattern the teacher's own `config.rs` uses for
/// RPC URLs and signer keys.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"0xabc..."`
/// - Simple env var: `"$DELEGATION_MANAGER"`
/// - Braced env var: `"${DELEGATION_MANAGER}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if s.starts_with("${") && s.ends_with('}') {
            Some(s[2..s.len() - 1].to_string())
        } else if let Some(rest) = s.strip_prefix('$') {
            if !rest.is_empty() && rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(rest.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))?;
        Ok(LiteralOrEnv(parsed))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// WalletConfig loader
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainConfigLoad {
    rpc_url: LiteralOrEnv<Url>,
    chain_id: u64,
    delegation_manager: LiteralOrEnv<Address>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundlerConfigLoad {
    bundler_url: LiteralOrEnv<Url>,
    entry_point: LiteralOrEnv<Address>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmartAccountConfigLoad {
    kind: SmartAccountKind,
    owner: LiteralOrEnv<Address>,
    salt: LiteralOrEnv<U256>,
    address: LiteralOrEnv<Address>,
}

/// A file- or environment-backed source for the Coordinator's three
/// configuration records, loadable via `serde_json` the same way the
/// teacher's `Config::load_from_path` reads its own JSON file. Any field may
/// be a literal or a `$VAR`/`${VAR}` environment variable reference,
/// resolved at deserialization time (design §6 "Persisted layout", given a
/// concrete loader).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    #[serde(default)]
    chain: Option<ChainConfigLoad>,
    #[serde(default)]
    bundler: Option<BundlerConfigLoad>,
    #[serde(default)]
    smart_account: Option<SmartAccountConfigLoad>,
}

impl WalletConfig {
    pub fn from_json(content: &str) -> WalletResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| WalletError::ConfigurationInvalid(format!("parsing wallet config: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> WalletResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WalletError::ConfigurationInvalid(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn chain_config(&self) -> Option<ChainConfig> {
        self.chain.clone().map(|c| ChainConfig {
            rpc_url: c.rpc_url.into_inner(),
            chain_id: c.chain_id,
            delegation_manager: c.delegation_manager.into_inner(),
        })
    }

    pub fn bundler_config(&self) -> Option<BundlerConfig> {
        self.bundler.clone().map(|c| BundlerConfig {
            bundler_url: c.bundler_url.into_inner(),
            entry_point: c.entry_point.into_inner(),
        })
    }

    pub fn smart_account_config(&self) -> Option<SmartAccountConfig> {
        self.smart_account.clone().map(|c| SmartAccountConfig {
            kind: c.kind,
            owner: c.owner.into_inner(),
            salt: c.salt.into_inner(),
            address: c.address.into_inner(),
        })
    }
}
