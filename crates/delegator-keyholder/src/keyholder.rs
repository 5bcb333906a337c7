//! The Key Holder: owns secret material exclusively and exposes only
//! signing operations (design §4.3). No other component ever sees a
//! private key or mnemonic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signer;
use alloy_signer_local::coins_bip39::English;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner};
use delegator_codec::error::{WalletError, WalletResult};
use delegator_codec::storage::DurableStore;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::state::{InitOptions, KeyHolderState};
use crate::tx::{SignedTransaction, TransactionRequest};

const STORAGE_KEY: &str = "keyholder:state";
const DERIVATION_PREFIX: &str = "m/44'/60'/0'/0/";

/// Fallback counter for ephemeral key generation when the host denies access
/// to a cryptographic RNG (design §4.3 "Ephemeral keys and weak-entropy
/// environments"). Shared process-wide; this path is for test/bootstrap use
/// only and is never taken when `getrandom` succeeds.
static WEAK_ENTROPY_COUNTER: AtomicU64 = AtomicU64::new(0);

struct Registered {
    address: Address,
    signer: PrivateKeySigner,
}

struct Inner {
    state: KeyHolderState,
    accounts: Vec<Registered>,
}

/// Owns secret key material behind a `DurableStore` and an async lock.
/// Never cloned; callers share it through an `Arc`.
pub struct KeyHolder<S: DurableStore> {
    store: Arc<S>,
    inner: RwLock<Inner>,
}

impl<S: DurableStore> KeyHolder<S> {
    /// A fresh, uninitialised Key Holder.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            inner: RwLock::new(Inner {
                state: KeyHolderState::Uninitialised,
                accounts: Vec::new(),
            }),
        }
    }

    /// Reconstruct a Key Holder from its persisted record, re-deriving every
    /// seed-based account up to `derived_account_count` (design §4.1).
    pub async fn load(store: Arc<S>) -> WalletResult<Self> {
        let holder = Self::new(store);
        if let Some(bytes) = holder.store.get_bytes(STORAGE_KEY).await? {
            let state: KeyHolderState = serde_json::from_slice(&bytes)
                .map_err(|e| WalletError::ConfigurationInvalid(format!("deserializing key holder state: {e}")))?;
            holder.rehydrate(state).await?;
        }
        Ok(holder)
    }

    async fn rehydrate(&self, state: KeyHolderState) -> WalletResult<()> {
        let mut inner = self.inner.write().await;
        match &state {
            KeyHolderState::Uninitialised => {}
            KeyHolderState::SeedBased {
                mnemonic,
                derived_account_count,
            } => {
                for index in 0..*derived_account_count {
                    inner.accounts.push(derive_signer(mnemonic, index)?);
                }
            }
            KeyHolderState::Ephemeral { private_key } => {
                let signer = PrivateKeySigner::from_bytes(private_key).map_err(config_err)?;
                inner.accounts.push(Registered {
                    address: signer.address(),
                    signer,
                });
            }
        }
        inner.state = state;
        Ok(())
    }

    async fn persist(&self, state: &KeyHolderState) -> WalletResult<()> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| WalletError::ConfigurationInvalid(format!("serializing key holder state: {e}")))?;
        self.store.put_bytes(STORAGE_KEY, bytes).await
    }

    /// `initialize(options)` (design §4.3). Fails if already initialised.
    pub async fn initialize(&self, options: InitOptions) -> WalletResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state.is_initialised() {
            return Err(WalletError::InvalidState(
                "key holder is already initialised".to_string(),
            ));
        }
        match options {
            InitOptions::Seed { mnemonic } => {
                inner.state = KeyHolderState::SeedBased {
                    mnemonic,
                    derived_account_count: 0,
                };
            }
            InitOptions::Ephemeral => {
                let private_key = generate_ephemeral_key();
                let signer = PrivateKeySigner::from_bytes(&private_key).map_err(config_err)?;
                inner.accounts.push(Registered {
                    address: signer.address(),
                    signer,
                });
                inner.state = KeyHolderState::Ephemeral { private_key };
            }
        }
        self.persist(&inner.state).await
    }

    /// `deriveAccount(index)` (design §4.3). Seed-based only; increments the
    /// persisted derivation count.
    pub async fn derive_account(&self, index: u32) -> WalletResult<Address> {
        let mut inner = self.inner.write().await;
        let mnemonic = match &inner.state {
            KeyHolderState::SeedBased { mnemonic, .. } => mnemonic.clone(),
            KeyHolderState::Uninitialised => {
                return Err(WalletError::NotInitialised("key holder has no keyring".to_string()))
            }
            KeyHolderState::Ephemeral { .. } => {
                return Err(WalletError::InvalidState(
                    "deriveAccount is not supported for an ephemeral key holder".to_string(),
                ))
            }
        };
        let registered = derive_signer(&mnemonic, index)?;
        let address = registered.address;
        inner.accounts.push(registered);
        if let KeyHolderState::SeedBased {
            derived_account_count,
            ..
        } = &mut inner.state
        {
            *derived_account_count += 1;
        }
        self.persist(&inner.state).await?;
        Ok(address)
    }

    /// `getAccounts()`: all registered addresses, in insertion order.
    pub async fn get_accounts(&self) -> Vec<Address> {
        self.inner.read().await.accounts.iter().map(|r| r.address).collect()
    }

    /// `signTransaction(tx)`. Rejects if `tx.from` is not registered.
    pub async fn sign_transaction(&self, request: TransactionRequest) -> WalletResult<SignedTransaction> {
        let from = request.from;
        let kind = request.kind_label();
        let inner = self.inner.read().await;
        let account = self.resolve_account(&inner, Some(from))?;
        let unsigned = request.into_unsigned()?;
        let hash = unsigned.signature_hash();
        let signature = account.signer.sign_hash(&hash).await.map_err(sign_err)?;
        let raw = unsigned.into_raw(signature);
        debug!(%from, kind, "signed transaction");
        Ok(SignedTransaction::from_raw(raw))
    }

    /// `signTypedData(typedData)`: EIP-712, signed by the first registered
    /// account. `signing_hash` is the struct's own
    /// `eip712_signing_hash(&domain)`, computed by the caller (the codec
    /// crate owns the per-message-type ABI).
    pub async fn sign_typed_data(&self, signing_hash: B256) -> WalletResult<Bytes> {
        let inner = self.inner.read().await;
        let account = self.resolve_account(&inner, None)?;
        let signature = account.signer.sign_hash(&signing_hash).await.map_err(sign_err)?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    /// `signMessage(text, from?)`: EIP-191 personal-sign.
    pub async fn sign_message(&self, text: &str, from: Option<Address>) -> WalletResult<Bytes> {
        let inner = self.inner.read().await;
        let account = self.resolve_account(&inner, from)?;
        let signature = account
            .signer
            .sign_message(text.as_bytes())
            .await
            .map_err(sign_err)?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    /// `signHash(hash, from?)`: raw ECDSA, no EIP-191 envelope. Required for
    /// UserOp hashes, since the EntryPoint verifies raw signatures.
    pub async fn sign_hash(&self, hash: B256, from: Option<Address>) -> WalletResult<Bytes> {
        let inner = self.inner.read().await;
        let account = self.resolve_account(&inner, from)?;
        let signature = account.signer.sign_hash(&hash).await.map_err(sign_err)?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    fn resolve_account<'a>(&self, inner: &'a Inner, from: Option<Address>) -> WalletResult<&'a Registered> {
        match from {
            Some(address) => inner
                .accounts
                .iter()
                .find(|r| r.address == address)
                .ok_or_else(|| WalletError::NotFound(format!("account {address}"))),
            None => inner
                .accounts
                .first()
                .ok_or_else(|| WalletError::NotInitialised("no registered accounts".to_string())),
        }
    }
}

fn derive_signer(mnemonic: &str, index: u32) -> WalletResult<Registered> {
    let path = format!("{DERIVATION_PREFIX}{index}");
    let signer = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(path.as_str())
        .map_err(config_err)?
        .build()
        .map_err(config_err)?;
    Ok(Registered {
        address: signer.address(),
        signer,
    })
}

/// Generate a 32-byte ephemeral private key from the OS RNG, falling back to
/// a deterministic, explicitly non-cryptographic counter-derived key if the
/// isolation runtime denies RNG access (design §4.3).
fn generate_ephemeral_key() -> B256 {
    let mut bytes = [0u8; 32];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => B256::from(bytes),
        Err(e) => {
            warn!(error = %e, "RNG unavailable; falling back to non-cryptographic ephemeral key");
            let counter = WEAK_ENTROPY_COUNTER.fetch_add(1, Ordering::Relaxed);
            alloy_primitives::keccak256(counter.to_be_bytes())
        }
    }
}

fn sign_err(e: impl fmt::Display) -> WalletError {
    WalletError::ValidationFailed(format!("signing failed: {e}"))
}

fn config_err(e: impl fmt::Display) -> WalletError {
    WalletError::ConfigurationInvalid(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegator_codec::storage::InMemoryStore;

    fn test_mnemonic() -> &'static str {
        "test test test test test test test test test test test junk"
    }

    #[tokio::test]
    async fn initialize_is_idempotent_guard() {
        let holder = KeyHolder::new(Arc::new(InMemoryStore::new()));
        holder
            .initialize(InitOptions::Seed {
                mnemonic: test_mnemonic().to_string(),
            })
            .await
            .unwrap();
        let err = holder
            .initialize(InitOptions::Ephemeral)
            .await
            .expect_err("second initialize must fail");
        assert_eq!(err.kind(), delegator_codec::error::ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn derive_account_registers_in_order_and_persists_count() {
        let store = Arc::new(InMemoryStore::new());
        let holder = KeyHolder::new(store.clone());
        holder
            .initialize(InitOptions::Seed {
                mnemonic: test_mnemonic().to_string(),
            })
            .await
            .unwrap();
        let first = holder.derive_account(0).await.unwrap();
        let second = holder.derive_account(1).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(holder.get_accounts().await, vec![first, second]);

        let reloaded = KeyHolder::load(store).await.unwrap();
        assert_eq!(reloaded.get_accounts().await, vec![first, second]);
    }

    #[tokio::test]
    async fn derive_account_fails_for_ephemeral_keyring() {
        let holder = KeyHolder::new(Arc::new(InMemoryStore::new()));
        holder.initialize(InitOptions::Ephemeral).await.unwrap();
        assert!(holder.derive_account(0).await.is_err());
    }

    #[tokio::test]
    async fn sign_transaction_rejects_unregistered_from() {
        use crate::tx::TransactionRequest;
        use alloy_primitives::{Bytes, U256};

        let holder = KeyHolder::new(Arc::new(InMemoryStore::new()));
        holder.initialize(InitOptions::Ephemeral).await.unwrap();
        let request = TransactionRequest {
            from: Address::ZERO,
            to: Some(Address::ZERO),
            value: U256::ZERO,
            data: Bytes::new(),
            nonce: 0,
            chain_id: 1,
            gas_limit: 21_000,
            gas_price: Some(1),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            authorization_list: None,
        };
        let err = holder.sign_transaction(request).await.unwrap_err();
        assert_eq!(err.kind(), delegator_codec::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn sign_hash_and_sign_message_diverge() {
        let holder = KeyHolder::new(Arc::new(InMemoryStore::new()));
        holder.initialize(InitOptions::Ephemeral).await.unwrap();
        let text = "hello delegator wallet";
        let raw_hash = alloy_primitives::keccak256(text.as_bytes());

        let via_sign_hash = holder.sign_hash(raw_hash, None).await.unwrap();
        let via_sign_message = holder.sign_message(text, None).await.unwrap();

        // Same underlying bytes, but signMessage applies the EIP-191 prefix
        // before hashing -- the two signatures must not coincide.
        assert_ne!(via_sign_hash, via_sign_message);
        assert_eq!(via_sign_hash.len(), 65);
    }
}
