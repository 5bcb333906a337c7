//! The Coordinator: owns the public API and composes the Key Holder,
//! Authority Store, and Chain Gateway behind it (design §4.5). Holds no
//! secret material and no delegation data of its own -- only the
//! configuration needed to drive the other three components, plus whichever
//! remote signing capabilities the host has connected.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use delegator_authority::AuthorityStore;
use delegator_codec::delegation::status_name;
use delegator_codec::error::{WalletError, WalletResult};
use delegator_codec::redeem::encode_redeem_call_data;
use delegator_codec::storage::DurableStore;
use delegator_codec::time::{Clock, SystemClock};
use delegator_codec::userop::{compute_user_op_hash, UserOperation};
use delegator_codec::{Action, Caveat, Delegation, DelegationStatus, Execution};
use delegator_gateway::{ChainGateway, GasFees};
use delegator_keyholder::{InitOptions, KeyHolder, SignedTransaction, TransactionRequest};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BundlerConfig, ChainConfig, PersistedCoordinatorState, SmartAccountConfig, SmartAccountKind};
use crate::peer::{Capabilities, ExternalSigner, PeerWallet, SigningRequest};

const STORAGE_KEY: &str = "coordinator:state";

/// Placeholder gas limits filled into an unsigned UserOp before the bundler
/// estimate replaces them (design §4.5 step 6). Generous enough that
/// `eth_estimateUserOperationGas` simulations against them don't themselves
/// run out of gas.
const PLACEHOLDER_CALL_GAS_LIMIT: u64 = 500_000;
const PLACEHOLDER_VERIFICATION_GAS_LIMIT: u64 = 500_000;
const PLACEHOLDER_PRE_VERIFICATION_GAS: u64 = 50_000;

/// `redeemDelegation`'s three mutually-exclusive routes (design §4.5d).
/// `chain_id` only applies to the `action` route, matching
/// `AuthorityStore::find_for_action`'s own optional filter.
#[derive(Debug, Clone, Default)]
pub struct RedeemRequest {
    pub chain: Option<Vec<Delegation>>,
    pub id: Option<B256>,
    pub action: Option<Action>,
    pub chain_id: Option<u64>,
}

/// `sendTransaction`'s two possible outcomes (design §4.5e): redeemed through
/// a matching delegation as a UserOp, or signed and broadcast directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTransactionOutcome {
    UserOp(B256),
    Transaction(B256),
}

#[derive(Default)]
struct Connections {
    external_signer: Option<Arc<dyn ExternalSigner>>,
    peer: Option<Arc<dyn PeerWallet>>,
}

/// Owns the public API. Cheap to hold behind an `Arc`; every sub-component
/// is independently synchronized, so the Coordinator itself only guards its
/// own small configuration record plus the two remote-signing handles
/// (design §5 "components do not share mutable memory; each owns its state
/// exclusively").
pub struct Coordinator<S: DurableStore> {
    store: Arc<S>,
    key_holder: Arc<KeyHolder<S>>,
    authority: Arc<AuthorityStore<S>>,
    gateway: Arc<ChainGateway>,
    delegation_manager: Address,
    clock: Arc<dyn Clock>,
    state: RwLock<PersistedCoordinatorState>,
    connections: RwLock<Connections>,
}

impl<S: DurableStore + 'static> Coordinator<S> {
    /// `delegation_manager` is wired in at construction -- it is the one
    /// piece of chain configuration the Authority Store needs up front to
    /// build EIP-712 payloads (design §4.2 `prepareForSigning`), so unlike
    /// the rest of `chainConfig` it cannot be deferred to `configureProvider`
    /// without forcing the Authority Store to be rebuilt mid-flight.
    pub fn new(store: Arc<S>, delegation_manager: Address) -> Self {
        let key_holder = Arc::new(KeyHolder::new(store.clone()));
        let authority = Arc::new(AuthorityStore::new(store.clone(), delegation_manager));
        Self {
            store,
            key_holder,
            authority,
            gateway: Arc::new(ChainGateway::new()),
            delegation_manager,
            clock: Arc::new(SystemClock),
            state: RwLock::new(PersistedCoordinatorState::default()),
            connections: RwLock::new(Connections::default()),
        }
    }

    /// Reconstruct every component from its persisted record and replay the
    /// chain node endpoint. `peerRef`/`externalSignerRef` are not replayed --
    /// the host reconnects them explicitly (design §9).
    pub async fn load(store: Arc<S>, delegation_manager: Address) -> WalletResult<Self> {
        let key_holder = Arc::new(KeyHolder::load(store.clone()).await?);
        let authority = Arc::new(AuthorityStore::load(store.clone(), delegation_manager).await?);
        let gateway = Arc::new(ChainGateway::new());
        let state: PersistedCoordinatorState = match store.get_bytes(STORAGE_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| WalletError::ConfigurationInvalid(format!("deserializing coordinator state: {e}")))?,
            None => PersistedCoordinatorState::default(),
        };
        if let Some(chain_config) = &state.chain_config {
            gateway.configure(chain_config.rpc_url.clone()).await;
        }
        Ok(Self {
            store,
            key_holder,
            authority,
            gateway,
            delegation_manager,
            clock: Arc::new(SystemClock),
            state: RwLock::new(state),
            connections: RwLock::new(Connections::default()),
        })
    }

    async fn persist_state(&self, state: &PersistedCoordinatorState) -> WalletResult<()> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| WalletError::ConfigurationInvalid(format!("serializing coordinator state: {e}")))?;
        self.store.put_bytes(STORAGE_KEY, bytes).await
    }

    // -- wiring -----------------------------------------------------------

    pub async fn initialize_keyring(&self, options: InitOptions) -> WalletResult<()> {
        self.key_holder.initialize(options).await
    }

    /// `configureProvider(chainConfig)`: points the Chain Gateway at a node
    /// and records the chain id used for UserOp hashing.
    pub async fn configure_provider(&self, chain_config: ChainConfig) -> WalletResult<()> {
        self.gateway.configure(chain_config.rpc_url.clone()).await;
        let mut state = self.state.write().await;
        state.chain_config = Some(chain_config);
        self.persist_state(&state).await
    }

    pub async fn configure_bundler(&self, bundler_config: BundlerConfig) -> WalletResult<()> {
        let mut state = self.state.write().await;
        state.bundler_config = Some(bundler_config);
        self.persist_state(&state).await
    }

    pub async fn connect_external_signer(&self, signer: Arc<dyn ExternalSigner>) {
        self.connections.write().await.external_signer = Some(signer);
    }

    pub async fn connect_peer(&self, peer: Arc<dyn PeerWallet>) {
        self.connections.write().await.peer = Some(peer);
    }

    /// `createSmartAccount(kind, owner, salt)`. Address derivation here is a
    /// deterministic placeholder (`keccak256(owner || salt || kind)`, taking
    /// the low 20 bytes) -- not a real CREATE2 factory simulation, which
    /// would require the host's actual factory address and init-code hash.
    /// See DESIGN.md for the rationale.
    pub async fn create_smart_account(
        &self,
        kind: SmartAccountKind,
        owner: Address,
        salt: U256,
    ) -> WalletResult<Address> {
        let mut packed = Vec::with_capacity(20 + 32 + 1);
        packed.extend_from_slice(owner.as_slice());
        packed.extend_from_slice(&salt.to_be_bytes::<32>());
        packed.push(match kind {
            SmartAccountKind::Hybrid => 0,
            SmartAccountKind::Stateless7702 => 1,
        });
        let digest = alloy_primitives::keccak256(packed);
        let address = Address::from_slice(&digest[12..32]);

        let mut state = self.state.write().await;
        state.smart_account_config = Some(SmartAccountConfig {
            kind,
            owner,
            salt,
            address,
        });
        self.persist_state(&state).await?;
        info!(%address, ?kind, "configured smart account");
        Ok(address)
    }

    pub async fn get_smart_account_address(&self) -> WalletResult<Address> {
        self.state
            .read()
            .await
            .smart_account_config
            .as_ref()
            .map(|c| c.address)
            .ok_or_else(|| WalletError::NotInitialised("no smart account configured".to_string()))
    }

    /// Local accounts followed by the external signer's accounts, if one is
    /// connected. A failing external signer is logged and skipped, not
    /// propagated -- `getAccounts` is a best-effort inventory, not a
    /// capability check.
    pub async fn get_accounts(&self) -> Vec<Address> {
        let mut accounts = self.key_holder.get_accounts().await;
        if let Some(signer) = &self.connections.read().await.external_signer {
            match signer.accounts().await {
                Ok(mut external) => accounts.append(&mut external),
                Err(e) => warn!(error = %e, "external signer accounts() failed"),
            }
        }
        accounts
    }

    pub async fn get_capabilities(&self) -> Capabilities {
        let state = self.state.read().await;
        let connections = self.connections.read().await;
        let local_accounts = self.key_holder.get_accounts().await;
        Capabilities {
            keyring_initialised: !local_accounts.is_empty(),
            local_account_count: local_accounts.len(),
            provider_configured: state.chain_config.is_some(),
            bundler_configured: state.bundler_config.is_some(),
            smart_account_configured: state.smart_account_config.is_some(),
            external_signer_connected: connections.external_signer.is_some(),
            peer_connected: connections.peer.is_some(),
        }
    }

    // -- signing-strategy resolution (design §4.5a) ------------------------

    async fn sign_transaction_via_strategy(&self, tx: TransactionRequest) -> WalletResult<SignedTransaction> {
        if self.key_holder.get_accounts().await.contains(&tx.from) {
            return self.key_holder.sign_transaction(tx).await;
        }
        let connections = self.connections.read().await;
        if let Some(signer) = &connections.external_signer {
            let raw = signer.sign_transaction(tx).await?;
            return Ok(SignedTransaction::from_raw(raw));
        }
        if let Some(peer) = &connections.peer {
            let raw = peer.handle_signing_request(SigningRequest::Transaction(tx)).await?;
            return Ok(SignedTransaction::from_raw(raw));
        }
        Err(WalletError::NoAuthority("transaction".to_string()))
    }

    async fn sign_typed_data_via_strategy(&self, signing_hash: B256) -> WalletResult<Bytes> {
        if !self.key_holder.get_accounts().await.is_empty() {
            return self.key_holder.sign_typed_data(signing_hash).await;
        }
        let connections = self.connections.read().await;
        if let Some(signer) = &connections.external_signer {
            return signer.sign_typed_data(signing_hash).await;
        }
        if let Some(peer) = &connections.peer {
            return peer
                .handle_signing_request(SigningRequest::TypedData { signing_hash })
                .await;
        }
        Err(WalletError::NoAuthority("typed data".to_string()))
    }

    async fn sign_message_via_strategy(&self, text: &str, from: Option<Address>) -> WalletResult<Bytes> {
        if !self.key_holder.get_accounts().await.is_empty() {
            return self.key_holder.sign_message(text, from).await;
        }
        let connections = self.connections.read().await;
        if let Some(signer) = &connections.external_signer {
            return signer.sign_message(text, from).await;
        }
        if let Some(peer) = &connections.peer {
            return peer
                .handle_signing_request(SigningRequest::Message {
                    text: text.to_string(),
                    from,
                })
                .await;
        }
        Err(WalletError::NoAuthority("message".to_string()))
    }

    /// Raw-hash requests that fall through to a remote signer are forwarded
    /// via the message path, carrying the hash's hex text (design §4.5a):
    /// neither an external provider nor a peer is assumed to expose a raw,
    /// EIP-191-less signing primitive.
    async fn sign_raw_hash_via_strategy(&self, hash: B256) -> WalletResult<Bytes> {
        if !self.key_holder.get_accounts().await.is_empty() {
            return self.key_holder.sign_hash(hash, None).await;
        }
        let text = hash.to_string();
        let connections = self.connections.read().await;
        if let Some(signer) = &connections.external_signer {
            return signer.sign_message(&text, None).await;
        }
        if let Some(peer) = &connections.peer {
            return peer
                .handle_signing_request(SigningRequest::Message { text, from: None })
                .await;
        }
        Err(WalletError::NoAuthority("raw hash".to_string()))
    }

    pub async fn sign_transaction(&self, tx: TransactionRequest) -> WalletResult<SignedTransaction> {
        self.sign_transaction_via_strategy(tx).await
    }

    pub async fn sign_typed_data(&self, signing_hash: B256) -> WalletResult<Bytes> {
        self.sign_typed_data_via_strategy(signing_hash).await
    }

    pub async fn sign_message(&self, text: &str, from: Option<Address>) -> WalletResult<Bytes> {
        self.sign_message_via_strategy(text, from).await
    }

    /// The peer-facing entrypoint other wallet instances call through
    /// [`crate::peer::PeerWallet::handle_signing_request`]. Only the local
    /// key is consulted here -- honoring a peer's request by forwarding it
    /// again to *our own* external signer or peer would extend trust this
    /// wallet never agreed to, and risks a forwarding loop between two
    /// coordinators that have connected each other as peers.
    pub async fn handle_signing_request(&self, request: SigningRequest) -> WalletResult<Bytes> {
        match request {
            SigningRequest::Transaction(tx) => {
                if !self.key_holder.get_accounts().await.contains(&tx.from) {
                    return Err(WalletError::NoAuthority("transaction".to_string()));
                }
                Ok(self.key_holder.sign_transaction(tx).await?.raw)
            }
            SigningRequest::TypedData { signing_hash } => self.key_holder.sign_typed_data(signing_hash).await,
            SigningRequest::Message { text, from } => self.key_holder.sign_message(&text, from).await,
        }
    }

    // -- delegations --------------------------------------------------------

    /// `createDelegation` (design §4.5b): picks a delegator, creates the
    /// pending delegation, signs its typed-data payload via the resolved
    /// strategy, and stores the signed result.
    pub async fn create_delegation(
        &self,
        delegate: Address,
        caveats: Vec<Caveat>,
        chain_id: u64,
        salt: Option<U256>,
        authority: Option<B256>,
    ) -> WalletResult<Delegation> {
        let delegator = self.pick_delegator().await?;
        let pending = self
            .authority
            .create(delegator, delegate, caveats, chain_id, salt, authority)
            .await?;
        let typed_data = self.authority.prepare_for_signing(pending.id).await?;
        let signature = self.sign_typed_data_via_strategy(typed_data.signing_hash()).await?;
        let signed = self.authority.store_signed(pending.id, signature).await?;
        debug!(id = %signed.id, %delegator, %delegate, "created delegation");
        Ok(signed)
    }

    async fn pick_delegator(&self) -> WalletResult<Address> {
        if let Some(smart_account) = &self.state.read().await.smart_account_config {
            return Ok(smart_account.address);
        }
        if let Some(first) = self.key_holder.get_accounts().await.first() {
            return Ok(*first);
        }
        if let Some(signer) = &self.connections.read().await.external_signer {
            let accounts = signer.accounts().await?;
            if let Some(first) = accounts.first() {
                return Ok(*first);
            }
        }
        Err(WalletError::NoAuthority("no accounts available".to_string()))
    }

    pub async fn receive_delegation(&self, delegation: Delegation) -> WalletResult<Delegation> {
        self.authority.receive(delegation).await
    }

    pub async fn revoke_delegation(&self, id: B256) -> WalletResult<Delegation> {
        self.authority.revoke(id).await
    }

    pub async fn list_delegations(&self) -> Vec<Delegation> {
        self.authority.list().await
    }

    // -- UserOp pipeline (design §4.5c) ------------------------------------

    fn chain_id(&self, state: &PersistedCoordinatorState) -> WalletResult<u64> {
        state
            .chain_config
            .as_ref()
            .map(|c| c.chain_id)
            .ok_or_else(|| WalletError::ConfigurationInvalid("chain not configured".to_string()))
    }

    /// `submitDelegationUserOp(chain, execution, fees?)`: the nine-step
    /// pipeline from design §4.5c. `chain` is in leaf-to-root order; the
    /// sender is the leaf's `delegate`.
    pub async fn submit_delegation_user_op(
        &self,
        chain: &[Delegation],
        execution: Execution,
        fees: Option<GasFees>,
    ) -> WalletResult<B256> {
        let state = self.state.read().await;
        let bundler_config = state
            .bundler_config
            .clone()
            .ok_or_else(|| WalletError::ConfigurationInvalid("bundler not configured".to_string()))?;
        let chain_id = self.chain_id(&state)?;
        drop(state);

        let fees = match fees {
            Some(fees) => fees,
            None => self.gateway.get_gas_fees().await?,
        };

        let leaf = chain
            .first()
            .ok_or_else(|| WalletError::ValidationFailed("delegation chain is empty".to_string()))?;
        let sender = leaf.delegate;

        let nonce = self
            .gateway
            .get_entry_point_nonce(bundler_config.entry_point, sender, None)
            .await?;

        let call_data = encode_redeem_call_data(chain, self.delegation_manager, &execution)?;

        let mut op = UserOperation {
            sender,
            nonce,
            factory: None,
            factory_data: None,
            call_data,
            call_gas_limit: U256::from(PLACEHOLDER_CALL_GAS_LIMIT),
            verification_gas_limit: U256::from(PLACEHOLDER_VERIFICATION_GAS_LIMIT),
            pre_verification_gas: U256::from(PLACEHOLDER_PRE_VERIFICATION_GAS),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: Bytes::new(),
        };

        let estimate = self
            .gateway
            .estimate_user_op_gas(&bundler_config.bundler_url, bundler_config.entry_point, &op)
            .await?;
        op.call_gas_limit = estimate.call_gas_limit;
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.pre_verification_gas = estimate.pre_verification_gas;

        let hash = compute_user_op_hash(&op, bundler_config.entry_point, chain_id);
        op.signature = self.sign_raw_hash_via_strategy(hash).await?;

        let submitted = self
            .gateway
            .submit_user_op(&bundler_config.bundler_url, bundler_config.entry_point, &op)
            .await?;
        info!(user_op_hash = %submitted, sender = %sender, "submitted delegation UserOp");
        Ok(submitted)
    }

    /// `redeemDelegation` (design §4.5d): resolves one of an explicit chain,
    /// a delegation id, or an action into a concrete chain, validates every
    /// delegation in it is signed, then submits the UserOp.
    pub async fn redeem_delegation(&self, request: RedeemRequest, execution: Execution) -> WalletResult<B256> {
        let chain = self.resolve_redeem_chain(request).await?;
        for delegation in &chain {
            if delegation.status != DelegationStatus::Signed {
                return Err(WalletError::InvalidState(format!(
                    "delegation {} is '{}', expected signed",
                    delegation.id,
                    status_name(delegation.status)
                )));
            }
        }
        self.submit_delegation_user_op(&chain, execution, None).await
    }

    async fn resolve_redeem_chain(&self, request: RedeemRequest) -> WalletResult<Vec<Delegation>> {
        if let Some(chain) = request.chain {
            return Ok(chain);
        }
        if let Some(id) = request.id {
            return Ok(vec![self.authority.get(id).await?]);
        }
        if let Some(action) = request.action {
            return self
                .authority
                .find_for_action(&action, request.chain_id, self.clock.as_ref())
                .await
                .map(|d| vec![d])
                .ok_or_else(|| WalletError::NotFound("no matching delegation found".to_string()));
        }
        Err(WalletError::ValidationFailed(
            "must provide one of: delegation chain, delegation id, or action".to_string(),
        ))
    }

    /// `sendTransaction` (design §4.5e): redeems through a matching signed
    /// delegation when a bundler is configured and one covers the action,
    /// otherwise signs and broadcasts directly.
    pub async fn send_transaction(
        &self,
        action: Action,
        chain_id: Option<u64>,
    ) -> WalletResult<SendTransactionOutcome> {
        let bundler_configured = self.state.read().await.bundler_config.is_some();
        if bundler_configured {
            if let Some(delegation) = self
                .authority
                .find_for_action(&action, chain_id, self.clock.as_ref())
                .await
            {
                let execution = Execution::new(action.to, action.value_or_zero(), action.data.clone().unwrap_or_default());
                let hash = self.submit_delegation_user_op(&[delegation], execution, None).await?;
                return Ok(SendTransactionOutcome::UserOp(hash));
            }
        }
        let hash = self.sign_and_broadcast(action, chain_id).await?;
        Ok(SendTransactionOutcome::Transaction(hash))
    }

    async fn sign_and_broadcast(&self, action: Action, chain_id: Option<u64>) -> WalletResult<B256> {
        let from = self.pick_delegator().await?;
        let state = self.state.read().await;
        let chain_id = chain_id
            .or_else(|| state.chain_config.as_ref().map(|c| c.chain_id))
            .ok_or_else(|| WalletError::ConfigurationInvalid("chain not configured".to_string()))?;
        drop(state);

        let nonce = self.gateway.get_nonce(from).await?;
        let fees = self.gateway.get_gas_fees().await?;
        let request = TransactionRequest {
            from,
            to: Some(action.to),
            value: action.value_or_zero(),
            data: action.data.clone().unwrap_or_default(),
            nonce,
            chain_id,
            gas_limit: PLACEHOLDER_CALL_GAS_LIMIT,
            gas_price: None,
            max_fee_per_gas: Some(fees.max_fee_per_gas.to::<u128>()),
            max_priority_fee_per_gas: Some(fees.max_priority_fee_per_gas.to::<u128>()),
            authorization_list: None,
        };
        let signed = self.sign_transaction_via_strategy(request).await?;
        self.gateway.broadcast_transaction(&signed.raw).await
    }

    /// `waitForUserOpReceipt(hash, interval, timeout)` (design §4.5f).
    pub async fn wait_for_user_op_receipt(
        &self,
        hash: B256,
        interval: Duration,
        timeout: Duration,
    ) -> WalletResult<Value> {
        let bundler_config = self
            .state
            .read()
            .await
            .bundler_config
            .clone()
            .ok_or_else(|| WalletError::ConfigurationInvalid("bundler not configured".to_string()))?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(receipt) = self
                .gateway
                .get_user_op_receipt(&bundler_config.bundler_url, hash)
                .await?
            {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(WalletError::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use delegator_codec::storage::InMemoryStore;
    use delegator_codec::ROOT_AUTHORITY;

    fn manager() -> Address {
        address!("0x9999999999999999999999999999999999999999")
    }

    async fn initialised_coordinator() -> Coordinator<InMemoryStore> {
        let coordinator = Coordinator::new(Arc::new(InMemoryStore::new()), manager());
        coordinator
            .initialize_keyring(InitOptions::Ephemeral)
            .await
            .unwrap();
        coordinator
    }

    #[tokio::test]
    async fn create_delegation_signs_with_local_key_and_stores_signed() {
        let coordinator = initialised_coordinator().await;
        let delegator = coordinator.get_accounts().await[0];
        let delegate = address!("0x2222222222222222222222222222222222222222");

        let delegation = coordinator
            .create_delegation(delegate, vec![], 1, None, None)
            .await
            .unwrap();

        assert_eq!(delegation.delegator, delegator);
        assert_eq!(delegation.status, DelegationStatus::Signed);
        assert!(delegation.signature.is_some());
        assert_eq!(delegation.authority, ROOT_AUTHORITY);
    }

    #[tokio::test]
    async fn redeem_delegation_rejects_pending_status() {
        let coordinator = initialised_coordinator().await;
        let delegator = coordinator.get_accounts().await[0];
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let pending = coordinator
            .authority
            .create(delegator, delegate, vec![], 1, None, None)
            .await
            .unwrap();

        let request = RedeemRequest {
            id: Some(pending.id),
            ..Default::default()
        };
        let execution = Execution::new(delegate, U256::ZERO, Bytes::new());
        let err = coordinator.redeem_delegation(request, execution).await.unwrap_err();
        assert!(err.to_string().contains("pending"));
        assert!(err.to_string().contains("expected signed"));
    }

    #[tokio::test]
    async fn redeem_delegation_without_bundler_fails_not_configured() {
        let coordinator = initialised_coordinator().await;
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let delegation = coordinator
            .create_delegation(delegate, vec![], 1, None, None)
            .await
            .unwrap();

        let request = RedeemRequest {
            id: Some(delegation.id),
            ..Default::default()
        };
        let execution = Execution::new(delegate, U256::ZERO, Bytes::new());
        let err = coordinator.redeem_delegation(request, execution).await.unwrap_err();
        assert!(err.to_string().contains("bundler not configured"));
    }

    #[tokio::test]
    async fn redeem_delegation_by_action_reports_no_match() {
        let coordinator = initialised_coordinator().await;
        let stranger = address!("0x7777777777777777777777777777777777777777");
        let request = RedeemRequest {
            action: Some(Action::new(stranger)),
            ..Default::default()
        };
        let execution = Execution::new(stranger, U256::ZERO, Bytes::new());
        let err = coordinator.redeem_delegation(request, execution).await.unwrap_err();
        assert!(err.to_string().contains("no matching delegation found"));
    }

    #[tokio::test]
    async fn redeem_delegation_with_no_route_rejects() {
        let coordinator = initialised_coordinator().await;
        let execution = Execution::new(Address::ZERO, U256::ZERO, Bytes::new());
        let err = coordinator
            .redeem_delegation(RedeemRequest::default(), execution)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must provide one of"));
    }

    #[tokio::test]
    async fn signing_strategy_fails_with_no_authority_when_nothing_configured() {
        let coordinator = Coordinator::new(Arc::new(InMemoryStore::new()), manager());
        let err = coordinator
            .sign_message("hello", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), delegator_codec::error::ErrorKind::NoAuthority);
    }

    #[tokio::test]
    async fn get_capabilities_reflects_wiring() {
        let coordinator = initialised_coordinator().await;
        let capabilities = coordinator.get_capabilities().await;
        assert!(capabilities.keyring_initialised);
        assert_eq!(capabilities.local_account_count, 1);
        assert!(!capabilities.bundler_configured);
        assert!(!capabilities.external_signer_connected);
    }

    #[tokio::test]
    async fn create_smart_account_is_deterministic_for_same_inputs() {
        let coordinator = initialised_coordinator().await;
        let owner = coordinator.get_accounts().await[0];
        let salt = U256::from(7u64);
        let a = coordinator
            .create_smart_account(SmartAccountKind::Hybrid, owner, salt)
            .await
            .unwrap();
        let b = coordinator
            .create_smart_account(SmartAccountKind::Hybrid, owner, salt)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(coordinator.get_smart_account_address().await.unwrap(), a);
    }
}
