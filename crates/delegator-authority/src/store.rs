//! The Authority Store: the sole owner of the delegation set (design §4.2).
//! Holds a keyed map `id -> Delegation`, fully persisted and rehydrated as a
//! flat list so insertion order -- which `find_for_action` depends on --
//! survives a restart.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use delegator_codec::action::Action;
use delegator_codec::caveat::Caveat;
use delegator_codec::delegation::{Delegation, DelegationStatus, DelegationTypedData, ROOT_AUTHORITY};
use delegator_codec::error::{WalletError, WalletResult};
use delegator_codec::storage::DurableStore;
use delegator_codec::time::Clock;
use delegator_codec::{generate_salt, matches_action};
use tokio::sync::RwLock;
use tracing::debug;

const STORAGE_KEY: &str = "authority:delegations";

/// Owns the delegation set. Cheap to hold behind an `Arc`; every mutating
/// operation persists the full set immediately afterward (design §4.2
/// "Durable state").
pub struct AuthorityStore<S: DurableStore> {
    store: Arc<S>,
    verifying_contract: Address,
    delegations: RwLock<Vec<Delegation>>,
}

impl<S: DurableStore> AuthorityStore<S> {
    /// `verifying_contract` is the `DelegationManager` address embedded in
    /// every EIP-712 payload this store prepares (design §4.2
    /// `prepareForSigning`).
    pub fn new(store: Arc<S>, verifying_contract: Address) -> Self {
        Self {
            store,
            verifying_contract,
            delegations: RwLock::new(Vec::new()),
        }
    }

    /// Reconstruct the store from its persisted serialized map.
    pub async fn load(store: Arc<S>, verifying_contract: Address) -> WalletResult<Self> {
        let authority = Self::new(store, verifying_contract);
        if let Some(bytes) = authority.store.get_bytes(STORAGE_KEY).await? {
            let delegations: Vec<Delegation> = serde_json::from_slice(&bytes)
                .map_err(|e| WalletError::ConfigurationInvalid(format!("deserializing delegation set: {e}")))?;
            *authority.delegations.write().await = delegations;
        }
        Ok(authority)
    }

    async fn persist(&self, delegations: &[Delegation]) -> WalletResult<()> {
        let bytes = serde_json::to_vec(delegations)
            .map_err(|e| WalletError::ConfigurationInvalid(format!("serializing delegation set: {e}")))?;
        self.store.put_bytes(STORAGE_KEY, bytes).await
    }

    /// `create(delegator, delegate, caveats, chainId, salt?, authority?)`.
    /// Derives `salt` from a cryptographically strong source and `authority
    /// = ROOT` when not supplied.
    pub async fn create(
        &self,
        delegator: Address,
        delegate: Address,
        caveats: Vec<Caveat>,
        chain_id: u64,
        salt: Option<U256>,
        authority: Option<B256>,
    ) -> WalletResult<Delegation> {
        let delegation = Delegation::new_pending(
            delegator,
            delegate,
            authority.unwrap_or(ROOT_AUTHORITY),
            caveats,
            salt.unwrap_or_else(generate_salt),
            chain_id,
        );
        let mut delegations = self.delegations.write().await;
        delegations.push(delegation.clone());
        self.persist(&delegations).await?;
        debug!(id = %delegation.id, %delegator, %delegate, "created pending delegation");
        Ok(delegation)
    }

    /// `prepareForSigning(id)`: the EIP-712 payload with the configured
    /// verifying-contract address.
    pub async fn prepare_for_signing(&self, id: B256) -> WalletResult<DelegationTypedData> {
        let delegation = self.get(id).await?;
        Ok(DelegationTypedData::for_delegation(&delegation, self.verifying_contract))
    }

    /// `storeSigned(id, signature)`: `pending -> signed`.
    pub async fn store_signed(&self, id: B256, signature: Bytes) -> WalletResult<Delegation> {
        let mut delegations = self.delegations.write().await;
        let index = index_of(&delegations, id)?;
        let signed = delegations[index].finalize(signature)?;
        delegations[index] = signed.clone();
        self.persist(&delegations).await?;
        Ok(signed)
    }

    /// `receive(delegation)`: import a signed delegation from a peer.
    /// Recomputes the id and rejects on mismatch; does not verify the
    /// signature cryptographically (design §4.2 -- authoritative
    /// verification happens on-chain at redemption time, since a smart
    /// account delegator's signature recovers to its EOA owner, not the
    /// smart account itself).
    pub async fn receive(&self, delegation: Delegation) -> WalletResult<Delegation> {
        if delegation.status != DelegationStatus::Signed {
            return Err(WalletError::ValidationFailed(format!(
                "received delegation {} is not signed",
                delegation.id
            )));
        }
        if delegation.signature.is_none() {
            return Err(WalletError::ValidationFailed(format!(
                "received delegation {} has no signature",
                delegation.id
            )));
        }
        if delegation.recompute_id() != delegation.id {
            return Err(WalletError::ValidationFailed(format!(
                "received delegation {}: id mismatch",
                delegation.id
            )));
        }
        let mut delegations = self.delegations.write().await;
        match delegations.iter_mut().find(|d| d.id == delegation.id) {
            Some(existing) => *existing = delegation.clone(),
            None => delegations.push(delegation.clone()),
        }
        self.persist(&delegations).await?;
        Ok(delegation)
    }

    /// `findForAction(action, chainId?)`: the first delegation, in insertion
    /// order, matching `chainId` (if supplied) whose matcher permits
    /// `action`.
    pub async fn find_for_action(
        &self,
        action: &Action,
        chain_id: Option<u64>,
        clock: &dyn Clock,
    ) -> Option<Delegation> {
        let delegations = self.delegations.read().await;
        delegations
            .iter()
            .find(|d| {
                chain_id.is_none_or(|wanted| d.chain_id == wanted) && matches_action(d, action, clock).permits()
            })
            .cloned()
    }

    pub async fn get(&self, id: B256) -> WalletResult<Delegation> {
        let delegations = self.delegations.read().await;
        delegations
            .get(index_of(&delegations, id)?)
            .cloned()
            .ok_or_else(|| WalletError::not_found_id(id))
    }

    pub async fn list(&self) -> Vec<Delegation> {
        self.delegations.read().await.clone()
    }

    /// `revoke(id)`: transitions to terminal `revoked`.
    pub async fn revoke(&self, id: B256) -> WalletResult<Delegation> {
        let mut delegations = self.delegations.write().await;
        let index = index_of(&delegations, id)?;
        let revoked = delegations[index].revoke()?;
        delegations[index] = revoked.clone();
        self.persist(&delegations).await?;
        Ok(revoked)
    }
}

fn index_of(delegations: &[Delegation], id: B256) -> WalletResult<usize> {
    delegations
        .iter()
        .position(|d| d.id == id)
        .ok_or_else(|| WalletError::not_found_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use delegator_codec::storage::InMemoryStore;
    use delegator_codec::time::FixedClock;

    fn manager() -> Address {
        address!("0x9999999999999999999999999999999999999999")
    }

    #[tokio::test]
    async fn create_derives_salt_and_root_authority_by_default() {
        let authority = AuthorityStore::new(Arc::new(InMemoryStore::new()), manager());
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let d = authority.create(delegator, delegate, vec![], 1, None, None).await.unwrap();
        assert_eq!(d.authority, ROOT_AUTHORITY);
        assert_eq!(d.status, DelegationStatus::Pending);
    }

    #[tokio::test]
    async fn store_signed_transitions_and_persists() {
        let store = Arc::new(InMemoryStore::new());
        let authority = AuthorityStore::new(store.clone(), manager());
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let pending = authority.create(delegator, delegate, vec![], 1, None, None).await.unwrap();

        let signed = authority
            .store_signed(pending.id, Bytes::from_static(&[0xaa; 65]))
            .await
            .unwrap();
        assert_eq!(signed.status, DelegationStatus::Signed);

        let reloaded = AuthorityStore::load(store, manager()).await.unwrap();
        let fetched = reloaded.get(pending.id).await.unwrap();
        assert_eq!(fetched.status, DelegationStatus::Signed);
    }

    #[tokio::test]
    async fn receive_rejects_id_mismatch() {
        let authority = AuthorityStore::new(Arc::new(InMemoryStore::new()), manager());
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let mut tampered = Delegation::new_pending(delegator, delegate, ROOT_AUTHORITY, vec![], U256::from(1u64), 1)
            .finalize(Bytes::from_static(&[0xaa; 65]))
            .unwrap();
        tampered.delegate = address!("0x3333333333333333333333333333333333333333");
        let err = authority.receive(tampered).await.unwrap_err();
        assert_eq!(err.kind(), delegator_codec::error::ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn find_for_action_respects_insertion_order_and_chain_filter() {
        let authority = AuthorityStore::new(Arc::new(InMemoryStore::new()), manager());
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let first = authority
            .create(delegator, delegate, vec![], 1, None, None)
            .await
            .unwrap();
        authority
            .store_signed(first.id, Bytes::from_static(&[0xaa; 65]))
            .await
            .unwrap();
        let second = authority
            .create(delegator, delegate, vec![], 2, None, None)
            .await
            .unwrap();
        authority
            .store_signed(second.id, Bytes::from_static(&[0xaa; 65]))
            .await
            .unwrap();

        let action = Action::new(delegate);
        let clock = FixedClock(0);
        let found = authority.find_for_action(&action, Some(2), &clock).await.unwrap();
        assert_eq!(found.id, second.id);
    }

    #[tokio::test]
    async fn revoke_is_terminal() {
        let authority = AuthorityStore::new(Arc::new(InMemoryStore::new()), manager());
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let pending = authority.create(delegator, delegate, vec![], 1, None, None).await.unwrap();
        authority
            .store_signed(pending.id, Bytes::from_static(&[0xaa; 65]))
            .await
            .unwrap();
        authority.revoke(pending.id).await.unwrap();
        assert!(authority.revoke(pending.id).await.is_err());
    }
}
