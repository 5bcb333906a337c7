//! Delegation identity, lifecycle, EIP-712 signing payload, and the ABI
//! tuple used as the `redeemDelegations` permission context (design §3, §6).

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

use crate::caveat::Caveat;
use crate::error::WalletError;

/// The all-ones sentinel marking a delegation with no parent (design §6).
pub const ROOT_AUTHORITY: B256 = B256::repeat_byte(0xff);

/// A delegation's position in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Pending,
    Signed,
    Revoked,
}

/// A signed authorization token from `delegator` to `delegate`, carrying
/// caveats. Records are immutable in shape: lifecycle transitions
/// ([`Delegation::finalize`], [`Delegation::revoke`]) produce new records
/// sharing the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: B256,
    pub delegator: Address,
    pub delegate: Address,
    pub authority: B256,
    pub caveats: Vec<Caveat>,
    pub salt: U256,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Bytes>,
    pub status: DelegationStatus,
}

/// `id == keccak256(packed(delegator, delegate, authority, salt))`, where
/// `salt` is packed as a 32-byte big-endian uint256. This is
/// `abi.encodePacked`, not `abi.encode` -- addresses contribute 20 bytes
/// each, not 32.
pub fn derive_delegation_id(delegator: Address, delegate: Address, authority: B256, salt: U256) -> B256 {
    let mut packed = Vec::with_capacity(20 + 20 + 32 + 32);
    packed.extend_from_slice(delegator.as_slice());
    packed.extend_from_slice(delegate.as_slice());
    packed.extend_from_slice(authority.as_slice());
    packed.extend_from_slice(&salt.to_be_bytes::<32>());
    keccak256(packed)
}

impl Delegation {
    /// Construct a new `pending` delegation, deriving its id from the
    /// identity fields.
    pub fn new_pending(
        delegator: Address,
        delegate: Address,
        authority: B256,
        caveats: Vec<Caveat>,
        salt: U256,
        chain_id: u64,
    ) -> Self {
        let id = derive_delegation_id(delegator, delegate, authority, salt);
        Self {
            id,
            delegator,
            delegate,
            authority,
            caveats,
            salt,
            chain_id,
            signature: None,
            status: DelegationStatus::Pending,
        }
    }

    /// Recompute and check this delegation's id against its own fields.
    /// Used to validate delegations received from a peer (they carry their
    /// own claimed `id`, which must match).
    pub fn recompute_id(&self) -> B256 {
        derive_delegation_id(self.delegator, self.delegate, self.authority, self.salt)
    }

    /// `pending -> signed`. The input `self` is left unchanged; the caller
    /// receives a new record with the signature attached.
    pub fn finalize(&self, signature: Bytes) -> Result<Delegation, WalletError> {
        if self.status != DelegationStatus::Pending {
            return Err(WalletError::invalid_state(status_name(self.status), "pending"));
        }
        let mut next = self.clone();
        next.signature = Some(signature);
        next.status = DelegationStatus::Signed;
        Ok(next)
    }

    /// `signed | pending -> revoked` (terminal).
    pub fn revoke(&self) -> Result<Delegation, WalletError> {
        if self.status == DelegationStatus::Revoked {
            return Err(WalletError::invalid_state("revoked", "signed or pending"));
        }
        let mut next = self.clone();
        next.status = DelegationStatus::Revoked;
        Ok(next)
    }
}

pub fn status_name(status: DelegationStatus) -> &'static str {
    match status {
        DelegationStatus::Pending => "pending",
        DelegationStatus::Signed => "signed",
        DelegationStatus::Revoked => "revoked",
    }
}

// ---------------------------------------------------------------------
// EIP-712 typed-data signing payload
// ---------------------------------------------------------------------

sol! {
    /// The EIP-712 `Caveat` type (design §6). Shared by the typed-data
    /// struct below and the ABI permission-context tuple further down --
    /// the two encodings happen to agree on this inner shape.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Caveat712 {
        address enforcer;
        bytes terms;
    }

    /// The EIP-712 `Delegation` type signed by the delegator. Notably
    /// excludes `signature` and `chainId` (the latter lives in the domain).
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Delegation712 {
        address delegate;
        address delegator;
        bytes32 authority;
        Caveat712[] caveats;
        uint256 salt;
    }
}

impl From<&Caveat> for Caveat712 {
    fn from(caveat: &Caveat) -> Self {
        Caveat712 {
            enforcer: caveat.enforcer,
            terms: caveat.terms.clone(),
        }
    }
}

impl From<&Delegation> for Delegation712 {
    fn from(delegation: &Delegation) -> Self {
        Delegation712 {
            delegate: delegation.delegate,
            delegator: delegation.delegator,
            authority: delegation.authority,
            caveats: delegation.caveats.iter().map(Caveat712::from).collect(),
            salt: delegation.salt,
        }
    }
}

/// The EIP-712 domain for the `DelegationManager`, per design §6.
pub fn delegation_manager_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    eip712_domain! {
        name: "DelegationManager",
        version: "1",
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// A ready-to-sign EIP-712 payload: the raw 32-byte signing hash plus the
/// domain/struct it was derived from, so a caller (or UI) can re-render the
/// human-readable form if needed.
#[derive(Debug, Clone)]
pub struct DelegationTypedData {
    pub domain: Eip712Domain,
    pub message: Delegation712,
}

impl DelegationTypedData {
    pub fn for_delegation(delegation: &Delegation, verifying_contract: Address) -> Self {
        Self {
            domain: delegation_manager_domain(delegation.chain_id, verifying_contract),
            message: Delegation712::from(delegation),
        }
    }

    /// The 32-byte digest the Key Holder is asked to sign (raw ECDSA, no
    /// EIP-191 envelope, since the DelegationManager verifies EIP-712
    /// signatures directly).
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }
}

// ---------------------------------------------------------------------
// ABI permission-context tuple
// ---------------------------------------------------------------------

sol! {
    /// The ABI tuple passed as one element of `redeemDelegations`'
    /// `permissionContexts` array (design §6): a delegation *with* its
    /// signature attached, unlike [`Delegation712`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DelegationAbiTuple {
        address delegate;
        address delegator;
        bytes32 authority;
        Caveat712[] caveats;
        uint256 salt;
        bytes signature;
    }
}

impl TryFrom<&Delegation> for DelegationAbiTuple {
    type Error = WalletError;

    fn try_from(delegation: &Delegation) -> Result<Self, Self::Error> {
        let signature = delegation.signature.clone().ok_or_else(|| {
            WalletError::InvalidState("delegation has no signature".to_string())
        })?;
        Ok(DelegationAbiTuple {
            delegate: delegation.delegate,
            delegator: delegation.delegator,
            authority: delegation.authority,
            caveats: delegation.caveats.iter().map(Caveat712::from).collect(),
            salt: delegation.salt,
            signature,
        })
    }
}

/// ABI-encode a delegation chain (leaf-to-root order) as the
/// `Delegation[]` bytes expected for one element of `permissionContexts`.
pub fn encode_permission_context(chain: &[Delegation]) -> Result<Bytes, WalletError> {
    use alloy_sol_types::SolValue;
    let tuples: Vec<DelegationAbiTuple> = chain
        .iter()
        .map(DelegationAbiTuple::try_from)
        .collect::<Result<_, _>>()?;
    Ok(tuples.abi_encode().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveat::CaveatKind;
    use alloy_primitives::address;

    fn delegation_with(salt: U256) -> Delegation {
        Delegation::new_pending(
            address!("0x1111111111111111111111111111111111111111"),
            Address::ZERO,
            ROOT_AUTHORITY,
            vec![],
            salt,
            1,
        )
    }

    #[test]
    fn id_matches_content_address() {
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let salt = U256::from(1u64);
        let d = Delegation::new_pending(delegator, delegate, ROOT_AUTHORITY, vec![], salt, 1);
        assert_eq!(d.id, derive_delegation_id(delegator, delegate, ROOT_AUTHORITY, salt));

        // Tampering with delegate changes the id.
        let other = Delegation::new_pending(
            delegator,
            address!("0x3333333333333333333333333333333333333333"),
            ROOT_AUTHORITY,
            vec![],
            salt,
            1,
        );
        assert_ne!(d.id, other.id);
    }

    #[test]
    fn lifecycle_finalize_preserves_identity_and_is_immutable() {
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let d = Delegation::new_pending(delegator, delegate, ROOT_AUTHORITY, vec![], U256::from(1u64), 1);
        assert_eq!(d.status, DelegationStatus::Pending);
        assert!(d.signature.is_none());

        let signed = d.finalize(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])).unwrap();
        assert_eq!(signed.status, DelegationStatus::Signed);
        assert_eq!(signed.signature.as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
        assert_eq!(signed.id, d.id);

        // Original is untouched.
        assert_eq!(d.status, DelegationStatus::Pending);
        assert!(d.signature.is_none());
    }

    #[test]
    fn revoke_is_terminal() {
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let d = Delegation::new_pending(delegator, Address::ZERO, ROOT_AUTHORITY, vec![], U256::from(1u64), 1);
        let signed = d.finalize(Bytes::from_static(&[1, 2, 3])).unwrap();
        let revoked = signed.revoke().unwrap();
        assert_eq!(revoked.status, DelegationStatus::Revoked);
        assert!(revoked.revoke().is_err());
    }

    #[test]
    fn permission_context_encodes_caveats_and_signature() {
        let delegator = address!("0x1111111111111111111111111111111111111111");
        let delegate = address!("0x2222222222222222222222222222222222222222");
        let caveats = vec![Caveat::new(
            address!("0x3333333333333333333333333333333333333333"),
            Bytes::from_static(&[1, 2, 3, 4]),
            CaveatKind::AllowedTargets,
        )];
        let d = Delegation::new_pending(delegator, delegate, ROOT_AUTHORITY, caveats, U256::from(7u64), 1);
        let signed = d.finalize(Bytes::from_static(&[0xaa; 65])).unwrap();
        let encoded = encode_permission_context(std::slice::from_ref(&signed)).unwrap();
        assert!(!encoded.is_empty());
    }

    #[test]
    fn typed_data_signing_hash_is_deterministic() {
        let d = delegation_with(U256::from(1u64));
        let verifying_contract = address!("0x4444444444444444444444444444444444444444");
        let a = DelegationTypedData::for_delegation(&d, verifying_contract).signing_hash();
        let b = DelegationTypedData::for_delegation(&d, verifying_contract).signing_hash();
        assert_eq!(a, b);
    }
}
