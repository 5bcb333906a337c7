//! Caveat codec and matcher (design §4.1).
//!
//! Each [`CaveatKind`] has a fixed ABI shape for its `terms`. Encoders and
//! decoders are pure functions; the matcher is a conservative prefilter that
//! must never admit an action the on-chain enforcer would reject, but may
//! reject actions the enforcer would in fact accept (the caller simply picks
//! a different delegation in that case).

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::delegation::{Delegation, DelegationStatus};
use crate::error::WalletError;
use crate::time::Clock;

/// The closed set of caveat kinds this wallet understands. The `type` tag is
/// a client-side convenience for dispatch; the on-chain enforcer is
/// identified only by [`Caveat::enforcer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaveatKind {
    AllowedTargets,
    AllowedMethods,
    ValueLte,
    NativeTokenTransferAmount,
    Erc20TransferAmount,
    LimitedCalls,
    Timestamp,
}

impl CaveatKind {
    /// Whether this kind's on-chain rule tracks state this client cannot
    /// see, and therefore always permits (§4.1, §9 "pass-through caveats").
    pub fn is_pass_through(self) -> bool {
        matches!(
            self,
            CaveatKind::NativeTokenTransferAmount | CaveatKind::LimitedCalls
        )
    }
}

/// A single policy clause: an enforcer contract plus opaque ABI-encoded
/// terms, tagged with the kind used for client-side evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caveat {
    pub enforcer: Address,
    pub terms: Bytes,
    #[serde(rename = "type")]
    pub kind: CaveatKind,
}

impl Caveat {
    pub fn new(enforcer: Address, terms: Bytes, kind: CaveatKind) -> Self {
        Self {
            enforcer,
            terms,
            kind,
        }
    }
}

// ---------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------

pub fn encode_allowed_targets(targets: &[Address]) -> Bytes {
    targets.to_vec().abi_encode().into()
}

pub fn encode_allowed_methods(selectors: &[[u8; 4]]) -> Bytes {
    let fixed: Vec<alloy_primitives::FixedBytes<4>> =
        selectors.iter().map(|s| (*s).into()).collect();
    fixed.abi_encode().into()
}

pub fn encode_value_lte(max: U256) -> Bytes {
    max.abi_encode().into()
}

pub fn encode_native_token_transfer_amount(max: U256) -> Bytes {
    max.abi_encode().into()
}

pub fn encode_erc20_transfer_amount(token: Address, max: U256) -> Bytes {
    (token, max).abi_encode().into()
}

pub fn encode_limited_calls(max_calls: U256) -> Bytes {
    max_calls.abi_encode().into()
}

pub fn encode_timestamp(not_before: u128, not_after: u128) -> Bytes {
    (not_before, not_after).abi_encode().into()
}

// ---------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------

fn decode_err(kind: CaveatKind, detail: impl std::fmt::Display) -> WalletError {
    WalletError::ValidationFailed(format!("caveat {kind:?}: invalid terms ({detail})"))
}

pub fn decode_allowed_targets(terms: &[u8]) -> Result<Vec<Address>, WalletError> {
    Vec::<Address>::abi_decode(terms).map_err(|e| decode_err(CaveatKind::AllowedTargets, e))
}

pub fn decode_allowed_methods(terms: &[u8]) -> Result<Vec<[u8; 4]>, WalletError> {
    let decoded = Vec::<alloy_primitives::FixedBytes<4>>::abi_decode(terms)
        .map_err(|e| decode_err(CaveatKind::AllowedMethods, e))?;
    Ok(decoded.into_iter().map(|b| b.0).collect())
}

pub fn decode_value_lte(terms: &[u8]) -> Result<U256, WalletError> {
    U256::abi_decode(terms).map_err(|e| decode_err(CaveatKind::ValueLte, e))
}

pub fn decode_erc20_transfer_amount(terms: &[u8]) -> Result<(Address, U256), WalletError> {
    <(Address, U256)>::abi_decode(terms).map_err(|e| decode_err(CaveatKind::Erc20TransferAmount, e))
}

pub fn decode_timestamp(terms: &[u8]) -> Result<(u128, u128), WalletError> {
    <(u128, u128)>::abi_decode(terms).map_err(|e| decode_err(CaveatKind::Timestamp, e))
}

// ---------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------

/// The ERC-20 `transfer(address,uint256)` selector.
const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// The structured outcome of evaluating one caveat against one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaveatVerdict {
    Permit,
    Reject { failed_caveat: CaveatKind, reason: String },
}

impl CaveatVerdict {
    pub fn is_permit(&self) -> bool {
        matches!(self, CaveatVerdict::Permit)
    }

    fn reject(kind: CaveatKind, reason: impl Into<String>) -> Self {
        CaveatVerdict::Reject {
            failed_caveat: kind,
            reason: reason.into(),
        }
    }
}

/// Evaluate one caveat against one action. `now` is in whole seconds.
pub fn evaluate_caveat(caveat: &Caveat, action: &Action, now: u64) -> CaveatVerdict {
    if caveat.kind.is_pass_through() {
        return CaveatVerdict::Permit;
    }
    match caveat.kind {
        CaveatKind::AllowedTargets => {
            let targets = match decode_allowed_targets(&caveat.terms) {
                Ok(t) => t,
                Err(e) => return CaveatVerdict::reject(caveat.kind, e.to_string()),
            };
            if targets.iter().any(|t| *t == action.to) {
                CaveatVerdict::Permit
            } else {
                CaveatVerdict::reject(
                    caveat.kind,
                    format!("{} is not an allowed target", action.to),
                )
            }
        }
        CaveatKind::AllowedMethods => {
            // The caveat's presence alone does not reject an action with no
            // `data` -- the rule is only evaluated when `data` is present,
            // matching the on-chain enforcer's skip behaviour.
            let Some(selector) = action.selector() else {
                return CaveatVerdict::Permit;
            };
            let selectors = match decode_allowed_methods(&caveat.terms) {
                Ok(s) => s,
                Err(e) => return CaveatVerdict::reject(caveat.kind, e.to_string()),
            };
            if selectors.contains(&selector) {
                CaveatVerdict::Permit
            } else {
                CaveatVerdict::reject(
                    caveat.kind,
                    format!("selector 0x{} is not an allowed method", hex::encode(selector)),
                )
            }
        }
        CaveatKind::ValueLte => {
            let max = match decode_value_lte(&caveat.terms) {
                Ok(v) => v,
                Err(e) => return CaveatVerdict::reject(caveat.kind, e.to_string()),
            };
            if action.value_or_zero() <= max {
                CaveatVerdict::Permit
            } else {
                CaveatVerdict::reject(caveat.kind, format!("value exceeds max {max}"))
            }
        }
        CaveatKind::Erc20TransferAmount => {
            let (token, max) = match decode_erc20_transfer_amount(&caveat.terms) {
                Ok(v) => v,
                Err(e) => return CaveatVerdict::reject(caveat.kind, e.to_string()),
            };
            let Some(data) = action.data.as_ref() else {
                return CaveatVerdict::reject(caveat.kind, "incomplete calldata");
            };
            // selector(4) + address(32, padded) + uint256(32)
            if data.len() < 4 + 32 + 32 {
                return CaveatVerdict::reject(caveat.kind, "incomplete calldata");
            }
            if action.to != token {
                return CaveatVerdict::reject(caveat.kind, "token mismatch");
            }
            let selector = action.selector().expect("length already checked");
            if selector != ERC20_TRANSFER_SELECTOR {
                return CaveatVerdict::reject(caveat.kind, "not an ERC-20 transfer call");
            }
            let (_recipient, amount) = match <(Address, U256)>::abi_decode(&data[4..]) {
                Ok(v) => v,
                Err(e) => return CaveatVerdict::reject(caveat.kind, format!("malformed transfer calldata: {e}")),
            };
            if amount <= max {
                CaveatVerdict::Permit
            } else {
                CaveatVerdict::reject(caveat.kind, format!("transfer amount exceeds max {max}"))
            }
        }
        CaveatKind::Timestamp => {
            let (not_before, not_after) = match decode_timestamp(&caveat.terms) {
                Ok(v) => v,
                Err(e) => return CaveatVerdict::reject(caveat.kind, e.to_string()),
            };
            let now = now as u128;
            if now < not_before {
                CaveatVerdict::reject(caveat.kind, "before the allowed window")
            } else if now > not_after {
                CaveatVerdict::reject(caveat.kind, "after the allowed window")
            } else {
                CaveatVerdict::Permit
            }
        }
        CaveatKind::NativeTokenTransferAmount | CaveatKind::LimitedCalls => {
            unreachable!("pass-through kinds handled above")
        }
    }
}

/// Why a match attempt failed: either the delegation wasn't signed, or a
/// specific caveat rejected the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFailure {
    /// `None` when the delegation's status itself was the problem (never
    /// reached a caveat); `Some(kind)` names the rejecting caveat.
    pub failed_caveat: Option<CaveatKind>,
    pub reason: String,
}

/// The outcome of matching a full caveat list (or a whole delegation)
/// against an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub failed: Option<MatchFailure>,
}

impl MatchResult {
    pub fn permits(&self) -> bool {
        self.failed.is_none()
    }
}

/// Evaluate every caveat in `caveats` against `action`. Caveat order is
/// irrelevant -- the conjunction is commutative -- so this simply returns
/// the first rejection found, if any.
pub fn evaluate_caveats(caveats: &[Caveat], action: &Action, clock: &dyn Clock) -> MatchResult {
    let now = clock.now_unix_seconds();
    for caveat in caveats {
        if let CaveatVerdict::Reject {
            failed_caveat,
            reason,
        } = evaluate_caveat(caveat, action, now)
        {
            return MatchResult {
                failed: Some(MatchFailure {
                    failed_caveat: Some(failed_caveat),
                    reason,
                }),
            };
        }
    }
    MatchResult { failed: None }
}

/// A delegation matches an action iff `status == signed` and every caveat
/// permits it (design §4.2, §8 invariant). The boolean form is derived from
/// this structured form, not computed independently, so the two can never
/// disagree.
pub fn matches_action(delegation: &Delegation, action: &Action, clock: &dyn Clock) -> MatchResult {
    if delegation.status != DelegationStatus::Signed {
        return MatchResult {
            failed: Some(MatchFailure {
                failed_caveat: None,
                reason: format!("delegation status is {:?}, not signed", delegation.status),
            }),
        };
    }
    evaluate_caveats(&delegation.caveats, action, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedClock;
    use alloy_primitives::address;

    fn action_to(to: Address) -> Action {
        Action::new(to)
    }

    #[test]
    fn allowed_targets_permits_member_and_rejects_others() {
        let allowed = address!("0x1234567890123456789012345678901234567890");
        let terms = encode_allowed_targets(&[allowed]);
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::AllowedTargets);

        let ok = action_to(allowed);
        assert!(evaluate_caveat(&caveat, &ok, 0).is_permit());

        let dead = address!("0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead");
        let verdict = evaluate_caveat(&caveat, &action_to(dead), 0);
        match verdict {
            CaveatVerdict::Reject { failed_caveat, .. } => {
                assert_eq!(failed_caveat, CaveatKind::AllowedTargets)
            }
            CaveatVerdict::Permit => panic!("expected reject"),
        }
    }

    #[test]
    fn allowed_methods_skips_when_no_data() {
        let terms = encode_allowed_methods(&[[0xaa, 0xbb, 0xcc, 0xdd]]);
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::AllowedMethods);
        let action = Action::new(Address::ZERO);
        assert!(evaluate_caveat(&caveat, &action, 0).is_permit());
    }

    #[test]
    fn value_lte_treats_missing_value_as_zero() {
        let terms = encode_value_lte(U256::from(100));
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::ValueLte);
        let action = Action::new(Address::ZERO);
        assert!(evaluate_caveat(&caveat, &action, 0).is_permit());
    }

    #[test]
    fn erc20_transfer_amount_matches_spec_scenario() {
        let token = address!("0xdead000000000000000000000000000000dead");
        let bob = address!("0x000000000000000000000000000000000000bb");
        let terms = encode_erc20_transfer_amount(token, U256::from(1_000_000u64));
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::Erc20TransferAmount);

        let mut data = ERC20_TRANSFER_SELECTOR.to_vec();
        data.extend_from_slice(&(bob, U256::from(500_000u64)).abi_encode());
        let action = Action::new(token).with_data(data.clone());
        assert!(evaluate_caveat(&caveat, &action, 0).is_permit());

        let mut over_data = ERC20_TRANSFER_SELECTOR.to_vec();
        over_data.extend_from_slice(&(bob, U256::from(1_000_001u64)).abi_encode());
        let over_action = Action::new(token).with_data(over_data);
        assert!(!evaluate_caveat(&caveat, &over_action, 0).is_permit());

        let wrong_to = Action::new(Address::ZERO).with_data(data);
        let verdict = evaluate_caveat(&caveat, &wrong_to, 0);
        match verdict {
            CaveatVerdict::Reject { reason, .. } => assert!(reason.contains("token mismatch")),
            CaveatVerdict::Permit => panic!("expected reject"),
        }
    }

    #[test]
    fn erc20_transfer_amount_rejects_short_calldata() {
        let token = address!("0xdead000000000000000000000000000000dead");
        let terms = encode_erc20_transfer_amount(token, U256::from(1u64));
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::Erc20TransferAmount);
        let action = Action::new(token).with_data(vec![0xa9, 0x05, 0x9c, 0xbb]);
        let verdict = evaluate_caveat(&caveat, &action, 0);
        match verdict {
            CaveatVerdict::Reject { reason, .. } => assert!(reason.contains("incomplete calldata")),
            CaveatVerdict::Permit => panic!("expected reject"),
        }
    }

    #[test]
    fn timestamp_window() {
        let now = 1_700_000_000u64;
        let terms = encode_timestamp((now - 3600) as u128, (now + 3600) as u128);
        let caveat = Caveat::new(Address::ZERO, terms, CaveatKind::Timestamp);
        let action = Action::new(Address::ZERO);
        assert!(evaluate_caveat(&caveat, &action, now).is_permit());

        let expired_terms = encode_timestamp((now - 7200) as u128, (now - 3600) as u128);
        let expired = Caveat::new(Address::ZERO, expired_terms, CaveatKind::Timestamp);
        let verdict = evaluate_caveat(&expired, &action, now);
        match verdict {
            CaveatVerdict::Reject { reason, .. } => assert!(reason.contains("after the allowed window")),
            CaveatVerdict::Permit => panic!("expected reject"),
        }
    }

    #[test]
    fn pass_through_kinds_never_reject() {
        let native = Caveat::new(
            Address::ZERO,
            encode_native_token_transfer_amount(U256::ZERO),
            CaveatKind::NativeTokenTransferAmount,
        );
        let limited = Caveat::new(
            Address::ZERO,
            encode_limited_calls(U256::ZERO),
            CaveatKind::LimitedCalls,
        );
        let action = Action::new(Address::ZERO);
        assert!(evaluate_caveat(&native, &action, 0).is_permit());
        assert!(evaluate_caveat(&limited, &action, 0).is_permit());
    }

    #[test]
    fn evaluate_caveats_uses_injected_clock() {
        let clock = FixedClock(1_700_000_000);
        let terms = encode_timestamp(
            (clock.0 - 10) as u128,
            (clock.0 + 10) as u128,
        );
        let caveats = vec![Caveat::new(Address::ZERO, terms, CaveatKind::Timestamp)];
        let action = Action::new(Address::ZERO);
        let result = evaluate_caveats(&caveats, &action, &clock);
        assert!(result.permits());
    }
}
