//! The outer `execute(Execution)` / `redeemDelegations(...)` callData shape
//! (design §4.5 step 5, §6).
//!
//! The `redeemDelegations` selector is derived from the
//! `redeemDelegations(bytes[],uint256[],bytes[])` signature below, not
//! hand-coded, so it can never drift from the declaration; the outer
//! `execute` selector is account-implementation dependent (design §9
//! Open Questions). This wallet targets the single-execution `execute`
//! entrypoint shared by the Hybrid and Stateless7702 account kinds named in
//! the glossary -- see DESIGN.md for the decision record.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::action::Execution;
use crate::delegation::Delegation;
use crate::error::WalletError;

sol! {
    struct ExecutionAbi {
        address target;
        uint256 value;
        bytes callData;
    }

    function execute(ExecutionAbi execution) external;

    function redeemDelegations(
        bytes[] permissionContexts,
        uint256[] modes,
        bytes[] executions
    ) external;
}

/// `SingleDefault` execution mode, per design §6.
pub const MODE_SINGLE_DEFAULT: u64 = 0;

impl From<&Execution> for ExecutionAbi {
    fn from(execution: &Execution) -> Self {
        ExecutionAbi {
            target: execution.target,
            value: execution.value,
            callData: execution.call_data.clone(),
        }
    }
}

/// ABI-encode the inner `Execution[]` bytes for one element of
/// `redeemDelegations`'s `executions` array -- a one-element list containing
/// one [`Execution`], per design §4.5 step 5.
fn encode_inner_executions(execution: &Execution) -> Bytes {
    use alloy_sol_types::SolValue;
    vec![ExecutionAbi::from(execution)].abi_encode().into()
}

/// Build the callData that redeems `chain` (leaf-to-root order) to perform
/// `execution`, wrapped in the smart account's `execute(Execution)` entry
/// point (design §6 "Outer callData shape").
pub fn encode_redeem_call_data(
    chain: &[Delegation],
    delegation_manager: Address,
    execution: &Execution,
) -> Result<Bytes, WalletError> {
    let permission_context = crate::delegation::encode_permission_context(chain)?;
    let redeem_call = redeemDelegationsCall {
        permissionContexts: vec![permission_context],
        modes: vec![U256::from(MODE_SINGLE_DEFAULT)],
        executions: vec![encode_inner_executions(execution)],
    };
    let inner_execution = ExecutionAbi {
        target: delegation_manager,
        value: U256::ZERO,
        callData: redeem_call.abi_encode().into(),
    };
    let outer = executeCall {
        execution: inner_execution,
    };
    Ok(outer.abi_encode().into())
}

/// The `redeemDelegations(bytes[],uint256[],bytes[])` selector for a direct
/// (unwrapped) call, design §6. Derived from the `sol!` declaration above
/// rather than hand-coded.
pub const REDEEM_DELEGATIONS_SELECTOR: [u8; 4] = redeemDelegationsCall::SELECTOR;
